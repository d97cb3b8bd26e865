//! Typed errors at the engine boundary.
//!
//! Internals use `anyhow`; [`RagError`] is what the engine hands back to the
//! HTTP layer and the CLI, so each failure can be mapped to a response shape
//! and status without string matching.

use thiserror::Error;

use crate::codec::DecodeError;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error(transparent)]
    Codec(#[from] DecodeError),
    #[error("database error: {0}")]
    Database(String),
    #[error("{0}")]
    Engine(String),
    #[error("{0}")]
    BadRequest(String),
}

/// Coarse classification of a [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ModelLoad,
    Codec,
    Database,
    Engine,
    BadRequest,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::ModelLoad(_) => ErrorKind::ModelLoad,
            RagError::Codec(_) => ErrorKind::Codec,
            RagError::Database(_) => ErrorKind::Database,
            RagError::Engine(_) => ErrorKind::Engine,
            RagError::BadRequest(_) => ErrorKind::BadRequest,
        }
    }

    pub fn model_load(err: anyhow::Error) -> Self {
        RagError::ModelLoad(format!("{:#}", err))
    }

    /// Wrap a storage failure, keeping a codec error typed when it is the root cause.
    pub fn database(err: anyhow::Error) -> Self {
        match err.downcast::<DecodeError>() {
            Ok(decode) => RagError::Codec(decode),
            Err(err) => RagError::Database(format!("{:#}", err)),
        }
    }

    pub fn engine(err: anyhow::Error) -> Self {
        RagError::Engine(format!("{:#}", err))
    }
}
