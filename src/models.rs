//! Core data models used throughout the RAG service.
//!
//! These types represent the documents and chunks held by the vector store,
//! and the request/response shapes that flow through the engine and the
//! HTTP layer.

use serde::{Deserialize, Serialize};

/// A file discovered under the knowledge root, before chunking.
#[derive(Debug, Clone)]
pub struct KnowledgeFile {
    /// Path relative to the knowledge root, using `/` separators.
    pub filename: String,
    pub body: String,
}

/// Document row stored in SQLite.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub content_hash: String,
    pub chunk_count: i64,
    pub created_at: i64,
}

/// A chunk of a document's text, before it is embedded.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk as read back from the store, with its decoded embedding.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Restricts retrieval to one or more source files.
///
/// Accepts either a bare string or a list of strings on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FileFilter {
    Single(String),
    Many(Vec<String>),
}

impl FileFilter {
    /// Normalize into a list of non-empty, trimmed file names.
    pub fn into_names(self) -> Vec<String> {
        let names = match self {
            FileFilter::Single(name) => vec![name],
            FileFilter::Many(names) => names,
        };
        names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

/// One prior turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConversationTurn {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

fn default_role() -> String {
    "user".to_string()
}

/// A retrieved chunk cited in an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub filename: String,
    pub chunk_index: i64,
    pub score: f32,
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub model: String,
    pub embedding_model: String,
    pub chunks_retrieved: usize,
    pub file_filter: Vec<String>,
    pub history_turns_used: usize,
    pub elapsed_ms: u64,
}

/// Result of answering one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub metadata: AnswerMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStats {
    pub filename: String,
    pub chunk_count: i64,
}

/// Corpus statistics reported by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub total_documents: i64,
    pub total_chunks: i64,
    pub embedding_dim: Option<i64>,
    pub embedding_model: Option<String>,
    pub documents: Vec<DocumentStats>,
    pub database_path: String,
}

/// Outcome of a knowledge base rebuild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub embedding_dim: usize,
    pub skipped: usize,
}
