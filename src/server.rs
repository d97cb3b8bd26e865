//! HTTP API server.
//!
//! Exposes the [`RagEngine`] over a small JSON API. Handlers never fail the
//! request at the framework level: every engine error is turned into a
//! JSON body carrying an `"error"` field.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service banner with version |
//! | `GET`  | `/api/hello` | Static greeting |
//! | `POST` | `/generate-answer` | Answer a question from the knowledge base |
//! | `GET`  | `/get-statistics` | Document and chunk counts |
//! | `GET`  | `/get-model-name` | Chat model identifier |
//! | `POST` | `/reload-knowledge-base` | Re-index the knowledge directory |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": "question must not be empty", "answer": "", "sources": [] }
//! ```
//!
//! With `server.error_status = "compat"` (the default) errors are sent with
//! `200 OK`. With `"mapped"`, bad requests get `400` and everything else
//! `500`; the body is unchanged.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

use crate::companion::shutdown_signal;
use crate::config::ErrorStatusMode;
use crate::engine::RagEngine;
use crate::error::{ErrorKind, RagError};
use crate::models::{ConversationTurn, FileFilter};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    engine: Arc<RagEngine>,
    error_status: ErrorStatusMode,
}

/// Build the API router around an engine.
pub fn router(engine: Arc<RagEngine>) -> Router {
    let state = AppState {
        error_status: engine.config().server.error_status,
        engine,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/api/hello", get(handle_hello))
        .route("/generate-answer", post(handle_generate_answer))
        .route("/get-statistics", get(handle_statistics))
        .route("/get-model-name", get(handle_model_name))
        .route("/reload-knowledge-base", post(handle_reload))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
///
/// Binds to `[server].bind` and serves until `shutdown` flips to `true`,
/// then drains in-flight requests and returns.
pub async fn run_server(
    engine: Arc<RagEngine>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let bind_addr = engine.config().server.bind.clone();
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("RAG API listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "api server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("api server stopped");
    Ok(())
}

// ============ Error response ============

/// Status code for an engine error under the configured policy.
pub fn error_status(mode: ErrorStatusMode, kind: ErrorKind) -> StatusCode {
    match mode {
        ErrorStatusMode::Compat => StatusCode::OK,
        ErrorStatusMode::Mapped => match kind {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::ModelLoad
            | ErrorKind::Codec
            | ErrorKind::Database
            | ErrorKind::Engine => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn error_response(
    state: &AppState,
    route: &str,
    err: &RagError,
    body: serde_json::Value,
) -> Response {
    tracing::warn!(route, kind = ?err.kind(), error = %err, "request failed");
    (error_status(state.error_status, err.kind()), Json(body)).into_response()
}

fn answer_error_body(err: &RagError) -> serde_json::Value {
    json!({ "error": err.to_string(), "answer": "", "sources": [] })
}

// ============ GET / and /api/hello ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "LeapLogic RAG API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_hello() -> Json<serde_json::Value> {
    Json(json!({ "message": crate::companion::HELLO_MESSAGE }))
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /generate-answer ============

/// Request body for `POST /generate-answer`. Unknown keys are ignored.
#[derive(Debug, Deserialize)]
pub struct GenerateAnswerRequest {
    pub question: String,
    #[serde(default)]
    pub file_filter: Option<FileFilter>,
    #[serde(default)]
    pub conversation_history: Option<Vec<ConversationTurn>>,
}

async fn handle_generate_answer(
    State(state): State<AppState>,
    payload: Result<Json<GenerateAnswerRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            let err = RagError::BadRequest(rejection.body_text());
            return error_response(&state, "generate-answer", &err, answer_error_body(&err));
        }
    };

    match state
        .engine
        .answer_question(&req.question, req.file_filter, req.conversation_history)
        .await
    {
        Ok(answer) => Json(answer).into_response(),
        Err(err) => error_response(&state, "generate-answer", &err, answer_error_body(&err)),
    }
}

// ============ GET /get-statistics ============

async fn handle_statistics(State(state): State<AppState>) -> Response {
    match state.engine.get_statistics().await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => error_response(&state, "get-statistics", &err, answer_error_body(&err)),
    }
}

// ============ GET /get-model-name ============

async fn handle_model_name(State(state): State<AppState>) -> Response {
    match state.engine.get_model_name().await {
        Ok(model_name) => Json(json!({ "model_name": model_name })).into_response(),
        Err(err) => {
            let body = json!({ "error": err.to_string(), "model_name": "" });
            error_response(&state, "get-model-name", &err, body)
        }
    }
}

// ============ POST /reload-knowledge-base ============

async fn handle_reload(State(state): State<AppState>) -> Response {
    match state.engine.reload_knowledge_base().await {
        Ok(report) => {
            tracing::info!(
                documents = report.documents,
                chunks = report.chunks,
                "knowledge base reloaded via api"
            );
            Json(json!({ "message": "Knowledge base reloaded successfully" })).into_response()
        }
        Err(err) => {
            let body = json!({ "error": err.to_string() });
            error_response(&state, "reload-knowledge-base", &err, body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compat_mode_always_ok() {
        for kind in [
            ErrorKind::BadRequest,
            ErrorKind::Codec,
            ErrorKind::Database,
            ErrorKind::Engine,
            ErrorKind::ModelLoad,
        ] {
            assert_eq!(error_status(ErrorStatusMode::Compat, kind), StatusCode::OK);
        }
    }

    #[test]
    fn test_mapped_mode_statuses() {
        assert_eq!(
            error_status(ErrorStatusMode::Mapped, ErrorKind::BadRequest),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(ErrorStatusMode::Mapped, ErrorKind::Codec),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_request_accepts_filter_shapes_and_ignores_unknown_keys() {
        let req: GenerateAnswerRequest = serde_json::from_str(
            r#"{"question": "q", "file_filter": ["a.md"], "conversation_history": null, "extra": 1}"#,
        )
        .unwrap();
        assert_eq!(req.file_filter, Some(FileFilter::Many(vec!["a.md".to_string()])));
        assert!(req.conversation_history.is_none());

        let req: GenerateAnswerRequest =
            serde_json::from_str(r#"{"question": "q", "file_filter": null}"#).unwrap();
        assert!(req.file_filter.is_none());
    }

    #[test]
    fn test_answer_error_body_shape() {
        let body = answer_error_body(&RagError::Engine("boom".to_string()));
        assert_eq!(body["error"], "boom");
        assert_eq!(body["answer"], "");
        assert_eq!(body["sources"], json!([]));
    }
}
