//! Secondary "hello" server.
//!
//! A tiny axum app serving `GET /api/hello`, run alongside the API server
//! when `server.companion_bind` is set. It stops when the shared shutdown
//! channel flips to `true`.

use axum::{routing::get, Json, Router};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const HELLO_MESSAGE: &str = "Hello from LeapLogic RAG API!";

pub fn router() -> Router {
    Router::new().route(
        "/api/hello",
        get(|| async { Json(json!({ "message": HELLO_MESSAGE })) }),
    )
}

/// Resolves once `rx` observes `true` or its sender is dropped.
pub async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Bind `bind` and serve the hello route on a spawned task.
pub fn spawn_companion(
    bind: String,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        tracing::info!(bind = %bind, "companion server started");

        axum::serve(listener, router())
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        tracing::info!("companion server stopped");
        Ok(())
    })
}
