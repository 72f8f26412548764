//! HTTP surface: router, shared handler state and the server loop.
//!
//! ## Routes
//!
//! ```text
//! GET  /ping         → {"message":"pong"}
//! POST /api/chat     one-shot answer, or SSE relay when streaming
//! POST /api/chat2    tool-calling agent
//! POST /api/intent   DNS intent extraction
//! ```
//!
//! The server's [`CancellationToken`] is wired to axum's graceful shutdown
//! and is the parent of every stream's token, so shutdown also ends open
//! SSE relays.

mod chat;
pub mod common;
mod stream;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::Agent;
use crate::config::Config;
use crate::error::AppError;
use crate::llm::service::LlmService;

// ── Shared request state ──────────────────────────────────────────────────────

/// Injected into every handler via [`axum::extract::State`].
///
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: LlmService,
    pub agent: Arc<Agent>,
    /// Cancelled on server shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, llm: LlmService, agent: Agent, shutdown: CancellationToken) -> Self {
        Self { config: Arc::new(config), llm, agent: Arc::new(agent), shutdown }
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.server.max_body_bytes;
    Router::new()
        .route("/ping",        get(chat::ping))
        .route("/api/chat",    post(chat::chat))
        .route("/api/chat2",   post(chat::chat_agent))
        .route("/api/intent",  post(chat::intent))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

// ── Server loop ───────────────────────────────────────────────────────────────

/// Bind `bind_addr` and serve `router` until `shutdown` is cancelled.
pub async fn serve(bind_addr: &str, router: Router, shutdown: CancellationToken) -> Result<(), AppError> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Server(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Server(format!("http server error: {e}")))?;

    info!("http server shut down");
    Ok(())
}
