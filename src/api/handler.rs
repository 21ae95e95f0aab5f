//! HTTP entry point - thin router that delegates to specialized handlers.
//!
//! This module handles:
//! - Chat-lifecycle webhooks (delegated to `webhooks`)
//! - Manual triggers, preview and introspection (delegated to `actions`)
//! - Health checks

use axum::Router;
use axum::response::Response;
use axum::routing::{get, post};
use serde_json::json;
use tower_http::trace::TraceLayer;

use super::helpers::ok_json;
use super::{AppState, actions, webhooks};

/// Build the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // ── Health ─────────────────────────────────────────────────
        .route("/", get(health))
        .route("/health", get(health))
        .route("/webhooks/health", get(health))
        // ── Webhooks ───────────────────────────────────────────────
        .route("/webhooks/livechat", post(webhooks::livechat_webhook))
        // ── Manual triggers ────────────────────────────────────────
        .route("/api/summarize", post(actions::summarize))
        .route("/api/summarize/{chat_id}", get(actions::summarize_by_path))
        .route("/api/preview/{chat_id}", get(actions::preview))
        // ── Introspection ──────────────────────────────────────────
        .route("/api/status", get(actions::status))
        .route("/api/runs", get(actions::runs))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /, /health, /webhooks/health
pub async fn health() -> Response {
    ok_json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
