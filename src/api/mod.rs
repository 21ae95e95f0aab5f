//! HTTP surface: webhook ingestion, manual triggers, preview and health.

pub mod actions;
pub mod handler;
pub mod helpers;
pub mod signature;
pub mod webhooks;

use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::worker::TriggerCoordinator;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub coordinator: Arc<TriggerCoordinator>,
}

// Re-export the router for convenience
pub use handler::router;
