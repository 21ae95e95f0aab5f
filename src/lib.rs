//! Chat TLDR - summarizes finished LiveChat conversations and hands the
//! summary to a CRM.
//!
//! A chat-ended webhook (or a manual request) enters the trigger coordinator,
//! which fetches the transcript, filters out noise, asks a language model for
//! a structured summary, then optionally opens a ticket on the chat platform
//! and delivers the summary to a CRM over REST or a webhook.
//!
//! # Architecture
//!
//! The system uses:
//! - axum for the webhook and manual-trigger HTTP surface
//! - reqwest for the LiveChat, model and CRM calls
//! - openai-api-rs message types for the model prompt
//! - dashmap for the per-chat single-flight table
//! - Tokio for async runtime
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chat_tldr::ai::{LlmClient, Summarizer};
//! use chat_tldr::clients::LiveChatClient;
//! use chat_tldr::core::config::AppConfig;
//! use chat_tldr::core::models::TriggerSource;
//! use chat_tldr::utils::MessageFilter;
//! use chat_tldr::worker::{CoordinatorSettings, TriggerCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     chat_tldr::setup_logging();
//!
//!     let config = AppConfig::from_env()?;
//!     let coordinator = TriggerCoordinator::new(
//!         Arc::new(LiveChatClient::new(&config)?),
//!         Summarizer::new(Arc::new(LlmClient::new(&config)?), config.model_timeout),
//!         MessageFilter::new(config.filter.clone())?,
//!         None,
//!         CoordinatorSettings::from_config(&config),
//!     );
//!
//!     let outcome = coordinator
//!         .request_summary("CHAT123", TriggerSource::ManualApi)
//!         .await;
//!     println!("{}", outcome.label());
//!     Ok(())
//! }
//! ```
// Module declarations
pub mod ai;
pub mod api;
pub mod clients;
pub mod core;
pub mod errors;
pub mod prompt;
pub mod utils;
pub mod worker;

const DEFAULT_LOG_FILTER: &str = "chat_tldr=info,tower_http=info";

/// Configure structured JSON logging.
///
/// The filter comes from `RUST_LOG` and defaults to `chat_tldr=info,tower_http=info`.
/// Calling it more than once keeps the first subscriber.
///
/// # Example
///
/// ```
/// chat_tldr::setup_logging();
/// ```
pub fn setup_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
