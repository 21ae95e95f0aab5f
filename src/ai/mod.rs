//! All AI/LLM functionality

pub mod client;
pub mod summarizer;

// Re-export main types for convenience
pub use client::{LanguageModel, LlmClient, estimate_tokens};
pub use summarizer::{ModelSummary, Summarizer, parse_model_output};
