//! LLM (`OpenAI`) API client module
//!
//! Encapsulates the chat-completions call used for structured summaries.

use async_trait::async_trait;
use openai_api_rs::v1::chat_completion::{ChatCompletionMessage, Content, MessageRole};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
#[cfg(feature = "debug-logs")]
use tracing::debug;
use tracing::info;

use crate::core::config::AppConfig;
use crate::errors::PipelineError;

#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4 + 1
}

#[must_use]
pub fn text_message(role: MessageRole, text: impl Into<String>) -> ChatCompletionMessage {
    ChatCompletionMessage {
        role,
        content: Content::Text(text.into()),
        name: None,
        tool_calls: None,
        tool_call_id: None,
    }
}

/// Anything that can answer a chat prompt with raw text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// # Errors
    ///
    /// Returns `SummarizationError` when the call fails or yields no text.
    async fn complete(&self, prompt: &[ChatCompletionMessage]) -> Result<String, PipelineError>;

    fn model_name(&self) -> &str;
}

/// LLM API client for generating summaries
pub struct LlmClient {
    http: Client,
    api_key: String,
    org_id: Option<String>,
    base_url: String,
    model_name: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmClient {
    /// # Errors
    ///
    /// Returns `ConfigError` if the HTTP client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self, PipelineError> {
        let http = Client::builder()
            .timeout(config.model_timeout)
            .build()
            .map_err(|e| PipelineError::ConfigError(format!("LLM HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: config.openai_api_key.clone(),
            org_id: config.openai_org_id.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model_name: config.openai_model.clone(),
            max_tokens: config.openai_max_tokens,
            temperature: config.openai_temperature,
        })
    }

    fn headers(&self) -> Result<HeaderMap, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| PipelineError::ConfigError(format!("OPENAI_API_KEY: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(org) = &self.org_id {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(org)
                    .map_err(|e| PipelineError::ConfigError(format!("OPENAI_ORG_ID: {e}")))?,
            );
        }
        Ok(headers)
    }
}

#[allow(unreachable_patterns)]
fn role_str(role: &MessageRole) -> &'static str {
    match role {
        MessageRole::system => "system",
        MessageRole::user => "user",
        MessageRole::assistant => "assistant",
        MessageRole::function => "function",
        MessageRole::tool => "tool",
        _ => "user",
    }
}

/// Serialize prompt messages into the chat-completions `messages` array.
/// Only text content is forwarded.
#[must_use]
pub fn prompt_to_json(prompt: &[ChatCompletionMessage]) -> Vec<Value> {
    prompt
        .iter()
        .filter_map(|msg| match &msg.content {
            Content::Text(text) => Some(json!({
                "role": role_str(&msg.role),
                "content": text,
            })),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, prompt: &[ChatCompletionMessage]) -> Result<String, PipelineError> {
        #[cfg(feature = "debug-logs")]
        debug!("Using prompt:\n{:?}", prompt);

        let messages = prompt_to_json(prompt);
        let estimated_input_tokens: usize = messages
            .iter()
            .map(|m| estimate_tokens(m["content"].as_str().unwrap_or_default()))
            .sum();

        info!(
            model = %self.model_name,
            messages = messages.len(),
            estimated_input_tokens,
            "Requesting structured summary"
        );

        let request_body = json!({
            "model": self.model_name,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .headers(self.headers()?)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::SummarizationError("model request timed out".to_string())
                } else {
                    PipelineError::SummarizationError(format!("model request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::SummarizationError(format!(
                "model API error {status}: {error_text}"
            )));
        }

        let response_json: Value = response.json().await.map_err(|e| {
            PipelineError::SummarizationError(format!("failed to parse model response: {e}"))
        })?;

        response_json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| PipelineError::SummarizationError("No text in response".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
