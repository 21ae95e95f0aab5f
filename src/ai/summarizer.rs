//! Structured summarization on top of a [`LanguageModel`].
//!
//! The model only supplies the narrative fields. Identifiers, customer
//! fields and the timestamp always come from the transcript.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use openai_api_rs::v1::chat_completion::{ChatCompletionMessage, MessageRole};
use serde_json::Value;
use tracing::{info, warn};

use super::client::{LanguageModel, text_message};
use crate::core::models::{ChatTranscript, Message, Sentiment, SummaryRecord, Urgency};
use crate::errors::PipelineError;
use crate::prompt::{SUMMARY_INSTRUCTIONS, corrective_instruction, format_transcript};

/// Narrative fields the model is trusted with, after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub summary: String,
    pub key_issues: Vec<String>,
    pub resolution: Option<String>,
    pub action_items: Vec<String>,
    pub sentiment: Sentiment,
    pub urgency: Urgency,
}

/// Validate raw model output against the summary shape.
///
/// Missing or mistyped fields are violations. Out-of-set sentiment and
/// urgency labels are coerced, not rejected.
///
/// # Errors
///
/// Returns a human-readable reason when the output does not fit the shape.
pub fn parse_model_output(raw: &str) -> Result<ModelSummary, String> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err("reply is empty".to_string());
    }
    let value: Value =
        serde_json::from_str(body).map_err(|e| format!("reply is not valid JSON ({e})"))?;
    let obj = value
        .as_object()
        .ok_or_else(|| "reply is not a JSON object".to_string())?;

    let summary = obj
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "\"summary\" is missing or empty".to_string())?
        .to_string();

    let key_issues = string_list(obj.get("key_issues"), "key_issues")?;
    let action_items = string_list(obj.get("action_items"), "action_items")?;

    let resolution = match obj.get("resolution") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(_) => return Err("\"resolution\" must be a string or null".to_string()),
    };

    let sentiment = obj
        .get("sentiment")
        .and_then(Value::as_str)
        .map(Sentiment::normalize)
        .ok_or_else(|| "\"sentiment\" is missing".to_string())?;

    let urgency = obj
        .get("urgency")
        .and_then(Value::as_str)
        .map(Urgency::normalize)
        .ok_or_else(|| "\"urgency\" is missing".to_string())?;

    Ok(ModelSummary {
        summary,
        key_issues,
        resolution,
        action_items,
        sentiment,
        urgency,
    })
}

fn string_list(value: Option<&Value>, field: &str) -> Result<Vec<String>, String> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| format!("\"{field}\" must be an array of strings"))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.trim().to_string())
                .ok_or_else(|| format!("\"{field}\" must only contain strings"))
        })
        .filter(|item| item.as_ref().map_or(true, |s| !s.is_empty()))
        .collect()
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub struct Summarizer {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl Summarizer {
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    #[must_use]
    pub fn build_prompt(
        &self,
        transcript: &ChatTranscript,
        messages: &[Message],
    ) -> Vec<ChatCompletionMessage> {
        vec![
            text_message(MessageRole::system, SUMMARY_INSTRUCTIONS),
            text_message(
                MessageRole::user,
                format!(
                    "Chat Transcript:\n\n{}",
                    format_transcript(transcript, messages)
                ),
            ),
        ]
    }

    /// Summarize the cleaned messages of `transcript`.
    ///
    /// # Errors
    ///
    /// `InsufficientContent` when `messages` is empty (no model call is made);
    /// `SummarizationError` when the model fails, times out, or still returns
    /// an invalid shape after one corrective retry.
    pub async fn summarize(
        &self,
        transcript: &ChatTranscript,
        messages: &[Message],
    ) -> Result<SummaryRecord, PipelineError> {
        if messages.is_empty() {
            return Err(PipelineError::InsufficientContent(format!(
                "chat {} has no messages left after filtering",
                transcript.chat_id
            )));
        }

        let mut prompt = self.build_prompt(transcript, messages);

        let first = self.call_model(&prompt).await?;
        let parsed = match parse_model_output(&first) {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!(
                    chat_id = %transcript.chat_id,
                    reason = %reason,
                    "Model reply failed validation, retrying once"
                );
                prompt.push(text_message(MessageRole::assistant, first));
                prompt.push(text_message(MessageRole::user, corrective_instruction(&reason)));

                let second = self.call_model(&prompt).await?;
                parse_model_output(&second).map_err(|reason| {
                    PipelineError::SummarizationError(format!(
                        "invalid model output after retry: {reason}"
                    ))
                })?
            }
        };

        info!(
            chat_id = %transcript.chat_id,
            sentiment = ?parsed.sentiment,
            urgency = ?parsed.urgency,
            "Summary generated"
        );

        Ok(SummaryRecord {
            ticket_id: None,
            chat_id: transcript.chat_id.clone(),
            customer_email: transcript.customer_email.clone(),
            customer_name: transcript.customer_name.clone(),
            summary: parsed.summary,
            key_issues: parsed.key_issues,
            resolution: parsed.resolution,
            action_items: parsed.action_items,
            sentiment: parsed.sentiment,
            urgency: parsed.urgency,
            timestamp: Utc::now(),
        })
    }

    async fn call_model(&self, prompt: &[ChatCompletionMessage]) -> Result<String, PipelineError> {
        match tokio::time::timeout(self.timeout, self.model.complete(prompt)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(PipelineError::SummarizationError(msg))) => {
                Err(PipelineError::SummarizationError(msg))
            }
            Ok(Err(other)) => Err(PipelineError::SummarizationError(other.to_string())),
            Err(_) => Err(PipelineError::SummarizationError(format!(
                "model call timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}
