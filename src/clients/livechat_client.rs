//! LiveChat Agent API client
//!
//! Reads chat transcripts and opens tickets. Transcript reads are retried
//! with backoff; ticket creation is not, since it is not idempotent.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{info, warn};

use crate::core::config::AppConfig;
use crate::core::models::{ChatTranscript, Message, Role, TicketRequest};
use crate::errors::PipelineError;

/// The chat platform as seen by the pipeline.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn get_chat(
        &self,
        chat_id: &str,
        thread_id: Option<&str>,
    ) -> Result<ChatTranscript, PipelineError>;

    /// Returns the id of the created ticket.
    async fn create_ticket(&self, ticket: &TicketRequest) -> Result<String, PipelineError>;
}

pub struct LiveChatClient {
    http: Client,
    api_url: String,
    auth_header: String,
}

impl LiveChatClient {
    /// # Errors
    ///
    /// Returns `ConfigError` if the HTTP client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self, PipelineError> {
        let http = Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| PipelineError::ConfigError(format!("LiveChat HTTP client: {e}")))?;

        // Personal access tokens authenticate as Basic account_id:token;
        // bare tokens go out as Bearer.
        let auth_header = match &config.livechat_account_id {
            Some(account_id) => format!(
                "Basic {}",
                general_purpose::STANDARD
                    .encode(format!("{account_id}:{}", config.livechat_access_token))
            ),
            None => format!("Bearer {}", config.livechat_access_token),
        };

        Ok(Self {
            http,
            api_url: config.livechat_api_url.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    fn headers(&self) -> Result<HeaderMap, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&self.auth_header)
                .map_err(|e| PipelineError::ConfigError(format!("LIVECHAT_ACCESS_TOKEN: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// POST an agent action. Transport failures, 429 and 5xx come back as
    /// `HttpError` so callers can tell them apart from hard failures. A 2xx
    /// body that is not JSON is a hard `FetchError`.
    async fn action(&self, action: &str, body: &Value) -> Result<Value, PipelineError> {
        let response = self
            .http
            .post(format!("{}/agent/action/{action}", self.api_url))
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| {
                PipelineError::FetchError(format!("{action} returned an unreadable body: {e}"))
            });
        }

        let body_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        let message = format!("{action} returned {status}: {body_text}");
        if status.is_server_error() || status.as_u16() == 429 {
            Err(PipelineError::HttpError(message))
        } else {
            Err(PipelineError::FetchError(message))
        }
    }
}

#[async_trait]
impl ChatPlatform for LiveChatClient {
    async fn get_chat(
        &self,
        chat_id: &str,
        thread_id: Option<&str>,
    ) -> Result<ChatTranscript, PipelineError> {
        let mut body = json!({ "chat_id": chat_id });
        if let Some(thread_id) = thread_id {
            body["thread_id"] = json!(thread_id);
        }

        let strategy = ExponentialBackoff::from_millis(100).map(jitter).take(2);
        let response = RetryIf::spawn(
            strategy,
            || self.action("get_chat", &body),
            |e: &PipelineError| {
                let transient = matches!(e, PipelineError::HttpError(_));
                if transient {
                    warn!(chat_id, error = %e, "Transient error fetching chat, retrying");
                }
                transient
            },
        )
        .await
        .map_err(|e| match e {
            PipelineError::FetchError(msg) => PipelineError::FetchError(msg),
            other => PipelineError::FetchError(other.to_string()),
        })?;

        let transcript = parse_chat_response(chat_id, thread_id, &response);
        info!(
            chat_id,
            messages = transcript.messages.len(),
            "Fetched chat transcript"
        );
        Ok(transcript)
    }

    async fn create_ticket(&self, ticket: &TicketRequest) -> Result<String, PipelineError> {
        let mut body = json!({
            "subject": ticket.subject,
            "message": ticket.message,
            "source": { "type": "chat", "id": ticket.chat_id },
        });
        if let Some(email) = &ticket.requester_email {
            body["requester"] = json!({
                "email": email,
                "name": ticket.requester_name.as_deref().unwrap_or(email),
            });
        }
        if !ticket.tags.is_empty() {
            body["tags"] = json!(ticket.tags);
        }

        let response = self
            .action("create_ticket", &body)
            .await
            .map_err(|e| PipelineError::TicketError(e.to_string()))?;

        ticket_id_from(&response).ok_or_else(|| {
            PipelineError::TicketError("create_ticket response carried no ticket id".to_string())
        })
    }
}

fn ticket_id_from(response: &Value) -> Option<String> {
    let id = response
        .get("id")
        .or_else(|| response.get("ticket").and_then(|t| t.get("id")))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert a `get_chat` response into a transcript.
///
/// Accepts both the `{chat: {threads: [...]}}` and the `{thread: {...}}`
/// shapes. Only `message` and `system_message` events become messages.
#[must_use]
pub fn parse_chat_response(
    chat_id: &str,
    thread_id: Option<&str>,
    response: &Value,
) -> ChatTranscript {
    let chat = response.get("chat").unwrap_or(response);

    let threads: Vec<&Value> = match chat.get("threads").and_then(Value::as_array) {
        Some(threads) => threads.iter().collect(),
        None => chat.get("thread").into_iter().collect(),
    };

    let users: &[Value] = chat
        .get("users")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);

    let user_str = |user: &Value, key: &str| user.get(key).and_then(Value::as_str).map(String::from);

    let customer = users
        .iter()
        .find(|u| u.get("type").and_then(Value::as_str) == Some("customer"));
    let agent_ids: Vec<String> = users
        .iter()
        .filter(|u| u.get("type").and_then(Value::as_str) == Some("agent"))
        .filter_map(|u| user_str(u, "id"))
        .collect();

    let mut messages = Vec::new();
    let mut started_at = None;
    let mut ended_at = None;

    for thread in threads {
        if started_at.is_none() {
            started_at = parse_timestamp(thread.get("created_at").and_then(Value::as_str));
        }
        if let Some(closed) = parse_timestamp(thread.get("closed_at").and_then(Value::as_str)) {
            ended_at = Some(closed);
        }

        let events = thread
            .get("events")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice);

        for event in events {
            let kind = event.get("type").and_then(Value::as_str).unwrap_or_default();
            let author_id = event.get("author_id").and_then(Value::as_str);

            let role = match kind {
                "system_message" => Role::System,
                "message" => match author_id {
                    Some(id) if agent_ids.iter().any(|a| a == id) => Role::Agent,
                    Some(id) if id.starts_with("system") => Role::System,
                    _ => Role::Customer,
                },
                _ => continue,
            };

            let author_name = author_id.and_then(|id| {
                users
                    .iter()
                    .find(|u| u.get("id").and_then(Value::as_str) == Some(id))
                    .and_then(|u| user_str(u, "name").or_else(|| user_str(u, "email")))
            });

            messages.push(Message {
                id: event
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                role,
                author_id: author_id.map(String::from),
                author_name,
                text: event
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                timestamp: parse_timestamp(event.get("created_at").and_then(Value::as_str))
                    .unwrap_or_else(Utc::now),
                is_signature: false,
            });
        }
    }

    ChatTranscript {
        chat_id: chat_id.to_string(),
        thread_id: thread_id.map(String::from),
        customer_email: customer.and_then(|c| user_str(c, "email")),
        customer_name: customer.and_then(|c| user_str(c, "name")),
        agent_ids,
        messages,
        started_at,
        ended_at,
    }
}
