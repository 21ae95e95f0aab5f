use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who wrote a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Agent,
    System,
}

impl Role {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Role::Customer => "Customer",
            Role::Agent => "Agent",
            Role::System => "System",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Set by the platform when the event is a signature or boilerplate block.
    #[serde(default)]
    pub is_signature: bool,
}

impl Message {
    /// Convenience constructor for a plain message stamped now.
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            author_id: None,
            author_name: None,
            text: text.into(),
            timestamp: Utc::now(),
            is_signature: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTranscript {
    pub chat_id: String,
    pub thread_id: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub agent_ids: Vec<String>,
    pub messages: Vec<Message>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ChatTranscript {
    /// Customer display label: name first, then email.
    #[must_use]
    pub fn customer_label(&self) -> Option<&str> {
        self.customer_name
            .as_deref()
            .or(self.customer_email.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    /// Maps any model-provided label onto the allowed set. Unknown labels
    /// (including "mixed") become `Neutral`.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "positive" | "very positive" | "satisfied" | "happy" => Sentiment::Positive,
            "negative" | "very negative" | "dissatisfied" | "frustrated" | "angry" => {
                Sentiment::Negative
            }
            _ => Sentiment::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Normal,
    High,
}

impl Urgency {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
        }
    }

    /// Maps any model-provided label onto the allowed set. Unknown labels
    /// become `Normal`; escalations above `high` collapse to `High`.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" | "minor" | "trivial" => Urgency::Low,
            "high" | "critical" | "urgent" | "severe" | "blocker" => Urgency::High,
            _ => Urgency::Normal,
        }
    }
}

/// Structured summary delivered to the CRM. Field names, order and enum
/// values are the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub ticket_id: Option<String>,
    pub chat_id: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub summary: String,
    pub key_issues: Vec<String>,
    pub resolution: Option<String>,
    pub action_items: Vec<String>,
    pub sentiment: Sentiment,
    pub urgency: Urgency,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    ChatEndedWebhook,
    AgentButton,
    ManualApi,
}

impl TriggerSource {
    /// Tag attached to tickets created by this kind of run.
    #[must_use]
    pub fn ticket_tag(self) -> &'static str {
        match self {
            TriggerSource::ChatEndedWebhook => "auto-summarized",
            TriggerSource::AgentButton | TriggerSource::ManualApi => "manual-summary",
        }
    }
}

/// Ticket to open on the chat platform once a summary exists.
#[derive(Debug, Clone, Serialize)]
pub struct TicketRequest {
    pub chat_id: String,
    pub subject: String,
    pub message: String,
    pub requester_email: Option<String>,
    pub requester_name: Option<String>,
    pub tags: Vec<String>,
}

/// Incoming chat-lifecycle notification.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub webhook_id: Option<String>,
    pub secret_key: Option<String>,
    pub action: String,
    pub license_id: Option<u64>,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub additional_data: Option<serde_json::Value>,
}

impl WebhookPayload {
    #[must_use]
    pub fn chat_id(&self) -> Option<&str> {
        self.payload
            .get("chat")
            .and_then(|chat| chat.get("id"))
            .or_else(|| self.payload.get("chat_id"))
            .and_then(|v| v.as_str())
            .filter(|id| !id.is_empty())
    }

    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.payload
            .get("thread_id")
            .or_else(|| {
                self.payload
                    .get("chat")
                    .and_then(|chat| chat.get("thread"))
                    .and_then(|thread| thread.get("id"))
            })
            .and_then(|v| v.as_str())
    }
}

fn default_true() -> bool {
    true
}

/// Manual summarization request from the agent button or the API.
#[derive(Debug, Clone, Deserialize)]
pub struct SummarizeRequest {
    pub chat_id: String,
    pub thread_id: Option<String>,
    #[serde(default = "default_true")]
    pub create_ticket: bool,
    #[serde(default = "default_true")]
    pub send_to_crm: bool,
    #[serde(default)]
    pub force: bool,
    pub source: Option<TriggerSource>,
}
