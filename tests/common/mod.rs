//! Shared fakes for the pipeline seams.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chat_tldr::ai::{LanguageModel, Summarizer};
use chat_tldr::clients::ChatPlatform;
use chat_tldr::core::config::{AppConfig, FilterConfig};
use chat_tldr::core::models::{ChatTranscript, Message, Role, TicketRequest};
use chat_tldr::errors::PipelineError;
use chat_tldr::utils::MessageFilter;
use chat_tldr::worker::{
    CoordinatorSettings, CrmPayload, CrmSink, DispatchOutcome, TriggerCoordinator,
};
use openai_api_rs::v1::chat_completion::ChatCompletionMessage;
use serde_json::Value;
use tokio::sync::Notify;

pub const VALID_SUMMARY: &str = r#"{
    "summary": "Customer reported an incorrect invoice and the agent offered to help.",
    "key_issues": ["Invoice amount is wrong"],
    "resolution": null,
    "action_items": ["Review the invoice"],
    "sentiment": "neutral",
    "urgency": "normal"
}"#;

pub fn message(role: Role, text: &str) -> Message {
    Message::new(role, text)
}

/// The chat from the end-to-end scenario: one system line, a greeting, a
/// question, the issue and a signature.
pub fn scenario_messages() -> Vec<Message> {
    vec![
        message(Role::System, "chat started"),
        message(Role::Customer, "hi"),
        message(Role::Agent, "hello, how can I help?"),
        message(Role::Customer, "my invoice is wrong"),
        message(Role::Agent, "Best regards, Agent Team"),
    ]
}

pub fn transcript(chat_id: &str, messages: Vec<Message>) -> ChatTranscript {
    ChatTranscript {
        chat_id: chat_id.to_string(),
        thread_id: None,
        customer_email: Some("jane@example.com".to_string()),
        customer_name: Some("Jane Doe".to_string()),
        agent_ids: vec!["agent@example.com".to_string()],
        messages,
        started_at: None,
        ended_at: None,
    }
}

/// Config with only the required keys set, plus `extra`.
pub fn config_with(extra: &[(&str, &str)]) -> AppConfig {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("LIVECHAT_ACCESS_TOKEN".to_string(), "lc-token".to_string()),
        ("OPENAI_API_KEY".to_string(), "sk-test".to_string()),
    ]);
    for (key, value) in extra {
        vars.insert((*key).to_string(), (*value).to_string());
    }
    AppConfig::from_lookup(|key| vars.get(key).cloned()).expect("test config")
}

pub fn settings() -> CoordinatorSettings {
    CoordinatorSettings {
        auto_create_ticket: true,
        auto_send_to_crm: true,
        include_raw_transcript: false,
        fetch_timeout: Duration::from_secs(30),
        dispatch_timeout: Duration::from_secs(30),
        stale_lock_timeout: Duration::from_secs(600),
        dedup_window: Duration::from_secs(300),
    }
}

// ============================================================================
// Chat platform
// ============================================================================

pub struct FakePlatform {
    transcript: Result<ChatTranscript, String>,
    ticket: Result<String, String>,
    ticket_delay: Option<Duration>,
    gate: Mutex<Option<Arc<Notify>>>,
    pub fetch_calls: AtomicUsize,
    pub tickets: Mutex<Vec<TicketRequest>>,
}

impl FakePlatform {
    pub fn new(transcript: ChatTranscript) -> Self {
        Self {
            transcript: Ok(transcript),
            ticket: Ok("T-1".to_string()),
            ticket_delay: None,
            gate: Mutex::new(None),
            fetch_calls: AtomicUsize::new(0),
            tickets: Mutex::new(Vec::new()),
        }
    }

    pub fn missing_chat() -> Self {
        Self {
            transcript: Err("get_chat returned 404 Not Found".to_string()),
            ..Self::new(transcript("missing", Vec::new()))
        }
    }

    pub fn with_ticket_failure(mut self, reason: &str) -> Self {
        self.ticket = Err(reason.to_string());
        self
    }

    pub fn with_slow_tickets(mut self, delay: Duration) -> Self {
        self.ticket_delay = Some(delay);
        self
    }

    /// The first fetch blocks until the returned handle is notified.
    pub fn gated(self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        (self, gate)
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn get_chat(
        &self,
        chat_id: &str,
        _thread_id: Option<&str>,
    ) -> Result<ChatTranscript, PipelineError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match &self.transcript {
            Ok(t) => Ok(ChatTranscript {
                chat_id: chat_id.to_string(),
                ..t.clone()
            }),
            Err(reason) => Err(PipelineError::FetchError(reason.clone())),
        }
    }

    async fn create_ticket(&self, ticket: &TicketRequest) -> Result<String, PipelineError> {
        self.tickets.lock().unwrap().push(ticket.clone());
        if let Some(delay) = self.ticket_delay {
            tokio::time::sleep(delay).await;
        }
        self.ticket
            .clone()
            .map_err(PipelineError::TicketError)
    }
}

// ============================================================================
// Language model
// ============================================================================

pub struct FakeModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<Vec<ChatCompletionMessage>>>,
}

impl FakeModel {
    /// Answers every call with a valid summary.
    pub fn valid() -> Self {
        Self::with_replies(Vec::new())
    }

    /// Answers with `replies` in order, then with a valid summary.
    pub fn with_replies(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::valid()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn complete(&self, prompt: &[ChatCompletionMessage]) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(reason)) => Err(PipelineError::SummarizationError(reason)),
            None => Ok(VALID_SUMMARY.to_string()),
        }
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}

// ============================================================================
// CRM
// ============================================================================

pub struct FakeSink {
    status: Option<u16>,
    delay: Option<Duration>,
    pub payloads: Mutex<Vec<Value>>,
}

impl FakeSink {
    pub fn accepting() -> Self {
        Self {
            status: None,
            delay: None,
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::accepting()
        }
    }

    pub fn rejecting(status: u16) -> Self {
        Self {
            status: Some(status),
            delay: None,
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    pub fn last_payload(&self) -> Option<Value> {
        self.payloads.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CrmSink for FakeSink {
    async fn dispatch(&self, payload: &CrmPayload<'_>) -> Result<DispatchOutcome, PipelineError> {
        self.payloads
            .lock()
            .unwrap()
            .push(serde_json::to_value(payload).unwrap());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.status {
            None => Ok(DispatchOutcome {
                mode: "rest",
                status: 200,
            }),
            Some(status) => Err(PipelineError::dispatch(
                Some(status),
                format!("CRM responded {status}"),
            )),
        }
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub coordinator: Arc<TriggerCoordinator>,
    pub platform: Arc<FakePlatform>,
    pub model: Arc<FakeModel>,
    pub sink: Arc<FakeSink>,
}

pub fn harness(platform: FakePlatform, model: FakeModel, sink: FakeSink) -> Harness {
    harness_with(platform, model, sink, settings())
}

pub fn harness_with(
    platform: FakePlatform,
    model: FakeModel,
    sink: FakeSink,
    settings: CoordinatorSettings,
) -> Harness {
    let platform = Arc::new(platform);
    let model = Arc::new(model);
    let sink = Arc::new(sink);

    let coordinator = TriggerCoordinator::new(
        platform.clone(),
        Summarizer::new(model.clone(), Duration::from_secs(120)),
        MessageFilter::new(FilterConfig::default()).unwrap(),
        Some(sink.clone() as Arc<dyn CrmSink>),
        settings,
    );

    Harness {
        coordinator: Arc::new(coordinator),
        platform,
        model,
        sink,
    }
}
