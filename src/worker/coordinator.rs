//! Trigger Coordinator: decides whether a run starts and drives it.
//!
//! Every run goes fetch → filter → summarize, then performs the ticket and
//! CRM side effects independently of each other. The per-chat claim taken
//! from the [`TriggerTable`] is held for the whole run and released by its
//! guard on every exit path.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::deliver::{CrmPayload, CrmSink};
use super::trigger::{Acquire, TriggerGuard, TriggerTable};
use crate::ai::Summarizer;
use crate::clients::ChatPlatform;
use crate::core::config::AppConfig;
use crate::core::models::{ChatTranscript, SummaryRecord, TicketRequest, TriggerSource};
use crate::errors::{PipelineError, Stage};
use crate::prompt::format_transcript;
use crate::utils::filters::MessageFilter;

/// Number of finished runs kept for `/api/runs`.
pub const RUN_HISTORY_CAPACITY: usize = 100;

/// Upper bound on a single wait while a forced run queues behind another run.
const FORCED_RUN_POLL: Duration = Duration::from_millis(250);

/// Process-wide switches the coordinator applies to every run.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub auto_create_ticket: bool,
    pub auto_send_to_crm: bool,
    pub include_raw_transcript: bool,
    pub fetch_timeout: Duration,
    pub dispatch_timeout: Duration,
    pub stale_lock_timeout: Duration,
    pub dedup_window: Duration,
}

impl CoordinatorSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            auto_create_ticket: config.auto_create_ticket,
            auto_send_to_crm: config.auto_send_to_crm,
            include_raw_transcript: config.include_raw_transcript,
            fetch_timeout: config.fetch_timeout,
            dispatch_timeout: config.dispatch_timeout,
            stale_lock_timeout: config.stale_lock_timeout,
            dedup_window: config.dedup_window,
        }
    }
}

/// One summarization request as it enters the gate.
///
/// `create_ticket` and `send_to_crm` can only narrow the configured
/// toggles, never widen them.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub chat_id: String,
    pub thread_id: Option<String>,
    pub source: TriggerSource,
    pub create_ticket: bool,
    pub send_to_crm: bool,
}

impl RunRequest {
    #[must_use]
    pub fn new(chat_id: impl Into<String>, source: TriggerSource) -> Self {
        Self {
            chat_id: chat_id.into(),
            thread_id: None,
            source,
            create_ticket: true,
            send_to_crm: true,
        }
    }

    #[must_use]
    pub fn with_thread(mut self, thread_id: Option<String>) -> Self {
        self.thread_id = thread_id;
        self
    }
}

/// Result of one optional side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SideEffect {
    Skipped,
    Succeeded { detail: String },
    Failed { reason: String },
}

impl SideEffect {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self, SideEffect::Succeeded { .. })
    }

    #[must_use]
    pub fn failed(&self) -> bool {
        matches!(self, SideEffect::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub record: SummaryRecord,
    pub ticket: SideEffect,
    pub crm: SideEffect,
}

/// Terminal result of `request_summary` and friends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    AlreadyRunning,
    AlreadySummarized,
    /// A summary was produced. Side effects may still have failed.
    Completed(RunReport),
    /// Filtering left nothing to summarize; the model was not called.
    InsufficientContent { reason: String },
    Failed { stage: Stage, reason: String },
}

impl RunOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::AlreadyRunning => "already_running",
            RunOutcome::AlreadySummarized => "already_summarized",
            RunOutcome::Completed(_) => "completed",
            RunOutcome::InsufficientContent { .. } => "insufficient_content",
            RunOutcome::Failed { .. } => "failed",
        }
    }

    #[must_use]
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    /// A summary exists but the ticket or the CRM delivery failed.
    #[must_use]
    pub fn is_partial_failure(&self) -> bool {
        self.report()
            .is_some_and(|r| r.ticket.failed() || r.crm.failed())
    }
}

/// Finished run as kept in the in-memory history.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub chat_id: String,
    pub source: TriggerSource,
    pub forced: bool,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

/// Side-effect-free summary of a chat.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub record: SummaryRecord,
    pub total_messages: usize,
    pub kept_messages: usize,
    pub transcript: String,
}

pub struct TriggerCoordinator {
    table: TriggerTable,
    platform: Arc<dyn ChatPlatform>,
    summarizer: Summarizer,
    filter: MessageFilter,
    crm: Option<Arc<dyn CrmSink>>,
    settings: CoordinatorSettings,
    history: Mutex<VecDeque<RunRecord>>,
}

impl TriggerCoordinator {
    /// `crm` is `None` when no CRM target is configured; CRM delivery is
    /// then reported as skipped.
    #[must_use]
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        summarizer: Summarizer,
        filter: MessageFilter,
        crm: Option<Arc<dyn CrmSink>>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            table: TriggerTable::new(settings.stale_lock_timeout, settings.dedup_window),
            platform,
            summarizer,
            filter,
            crm,
            settings,
            history: Mutex::new(VecDeque::with_capacity(RUN_HISTORY_CAPACITY)),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    #[must_use]
    pub fn triggers(&self) -> &TriggerTable {
        &self.table
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        self.summarizer.model_name()
    }

    #[must_use]
    pub fn crm_enabled(&self) -> bool {
        self.crm.is_some()
    }

    /// Start a run for `chat_id` unless one is in flight or just finished.
    pub async fn request_summary(&self, chat_id: &str, source: TriggerSource) -> RunOutcome {
        self.request_summary_with(RunRequest::new(chat_id, source)).await
    }

    pub async fn request_summary_with(&self, request: RunRequest) -> RunOutcome {
        match self.table.try_acquire(&request.chat_id) {
            Acquire::Acquired(guard) => self.run(guard, request, false).await,
            Acquire::AlreadyRunning => {
                info!(
                    chat_id = %request.chat_id,
                    source = ?request.source,
                    "Run already in flight, ignoring trigger"
                );
                self.remember(&request, false, RunOutcome::AlreadyRunning).await
            }
            Acquire::AlreadySummarized => {
                info!(
                    chat_id = %request.chat_id,
                    source = ?request.source,
                    "Chat summarized recently, ignoring trigger"
                );
                self.remember(&request, false, RunOutcome::AlreadySummarized).await
            }
        }
    }

    /// Re-run a chat regardless of an earlier completed run.
    ///
    /// If a run is in flight this waits for it to finish first, so two runs
    /// for one chat never overlap.
    pub async fn request_summary_forced(&self, request: RunRequest) -> RunOutcome {
        loop {
            if let Some(guard) = self.table.try_acquire_forced(&request.chat_id) {
                return self.run(guard, request, true).await;
            }
            info!(chat_id = %request.chat_id, "Forced run waiting for in-flight run");
            self.table.wait_for_release(FORCED_RUN_POLL).await;
        }
    }

    /// Fetch, filter and summarize without touching the trigger table, the
    /// ticket system or the CRM.
    ///
    /// # Errors
    ///
    /// `FetchError`, `InsufficientContent` or `SummarizationError` from the
    /// corresponding stage.
    pub async fn preview(
        &self,
        chat_id: &str,
        thread_id: Option<&str>,
    ) -> Result<Preview, PipelineError> {
        let transcript = self.fetch(chat_id, thread_id).await?;
        let messages = self.filter.apply(&transcript.messages);
        let record = self.summarizer.summarize(&transcript, &messages).await?;

        info!(
            chat_id,
            total = transcript.messages.len(),
            kept = messages.len(),
            "Preview generated"
        );

        Ok(Preview {
            transcript: format_transcript(&transcript, &messages),
            total_messages: transcript.messages.len(),
            kept_messages: messages.len(),
            record,
        })
    }

    /// Most recent runs, newest first.
    pub async fn recent_runs(&self) -> Vec<RunRecord> {
        self.history.lock().await.iter().rev().cloned().collect()
    }

    async fn run(&self, mut guard: TriggerGuard, request: RunRequest, forced: bool) -> RunOutcome {
        info!(
            chat_id = %request.chat_id,
            run_id = %guard.run_id(),
            source = ?request.source,
            forced,
            "Starting summarization run"
        );

        let outcome = self.execute(&request, guard.run_id()).await;

        match &outcome {
            RunOutcome::Completed(report) => {
                guard.mark_succeeded();
                if report.ticket.failed() || report.crm.failed() {
                    warn!(
                        chat_id = %request.chat_id,
                        run_id = %report.run_id,
                        ticket = ?report.ticket,
                        crm = ?report.crm,
                        "Run completed with side-effect failures"
                    );
                } else {
                    info!(chat_id = %request.chat_id, run_id = %report.run_id, "Run completed");
                }
            }
            RunOutcome::InsufficientContent { reason } => {
                warn!(chat_id = %request.chat_id, reason = %reason, "Nothing to summarize");
            }
            RunOutcome::Failed { stage, reason } => {
                error!(chat_id = %request.chat_id, stage = %stage, reason = %reason, "Run failed");
            }
            RunOutcome::AlreadyRunning | RunOutcome::AlreadySummarized => {}
        }

        let outcome = self.remember(&request, forced, outcome).await;
        drop(guard);
        outcome
    }

    async fn execute(&self, request: &RunRequest, run_id: Uuid) -> RunOutcome {
        let transcript = match self
            .fetch(&request.chat_id, request.thread_id.as_deref())
            .await
        {
            Ok(transcript) => transcript,
            Err(e) => return failure(Stage::Fetch, &e),
        };

        let messages = self.filter.apply(&transcript.messages);

        let mut record = match self.summarizer.summarize(&transcript, &messages).await {
            Ok(record) => record,
            Err(e) => return failure(Stage::Summarize, &e),
        };

        let ticket = if self.settings.auto_create_ticket && request.create_ticket {
            self.create_ticket(&transcript, &record, request.source).await
        } else {
            SideEffect::Skipped
        };
        if let SideEffect::Succeeded { detail } = &ticket {
            record.ticket_id = Some(detail.clone());
        }

        let crm = if self.settings.auto_send_to_crm && request.send_to_crm {
            let raw_transcript = self
                .settings
                .include_raw_transcript
                .then(|| format_transcript(&transcript, &messages));
            self.send_to_crm(&record, raw_transcript.as_deref()).await
        } else {
            SideEffect::Skipped
        };

        RunOutcome::Completed(RunReport {
            run_id,
            record,
            ticket,
            crm,
        })
    }

    async fn fetch(
        &self,
        chat_id: &str,
        thread_id: Option<&str>,
    ) -> Result<ChatTranscript, PipelineError> {
        let timeout = self.settings.fetch_timeout;
        tokio::time::timeout(timeout, self.platform.get_chat(chat_id, thread_id))
            .await
            .map_err(|_| {
                PipelineError::FetchError(format!(
                    "transcript fetch timed out after {}s",
                    timeout.as_secs()
                ))
            })?
    }

    async fn create_ticket(
        &self,
        transcript: &ChatTranscript,
        record: &SummaryRecord,
        source: TriggerSource,
    ) -> SideEffect {
        let ticket = build_ticket(transcript, record, source);
        let timeout = self.settings.dispatch_timeout;

        let result = tokio::time::timeout(timeout, self.platform.create_ticket(&ticket))
            .await
            .unwrap_or_else(|_| {
                Err(PipelineError::TicketError(format!(
                    "ticket creation timed out after {}s",
                    timeout.as_secs()
                )))
            });

        match result {
            Ok(ticket_id) => {
                info!(chat_id = %record.chat_id, ticket_id = %ticket_id, "Ticket created");
                SideEffect::Succeeded { detail: ticket_id }
            }
            Err(e) => {
                error!(chat_id = %record.chat_id, error = %e, "Ticket creation failed");
                SideEffect::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn send_to_crm(&self, record: &SummaryRecord, raw_transcript: Option<&str>) -> SideEffect {
        let Some(sink) = &self.crm else {
            info!(chat_id = %record.chat_id, "No CRM target configured, skipping delivery");
            return SideEffect::Skipped;
        };

        let payload = CrmPayload {
            record,
            raw_transcript,
        };
        let timeout = self.settings.dispatch_timeout;

        let result = tokio::time::timeout(timeout, sink.dispatch(&payload))
            .await
            .unwrap_or_else(|_| {
                Err(PipelineError::dispatch(
                    None,
                    format!("CRM delivery timed out after {}s", timeout.as_secs()),
                ))
            });

        match result {
            Ok(outcome) => SideEffect::Succeeded {
                detail: format!("{} {}", outcome.mode, outcome.status),
            },
            Err(e) => SideEffect::Failed {
                reason: e.to_string(),
            },
        }
    }

    async fn remember(&self, request: &RunRequest, forced: bool, outcome: RunOutcome) -> RunOutcome {
        let mut history = self.history.lock().await;
        if history.len() == RUN_HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(RunRecord {
            chat_id: request.chat_id.clone(),
            source: request.source,
            forced,
            finished_at: Utc::now(),
            outcome: outcome.clone(),
        });
        outcome
    }
}

fn failure(default_stage: Stage, error: &PipelineError) -> RunOutcome {
    match error {
        PipelineError::InsufficientContent(reason) => RunOutcome::InsufficientContent {
            reason: reason.clone(),
        },
        other => RunOutcome::Failed {
            stage: other.stage().unwrap_or(default_stage),
            reason: other.to_string(),
        },
    }
}

/// Ticket opened on the chat platform for a finished summary.
#[must_use]
pub fn build_ticket(
    transcript: &ChatTranscript,
    record: &SummaryRecord,
    source: TriggerSource,
) -> TicketRequest {
    let subject = format!(
        "Chat Summary: {}",
        record
            .key_issues
            .first()
            .map_or("Support Request", String::as_str)
    );

    let mut message = format!("Chat Summary\n\n{}\n", record.summary);
    if !record.key_issues.is_empty() {
        message.push_str("\nKey Issues:\n");
        for issue in &record.key_issues {
            message.push_str(&format!("- {issue}\n"));
        }
    }
    if let Some(resolution) = &record.resolution {
        message.push_str(&format!("\nResolution: {resolution}\n"));
    }
    if !record.action_items.is_empty() {
        message.push_str("\nAction Items:\n");
        for item in &record.action_items {
            message.push_str(&format!("- {item}\n"));
        }
    }
    message.push_str(&format!(
        "\nSentiment: {} | Urgency: {}\nChat ID: {}",
        record.sentiment.as_str(),
        record.urgency.as_str(),
        record.chat_id
    ));

    TicketRequest {
        chat_id: transcript.chat_id.clone(),
        subject,
        message,
        requester_email: transcript.customer_email.clone(),
        requester_name: transcript.customer_name.clone(),
        tags: vec![source.ticket_tag().to_string()],
    }
}
