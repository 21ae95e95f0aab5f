//! Manual triggers, preview, and introspection routes.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::AppState;
use super::helpers::{err_response, error_status, ok_json, outcome_response};
use crate::core::models::{SummarizeRequest, TriggerSource};
use crate::worker::RunRequest;

fn default_true() -> bool {
    true
}

/// Query string accepted by `GET /api/summarize/{chat_id}`.
#[derive(Debug, Deserialize)]
pub struct SummarizeQuery {
    pub thread_id: Option<String>,
    #[serde(default = "default_true")]
    pub create_ticket: bool,
    #[serde(default = "default_true")]
    pub send_to_crm: bool,
    #[serde(default)]
    pub force: bool,
    pub source: Option<TriggerSource>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub thread_id: Option<String>,
}

/// POST /api/summarize
pub async fn summarize(
    State(state): State<AppState>,
    Json(request): Json<SummarizeRequest>,
) -> Response {
    let source = request.source.unwrap_or(TriggerSource::ManualApi);
    trigger(&state, request, source).await
}

/// GET /api/summarize/{chat_id}
///
/// Used by the agent-app button.
pub async fn summarize_by_path(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<SummarizeQuery>,
) -> Response {
    let source = query.source.unwrap_or(TriggerSource::AgentButton);
    let request = SummarizeRequest {
        chat_id,
        thread_id: query.thread_id,
        create_ticket: query.create_ticket,
        send_to_crm: query.send_to_crm,
        force: query.force,
        source: Some(source),
    };
    trigger(&state, request, source).await
}

async fn trigger(state: &AppState, request: SummarizeRequest, source: TriggerSource) -> Response {
    if request.chat_id.trim().is_empty() {
        return err_response(axum::http::StatusCode::BAD_REQUEST, "chat_id is required");
    }

    info!(
        chat_id = %request.chat_id,
        source = ?source,
        force = request.force,
        "Manual summarization requested"
    );

    let run = RunRequest {
        chat_id: request.chat_id.clone(),
        thread_id: request.thread_id,
        source,
        create_ticket: request.create_ticket,
        send_to_crm: request.send_to_crm,
    };

    let outcome = if request.force {
        state.coordinator.request_summary_forced(run).await
    } else {
        state.coordinator.request_summary_with(run).await
    };

    outcome_response(&request.chat_id, &outcome)
}

/// GET /api/preview/{chat_id}
///
/// Runs fetch, filter and summarize only. Never creates tickets or calls the CRM.
pub async fn preview(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Response {
    match state
        .coordinator
        .preview(&chat_id, query.thread_id.as_deref())
        .await
    {
        Ok(preview) => ok_json(json!({
            "success": true,
            "chat_id": chat_id,
            "preview": preview,
        })),
        Err(e) => err_response(error_status(&e), &e.to_string()),
    }
}

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> Response {
    let config = &state.config;
    let coordinator = &state.coordinator;

    ok_json(json!({
        "status": "ok",
        "model": coordinator.model_name(),
        "crm": {
            "mode": config.crm_mode.as_str(),
            "configured": coordinator.crm_enabled(),
        },
        "auto_create_ticket": config.auto_create_ticket,
        "auto_send_to_crm": config.auto_send_to_crm,
        "include_raw_transcript": config.include_raw_transcript,
        "signature_verification": config.livechat_webhook_secret.is_some(),
        "filters": {
            "remove_system_messages": config.filter.remove_system_messages,
            "remove_agent_signatures": config.filter.remove_agent_signatures,
            "min_message_length": config.filter.min_message_length,
            "include_greetings": config.filter.include_greetings,
            "custom_patterns": config.filter.remove_patterns.len(),
        },
        "runs_in_flight": coordinator.triggers().in_flight(),
    }))
}

/// GET /api/runs
pub async fn runs(State(state): State<AppState>) -> Response {
    let runs = state.coordinator.recent_runs().await;
    ok_json(json!({
        "count": runs.len(),
        "runs": runs,
    }))
}
