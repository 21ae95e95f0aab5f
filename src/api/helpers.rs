//! Common helper functions for API handlers.
//!
//! Response builders shared by the webhook and action routes, and the
//! mapping from run outcomes and pipeline errors to HTTP status codes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use crate::errors::{PipelineError, Stage};
use crate::worker::{RunOutcome, SideEffect};

// ============================================================================
// Response Builders
// ============================================================================

/// Returns a 200 OK response with the given JSON body.
#[must_use]
pub fn ok_json(body: Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

/// Returns an error response with the given status code and message.
#[must_use]
pub fn err_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message })),
    )
        .into_response()
}

// ============================================================================
// Status Mapping
// ============================================================================

/// HTTP status for a pipeline error surfaced directly to a caller.
#[must_use]
pub fn error_status(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::FetchError(_) => StatusCode::NOT_FOUND,
        PipelineError::InsufficientContent(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// HTTP status for a finished run.
#[must_use]
pub fn outcome_status(outcome: &RunOutcome) -> StatusCode {
    match outcome {
        RunOutcome::Completed(_) => StatusCode::OK,
        RunOutcome::AlreadyRunning | RunOutcome::AlreadySummarized => StatusCode::CONFLICT,
        RunOutcome::InsufficientContent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RunOutcome::Failed {
            stage: Stage::Fetch,
            ..
        } => StatusCode::NOT_FOUND,
        RunOutcome::Failed { .. } => StatusCode::BAD_GATEWAY,
    }
}

/// Structured body for a manual run.
#[must_use]
pub fn outcome_response(chat_id: &str, outcome: &RunOutcome) -> Response {
    let mut body = json!({
        "success": matches!(outcome, RunOutcome::Completed(_)),
        "chat_id": chat_id,
        "outcome": outcome.label(),
        "ticket_id": Value::Null,
        "summary": Value::Null,
        "crm_sent": false,
    });

    let message = match outcome {
        RunOutcome::AlreadyRunning => "A summary is already being generated for this chat".to_string(),
        RunOutcome::AlreadySummarized => {
            "This chat was summarized recently; pass force=true to run it again".to_string()
        }
        RunOutcome::InsufficientContent { reason } => reason.clone(),
        RunOutcome::Failed { stage, reason } => {
            body["stage"] = json!(stage);
            reason.clone()
        }
        RunOutcome::Completed(report) => {
            body["ticket_id"] = json!(report.record.ticket_id);
            body["summary"] = json!(report.record);
            body["crm_sent"] = json!(report.crm.succeeded());
            body["ticket"] = json!(report.ticket);
            body["crm"] = json!(report.crm);

            let failures: Vec<String> = [("ticket", &report.ticket), ("crm", &report.crm)]
                .into_iter()
                .filter_map(|(name, effect)| match effect {
                    SideEffect::Failed { reason } => Some(format!("{name}: {reason}")),
                    _ => None,
                })
                .collect();
            if failures.is_empty() {
                "Summary generated".to_string()
            } else {
                format!("Summary generated with errors ({})", failures.join("; "))
            }
        }
    };
    body["message"] = json!(message);

    (outcome_status(outcome), Json(body)).into_response()
}
