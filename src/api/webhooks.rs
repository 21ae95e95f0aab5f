//! Chat-lifecycle webhook ingestion.
//!
//! Verification and routing happen inline; the summarization run itself is
//! spawned so the platform gets its acknowledgement right away.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use serde_json::json;
use tracing::{info, warn};

use super::AppState;
use super::helpers::{err_response, ok_json};
use super::signature::{SIGNATURE_HEADER, verify_livechat_signature, verify_secret_key};
use crate::core::models::{TriggerSource, WebhookPayload};
use crate::worker::RunRequest;

/// Actions that mean the conversation is over.
const CHAT_ENDED_ACTIONS: [&str; 2] = ["chat_deactivated", "chat_thread_closed"];

/// POST /webhooks/livechat
pub async fn livechat_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let secret = state.config.livechat_webhook_secret.as_deref();

    if let (Some(secret), Some(signature)) = (secret, signature) {
        if !verify_livechat_signature(&body, signature, secret) {
            return err_response(StatusCode::UNAUTHORIZED, "Invalid webhook signature");
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) if secret.is_some() && signature.is_none() => {
            warn!(error = %e, "Unsigned webhook body is not a payload");
            return err_response(StatusCode::UNAUTHORIZED, "Invalid webhook signature");
        }
        Err(e) => {
            warn!(error = %e, "Rejecting malformed webhook payload");
            return err_response(StatusCode::BAD_REQUEST, "Invalid webhook payload");
        }
    };

    // Unsigned requests authenticate with the payload's shared secret.
    if let (Some(secret), None) = (secret, signature) {
        if !verify_secret_key(payload.secret_key.as_deref(), secret) {
            return err_response(StatusCode::UNAUTHORIZED, "Invalid webhook signature");
        }
    }

    info!(
        action = %payload.action,
        webhook_id = ?payload.webhook_id,
        license_id = ?payload.license_id,
        "Received LiveChat webhook"
    );

    if payload.action == "incoming_chat" {
        return ok_json(json!({
            "status": "acknowledged",
            "action": payload.action,
        }));
    }

    if !CHAT_ENDED_ACTIONS.contains(&payload.action.as_str()) {
        return ok_json(json!({
            "status": "ignored",
            "action": payload.action,
            "processed": false,
        }));
    }

    let Some(chat_id) = payload.chat_id() else {
        warn!(action = %payload.action, "Chat-ended webhook without a chat id");
        return err_response(StatusCode::BAD_REQUEST, "Webhook payload has no chat id");
    };

    let request = RunRequest::new(chat_id, TriggerSource::ChatEndedWebhook)
        .with_thread(payload.thread_id().map(String::from));
    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        coordinator.request_summary_with(request).await;
    });

    ok_json(json!({
        "status": "accepted",
        "action": payload.action,
        "chat_id": chat_id,
        "processed": true,
    }))
}
