//! CRM delivery over REST or webhook.
//!
//! Both transports post the same body: the summary record, optionally
//! followed by the raw transcript. Only REST carries the CRM credentials.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::{error, info};

use crate::core::config::{AppConfig, CrmMode};
use crate::core::models::SummaryRecord;
use crate::errors::PipelineError;

const CLIENT_USER_AGENT: &str = concat!("chat-tldr/", env!("CARGO_PKG_VERSION"));

/// Wire body for both transports.
#[derive(Debug, Serialize)]
pub struct CrmPayload<'a> {
    #[serde(flatten)]
    pub record: &'a SummaryRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_transcript: Option<&'a str>,
}

/// Result of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub mode: &'static str,
    pub status: u16,
}

#[async_trait]
pub trait CrmSink: Send + Sync {
    /// # Errors
    ///
    /// Returns `DispatchError` on a non-2xx status or a transport failure.
    async fn dispatch(&self, payload: &CrmPayload<'_>) -> Result<DispatchOutcome, PipelineError>;
}

pub struct CrmDispatcher {
    http: HttpClient,
    mode: CrmMode,
    endpoint_url: Option<String>,
    webhook_url: Option<String>,
    api_key: Option<String>,
    custom_headers: HashMap<String, String>,
}

impl CrmDispatcher {
    /// # Errors
    ///
    /// Returns `ConfigError` if the HTTP client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self, PipelineError> {
        let http = HttpClient::builder()
            .timeout(config.dispatch_timeout)
            .build()
            .map_err(|e| PipelineError::ConfigError(format!("CRM HTTP client: {e}")))?;

        Ok(Self {
            http,
            mode: config.crm_mode,
            endpoint_url: config.crm_endpoint_url.clone(),
            webhook_url: config.crm_webhook_url.clone(),
            api_key: config.crm_api_key.clone(),
            custom_headers: config.crm_custom_headers.clone(),
        })
    }

    #[must_use]
    pub fn mode(&self) -> CrmMode {
        self.mode
    }

    /// Target URL for the configured mode. Webhook mode falls back to the
    /// REST endpoint.
    #[must_use]
    pub fn target_url(&self) -> Option<&str> {
        match self.mode {
            CrmMode::Rest => self.endpoint_url.as_deref(),
            CrmMode::Webhook => self
                .webhook_url
                .as_deref()
                .or(self.endpoint_url.as_deref()),
        }
    }

    /// Headers for the configured mode.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError` when a configured header name or value is invalid.
    pub fn headers(&self) -> Result<HeaderMap, PipelineError> {
        let invalid = |what: &str, e: &dyn std::fmt::Display| {
            PipelineError::dispatch(None, format!("invalid {what} header: {e}"))
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        if self.mode == CrmMode::Rest {
            if let Some(key) = &self.api_key {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {key}"))
                        .map_err(|e| invalid("authorization", &e))?,
                );
                headers.insert(
                    HeaderName::from_static("x-api-key"),
                    HeaderValue::from_str(key).map_err(|e| invalid("x-api-key", &e))?,
                );
            }
        }

        for (name, value) in &self.custom_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(name.as_str(), &e))?;
            if self.mode == CrmMode::Webhook && (name == AUTHORIZATION || name == "x-api-key") {
                continue;
            }
            let value = HeaderValue::from_str(value).map_err(|e| invalid(name.as_str(), &e))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }
}

#[async_trait]
impl CrmSink for CrmDispatcher {
    async fn dispatch(&self, payload: &CrmPayload<'_>) -> Result<DispatchOutcome, PipelineError> {
        let url = self.target_url().ok_or_else(|| {
            PipelineError::dispatch(
                None,
                format!("no CRM URL configured for {} mode", self.mode.as_str()),
            )
        })?;

        let response = self
            .http
            .post(url)
            .headers(self.headers()?)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                let cause = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                };
                PipelineError::dispatch(None, cause)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            error!(
                chat_id = %payload.record.chat_id,
                status = status.as_u16(),
                "CRM rejected summary: {}",
                body_text
            );
            return Err(PipelineError::dispatch(
                Some(status.as_u16()),
                format!("CRM responded {status}: {body_text}"),
            ));
        }

        info!(
            chat_id = %payload.record.chat_id,
            mode = self.mode.as_str(),
            status = status.as_u16(),
            "Summary delivered to CRM"
        );

        Ok(DispatchOutcome {
            mode: self.mode.as_str(),
            status: status.as_u16(),
        })
    }
}
