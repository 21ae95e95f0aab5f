use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::errors::PipelineError;

const DEFAULT_LIVECHAT_API_URL: &str = "https://api.livechatinc.com/v3.5";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// How summaries reach the CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrmMode {
    Rest,
    Webhook,
}

impl CrmMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CrmMode::Rest => "rest",
            CrmMode::Webhook => "webhook",
        }
    }
}

impl FromStr for CrmMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rest" | "rest_api" | "api" => Ok(CrmMode::Rest),
            "webhook" => Ok(CrmMode::Webhook),
            other => Err(PipelineError::ConfigError(format!(
                "CRM_MODE: expected 'rest' or 'webhook', got '{other}'"
            ))),
        }
    }
}

/// Rules for trimming a transcript before it reaches the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    pub remove_system_messages: bool,
    pub remove_agent_signatures: bool,
    pub min_message_length: usize,
    pub include_greetings: bool,
    /// Extra case-insensitive regexes; matching messages are dropped.
    pub remove_patterns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            remove_system_messages: true,
            remove_agent_signatures: true,
            min_message_length: 3,
            include_greetings: true,
            remove_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    pub livechat_api_url: String,
    pub livechat_account_id: Option<String>,
    pub livechat_access_token: String,
    pub livechat_webhook_secret: Option<String>,

    pub openai_api_key: String,
    pub openai_org_id: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_max_tokens: u32,
    pub openai_temperature: f32,

    pub crm_mode: CrmMode,
    pub crm_endpoint_url: Option<String>,
    pub crm_api_key: Option<String>,
    pub crm_webhook_url: Option<String>,
    pub crm_custom_headers: HashMap<String, String>,

    pub auto_create_ticket: bool,
    pub auto_send_to_crm: bool,
    pub include_raw_transcript: bool,

    pub filter: FilterConfig,

    pub stale_lock_timeout: Duration,
    pub dedup_window: Duration,
    pub fetch_timeout: Duration,
    pub model_timeout: Duration,
    pub dispatch_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| PipelineError::ConfigError(format!("{key}: not set")))
        };

        let crm_mode = match get("CRM_MODE") {
            Some(mode) => mode.parse()?,
            None if flag_or(&get, "CRM_USE_WEBHOOK", false)? => CrmMode::Webhook,
            None => CrmMode::Rest,
        };

        let crm_custom_headers = match get("CRM_CUSTOM_HEADERS") {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                PipelineError::ConfigError(format!("CRM_CUSTOM_HEADERS: {e}"))
            })?,
            None => HashMap::new(),
        };

        let remove_patterns = match get("FILTER_REMOVE_PATTERNS") {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                PipelineError::ConfigError(format!("FILTER_REMOVE_PATTERNS: {e}"))
            })?,
            None => Vec::new(),
        };

        let defaults = FilterConfig::default();
        let filter = FilterConfig {
            remove_system_messages: flag_or(
                &get,
                "FILTER_REMOVE_SYSTEM_MESSAGES",
                defaults.remove_system_messages,
            )?,
            remove_agent_signatures: flag_or(
                &get,
                "FILTER_REMOVE_AGENT_SIGNATURES",
                defaults.remove_agent_signatures,
            )?,
            min_message_length: parse_or(
                &get,
                "FILTER_MIN_MESSAGE_LENGTH",
                defaults.min_message_length,
            )?,
            include_greetings: flag_or(&get, "FILTER_INCLUDE_GREETINGS", defaults.include_greetings)?,
            remove_patterns,
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 8000)?,

            livechat_api_url: url_or(&get, "LIVECHAT_API_URL", DEFAULT_LIVECHAT_API_URL)?,
            livechat_account_id: get("LIVECHAT_ACCOUNT_ID"),
            livechat_access_token: required("LIVECHAT_ACCESS_TOKEN")?,
            livechat_webhook_secret: get("LIVECHAT_WEBHOOK_SECRET"),

            openai_api_key: required("OPENAI_API_KEY")?,
            openai_org_id: get("OPENAI_ORG_ID"),
            openai_base_url: url_or(&get, "OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL)?,
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_max_tokens: parse_or(&get, "OPENAI_MAX_TOKENS", 1000)?,
            openai_temperature: parse_or(&get, "OPENAI_TEMPERATURE", 0.3)?,

            crm_mode,
            crm_endpoint_url: optional_url(&get, "CRM_ENDPOINT_URL")?,
            crm_api_key: get("CRM_API_KEY"),
            crm_webhook_url: optional_url(&get, "CRM_WEBHOOK_URL")?,
            crm_custom_headers,

            auto_create_ticket: flag_or(&get, "AUTO_CREATE_TICKET", true)?,
            auto_send_to_crm: flag_or(&get, "AUTO_SEND_TO_CRM", true)?,
            include_raw_transcript: flag_or(&get, "INCLUDE_RAW_TRANSCRIPT", false)?,

            filter,

            stale_lock_timeout: secs_or(&get, "TRIGGER_STALE_LOCK_SECS", 600)?,
            dedup_window: secs_or(&get, "TRIGGER_DEDUP_WINDOW_SECS", 300)?,
            fetch_timeout: secs_or(&get, "FETCH_TIMEOUT_SECS", 30)?,
            model_timeout: secs_or(&get, "MODEL_TIMEOUT_SECS", 120)?,
            dispatch_timeout: secs_or(&get, "DISPATCH_TIMEOUT_SECS", 30)?,
        })
    }

    /// True when the configured transport has somewhere to send to.
    #[must_use]
    pub fn crm_configured(&self) -> bool {
        match self.crm_mode {
            CrmMode::Rest => self.crm_endpoint_url.is_some(),
            CrmMode::Webhook => self.crm_webhook_url.is_some() || self.crm_endpoint_url.is_some(),
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, PipelineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, PipelineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| PipelineError::ConfigError(format!("{key}: {e}")))
}

fn flag_or<G>(get: &G, key: &str, default: bool) -> Result<bool, PipelineError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(PipelineError::ConfigError(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}

fn secs_or<G>(get: &G, key: &str, default: u64) -> Result<Duration, PipelineError>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default).map(Duration::from_secs)
}

/// Validated absolute URL, kept as the caller wrote it.
fn optional_url<G>(get: &G, key: &str) -> Result<Option<String>, PipelineError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    let raw = raw.trim().to_string();
    match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Some(raw)),
        Ok(url) => Err(PipelineError::ConfigError(format!(
            "{key}: unsupported scheme '{}'",
            url.scheme()
        ))),
        Err(e) => Err(PipelineError::ConfigError(format!("{key}: {e}"))),
    }
}

fn url_or<G>(get: &G, key: &str, default: &str) -> Result<String, PipelineError>
where
    G: Fn(&str) -> Option<String>,
{
    Ok(optional_url(get, key)?.unwrap_or_else(|| default.to_string()))
}
