use serde::Serialize;
use thiserror::Error;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Filter,
    Summarize,
    Ticket,
    Dispatch,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Filter => "filter",
            Stage::Summarize => "summarize",
            Stage::Ticket => "ticket",
            Stage::Dispatch => "dispatch",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to fetch chat transcript: {0}")]
    FetchError(String),

    #[error("Failed to apply message filters: {0}")]
    FilterError(String),

    #[error("Not enough content to summarize: {0}")]
    InsufficientContent(String),

    #[error("Failed to summarize chat: {0}")]
    SummarizationError(String),

    #[error("Failed to create ticket: {0}")]
    TicketError(String),

    #[error("Failed to deliver summary to CRM: {message}")]
    DispatchError {
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Failed to parse payload: {0}")]
    ParseError(String),

    #[error("Failed to send HTTP request: {0}")]
    HttpError(String),
}

impl PipelineError {
    /// Stage this error surfaces at; transport and parse errors carry none.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::FetchError(_) => Some(Stage::Fetch),
            PipelineError::FilterError(_) => Some(Stage::Filter),
            PipelineError::InsufficientContent(_) | PipelineError::SummarizationError(_) => {
                Some(Stage::Summarize)
            }
            PipelineError::TicketError(_) => Some(Stage::Ticket),
            PipelineError::DispatchError { .. } => Some(Stage::Dispatch),
            PipelineError::ConfigError(_)
            | PipelineError::ParseError(_)
            | PipelineError::HttpError(_) => None,
        }
    }

    pub fn dispatch(status: Option<u16>, message: impl Into<String>) -> Self {
        PipelineError::DispatchError {
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(error: reqwest::Error) -> Self {
        PipelineError::HttpError(error.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::ParseError(error.to_string())
    }
}
