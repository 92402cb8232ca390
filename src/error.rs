//! Error types for the investment research copilot

use crate::models::FailureKind;
use thiserror::Error;

/// Result type alias for copilot operations
pub type Result<T> = std::result::Result<T, CopilotError>;

#[derive(Error, Debug)]
pub enum CopilotError {

    // =============================
    // Tool-level errors (become observations)
    // =============================

    #[error("Invalid date '{value}': expected YYYY-MM-DD")]
    DateParse { value: String },

    #[error("Invalid date range: start date {start} is after end date {end}")]
    DateRange { start: String, end: String },

    #[error("No data available for {ticker} in the given date range.")]
    NoData { ticker: String },

    #[error("Rate limited by {provider} (HTTP 429); retry later")]
    RateLimit { provider: String },

    #[error("Invalid tool invocation: {0}")]
    Invocation(String),

    #[error("Provider error: {0}")]
    Provider(String),

    // =============================
    // Session-level errors
    // =============================

    #[error("Could not complete the request: {0}")]
    AgentTermination(String),

    #[error("Missing credential: {0} is not set")]
    CredentialMissing(&'static str),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CopilotError {
    /// Classify an error for the tagged tool outcome.
    pub fn kind(&self) -> FailureKind {
        match self {
            CopilotError::DateParse { .. } | CopilotError::DateRange { .. } => {
                FailureKind::DateParse
            }
            CopilotError::NoData { .. } => FailureKind::NoData,
            CopilotError::RateLimit { .. } => FailureKind::RateLimit,
            CopilotError::Invocation(_) => FailureKind::Invocation,
            _ => FailureKind::Provider,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, CopilotError::RateLimit { .. })
    }
}
