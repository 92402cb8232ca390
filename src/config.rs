//! Environment-driven configuration
//!
//! Values are read after `dotenv::dotenv()` has loaded any `.env` file.

use crate::error::CopilotError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You're a helpful assistant.";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

pub const GROQ_API_KEY: &str = "GROQ_API_KEY";
pub const TAVILY_API_KEY: &str = "TAVILY_API_KEY";

#[derive(Debug, Clone)]
pub struct CopilotConfig {
    /// Reasoning engine credential; queries are refused while unset
    pub groq_api_key: Option<String>,
    /// Search credential; required to build the tool registry
    pub tavily_api_key: Option<String>,
    pub model: String,
    pub max_iterations: usize,
    pub http_timeout: Duration,
    pub turn_timeout: Option<Duration>,
    /// Instruction given to the reasoning engine on every step
    pub system_prompt: String,
    pub port: u16,
    /// HTTP sessions unused for this long are discarded
    pub session_idle_timeout: Duration,
}

impl Default for CopilotConfig {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            tavily_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            turn_timeout: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            port: DEFAULT_PORT,
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
        }
    }
}

impl CopilotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process env in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = Self::default();

        let max_iterations = parse_var(&non_empty, "COPILOT_MAX_ITERATIONS")?
            .unwrap_or(defaults.max_iterations);
        let http_timeout = parse_var::<u64, _>(&non_empty, "COPILOT_HTTP_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);
        let turn_timeout =
            parse_var::<u64, _>(&non_empty, "COPILOT_TURN_TIMEOUT_SECS")?.map(Duration::from_secs);
        let session_idle_timeout =
            parse_var::<u64, _>(&non_empty, "COPILOT_SESSION_IDLE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_idle_timeout);
        let port = match parse_var(&non_empty, "PORT")? {
            Some(port) => port,
            None => parse_var(&non_empty, "API_PORT")?.unwrap_or(defaults.port),
        };

        Ok(Self {
            groq_api_key: non_empty(GROQ_API_KEY),
            tavily_api_key: non_empty(TAVILY_API_KEY),
            model: non_empty("COPILOT_MODEL").unwrap_or(defaults.model),
            max_iterations,
            http_timeout,
            turn_timeout,
            system_prompt: non_empty("COPILOT_SYSTEM_PROMPT").unwrap_or(defaults.system_prompt),
            port,
            session_idle_timeout,
        })
    }

    /// The search key is needed before any tool can be built.
    pub fn require_search_key(&self) -> Result<&str> {
        self.tavily_api_key
            .as_deref()
            .ok_or(CopilotError::CredentialMissing(TAVILY_API_KEY))
    }

    pub fn require_reasoning_key(&self) -> Result<&str> {
        self.groq_api_key
            .as_deref()
            .ok_or(CopilotError::CredentialMissing(GROQ_API_KEY))
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| CopilotError::ConfigError(format!("{} = '{}': {}", key, raw, e))),
        None => Ok(None),
    }
}
