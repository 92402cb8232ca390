//! Shared HTTP plumbing for the external providers
//!
//! One long-lived `reqwest::Client` per provider for connection pooling,
//! with its own cookie jar. HTTP 429 is always surfaced as
//! [`CopilotError::RateLimit`].

use crate::error::CopilotError;
use crate::Result;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("investment-copilot/", env!("CARGO_PKG_VERSION"));

/// Yahoo serves cookies and crumbs only to browser-like clients.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    provider: &'static str,
}

impl ProviderClient {
    pub fn new(provider: &'static str, timeout: Duration) -> Result<Self> {
        Self::with_user_agent(provider, timeout, USER_AGENT)
    }

    pub fn with_user_agent(provider: &'static str, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .user_agent(user_agent)
            .cookie_store(true)
            .build()?;

        Ok(Self { client, provider })
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Send a request and return the body as text, whatever the status.
    pub async fn send_text(&self, request: RequestBuilder) -> Result<(StatusCode, String)> {
        let response = request.send().await.map_err(|e| {
            CopilotError::Provider(format!("{} request failed: {}", self.provider, e))
        })?;

        let status = response.status();
        debug!(provider = self.provider, %status, "Provider responded");

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(provider = self.provider, "Provider is throttling requests");
            return Err(CopilotError::RateLimit {
                provider: self.provider.to_string(),
            });
        }

        let text = response.text().await.map_err(|e| {
            CopilotError::Provider(format!("{} response could not be read: {}", self.provider, e))
        })?;

        Ok((status, text))
    }

    /// Send a request and decode the JSON body, whatever the status.
    pub async fn send_raw(&self, request: RequestBuilder) -> Result<(StatusCode, Value)> {
        let (status, text) = self.send_text(request).await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                CopilotError::Provider(format!(
                    "{} returned {} with invalid JSON: {}",
                    self.provider, status, e
                ))
            })?
        };

        Ok((status, body))
    }

    /// Send a request and require a 2xx JSON response.
    pub async fn send_json(&self, request: RequestBuilder) -> Result<Value> {
        let (status, body) = self.send_raw(request).await?;

        if !status.is_success() {
            return Err(status_error(self.provider, status, &body));
        }

        Ok(body)
    }
}

pub fn status_error(provider: &str, status: StatusCode, body: &Value) -> CopilotError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return CopilotError::RateLimit {
            provider: provider.to_string(),
        };
    }
    CopilotError::Provider(format!("{} returned {}: {}", provider, status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_error_mapping() {
        let err = status_error("Tavily", StatusCode::TOO_MANY_REQUESTS, &Value::Null);
        assert!(err.is_rate_limit());

        let err = status_error(
            "Tavily",
            StatusCode::UNAUTHORIZED,
            &json!({"detail": "invalid api key"}),
        );
        let message = err.to_string();
        assert!(message.contains("401"));
        assert!(message.contains("invalid api key"));
    }

    #[test]
    fn test_client_builds() {
        let client = ProviderClient::new("Yahoo Finance", Duration::from_secs(5));
        tokio_test::assert_ok!(client);
    }
}
