//! Yahoo Finance cookie/crumb session
//!
//! `quoteSummary` rejects requests without a crumb tied to a session cookie:
//! 1. visit the consent host so the cookie jar receives the session cookie
//! 2. fetch a crumb from `/v1/test/getcrumb` with that cookie
//!
//! The crumb is cached until a provider call reports 401.

use crate::error::CopilotError;
use crate::http::ProviderClient;
use crate::Result;
use reqwest::header::REFERER;
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::{debug, info};

const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query2.finance.yahoo.com/v1/test/getcrumb";
const REFERER_URL: &str = "https://finance.yahoo.com/";
const MAX_CRUMB_LEN: usize = 100;

pub struct YahooAuth {
    cookie_url: String,
    crumb_url: String,
    crumb: Mutex<Option<String>>,
}

impl YahooAuth {
    pub fn yahoo() -> Self {
        Self::new(COOKIE_URL, CRUMB_URL)
    }

    pub fn new(cookie_url: &str, crumb_url: &str) -> Self {
        Self {
            cookie_url: cookie_url.to_string(),
            crumb_url: crumb_url.to_string(),
            crumb: Mutex::new(None),
        }
    }

    /// Cached crumb, fetched on first use. Concurrent callers wait for a
    /// single refresh.
    pub async fn crumb(&self, http: &ProviderClient) -> Result<String> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        let fresh = self.fetch_crumb(http).await?;
        info!("Obtained Yahoo crumb");
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the cached crumb so the next call starts a new session.
    pub async fn invalidate(&self) {
        *self.crumb.lock().await = None;
    }

    async fn fetch_crumb(&self, http: &ProviderClient) -> Result<String> {
        // Status is irrelevant here; only the cookies it sets matter.
        let (status, _) = http
            .send_text(http.get(&self.cookie_url).header(REFERER, REFERER_URL))
            .await?;
        debug!(%status, "Yahoo consent host visited");

        let (status, body) = http
            .send_text(http.get(&self.crumb_url).header(REFERER, REFERER_URL))
            .await?;

        parse_crumb(status, &body)
    }
}

fn parse_crumb(status: StatusCode, body: &str) -> Result<String> {
    if !status.is_success() {
        return Err(CopilotError::Provider(format!(
            "Yahoo crumb request returned {}",
            status
        )));
    }

    let crumb = body.trim();
    let plausible = !crumb.is_empty()
        && crumb.len() < MAX_CRUMB_LEN
        && !crumb.contains(char::is_whitespace)
        && !crumb.contains('<');

    if !plausible {
        return Err(CopilotError::Provider(
            "Yahoo returned an unusable crumb".to_string(),
        ));
    }

    Ok(crumb.to_string())
}
