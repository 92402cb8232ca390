//! Web search through the Tavily API

use super::{ParamSpec, Tool, ToolArgs, ToolSpec};
use crate::error::CopilotError;
use crate::http::ProviderClient;
use crate::models::ToolOutcome;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

const PROVIDER: &str = "Tavily";
const DEFAULT_ENDPOINT: &str = "https://api.tavily.com/search";
const DEFAULT_MAX_RESULTS: i64 = 6;
const MAX_RESULTS_CAP: i64 = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

pub struct WebSearchTool {
    http: ProviderClient,
    endpoint: String,
    api_key: String,
}

impl WebSearchTool {
    pub fn tavily(api_key: &str, timeout: Duration) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT, api_key, timeout)
    }

    pub fn with_endpoint(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(CopilotError::CredentialMissing(crate::config::TAVILY_API_KEY));
        }

        Ok(Self {
            http: ProviderClient::new(PROVIDER, timeout)?,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Ranked snippets with source attribution.
    pub async fn search(&self, query: &str, max_results: i64) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(CopilotError::Invocation("search query must not be empty".to_string()));
        }

        let body = json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results.clamp(1, MAX_RESULTS_CAP),
            "search_depth": "basic",
        });

        let value = self
            .http
            .send_json(self.http.post(&self.endpoint).json(&body))
            .await?;

        let response: TavilyResponse = serde_json::from_value(value)
            .map_err(|e| CopilotError::Provider(format!("invalid Tavily response: {}", e)))?;

        debug!(query, hits = response.results.len(), "Search completed");
        Ok(rank(response.results))
    }
}

fn rank(mut results: Vec<TavilyResult>) -> Vec<SearchHit> {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results
        .into_iter()
        .map(|r| SearchHit {
            title: r.title,
            url: r.url,
            content: r.content,
        })
        .collect()
}

fn search_spec() -> &'static ToolSpec {
    static SPEC: OnceLock<ToolSpec> = OnceLock::new();
    SPEC.get_or_init(|| ToolSpec {
        name: "search",
        description: "Run a web search and return ranked text snippets with their source URLs. \
                      Use for news, management commentary and anything not covered by price \
                      or fundamentals tools.",
        parameters: vec![
            ParamSpec::string("query", "The search query"),
            ParamSpec::optional_integer("max_results", "Maximum number of results (default 6)"),
        ],
    })
}

#[async_trait::async_trait]
impl Tool for WebSearchTool {
    fn spec(&self) -> &ToolSpec {
        search_spec()
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutcome {
        let query = args.str("query").unwrap_or_default();
        let max_results = args.integer("max_results").unwrap_or(DEFAULT_MAX_RESULTS);

        let result = async {
            let hits = self.search(query, max_results).await?;
            Ok::<_, CopilotError>(serde_json::to_value(hits)?)
        }
        .await;

        match result {
            Ok(hits) => ToolOutcome::json(hits),
            Err(e) => {
                warn!(query, error = %e, "Web search failed");
                ToolOutcome::from_error(&format!("Error searching the web for '{}'", query), &e)
            }
        }
    }
}
