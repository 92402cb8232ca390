//! Company fundamentals from Yahoo Finance `quoteSummary`
//!
//! The payload is passed through to the engine untouched. Requests carry a
//! crumb from [`YahooAuth`]; a 401 refreshes it once and retries.

use super::{ParamSpec, Tool, ToolArgs, ToolSpec};
use crate::error::CopilotError;
use crate::http::{status_error, ProviderClient, BROWSER_USER_AGENT};
use crate::models::ToolOutcome;
use crate::yahoo_auth::YahooAuth;
use crate::Result;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

const PROVIDER: &str = "Yahoo Finance";
const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundamentalsSection {
    BalanceSheet,
    IncomeStatement,
    CashFlow,
    BasicInfo,
    AnalystRecommendations,
    LatestPrice,
}

impl FundamentalsSection {
    pub const ALL: [FundamentalsSection; 6] = [
        FundamentalsSection::BalanceSheet,
        FundamentalsSection::IncomeStatement,
        FundamentalsSection::CashFlow,
        FundamentalsSection::BasicInfo,
        FundamentalsSection::AnalystRecommendations,
        FundamentalsSection::LatestPrice,
    ];

    pub fn tool_name(self) -> &'static str {
        match self {
            FundamentalsSection::BalanceSheet => "balance_sheet",
            FundamentalsSection::IncomeStatement => "income_statement",
            FundamentalsSection::CashFlow => "cash_flow",
            FundamentalsSection::BasicInfo => "stock_basic_info",
            FundamentalsSection::AnalystRecommendations => "stock_analyst_recommendations",
            FundamentalsSection::LatestPrice => "stock_latest_price",
        }
    }

    fn description(self) -> &'static str {
        match self {
            FundamentalsSection::BalanceSheet => "Return the annual balance sheets of a company.",
            FundamentalsSection::IncomeStatement => {
                "Return the annual income statements of a company."
            }
            FundamentalsSection::CashFlow => "Return the annual cash flow statements of a company.",
            FundamentalsSection::BasicInfo => {
                "Return basic company information: profile, sector, industry, market cap and \
                 valuation summary."
            }
            FundamentalsSection::AnalystRecommendations => {
                "Return analyst recommendation trends (strong buy / buy / hold / sell counts) and \
                 target prices for a company."
            }
            FundamentalsSection::LatestPrice => "Return the latest market price of a stock.",
        }
    }

    /// `quoteSummary` modules backing the section.
    pub fn modules(self) -> &'static str {
        match self {
            FundamentalsSection::BalanceSheet => "balanceSheetHistory",
            FundamentalsSection::IncomeStatement => "incomeStatementHistory",
            FundamentalsSection::CashFlow => "cashflowStatementHistory",
            FundamentalsSection::BasicInfo => "assetProfile,price,summaryDetail",
            FundamentalsSection::AnalystRecommendations => "recommendationTrend,financialData",
            FundamentalsSection::LatestPrice => "price",
        }
    }

    /// Sections already covered by a custom tool (`price_history`).
    pub fn is_redundant(self) -> bool {
        matches!(self, FundamentalsSection::LatestPrice)
    }

    pub fn spec(self) -> &'static ToolSpec {
        static SPECS: OnceLock<Vec<ToolSpec>> = OnceLock::new();

        let specs = SPECS.get_or_init(|| {
            FundamentalsSection::ALL
                .iter()
                .map(|section| ToolSpec {
                    name: section.tool_name(),
                    description: section.description(),
                    parameters: vec![ParamSpec::string("ticker", "The stock ticker (e.g., 'TSLA')")],
                })
                .collect()
        });

        let position = FundamentalsSection::ALL
            .iter()
            .position(|s| *s == self)
            .unwrap_or(0);
        &specs[position]
    }
}

pub struct FundamentalsClient {
    http: ProviderClient,
    base_url: String,
    auth: YahooAuth,
}

impl FundamentalsClient {
    pub fn yahoo(timeout: Duration) -> Result<Self> {
        Self::with_auth(DEFAULT_BASE_URL, YahooAuth::yahoo(), timeout)
    }

    /// Client whose consent and crumb endpoints live on `base_url` too.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/');
        let auth = YahooAuth::new(
            &format!("{}/", base_url),
            &format!("{}/v1/test/getcrumb", base_url),
        );
        Self::with_auth(base_url, auth, timeout)
    }

    fn with_auth(base_url: &str, auth: YahooAuth, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: ProviderClient::with_user_agent(PROVIDER, timeout, BROWSER_USER_AGENT)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn summary_url(&self, ticker: &str, section: FundamentalsSection, crumb: &str) -> String {
        format!(
            "{}/v10/finance/quoteSummary/{}?modules={}&crumb={}",
            self.base_url,
            urlencoding::encode(ticker),
            section.modules(),
            urlencoding::encode(crumb)
        )
    }

    async fn request(&self, ticker: &str, section: FundamentalsSection) -> Result<(StatusCode, Value)> {
        let crumb = self.auth.crumb(&self.http).await?;
        let url = self.summary_url(ticker, section, &crumb);
        self.http.send_raw(self.http.get(&url)).await
    }

    pub async fn fetch(&self, ticker: &str, section: FundamentalsSection) -> Result<Value> {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(CopilotError::Invocation("ticker must not be empty".to_string()));
        }

        let (mut status, mut body) = self.request(ticker, section).await?;

        if status == StatusCode::UNAUTHORIZED {
            debug!(ticker, "Yahoo rejected the crumb, refreshing session");
            self.auth.invalidate().await;
            (status, body) = self.request(ticker, section).await?;
        }

        if status == StatusCode::NOT_FOUND {
            return Err(CopilotError::NoData {
                ticker: ticker.to_string(),
            });
        }
        if !status.is_success() {
            return Err(status_error(PROVIDER, status, &body));
        }

        extract_summary(ticker, body)
    }
}

fn extract_summary(ticker: &str, mut body: Value) -> Result<Value> {
    let summary = body
        .get_mut("quoteSummary")
        .map(Value::take)
        .ok_or_else(|| CopilotError::Provider("quoteSummary missing from response".to_string()))?;

    if let Some(error) = summary.get("error").filter(|e| !e.is_null()) {
        return Err(CopilotError::Provider(format!("yahoo quoteSummary error: {}", error)));
    }

    summary
        .get("result")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .cloned()
        .ok_or_else(|| CopilotError::NoData {
            ticker: ticker.to_string(),
        })
}

pub struct FundamentalsTool {
    section: FundamentalsSection,
    client: Arc<FundamentalsClient>,
}

impl FundamentalsTool {
    pub fn new(section: FundamentalsSection, client: Arc<FundamentalsClient>) -> Self {
        Self { section, client }
    }
}

#[async_trait::async_trait]
impl Tool for FundamentalsTool {
    fn spec(&self) -> &ToolSpec {
        self.section.spec()
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutcome {
        let ticker = args.str("ticker").unwrap_or_default();

        match self.client.fetch(ticker, self.section).await {
            Ok(payload) => ToolOutcome::json(payload),
            Err(e) => {
                warn!(ticker, section = self.section.tool_name(), error = %e, "Fundamentals fetch failed");
                ToolOutcome::from_error(
                    &format!("Error fetching {} for {}", self.section.tool_name(), ticker),
                    &e,
                )
            }
        }
    }
}
