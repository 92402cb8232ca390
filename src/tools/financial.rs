//! Deterministic financial calculations over daily price bars
//!
//! Each public function returns a [`ToolOutcome`]; failures are converted
//! at this boundary and never propagate to the reasoning loop.

use super::{ParamSpec, Tool, ToolArgs, ToolSpec};
use crate::error::CopilotError;
use crate::market_data::MarketDataClient;
use crate::models::{DateRange, FailureKind, PriceSeries, ToolOutcome, DATE_FORMAT};
use crate::Result;
use chrono::Local;
use std::sync::OnceLock;
use tracing::{debug, warn};

const DAYS_PER_YEAR: f64 = 365.25;

pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please wait and try again shortly.";

/// Round to two decimal places. Never yields negative zero.
pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Percentage return of a series.
///
/// A single session is measured as `(open - close) / close`. That is the
/// inverse of the usual intraday convention and is kept as is because
/// callers depend on the exact figure. Longer series use first and last
/// close.
pub fn period_return(series: &PriceSeries) -> Result<f64> {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return Err(CopilotError::NoData {
            ticker: series.ticker.clone(),
        });
    };

    if series.len() == 1 {
        ensure_positive(&series.ticker, first.close)?;
        return Ok((first.open - first.close) / first.close * 100.0);
    }

    ensure_positive(&series.ticker, first.close)?;
    Ok((last.close - first.close) / first.close * 100.0)
}

/// Compound annual growth rate in percent over `years`.
pub fn compound_annual_growth(series: &PriceSeries, years: f64) -> Result<f64> {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return Err(CopilotError::NoData {
            ticker: series.ticker.clone(),
        });
    };

    if years <= 0.0 {
        return Err(CopilotError::Invocation(
            "the date range must span at least one day to annualise growth".to_string(),
        ));
    }
    ensure_positive(&series.ticker, first.close)?;

    Ok(((last.close / first.close).powf(1.0 / years) - 1.0) * 100.0)
}

fn ensure_positive(ticker: &str, price: f64) -> Result<()> {
    if price > 0.0 && price.is_finite() {
        Ok(())
    } else {
        Err(CopilotError::Provider(format!(
            "unusable reference price {} for {}",
            price, ticker
        )))
    }
}

#[derive(Clone)]
pub struct FinancialToolset {
    market: MarketDataClient,
}

impl FinancialToolset {
    pub fn new(market: MarketDataClient) -> Self {
        Self { market }
    }

    /// Percentage return between two dates, rounded to 2 dp.
    pub async fn compute_return(&self, ticker: &str, start_date: &str, end_date: &str) -> ToolOutcome {
        let result = async {
            let series = self.market.fetch(ticker, start_date, end_date).await?;
            period_return(&series)
        }
        .await;

        match result {
            Ok(value) => ToolOutcome::number(round2(value)),
            Err(e) => {
                warn!(ticker, error = %e, "Return calculation failed");
                ToolOutcome::from_error(&format!("Error calculating returns for {}", ticker), &e)
            }
        }
    }

    /// Full price history as a JSON document.
    pub async fn price_history(&self, ticker: &str, start_date: &str, end_date: &str) -> ToolOutcome {
        let result = async {
            let series = self.market.fetch(ticker, start_date, end_date).await?;
            Ok::<_, CopilotError>(serde_json::to_value(&series)?)
        }
        .await;

        match result {
            Ok(document) => ToolOutcome::json(document),
            Err(e) => {
                warn!(ticker, error = %e, "Price history fetch failed");
                ToolOutcome::from_error(
                    &format!("Error fetching price history for {}", ticker),
                    &e,
                )
            }
        }
    }

    /// CAGR between two dates, years measured as days / 365.25.
    pub async fn compute_cagr(&self, ticker: &str, start_date: &str, end_date: &str) -> ToolOutcome {
        let result = async {
            let range = DateRange::parse(start_date, end_date)?;
            if range.days() == 0 {
                return Err(CopilotError::Invocation(
                    "the date range must span at least one day to annualise growth".to_string(),
                ));
            }
            let years = range.days() as f64 / DAYS_PER_YEAR;
            let series = self.market.fetch_range(ticker, &range).await?;
            debug!(ticker, years, bars = series.len(), "Computing CAGR");
            compound_annual_growth(&series, years)
        }
        .await;

        match result {
            Ok(value) => ToolOutcome::number(round2(value)),
            Err(e) if e.is_rate_limit() => {
                warn!(ticker, "CAGR hit the market data rate limit");
                ToolOutcome::failure(FailureKind::RateLimit, RATE_LIMIT_MESSAGE)
            }
            Err(CopilotError::NoData { ticker }) => ToolOutcome::failure(
                FailureKind::NoData,
                format!("No data available for {} in the given range.", ticker),
            ),
            Err(e) => {
                warn!(ticker, error = %e, "CAGR calculation failed");
                ToolOutcome::from_error(&format!("Error calculating CAGR for {}", ticker), &e)
            }
        }
    }

    /// Today's local date as `YYYY-MM-DD`.
    pub fn today(&self) -> ToolOutcome {
        ToolOutcome::text(today_string())
    }
}

pub fn today_string() -> String {
    Local::now().date_naive().format(DATE_FORMAT).to_string()
}

//
// ================= Tool wrappers =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinancialFunction {
    Returns,
    PriceHistory,
    Cagr,
    Today,
}

const RANGE_PARAMS: [ParamSpec; 3] = [
    ParamSpec::string("ticker", "The stock ticker (e.g., 'GOOGL')"),
    ParamSpec::string("start_date", "The starting date in YYYY-MM-DD format"),
    ParamSpec::string("end_date", "The ending date in YYYY-MM-DD format (exclusive)"),
];

impl FinancialFunction {
    fn build_spec(self) -> ToolSpec {
        match self {
            FinancialFunction::Returns => ToolSpec {
                name: "returns",
                description: "Return the percentage return of a stock between start_date and end_date, \
                              rounded to 2 decimals. For a single trading day the figure is \
                              (open - close) / close * 100.",
                parameters: RANGE_PARAMS.to_vec(),
            },
            FinancialFunction::PriceHistory => ToolSpec {
                name: "price_history",
                description: "Return the daily price history (open, high, low, close, volume) of a \
                              stock between start_date and end_date as a JSON document.",
                parameters: RANGE_PARAMS.to_vec(),
            },
            FinancialFunction::Cagr => ToolSpec {
                name: "cagr",
                description: "Calculate the compound annual growth rate (CAGR, in percent) of a stock \
                              from historical closing prices. The period in years is derived from the \
                              date range automatically.",
                parameters: RANGE_PARAMS.to_vec(),
            },
            FinancialFunction::Today => ToolSpec {
                name: "get_date",
                description: "Return today's date in YYYY-MM-DD format.",
                parameters: Vec::new(),
            },
        }
    }

    pub fn spec(self) -> &'static ToolSpec {
        static RETURNS: OnceLock<ToolSpec> = OnceLock::new();
        static PRICE_HISTORY: OnceLock<ToolSpec> = OnceLock::new();
        static CAGR: OnceLock<ToolSpec> = OnceLock::new();
        static TODAY: OnceLock<ToolSpec> = OnceLock::new();

        let cell = match self {
            FinancialFunction::Returns => &RETURNS,
            FinancialFunction::PriceHistory => &PRICE_HISTORY,
            FinancialFunction::Cagr => &CAGR,
            FinancialFunction::Today => &TODAY,
        };
        cell.get_or_init(|| self.build_spec())
    }
}

pub struct FinancialTool {
    function: FinancialFunction,
    toolset: FinancialToolset,
}

impl FinancialTool {
    pub fn new(function: FinancialFunction, toolset: FinancialToolset) -> Self {
        Self { function, toolset }
    }
}

#[async_trait::async_trait]
impl Tool for FinancialTool {
    fn spec(&self) -> &ToolSpec {
        self.function.spec()
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutcome {
        if self.function == FinancialFunction::Today {
            return self.toolset.today();
        }

        let (ticker, start, end) = match (args.str("ticker"), args.str("start_date"), args.str("end_date")) {
            (Ok(ticker), Ok(start), Ok(end)) => (ticker, start, end),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                return ToolOutcome::failure(FailureKind::Invocation, format!("Error: {}", e))
            }
        };

        match self.function {
            FinancialFunction::Returns => self.toolset.compute_return(ticker, start, end).await,
            FinancialFunction::PriceHistory => self.toolset.price_history(ticker, start, end).await,
            FinancialFunction::Cagr => self.toolset.compute_cagr(ticker, start, end).await,
            FinancialFunction::Today => self.toolset.today(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolValue;
    use crate::testing::{bar, StaticProvider};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn toolset(provider: StaticProvider) -> FinancialToolset {
        FinancialToolset::new(MarketDataClient::new(Arc::new(provider)))
    }

    #[tokio::test]
    async fn test_single_day_return_uses_inverted_formula() {
        let tools = toolset(StaticProvider::with_bars(vec![bar("2023-01-03", 100.0, 98.0)]));
        let outcome = tools.compute_return("GOOGL", "2023-01-03", "2023-01-04").await;

        assert_eq!(outcome, ToolOutcome::number(2.04));
        assert_eq!(outcome.observation(), "2.04");
    }

    #[tokio::test]
    async fn test_multi_day_return_uses_closes() {
        let tools = toolset(StaticProvider::with_bars(vec![
            bar("2024-01-02", 50.0, 80.0),
            bar("2024-01-03", 81.0, 85.0),
            bar("2024-01-04", 85.0, 90.0),
        ]));
        let outcome = tools.compute_return("MSFT", "2024-01-02", "2024-01-05").await;

        // (90 - 80) / 80 * 100
        assert_eq!(outcome, ToolOutcome::number(12.5));
    }

    #[tokio::test]
    async fn test_return_rounds_to_two_places() {
        let tools = toolset(StaticProvider::with_bars(vec![
            bar("2024-01-02", 3.0, 3.0),
            bar("2024-01-03", 3.0, 4.0),
        ]));
        let outcome = tools.compute_return("X", "2024-01-02", "2024-01-04").await;
        assert_eq!(outcome, ToolOutcome::number(33.33));
    }

    #[tokio::test]
    async fn test_empty_series_is_no_data_for_every_tool() {
        let tools = toolset(StaticProvider::empty());

        let returns = tools.compute_return("ZZZZ", "2030-01-01", "2030-02-01").await;
        let history = tools.price_history("ZZZZ", "2030-01-01", "2030-02-01").await;
        let cagr = tools.compute_cagr("ZZZZ", "2030-01-01", "2030-02-01").await;

        for outcome in [&returns, &history, &cagr] {
            assert_eq!(outcome.failure_kind(), Some(FailureKind::NoData));
            assert!(outcome.observation().contains("ZZZZ"));
        }
        assert_eq!(
            returns.observation(),
            "Error calculating returns for ZZZZ: No data available for ZZZZ in the given date range."
        );
        assert_eq!(
            cagr.observation(),
            "No data available for ZZZZ in the given range."
        );
    }

    #[tokio::test]
    async fn test_bad_date_is_observation() {
        let tools = toolset(StaticProvider::empty());
        let outcome = tools.compute_return("AAPL", "last year", "2024-01-01").await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::DateParse));
        assert!(outcome.observation().contains("last year"));
    }

    #[tokio::test]
    async fn test_price_history_document() {
        let tools = toolset(StaticProvider::with_bars(vec![
            bar("2024-01-03", 11.0, 12.0),
            bar("2024-01-02", 10.0, 11.0),
        ]));
        let outcome = tools.price_history("AAPL", "2024-01-02", "2024-01-04").await;

        let ToolOutcome::Success { value: ToolValue::Json(document) } = outcome else {
            panic!("expected json document");
        };
        assert_eq!(document["ticker"], "AAPL");
        let bars = document["bars"].as_array().unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0]["close"], 11.0);
        assert_eq!(bars[1]["volume"], 1000);
    }

    #[tokio::test]
    async fn test_cagr_over_two_years() {
        let tools = toolset(StaticProvider::with_bars(vec![
            bar("2020-01-02", 100.0, 100.0),
            bar("2021-12-31", 121.0, 121.0),
        ]));
        // 731 days / 365.25 ≈ 2.0014 years
        let outcome = tools.compute_cagr("SPY", "2020-01-01", "2022-01-01").await;
        assert_eq!(outcome, ToolOutcome::number(9.99));
    }

    #[tokio::test]
    async fn test_cagr_is_idempotent() {
        let tools = toolset(StaticProvider::with_bars(vec![
            bar("2019-03-01", 40.0, 41.3),
            bar("2023-08-15", 77.0, 76.9),
        ]));

        let first = tools.compute_cagr("NVDA", "2019-03-01", "2023-08-16").await;
        let second = tools.compute_cagr("NVDA", "2019-03-01", "2023-08-16").await;
        assert!(first.is_success());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cagr_rate_limit_message() {
        let tools = toolset(StaticProvider::rate_limited());
        let outcome = tools.compute_cagr("AAPL", "2020-01-01", "2024-01-01").await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::RateLimit));
        assert_eq!(outcome.observation(), RATE_LIMIT_MESSAGE);
    }

    #[tokio::test]
    async fn test_other_provider_failures_are_prefixed() {
        let tools = toolset(StaticProvider::failing("connection reset"));

        let cagr = tools.compute_cagr("AAPL", "2020-01-01", "2024-01-01").await;
        assert!(cagr
            .observation()
            .starts_with("Error calculating CAGR for AAPL: "));

        let history = tools.price_history("AAPL", "2020-01-01", "2024-01-01").await;
        assert!(history.observation().contains("connection reset"));
        assert_eq!(history.failure_kind(), Some(FailureKind::Provider));
    }

    #[tokio::test]
    async fn test_cagr_zero_length_span_rejected_before_fetch() {
        let provider = Arc::new(StaticProvider::with_bars(vec![bar("2024-01-02", 1.0, 1.0)]));
        let tools = FinancialToolset::new(MarketDataClient::new(provider.clone()));

        let outcome = tools.compute_cagr("AAPL", "2024-01-02", "2024-01-02").await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Invocation));
        assert!(outcome.observation().contains("at least one day"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_tiny_loss_is_reported_as_zero() {
        let tools = toolset(StaticProvider::with_bars(vec![
            bar("2024-01-02", 1000.0, 1000.0),
            bar("2024-01-03", 1000.0, 999.99),
        ]));
        let outcome = tools.compute_return("X", "2024-01-02", "2024-01-04").await;

        assert_eq!(outcome.observation(), "0");
        assert!(round2(-0.001).is_sign_positive());
        assert_eq!(round2(-0.005), -0.01);
    }

    #[test]
    fn test_today_is_current_date() {
        let tools = toolset(StaticProvider::empty());
        let today = tools.today().observation();

        let parsed = NaiveDate::parse_from_str(&today, DATE_FORMAT).unwrap();
        assert_eq!(parsed, Local::now().date_naive());
        assert_eq!(today.len(), 10);
    }

    #[test]
    fn test_zero_reference_price_is_error() {
        let series = PriceSeries::new("BAD", vec![bar("2024-01-02", 5.0, 0.0)]);
        assert!(period_return(&series).is_err());
    }

    #[test]
    fn test_specs_are_cached() {
        let a = FinancialFunction::Returns.spec() as *const ToolSpec;
        let b = FinancialFunction::Returns.spec() as *const ToolSpec;
        assert_eq!(a, b);
        assert_eq!(FinancialFunction::Today.spec().name, "get_date");
    }
}
