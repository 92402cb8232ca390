//! Yahoo Finance chart endpoint (`/v8/finance/chart`)
//!
//! Daily bars are stamped at the session open in UTC, which lands on the
//! previous UTC day for exchanges east of Greenwich. The request window is
//! padded by a day on each side and bars are then kept by their
//! exchange-local date, using the `gmtoffset` Yahoo reports.

use super::MarketDataProvider;
use crate::error::CopilotError;
use crate::http::{status_error, ProviderClient};
use crate::models::{DateRange, PriceBar};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "Yahoo Finance";
const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const WINDOW_PADDING: Days = Days::new(1);

pub struct YahooChartProvider {
    http: ProviderClient,
    base_url: String,
}

impl YahooChartProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: ProviderClient::new(PROVIDER, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn chart_url(&self, ticker: &str, range: &DateRange) -> String {
        let start = range.start.checked_sub_days(WINDOW_PADDING).unwrap_or(range.start);
        let end = range.end.checked_add_days(WINDOW_PADDING).unwrap_or(range.end);

        format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=div%2Csplit&includeAdjustedClose=true",
            self.base_url,
            urlencoding::encode(ticker),
            midnight_utc(start),
            midnight_utc(end),
        )
    }
}

#[async_trait]
impl MarketDataProvider for YahooChartProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn daily_bars(&self, ticker: &str, range: &DateRange) -> Result<Vec<PriceBar>> {
        // Yahoo rejects an empty window, and an empty window has no sessions anyway.
        if range.days() == 0 {
            return Ok(Vec::new());
        }

        let url = self.chart_url(ticker, range);
        let (status, body) = self.http.send_raw(self.http.get(&url)).await?;

        // Unknown or delisted symbols come back as 404 "No data found".
        if status == StatusCode::NOT_FOUND {
            debug!(ticker, "Yahoo chart returned 404");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(status_error(PROVIDER, status, &body));
        }

        let response: ChartResponse = serde_json::from_value(body)
            .map_err(|e| CopilotError::Provider(format!("failed to parse yahoo chart: {}", e)))?;

        let chart = parse_chart(response)?;
        Ok(chart.sessions_within(range))
    }
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

struct ChartBars {
    /// Exchange offset from UTC in seconds
    utc_offset: i64,
    bars: Vec<PriceBar>,
}

impl ChartBars {
    fn empty() -> Self {
        Self {
            utc_offset: 0,
            bars: Vec::new(),
        }
    }

    /// Bars whose exchange-local date falls in `[range.start, range.end)`.
    fn sessions_within(self, range: &DateRange) -> Vec<PriceBar> {
        let offset = self.utc_offset;
        self.bars
            .into_iter()
            .filter(|bar| {
                DateTime::from_timestamp(bar.timestamp.timestamp() + offset, 0)
                    .map(|local| local.date_naive())
                    .is_some_and(|date| date >= range.start && date < range.end)
            })
            .collect()
    }
}

/// Turn a chart payload into bars, adjusting OHLC for splits and dividends
/// when an adjusted close is present. Rows with missing OHLC are skipped.
fn parse_chart(response: ChartResponse) -> Result<ChartBars> {
    if let Some(error) = response.chart.error.filter(|e| !e.is_null()) {
        return Err(CopilotError::Provider(format!("yahoo chart API error: {}", error)));
    }

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(ChartBars::empty());
    };

    let utc_offset = result.meta.and_then(|m| m.gmtoffset).unwrap_or(0);

    let Some(timestamps) = result.timestamp else {
        return Ok(ChartBars::empty());
    };

    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Ok(ChartBars::empty());
    };

    let adjclose = result
        .indicators
        .adjclose
        .and_then(|a| a.into_iter().next())
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());

    for (i, &ts) in timestamps.iter().enumerate() {
        let (Some(Some(open)), Some(Some(high)), Some(Some(low)), Some(Some(close))) = (
            quote.open.get(i),
            quote.high.get(i),
            quote.low.get(i),
            quote.close.get(i),
        ) else {
            continue;
        };

        let factor = match adjclose.get(i).copied().flatten() {
            Some(adj) if *close != 0.0 => adj / close,
            _ => 1.0,
        };

        let timestamp = DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| CopilotError::Provider(format!("invalid timestamp: {}", ts)))?;

        let volume = quote
            .volume
            .get(i)
            .copied()
            .flatten()
            .map(|v| v.max(0) as u64)
            .unwrap_or(0);

        bars.push(PriceBar {
            timestamp,
            open: open * factor,
            high: high * factor,
            low: low * factor,
            close: close * factor,
            volume,
        });
    }

    Ok(ChartBars { utc_offset, bars })
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
    #[serde(default)]
    adjclose: Option<Vec<ChartAdjClose>>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct ChartAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}
