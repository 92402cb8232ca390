//! Historical price data
//!
//! `MarketDataClient` validates the request and turns an empty provider
//! answer into `NoData`. Every call goes to the provider; nothing is cached.

use crate::error::CopilotError;
use crate::models::{DateRange, PriceBar, PriceSeries};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub mod yahoo;
pub use yahoo::YahooChartProvider;

/// Source of daily OHLCV bars
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Daily bars in `[range.start, range.end)`.
    async fn daily_bars(&self, ticker: &str, range: &DateRange) -> Result<Vec<PriceBar>>;
}

#[derive(Clone)]
pub struct MarketDataClient {
    provider: Arc<dyn MarketDataProvider>,
}

impl MarketDataClient {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self { provider }
    }

    /// Parse the request and fetch bars.
    pub async fn fetch(&self, ticker: &str, start_date: &str, end_date: &str) -> Result<PriceSeries> {
        let range = DateRange::parse(start_date, end_date)?;
        self.fetch_range(ticker, &range).await
    }

    pub async fn fetch_range(&self, ticker: &str, range: &DateRange) -> Result<PriceSeries> {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(CopilotError::Invocation("ticker must not be empty".to_string()));
        }

        debug!(
            provider = self.provider.name(),
            ticker,
            start = %range.start,
            end = %range.end,
            "Fetching daily bars"
        );

        let bars = self.provider.daily_bars(ticker, range).await?;
        let series = PriceSeries::new(ticker, bars);

        if series.is_empty() {
            return Err(CopilotError::NoData {
                ticker: ticker.to_string(),
            });
        }

        Ok(series)
    }
}
