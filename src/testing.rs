//! Stubs shared by the unit tests

use crate::error::CopilotError;
use crate::market_data::MarketDataProvider;
use crate::models::{parse_date, DateRange, PriceBar, ToolCall};
use crate::reasoning::{ReasoningContext, ReasoningEngine, ReasoningStep};
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveTime;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn bar(date: &str, open: f64, close: f64) -> PriceBar {
    let timestamp = parse_date(date)
        .unwrap()
        .and_time(NaiveTime::from_hms_opt(14, 30, 0).unwrap())
        .and_utc();

    PriceBar {
        timestamp,
        open,
        high: open.max(close),
        low: open.min(close),
        close,
        volume: 1_000,
    }
}

enum Mode {
    Bars(Vec<PriceBar>),
    RateLimited,
    Failing(String),
}

/// Provider that ignores the requested range and serves fixed data.
pub struct StaticProvider {
    mode: Mode,
    calls: AtomicUsize,
}

impl StaticProvider {
    pub fn with_bars(bars: Vec<PriceBar>) -> Self {
        Self {
            mode: Mode::Bars(bars),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::with_bars(Vec::new())
    }

    pub fn rate_limited() -> Self {
        Self {
            mode: Mode::RateLimited,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            mode: Mode::Failing(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn daily_bars(&self, _ticker: &str, _range: &DateRange) -> Result<Vec<PriceBar>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            Mode::Bars(bars) => Ok(bars.clone()),
            Mode::RateLimited => Err(CopilotError::RateLimit {
                provider: "static".to_string(),
            }),
            Mode::Failing(message) => Err(CopilotError::Provider(message.clone())),
        }
    }
}

/// Engine that replays a fixed list of steps, then repeats the last one.
pub struct ScriptedEngine {
    steps: Mutex<VecDeque<ReasoningStep>>,
    last: Mutex<Option<ReasoningStep>>,
    pub observations_seen: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<ReasoningStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            observations_seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Never concludes: every step asks for the same tool again.
    pub fn always_call(name: &str, arguments: serde_json::Value) -> Self {
        Self::new(vec![ReasoningStep::ToolCall(tool_call(name, arguments))])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_observation(&self) -> Option<String> {
        self.observations_seen.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn next_step(&self, context: &ReasoningContext<'_>) -> Result<ReasoningStep> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(exchange) = context.scratchpad.last() {
            self.observations_seen
                .lock()
                .unwrap()
                .push(exchange.observation.clone());
        }

        let next = self.steps.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        let step = match next {
            Some(step) => step,
            None => last
                .clone()
                .ok_or_else(|| CopilotError::LlmError("script exhausted".to_string()))?,
        };
        *last = Some(step.clone());

        Ok(match step {
            ReasoningStep::ToolCall(mut call) => {
                call.id = format!("call_{}", n);
                ReasoningStep::ToolCall(call)
            }
            other => other,
        })
    }
}

pub fn tool_call(name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: String::new(),
        name: name.to_string(),
        arguments,
    }
}

/// Serve `router` on an ephemeral loopback port; returns its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
