//! Core data models for the copilot

use crate::error::CopilotError;
use crate::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

//
// ================= Conversation =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

//
// ================= Market data =================
//

/// Calendar date range as requested by a tool call.
///
/// `end` is exclusive when bars are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Parse both bounds as `YYYY-MM-DD` and check `start <= end`.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start_date = parse_date(start)?;
        let end_date = parse_date(end)?;

        if start_date > end_date {
            return Err(CopilotError::DateRange {
                start: start.trim().to_string(),
                end: end.trim().to_string(),
            });
        }

        Ok(Self {
            start: start_date,
            end: end_date,
        })
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| CopilotError::DateParse {
        value: value.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Daily bars for one ticker, ascending by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSeries {
    pub ticker: String,
    pub bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(ticker: impl Into<String>, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|bar| bar.timestamp);
        Self {
            ticker: ticker.into(),
            bars,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn first(&self) -> Option<&PriceBar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }
}

//
// ================= Tool I/O =================
//

/// A tool call requested by the reasoning engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Engine-assigned id, echoed back with the observation
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DateParse,
    NoData,
    RateLimit,
    Invocation,
    Provider,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ToolValue {
    Number(f64),
    Json(serde_json::Value),
    Text(String),
}

/// Result of one tool invocation.
///
/// Callers match on the variant; the engine only ever sees
/// [`ToolOutcome::observation`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolOutcome {
    Success { value: ToolValue },
    Failure { kind: FailureKind, message: String },
}

impl ToolOutcome {
    pub fn number(value: f64) -> Self {
        ToolOutcome::Success {
            value: ToolValue::Number(value),
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        ToolOutcome::Success {
            value: ToolValue::Json(value),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        ToolOutcome::Success {
            value: ToolValue::Text(value.into()),
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        ToolOutcome::Failure {
            kind,
            message: message.into(),
        }
    }

    /// Convert an error into a failure outcome, prefixing the message with
    /// the tool's context.
    pub fn from_error(context: &str, error: &CopilotError) -> Self {
        ToolOutcome::Failure {
            kind: error.kind(),
            message: format!("{}: {}", context, error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ToolOutcome::Failure { kind, .. } => Some(*kind),
            ToolOutcome::Success { .. } => None,
        }
    }

    /// Text rendering fed back to the reasoning engine.
    pub fn observation(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ToolOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutcome::Success { value } => match value {
                ToolValue::Number(n) => write!(f, "{}", n),
                ToolValue::Json(v) => write!(f, "{}", v),
                ToolValue::Text(s) => write!(f, "{}", s),
            },
            ToolOutcome::Failure { message, .. } => write!(f, "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_range_parse() {
        let range = DateRange::parse("2023-01-03", "2023-01-04").unwrap();
        assert_eq!(range.days(), 1);

        let same_day = DateRange::parse("2023-01-03", "2023-01-03").unwrap();
        assert_eq!(same_day.days(), 0);
    }

    #[test]
    fn test_date_range_rejects_bad_input() {
        let err = DateRange::parse("2023/01/03", "2023-01-04").unwrap_err();
        assert!(matches!(err, CopilotError::DateParse { ref value } if value == "2023/01/03"));

        let err = DateRange::parse("2023-01-05", "2023-01-04").unwrap_err();
        assert!(matches!(err, CopilotError::DateRange { .. }));

        assert!(DateRange::parse("2023-02-30", "2023-03-01").is_err());
    }

    #[test]
    fn test_series_sorted_ascending() {
        let bar = |day: u32, close: f64| PriceBar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 14, 30, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10,
        };

        let series = PriceSeries::new("AAPL", vec![bar(3, 3.0), bar(1, 1.0), bar(2, 2.0)]);
        let closes: Vec<f64> = series.bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
        assert_eq!(series.first().map(|b| b.close), Some(1.0));
        assert_eq!(series.last().map(|b| b.close), Some(3.0));
    }

    #[test]
    fn test_observation_rendering() {
        assert_eq!(ToolOutcome::number(2.04).observation(), "2.04");
        assert_eq!(ToolOutcome::text("2024-05-01").observation(), "2024-05-01");
        assert_eq!(
            ToolOutcome::json(serde_json::json!({"a": 1})).observation(),
            r#"{"a":1}"#
        );

        let failure = ToolOutcome::from_error(
            "Error calculating returns for TSLA",
            &CopilotError::NoData {
                ticker: "TSLA".to_string(),
            },
        );
        assert!(!failure.is_success());
        assert_eq!(failure.failure_kind(), Some(FailureKind::NoData));
        assert!(failure.observation().starts_with("Error calculating returns for TSLA"));
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let value = serde_json::to_value(ToolOutcome::number(1.5)).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["value"]["type"], "number");

        let value =
            serde_json::to_value(ToolOutcome::failure(FailureKind::RateLimit, "slow down")).unwrap();
        assert_eq!(value["status"], "failure");
        assert_eq!(value["kind"], "rate_limit");
    }
}
