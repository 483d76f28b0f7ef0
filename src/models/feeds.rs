use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest quote for the selected ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Last traded price, `None` when the backend had no data
    pub price: Option<f64>,

    /// Absolute change since previous close
    pub change: Option<f64>,

    /// Percentage change since previous close
    pub change_percent: Option<f64>,

    /// Time the quote refers to, when the backend sent one
    pub as_of: Option<DateTime<Utc>>,
}

impl fmt::Display for PriceQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} / {}%)",
            display_number(self.price),
            display_number(self.change),
            display_number(self.change_percent)
        )
    }
}

/// Render an optional number, never substituting zero for missing data
pub fn display_number(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "unavailable".to_string(),
    }
}

/// Sentiment classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

impl FromStr for SentimentLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(SentimentLabel::Positive),
            "negative" => Ok(SentimentLabel::Negative),
            "neutral" => Ok(SentimentLabel::Neutral),
            other => Err(format!("unknown sentiment label '{}'", other)),
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate sentiment for the selected ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub label: SentimentLabel,

    /// Model confidence (0.0 - 1.0)
    pub confidence: Option<f64>,
}

/// A news headline with its sentiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub sentiment: SentimentLabel,

    /// Model confidence (0.0 - 1.0)
    pub confidence: Option<f64>,
    pub published_at: Option<DateTime<Utc>>,
}

/// One point of the price history chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Date or time label as sent by the backend
    pub time: String,
    pub price: Option<f64>,
}

/// State of one feed's slice of the view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedSlice<T> {
    /// Nothing fetched yet for the current selection
    Pending,
    /// Last successfully applied result
    Ready {
        value: T,
        updated_at: DateTime<Utc>,
    },
    /// No usable value; the reason is the most recent failure
    Unavailable { reason: String },
}

impl<T> Default for FeedSlice<T> {
    fn default() -> Self {
        FeedSlice::Pending
    }
}

impl<T> FeedSlice<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            FeedSlice::Ready { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, FeedSlice::Ready { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, FeedSlice::Pending)
    }

    /// Replace the slice wholesale with a fresh value
    pub fn set(&mut self, value: T) {
        *self = FeedSlice::Ready {
            value,
            updated_at: Utc::now(),
        };
    }

    /// Record a failure. A ready value is kept as last-known-good.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.is_ready() {
            *self = FeedSlice::Unavailable {
                reason: reason.into(),
            };
        }
    }
}
