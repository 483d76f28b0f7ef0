use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DashboardError;

const DOMESTIC_TICKERS: &[&str] = &["RELIANCE", "TCS", "INFY", "HDFC", "WIPRO"];
const GLOBAL_TICKERS: &[&str] = &["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA"];

/// Market the ticker is listed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    /// Indian exchanges (NSE/BSE)
    #[serde(rename = "indian")]
    Domestic,
    /// Everything else
    Global,
}

impl Market {
    /// Value sent to the backend's `market` parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Domestic => "indian",
            Market::Global => "global",
        }
    }

    /// Preset tickers offered for this market
    pub fn preset_tickers(&self) -> &'static [&'static str] {
        match self {
            Market::Domestic => DOMESTIC_TICKERS,
            Market::Global => GLOBAL_TICKERS,
        }
    }

    pub fn default_ticker(&self) -> &'static str {
        self.preset_tickers()[0]
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "indian" | "domestic" | "in" => Ok(Market::Domestic),
            "global" => Ok(Market::Global),
            other => Err(DashboardError::InvalidSelection(format!(
                "unknown market '{}'",
                other
            ))),
        }
    }
}

/// Time window shown on the history chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Range {
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "1Y")]
    OneYear,
    #[serde(rename = "5Y")]
    FiveYears,
    #[serde(rename = "10Y")]
    TenYears,
}

impl Range {
    pub const ALL: [Range; 5] = [
        Range::OneWeek,
        Range::OneMonth,
        Range::OneYear,
        Range::FiveYears,
        Range::TenYears,
    ];

    /// Label shown on the range buttons
    pub fn label(&self) -> &'static str {
        match self {
            Range::OneWeek => "1W",
            Range::OneMonth => "1M",
            Range::OneYear => "1Y",
            Range::FiveYears => "5Y",
            Range::TenYears => "10Y",
        }
    }

    /// Period understood by the backend's `/history` endpoint
    pub fn period(&self) -> &'static str {
        match self {
            Range::OneWeek => "5d",
            Range::OneMonth => "1mo",
            Range::OneYear => "1y",
            Range::FiveYears => "5y",
            Range::TenYears => "10y",
        }
    }
}

impl Default for Range {
    fn default() -> Self {
        Range::OneMonth
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Range {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Range::ALL
            .into_iter()
            .find(|r| r.label() == wanted)
            .ok_or_else(|| DashboardError::InvalidSelection(format!("unknown range '{}'", s)))
    }
}

/// The (market, ticker, range) triple every feed fetch is keyed on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub market: Market,
    pub ticker: String,
    pub range: Range,
}

impl Selection {
    /// Build a selection, normalizing the ticker to trimmed upper case
    pub fn new(market: Market, ticker: &str, range: Range) -> Result<Self, DashboardError> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(DashboardError::InvalidSelection(
                "ticker must not be empty".to_string(),
            ));
        }

        Ok(Self {
            market,
            ticker,
            range,
        })
    }

    /// Default ticker and range for a market
    pub fn for_market(market: Market) -> Self {
        Self {
            market,
            ticker: market.default_ticker().to_string(),
            range: Range::default(),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.ticker, self.market, self.range)
    }
}
