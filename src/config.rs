use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::models::{Market, Range, Selection};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the dashboard backend
    pub api_base_url: String,

    /// Interval in seconds between automatic refreshes
    pub poll_interval: u64,

    /// Interval in seconds between backend liveness checks
    pub health_check_interval: u64,

    /// Per-request timeout in seconds
    pub request_timeout: u64,

    /// Retries after a transient request failure
    pub request_retries: u32,

    /// Pause between retries in milliseconds
    pub retry_delay_ms: u64,

    /// Headlines per page in the expanded view
    pub headlines_page_size: usize,

    /// Selection shown on startup
    pub default_selection: Selection,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let market: Market = lookup("DEFAULT_MARKET")
            .unwrap_or_else(|| "indian".to_string())
            .parse()
            .context("DEFAULT_MARKET must be 'indian' or 'global'")?;

        let range: Range = lookup("DEFAULT_RANGE")
            .unwrap_or_else(|| Range::default().label().to_string())
            .parse()
            .context("DEFAULT_RANGE must be one of 1W, 1M, 1Y, 5Y, 10Y")?;

        let ticker = lookup("DEFAULT_TICKER").unwrap_or_else(|| market.default_ticker().to_string());
        let default_selection =
            Selection::new(market, &ticker, range).context("DEFAULT_TICKER must not be empty")?;

        let headlines_page_size: usize = parse_or(&lookup, "HEADLINES_PAGE_SIZE", 10)?;
        anyhow::ensure!(
            headlines_page_size > 0,
            "HEADLINES_PAGE_SIZE must be at least 1"
        );

        let poll_interval: u64 = parse_or(&lookup, "POLL_INTERVAL", 60)?;
        anyhow::ensure!(poll_interval > 0, "POLL_INTERVAL must be at least 1 second");

        let health_check_interval: u64 = parse_or(&lookup, "HEALTH_CHECK_INTERVAL", 5)?;
        anyhow::ensure!(
            health_check_interval > 0,
            "HEALTH_CHECK_INTERVAL must be at least 1 second"
        );

        Ok(Config {
            api_base_url: lookup("DASHBOARD_API_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8000".to_string()),

            poll_interval,

            health_check_interval,

            request_timeout: parse_or(&lookup, "REQUEST_TIMEOUT", 10)?,

            request_retries: parse_or(&lookup, "REQUEST_RETRIES", 1)?,

            retry_delay_ms: parse_or(&lookup, "RETRY_DELAY_MS", 500)?,

            headlines_page_size,

            default_selection,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}
