use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::source::FeedSource;
use crate::error::FeedError;
use crate::models::{
    Headline, HistoryPoint, PriceQuote, Selection, SentimentLabel, SentimentResult,
};

/// Retry applied to transient failures of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }
}

/// HTTP client for the dashboard backend
pub struct BackendClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

/// `/price` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceResponse {
    price: Option<Value>,
    change: Option<Value>,
    #[serde(alias = "change_percent")]
    change_percent: Option<Value>,
    time: Option<Value>,
}

/// `/sentiment` response
#[derive(Debug, Deserialize)]
struct SentimentResponse {
    sentiment: Option<String>,
    confidence: Option<Value>,
}

/// `/headlines` response
#[derive(Debug, Deserialize)]
struct HeadlinesResponse {
    #[serde(default)]
    headlines: Option<Vec<HeadlineItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeadlineItem {
    title: Option<Value>,
    sentiment: Option<Value>,
    confidence: Option<Value>,
    #[serde(alias = "publishedAt")]
    published: Option<Value>,
}

/// `/history` response
#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    history: Option<Vec<HistoryItem>>,
}

#[derive(Debug, Deserialize)]
struct HistoryItem {
    #[serde(alias = "date")]
    time: Option<Value>,
    price: Option<Value>,
}

impl BackendClient {
    /// Create a new backend client
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a URL, retrying transient failures per the retry policy
    async fn get_body(&self, url: &str) -> Result<String, FeedError> {
        let mut attempt = 0;

        loop {
            match self.get_once(url).await {
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!("Request to {} failed ({}), retry {}", url, e, attempt);
                    tokio::time::sleep(self.retry.delay).await;
                }
                result => return result,
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<String, FeedError> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(FeedError::NonSuccessStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(response.text().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, FeedError> {
        let body = self.get_body(url).await?;
        serde_json::from_str(&body)
            .map_err(|e| FeedError::MalformedResponse(format!("{} payload: {}", what, e)))
    }
}

#[async_trait]
impl FeedSource for BackendClient {
    async fn fetch_price(&self, selection: &Selection) -> Result<PriceQuote, FeedError> {
        let url = format!(
            "{}/price?ticker={}",
            self.base_url,
            urlencoding::encode(&selection.ticker)
        );

        let raw: PriceResponse = self.get_json(&url, "price").await?;

        Ok(PriceQuote {
            price: number(raw.price.as_ref()),
            change: number(raw.change.as_ref()),
            change_percent: number(raw.change_percent.as_ref()),
            as_of: timestamp(raw.time.as_ref()),
        })
    }

    async fn fetch_sentiment(
        &self,
        selection: &Selection,
        text: &str,
    ) -> Result<SentimentResult, FeedError> {
        let url = format!(
            "{}/sentiment?text={}",
            self.base_url,
            urlencoding::encode(text)
        );

        let raw: SentimentResponse = self.get_json(&url, "sentiment").await?;
        debug!("Sentiment for {}: {:?}", selection.ticker, raw.sentiment);

        let label = raw
            .sentiment
            .as_deref()
            .ok_or_else(|| FeedError::MalformedResponse("sentiment label missing".to_string()))?
            .parse::<SentimentLabel>()
            .map_err(FeedError::MalformedResponse)?;

        Ok(SentimentResult {
            label,
            confidence: confidence(raw.confidence.as_ref()),
        })
    }

    async fn fetch_headlines(
        &self,
        selection: &Selection,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<Headline>, FeedError> {
        let url = format!(
            "{}/headlines?market={}&ticker={}&page={}&pageSize={}",
            self.base_url,
            selection.market.as_str(),
            urlencoding::encode(&selection.ticker),
            page,
            page_size
        );

        let raw: HeadlinesResponse = self.get_json(&url, "headlines").await?;

        let headlines = raw
            .headlines
            .unwrap_or_default()
            .into_iter()
            .map(convert_headline)
            .collect();

        Ok(headlines)
    }

    async fn fetch_history(&self, selection: &Selection) -> Result<Vec<HistoryPoint>, FeedError> {
        let url = format!(
            "{}/history?ticker={}&period={}",
            self.base_url,
            urlencoding::encode(&selection.ticker),
            selection.range.period()
        );

        let raw: HistoryResponse = self.get_json(&url, "history").await?;

        let points = raw
            .history
            .unwrap_or_default()
            .into_iter()
            .map(|item| HistoryPoint {
                time: match item.time {
                    Some(Value::String(s)) => s,
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                },
                price: number(item.price.as_ref()),
            })
            .collect();

        Ok(points)
    }

    async fn check_liveness(&self) -> Result<(), FeedError> {
        let url = format!("{}/", self.base_url);
        self.get_once(&url).await.map(|_| ())
    }
}

/// Convert API headline to our model
fn convert_headline(item: HeadlineItem) -> Headline {
    Headline {
        title: text(item.title.as_ref())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "No title".to_string()),
        sentiment: text(item.sentiment.as_ref())
            .and_then(|s| s.parse().ok())
            .unwrap_or(SentimentLabel::Neutral),
        confidence: confidence(item.confidence.as_ref()),
        published_at: timestamp(item.published.as_ref()),
    }
}

/// Read a JSON string; any other type is "no data"
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Read a timestamp string or epoch seconds
fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

/// Read a JSON number or numeric string; anything else is "no data"
fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn confidence(value: Option<&Value>) -> Option<f64> {
    number(value).map(|c| c.clamp(0.0, 1.0))
}

/// Accepts RFC 3339, naive ISO date-times (assumed UTC) and plain dates
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}
