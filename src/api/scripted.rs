//! In-memory feed source for exercising the workers without a backend.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use crate::api::FeedSource;
use crate::error::FeedError;
use crate::models::{
    Headline, HistoryPoint, PriceQuote, Selection, SentimentLabel, SentimentResult,
};
use crate::workers::Feed;

/// A request the source received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub feed: Feed,
    pub ticker: String,
    pub page: Option<u32>,
    /// Text sent for sentiment analysis
    pub text: Option<String>,
}

/// Answers every feed from scripted data. Requests can be held open with
/// [`ScriptedSource::hold`] until [`ScriptedSource::release`].
pub struct ScriptedSource {
    calls: Mutex<Vec<Call>>,
    gate: watch::Sender<bool>,
    failing: Mutex<HashSet<Feed>>,
    page_sizes: Mutex<HashMap<u32, usize>>,
    liveness: Mutex<VecDeque<bool>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            calls: Mutex::new(Vec::new()),
            gate,
            failing: Mutex::new(HashSet::new()),
            page_sizes: Mutex::new(HashMap::new()),
            liveness: Mutex::new(VecDeque::new()),
        }
    }

    /// Park every new request until `release`
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn fail(&self, feed: Feed) {
        self.failing.lock().unwrap().insert(feed);
    }

    pub fn recover(&self, feed: Feed) {
        self.failing.lock().unwrap().remove(&feed);
    }

    /// Number of headlines returned for `page`; unscripted pages are empty
    pub fn set_page_size(&self, page: u32, count: usize) {
        self.page_sizes.lock().unwrap().insert(page, count);
    }

    /// Results for upcoming liveness checks; once drained the backend is up
    pub fn script_liveness(&self, results: impl IntoIterator<Item = bool>) {
        self.liveness.lock().unwrap().extend(results);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, feed: Feed) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.feed == feed)
            .count()
    }

    /// Price every ticker is quoted at
    pub fn price_of(ticker: &str) -> f64 {
        ticker.bytes().map(f64::from).sum()
    }

    /// Sentiment texts in the order they were requested
    pub fn sentiment_texts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| c.text.clone())
            .collect()
    }

    async fn enter(
        &self,
        feed: Feed,
        selection: &Selection,
        page: Option<u32>,
        text: Option<&str>,
    ) -> Result<(), FeedError> {
        self.calls.lock().unwrap().push(Call {
            feed,
            ticker: selection.ticker.clone(),
            page,
            text: text.map(str::to_string),
        });

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if self.failing.lock().unwrap().contains(&feed) {
            return Err(FeedError::NetworkFailure(format!("{} feed unreachable", feed)));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn fetch_price(&self, selection: &Selection) -> Result<PriceQuote, FeedError> {
        self.enter(Feed::Price, selection, None, None).await?;
        Ok(PriceQuote {
            price: Some(Self::price_of(&selection.ticker)),
            change: Some(1.5),
            change_percent: None,
            as_of: Some(Utc::now()),
        })
    }

    async fn fetch_sentiment(
        &self,
        selection: &Selection,
        text: &str,
    ) -> Result<SentimentResult, FeedError> {
        self.enter(Feed::Sentiment, selection, None, Some(text)).await?;
        Ok(SentimentResult {
            label: SentimentLabel::Positive,
            confidence: Some(0.72),
        })
    }

    async fn fetch_headlines(
        &self,
        selection: &Selection,
        page: u32,
        _page_size: usize,
    ) -> Result<Vec<Headline>, FeedError> {
        self.enter(Feed::Headlines, selection, Some(page), None).await?;

        let count = self
            .page_sizes
            .lock()
            .unwrap()
            .get(&page)
            .copied()
            .unwrap_or(0);

        Ok((0..count)
            .map(|i| Headline {
                title: format!("{} page {} story {}", selection.ticker, page, i),
                sentiment: SentimentLabel::Neutral,
                confidence: Some(0.5),
                published_at: None,
            })
            .collect())
    }

    async fn fetch_history(&self, selection: &Selection) -> Result<Vec<HistoryPoint>, FeedError> {
        self.enter(Feed::History, selection, None, None).await?;
        Ok(vec![HistoryPoint {
            time: selection.ticker.clone(),
            price: Some(Self::price_of(&selection.ticker)),
        }])
    }

    async fn check_liveness(&self) -> Result<(), FeedError> {
        let up = self.liveness.lock().unwrap().pop_front().unwrap_or(true);
        if up {
            Ok(())
        } else {
            Err(FeedError::NonSuccessStatus {
                status: 503,
                body: "down".to_string(),
            })
        }
    }
}
