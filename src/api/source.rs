use async_trait::async_trait;

use crate::error::FeedError;
use crate::models::{Headline, HistoryPoint, PriceQuote, Selection, SentimentResult};

/// The backend feeds the dashboard polls.
///
/// Every call is independent and stateless; the caller decides what to do
/// with the result. Implementations must not panic on partial payloads.
#[async_trait]
pub trait FeedSource: Send + Sync + 'static {
    /// Latest quote for the selected ticker
    async fn fetch_price(&self, selection: &Selection) -> Result<PriceQuote, FeedError>;

    /// Sentiment of `text`, gathered for the selected ticker
    async fn fetch_sentiment(
        &self,
        selection: &Selection,
        text: &str,
    ) -> Result<SentimentResult, FeedError>;

    /// One page (1-based) of headlines for the selected market and ticker
    async fn fetch_headlines(
        &self,
        selection: &Selection,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<Headline>, FeedError>;

    /// Price history over the selected range
    async fn fetch_history(&self, selection: &Selection) -> Result<Vec<HistoryPoint>, FeedError>;

    /// Ok when the backend answers with a 2xx
    async fn check_liveness(&self) -> Result<(), FeedError>;
}

/// Headlines whose titles feed the sentiment call
pub const SENTIMENT_HEADLINES: usize = 5;

/// The backend rejects shorter texts
const MIN_SENTIMENT_TEXT: usize = 5;

/// Fallback text used before any headlines are known for a selection
pub fn sentiment_subject(selection: &Selection) -> String {
    format!("Latest market news for {}", selection.ticker)
}

/// Text sent to the sentiment endpoint: the top headline titles joined by
/// spaces, or the subject phrase when there are none to analyze
pub fn sentiment_text(selection: &Selection, headlines: Option<&[Headline]>) -> String {
    let combined = headlines
        .unwrap_or_default()
        .iter()
        .take(SENTIMENT_HEADLINES)
        .map(|h| h.title.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if combined.chars().count() < MIN_SENTIMENT_TEXT {
        sentiment_subject(selection)
    } else {
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Market, Range, SentimentLabel};

    fn headline(title: &str) -> Headline {
        Headline {
            title: title.to_string(),
            sentiment: SentimentLabel::Neutral,
            confidence: None,
            published_at: None,
        }
    }

    #[test]
    fn test_sentiment_text_joins_top_headlines() {
        let selection = Selection::new(Market::Global, "aapl", Range::OneMonth).unwrap();
        let headlines: Vec<Headline> = (1..=7).map(|i| headline(&format!("Story {}", i))).collect();

        assert_eq!(
            sentiment_text(&selection, Some(headlines.as_slice())),
            "Story 1 Story 2 Story 3 Story 4 Story 5"
        );
    }

    #[test]
    fn test_sentiment_text_falls_back_to_subject() {
        let selection = Selection::new(Market::Global, "MSFT", Range::OneMonth).unwrap();

        assert_eq!(
            sentiment_text(&selection, None),
            "Latest market news for MSFT"
        );
        assert_eq!(
            sentiment_text(&selection, Some(&[][..])),
            "Latest market news for MSFT"
        );
        assert_eq!(
            sentiment_text(&selection, Some(&[headline("Up"), headline("  ")][..])),
            "Latest market news for MSFT"
        );
    }
}
