use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{
    FeedSlice, Headline, HistoryPoint, LogEntry, PriceQuote, Selection, SentimentResult,
};
use crate::state::pagination::HeadlinesView;
use crate::workers::poll_scheduler::SchedulerState;

/// Everything the presentation layer reads, published after every change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewState {
    pub selection: Selection,

    /// Generation the slices below belong to
    pub generation: u64,

    pub scheduler: SchedulerState,

    pub price: FeedSlice<PriceQuote>,
    pub sentiment: FeedSlice<SentimentResult>,

    /// First page of headlines for the selection
    pub headlines: FeedSlice<Vec<Headline>>,
    pub history: FeedSlice<Vec<HistoryPoint>>,

    /// Status log, oldest to newest
    pub activity: Vec<LogEntry>,

    /// Expanded headlines view, when open
    pub headlines_view: Option<HeadlinesView>,

    /// When the last polling cycle finished
    pub last_update: Option<DateTime<Utc>>,
}

impl ViewState {
    pub fn new(selection: Selection) -> Self {
        Self {
            selection,
            generation: 0,
            scheduler: SchedulerState::Idle,
            price: FeedSlice::Pending,
            sentiment: FeedSlice::Pending,
            headlines: FeedSlice::Pending,
            history: FeedSlice::Pending,
            activity: Vec::new(),
            headlines_view: None,
            last_update: None,
        }
    }

    /// Drop every feed slice, ready for a new selection
    pub fn reset_feeds(&mut self, selection: Selection, generation: u64) {
        self.selection = selection;
        self.generation = generation;
        self.price = FeedSlice::Pending;
        self.sentiment = FeedSlice::Pending;
        self.headlines = FeedSlice::Pending;
        self.history = FeedSlice::Pending;
    }
}
