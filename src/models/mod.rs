pub mod activity;
pub mod feeds;
pub mod selection;

pub use activity::{LogEntry, LogKind};
pub use feeds::{
    display_number, FeedSlice, Headline, HistoryPoint, PriceQuote, SentimentLabel,
    SentimentResult,
};
pub use selection::{Market, Range, Selection};
