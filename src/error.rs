use thiserror::Error;

/// Why a feed fetch produced no usable result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// Connection refused, DNS failure, timeout, ...
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// Body was not the JSON shape the feed expects
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("backend returned {status}: {body}")]
    NonSuccessStatus { status: u16, body: String },

    /// Response belongs to a superseded selection; never shown to the user
    #[error("stale response for generation {generation} (current {current})")]
    Stale { generation: u64, current: u64 },
}

impl FeedError {
    /// Whether a single retry might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::NetworkFailure(_) => true,
            FeedError::NonSuccessStatus { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FeedError::MalformedResponse(err.to_string())
        } else if err.is_timeout() {
            FeedError::NetworkFailure(format!("request timed out: {}", err))
        } else {
            FeedError::NetworkFailure(err.to_string())
        }
    }
}

/// Errors surfaced by the dashboard handle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DashboardError {
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// The dashboard has been torn down
    #[error("dashboard is closed")]
    Closed,
}
