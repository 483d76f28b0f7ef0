use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of activity log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Info,
    Success,
    Error,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Info => "info",
            LogKind::Success => "success",
            LogKind::Error => "error",
        }
    }
}

/// A single fetch outcome shown in the status log.
///
/// Fields are private so an entry cannot change after it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    timestamp: DateTime<Utc>,
    kind: LogKind,
    message: String,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self::at(Utc::now(), kind, message)
    }

    pub fn at(timestamp: DateTime<Utc>, kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind,
            message: message.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn kind(&self) -> LogKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.kind.as_str(),
            self.message
        )
    }
}
