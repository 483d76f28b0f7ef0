use std::collections::VecDeque;

use crate::models::{LogEntry, LogKind};

/// Number of entries the status log keeps
pub const ACTIVITY_LOG_CAPACITY: usize = 10;

/// Fixed-capacity ring buffer of fetch outcomes, oldest evicted first
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::with_capacity(ACTIVITY_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Stamp a message with the current time and append it
    pub fn push(&mut self, kind: LogKind, message: impl Into<String>) {
        self.append(LogEntry::new(kind, message));
    }

    /// Entries oldest to newest
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
