use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::models::Selection;

/// One of the four polled feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Price,
    Sentiment,
    Headlines,
    History,
}

impl Feed {
    pub const ALL: [Feed; 4] = [Feed::Price, Feed::Sentiment, Feed::Headlines, Feed::History];

    fn index(self) -> usize {
        match self {
            Feed::Price => 0,
            Feed::Sentiment => 1,
            Feed::Headlines => 2,
            Feed::History => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Price => "price",
            Feed::Sentiment => "sentiment",
            Feed::Headlines => "headlines",
            Feed::History => "history",
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Fetching,
}

/// Why a polling cycle was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Activation or selection change
    Selection,
    Timer,
    Manual,
}

/// A set of fetches to issue, one per feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub generation: u64,
    pub selection: Selection,
    pub trigger: Trigger,
}

/// How a feed completion relates to the current generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Apply the result. `cycle_complete` is set on the last outstanding feed.
    Current { cycle_complete: bool },
    /// Superseded generation, duplicate, or scheduler torn down: drop it
    Stale,
}

/// Tracks the active selection, its generation and which feeds are still
/// outstanding. Owned by the dashboard event loop; does no I/O itself.
#[derive(Debug)]
pub struct PollScheduler {
    selection: Selection,
    generation: u64,
    outstanding: [bool; 4],
    terminated: bool,
}

impl PollScheduler {
    pub fn new(selection: Selection) -> Self {
        Self {
            selection,
            generation: 0,
            outstanding: [false; 4],
            terminated: false,
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> SchedulerState {
        if self.outstanding.iter().any(|o| *o) {
            SchedulerState::Fetching
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn is_outstanding(&self, feed: Feed) -> bool {
        self.outstanding[feed.index()]
    }

    /// Adopt a selection under a fresh generation. Anything still in flight
    /// for the previous generation becomes stale.
    pub fn start(&mut self, selection: Selection) -> Option<Cycle> {
        if self.terminated {
            return None;
        }

        self.generation += 1;
        self.selection = selection;
        self.outstanding = [true; 4];

        debug!(
            "Generation {} started for {}",
            self.generation, self.selection
        );

        Some(self.cycle(Trigger::Selection))
    }

    /// Re-poll the current selection. Returns `None` while a cycle is still
    /// in flight, so repeated calls never double up requests.
    pub fn refresh(&mut self, trigger: Trigger) -> Option<Cycle> {
        if self.terminated || self.state() == SchedulerState::Fetching {
            return None;
        }

        self.outstanding = [true; 4];
        Some(self.cycle(trigger))
    }

    /// Classify a feed completion tagged with `generation`
    pub fn accept(&mut self, generation: u64, feed: Feed) -> Acceptance {
        if self.terminated || generation != self.generation || !self.is_outstanding(feed) {
            return Acceptance::Stale;
        }

        self.outstanding[feed.index()] = false;
        Acceptance::Current {
            cycle_complete: self.state() == SchedulerState::Idle,
        }
    }

    /// Mark the current generation terminal; nothing is accepted afterwards
    pub fn teardown(&mut self) {
        self.terminated = true;
        self.outstanding = [false; 4];
    }

    fn cycle(&self, trigger: Trigger) -> Cycle {
        Cycle {
            generation: self.generation,
            selection: self.selection.clone(),
            trigger,
        }
    }
}
