use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::source::sentiment_text;
use crate::api::FeedSource;
use crate::config::Config;
use crate::error::{DashboardError, FeedError};
use crate::models::{
    Headline, HistoryPoint, LogKind, Market, PriceQuote, Range, Selection, SentimentResult,
};
use crate::state::{ActivityLog, PageOutcome, PageRequest, PaginationCursor, ViewState, DEFAULT_PAGE_SIZE};
use crate::workers::health_probe::{HealthProbe, HealthStatus, DEFAULT_HEALTH_INTERVAL};
use crate::workers::poll_scheduler::{Acceptance, Cycle, Feed, PollScheduler, Trigger};

/// Interval used when none (or zero) is given
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Timing and paging knobs for the dashboard
#[derive(Debug, Clone)]
pub struct DashboardSettings {
    /// Interval between automatic refreshes
    pub poll_interval: Duration,

    /// Interval between backend liveness checks
    pub health_interval: Duration,

    /// Headlines per page
    pub page_size: usize,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            health_interval: DEFAULT_HEALTH_INTERVAL,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl DashboardSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval),
            health_interval: Duration::from_secs(config.health_check_interval),
            page_size: config.headlines_page_size,
        }
    }

    /// Replace zero values, which the timers and pager cannot run with, by
    /// the defaults
    pub fn normalized(self) -> Self {
        let defaults = Self::default();

        if self.poll_interval.is_zero() {
            warn!("Zero poll interval, using {:?}", defaults.poll_interval);
        }
        if self.health_interval.is_zero() {
            warn!("Zero health interval, using {:?}", defaults.health_interval);
        }
        if self.page_size == 0 {
            warn!("Zero headlines page size, using {}", defaults.page_size);
        }

        Self {
            poll_interval: non_zero(self.poll_interval, defaults.poll_interval),
            health_interval: non_zero(self.health_interval, defaults.health_interval),
            page_size: if self.page_size == 0 {
                defaults.page_size
            } else {
                self.page_size
            },
        }
    }
}

fn non_zero(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

/// Result of asking for a manual refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Started,
    /// A cycle for this selection is still running; nothing new was issued
    AlreadyInFlight,
}

/// User actions, acknowledged once the event loop has applied them
enum Command {
    Refresh(oneshot::Sender<RefreshOutcome>),
    SetSelection(Selection, oneshot::Sender<()>),
    OpenHeadlines(String, oneshot::Sender<()>),
    LoadMore(oneshot::Sender<bool>),
    CloseHeadlines(oneshot::Sender<()>),
}

/// Result of one feed fetch
enum FeedOutcome {
    Price(Result<PriceQuote, FeedError>),
    Sentiment(Result<SentimentResult, FeedError>),
    Headlines(Result<Vec<Headline>, FeedError>),
    History(Result<Vec<HistoryPoint>, FeedError>),
}

impl FeedOutcome {
    fn feed(&self) -> Feed {
        match self {
            FeedOutcome::Price(_) => Feed::Price,
            FeedOutcome::Sentiment(_) => Feed::Sentiment,
            FeedOutcome::Headlines(_) => Feed::Headlines,
            FeedOutcome::History(_) => Feed::History,
        }
    }
}

/// Completions sent back to the event loop by fetch tasks
enum Event {
    Feed {
        generation: u64,
        selection: Selection,
        outcome: FeedOutcome,
    },
    Page {
        request: PageRequest,
        result: Result<Vec<Headline>, FeedError>,
    },
}

/// Cloneable handle used by the presentation layer
#[derive(Clone)]
pub struct DashboardHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ViewState>,
    health: watch::Receiver<HealthStatus>,
    cancel: CancellationToken,
}

impl DashboardHandle {
    /// Re-poll every feed unless a cycle is already in flight
    pub async fn refresh(&self) -> Result<RefreshOutcome, DashboardError> {
        self.request(Command::Refresh).await
    }

    /// Switch to a new selection; in-flight responses for the old one are dropped
    pub async fn set_selection(
        &self,
        market: Market,
        ticker: &str,
        range: Range,
    ) -> Result<(), DashboardError> {
        let selection = Selection::new(market, ticker, range)?;
        self.request(|reply| Command::SetSelection(selection, reply))
            .await
    }

    /// Open (or reopen) the expanded headlines view for a ticker
    pub async fn open_headlines(&self, ticker: &str) -> Result<(), DashboardError> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(DashboardError::InvalidSelection(
                "ticker must not be empty".to_string(),
            ));
        }
        self.request(|reply| Command::OpenHeadlines(ticker, reply))
            .await
    }

    /// Fetch the next page of headlines. Returns whether a request was issued.
    pub async fn load_more_headlines(&self) -> Result<bool, DashboardError> {
        self.request(Command::LoadMore).await
    }

    pub async fn close_headlines(&self) -> Result<(), DashboardError> {
        self.request(Command::CloseHeadlines).await
    }

    /// Subscribe to view state updates
    pub fn state(&self) -> watch::Receiver<ViewState> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> ViewState {
        self.state.borrow().clone()
    }

    pub fn health(&self) -> watch::Receiver<HealthStatus> {
        self.health.clone()
    }

    pub fn health_status(&self) -> HealthStatus {
        *self.health.borrow()
    }

    /// Tear the dashboard down: timers stop and no further state is written
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, DashboardError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| DashboardError::Closed)?;
        reply_rx.await.map_err(|_| DashboardError::Closed)
    }
}

/// Event loop owning all polling state for one dashboard lifetime.
///
/// Commands and fetch completions arrive as messages, so state is only ever
/// touched from this task. Fetches run as spawned tasks and report back
/// tagged with their generation; superseded generations are ignored rather
/// than aborted.
pub struct Dashboard<S: FeedSource> {
    source: Arc<S>,
    settings: DashboardSettings,
    scheduler: PollScheduler,
    log: ActivityLog,
    view: ViewState,
    cursor: Option<PaginationCursor>,
    view_epoch: u64,
    state_tx: watch::Sender<ViewState>,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    commands_rx: mpsc::Receiver<Command>,
    cancel: CancellationToken,
}

impl<S: FeedSource> Dashboard<S> {
    /// Start the dashboard and its health probe for an initial selection
    pub fn spawn(
        source: Arc<S>,
        selection: Selection,
        settings: DashboardSettings,
    ) -> (DashboardHandle, JoinHandle<()>) {
        let settings = settings.normalized();
        let cancel = CancellationToken::new();

        let (probe, health_rx) = HealthProbe::new(
            Arc::clone(&source),
            settings.health_interval,
            cancel.child_token(),
        );
        tokio::spawn(probe.run());

        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::channel(100);
        let (state_tx, state_rx) = watch::channel(ViewState::new(selection.clone()));

        let dashboard = Self {
            source,
            settings,
            scheduler: PollScheduler::new(selection.clone()),
            log: ActivityLog::new(),
            view: ViewState::new(selection.clone()),
            cursor: None,
            view_epoch: 0,
            state_tx,
            events_tx,
            events_rx,
            commands_rx,
            cancel: cancel.clone(),
        };

        let task = tokio::spawn(dashboard.run(selection));

        let handle = DashboardHandle {
            commands: commands_tx,
            state: state_rx,
            health: health_rx,
            cancel,
        };

        (handle, task)
    }

    /// Run the event loop until shutdown or until every handle is dropped
    pub async fn run(mut self, initial: Selection) {
        info!(
            "Dashboard started for {} (poll interval: {:?})",
            initial, self.settings.poll_interval
        );

        let mut interval = time::interval_at(
            Instant::now() + self.settings.poll_interval,
            self.settings.poll_interval,
        );
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        self.change_selection(initial, &mut interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Dashboard cancelled");
                    break;
                }
                command = self.commands_rx.recv() => match command {
                    Some(command) => self.handle_command(command, &mut interval),
                    None => {
                        debug!("All dashboard handles dropped");
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                _ = interval.tick() => {
                    self.refresh(Trigger::Timer);
                }
            }
        }

        self.teardown();
    }

    fn handle_command(&mut self, command: Command, interval: &mut Interval) {
        match command {
            Command::Refresh(reply) => {
                let outcome = self.refresh(Trigger::Manual);
                let _ = reply.send(outcome);
            }
            Command::SetSelection(selection, reply) => {
                if selection != *self.scheduler.selection() {
                    self.change_selection(selection, interval);
                }
                let _ = reply.send(());
            }
            Command::OpenHeadlines(ticker, reply) => {
                self.open_headlines(ticker);
                let _ = reply.send(());
            }
            Command::LoadMore(reply) => {
                let issued = self.load_more();
                let _ = reply.send(issued);
            }
            Command::CloseHeadlines(reply) => {
                if self.cursor.take().is_some() {
                    debug!("Headlines view closed");
                    self.publish();
                }
                let _ = reply.send(());
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Feed {
                generation,
                selection,
                outcome,
            } => self.apply_feed(generation, &selection, outcome),
            Event::Page { request, result } => self.apply_page(request, result),
        }
    }

    /// Adopt a selection under a new generation and poll it right away
    fn change_selection(&mut self, selection: Selection, interval: &mut Interval) {
        let Some(cycle) = self.scheduler.start(selection) else {
            return;
        };

        info!(
            "Selection changed to {} (generation {})",
            cycle.selection, cycle.generation
        );

        self.view
            .reset_feeds(cycle.selection.clone(), cycle.generation);
        self.log.push(
            LogKind::Info,
            format!("Fetching latest data for {}...", cycle.selection.ticker),
        );
        interval.reset();

        self.issue(cycle);
        self.publish();
    }

    /// Start a cycle for the current selection unless one is in flight
    fn refresh(&mut self, trigger: Trigger) -> RefreshOutcome {
        let Some(cycle) = self.scheduler.refresh(trigger) else {
            debug!("{:?} refresh skipped, cycle already in flight", trigger);
            return RefreshOutcome::AlreadyInFlight;
        };

        let message = match trigger {
            Trigger::Manual => "Manual refresh triggered".to_string(),
            _ => format!("Fetching latest data for {}...", cycle.selection.ticker),
        };
        self.log.push(LogKind::Info, message);

        self.issue(cycle);
        self.publish();
        RefreshOutcome::Started
    }

    /// Spawn one fetch task per feed for a cycle
    fn issue(&self, cycle: Cycle) {
        debug!(
            "Issuing fetches for {} (generation {}, {:?})",
            cycle.selection, cycle.generation, cycle.trigger
        );

        // Headlines are fetched alongside sentiment, so this cycle analyzes
        // the previous cycle's batch for the same selection
        let text = sentiment_text(
            &cycle.selection,
            self.view.headlines.value().map(Vec::as_slice),
        );

        for feed in Feed::ALL {
            let source = Arc::clone(&self.source);
            let events_tx = self.events_tx.clone();
            let selection = cycle.selection.clone();
            let generation = cycle.generation;
            let page_size = self.settings.page_size;
            let text = text.clone();

            tokio::spawn(async move {
                let outcome = match feed {
                    Feed::Price => FeedOutcome::Price(source.fetch_price(&selection).await),
                    Feed::Sentiment => {
                        FeedOutcome::Sentiment(source.fetch_sentiment(&selection, &text).await)
                    }
                    Feed::Headlines => FeedOutcome::Headlines(
                        source.fetch_headlines(&selection, 1, page_size).await,
                    ),
                    Feed::History => FeedOutcome::History(source.fetch_history(&selection).await),
                };

                let event = Event::Feed {
                    generation,
                    selection,
                    outcome,
                };
                if events_tx.send(event).await.is_err() {
                    debug!("Dashboard gone, dropping {} result", feed);
                }
            });
        }
    }

    /// Apply a feed result if it belongs to the current generation
    fn apply_feed(&mut self, generation: u64, selection: &Selection, outcome: FeedOutcome) {
        let feed = outcome.feed();

        let cycle_complete = match self.scheduler.accept(generation, feed) {
            Acceptance::Current { cycle_complete } => cycle_complete,
            Acceptance::Stale => {
                let stale = FeedError::Stale {
                    generation,
                    current: self.scheduler.generation(),
                };
                debug!("Discarding {} result for {}: {}", feed, selection.ticker, stale);
                return;
            }
        };

        let ticker = &selection.ticker;

        match outcome {
            FeedOutcome::Price(Ok(quote)) => {
                self.view.price.set(quote);
                self.log
                    .push(LogKind::Success, format!("Price data updated for {}", ticker));
            }
            FeedOutcome::Sentiment(Ok(sentiment)) => {
                self.view.sentiment.set(sentiment);
                self.log.push(
                    LogKind::Success,
                    format!("Sentiment analysis complete for {}", ticker),
                );
            }
            FeedOutcome::Headlines(Ok(headlines)) => {
                let count = headlines.len();
                self.view.headlines.set(headlines);
                self.log.push(
                    LogKind::Success,
                    format!("Headlines updated for {} ({} items)", ticker, count),
                );
            }
            FeedOutcome::History(Ok(points)) => {
                let count = points.len();
                self.view.history.set(points);
                self.log.push(
                    LogKind::Success,
                    format!(
                        "Price history updated for {} ({}, {} points)",
                        ticker, selection.range, count
                    ),
                );
            }
            FeedOutcome::Price(Err(e)) => {
                self.view.price.fail(e.to_string());
                self.feed_failed(feed, ticker, &e);
            }
            FeedOutcome::Sentiment(Err(e)) => {
                self.view.sentiment.fail(e.to_string());
                self.feed_failed(feed, ticker, &e);
            }
            FeedOutcome::Headlines(Err(e)) => {
                self.view.headlines.fail(e.to_string());
                self.feed_failed(feed, ticker, &e);
            }
            FeedOutcome::History(Err(e)) => {
                self.view.history.fail(e.to_string());
                self.feed_failed(feed, ticker, &e);
            }
        }

        if cycle_complete {
            self.view.last_update = Some(Utc::now());
            info!("Refresh complete for {}", selection);
        }

        self.publish();
    }

    fn feed_failed(&mut self, feed: Feed, ticker: &str, err: &FeedError) {
        warn!("Failed to fetch {} for {}: {}", feed, ticker, err);
        self.log.push(
            LogKind::Error,
            format!("Failed to fetch {} for {}: {}", feed, ticker, err),
        );
    }

    fn open_headlines(&mut self, ticker: String) {
        self.view_epoch += 1;

        let current = self.scheduler.selection();
        let initial = if current.ticker == ticker {
            self.view.headlines.value().cloned().unwrap_or_default()
        } else {
            Vec::new()
        };

        let selection = Selection {
            market: current.market,
            ticker,
            range: current.range,
        };

        debug!(
            "Headlines view opened for {} with {} items",
            selection.ticker,
            initial.len()
        );

        self.cursor = Some(PaginationCursor::open(
            self.view_epoch,
            selection,
            initial,
            self.settings.page_size,
        ));
        self.publish();
    }

    /// Issue the next page request if the cursor allows it
    fn load_more(&mut self) -> bool {
        let Some(cursor) = self.cursor.as_mut() else {
            return false;
        };
        let Some(request) = cursor.begin_load() else {
            return false;
        };

        let source = Arc::clone(&self.source);
        let events_tx = self.events_tx.clone();
        let selection = cursor.selection().clone();
        let page_size = cursor.page_size();

        debug!("Loading headlines page {} for {}", request.page, selection.ticker);

        tokio::spawn(async move {
            let result = source
                .fetch_headlines(&selection, request.page, page_size)
                .await;
            if events_tx.send(Event::Page { request, result }).await.is_err() {
                debug!("Dashboard gone, dropping headlines page {}", request.page);
            }
        });

        self.publish();
        true
    }

    fn apply_page(&mut self, request: PageRequest, result: Result<Vec<Headline>, FeedError>) {
        let Some(cursor) = self.cursor.as_mut() else {
            debug!("Headlines view closed, dropping page {}", request.page);
            return;
        };

        let ticker = cursor.selection().ticker.clone();

        match cursor.complete(request, result) {
            PageOutcome::Appended(count) => {
                self.log.push(
                    LogKind::Success,
                    format!("Loaded {} more headlines for {}", count, ticker),
                );
            }
            PageOutcome::Exhausted => {
                self.log
                    .push(LogKind::Info, format!("No more headlines for {}", ticker));
            }
            PageOutcome::Failed(e) => {
                warn!("Failed to load headlines page {} for {}: {}", request.page, ticker, e);
                self.log.push(
                    LogKind::Error,
                    format!("Failed to load more headlines for {}: {}", ticker, e),
                );
            }
            PageOutcome::Discarded => {
                debug!("Discarding headlines page {} from a previous view", request.page);
                return;
            }
        }

        self.publish();
    }

    fn publish(&mut self) {
        self.view.scheduler = self.scheduler.state();
        self.view.activity = self.log.to_vec();
        self.view.headlines_view = self.cursor.as_ref().map(|c| c.view());
        self.state_tx.send_replace(self.view.clone());
    }

    fn teardown(&mut self) {
        self.scheduler.teardown();
        self.cursor = None;
        self.cancel.cancel();
        info!("Dashboard stopped at generation {}", self.scheduler.generation());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::scripted::ScriptedSource;
    use crate::models::FeedSlice;
    use crate::workers::poll_scheduler::SchedulerState;

    const WAIT: Duration = Duration::from_secs(5);

    fn start(source: &Arc<ScriptedSource>, ticker: &str) -> (DashboardHandle, JoinHandle<()>) {
        let selection = Selection::new(Market::Global, ticker, Range::OneMonth).unwrap();
        Dashboard::spawn(Arc::clone(source), selection, DashboardSettings::default())
    }

    async fn settle(handle: &DashboardHandle, pred: impl FnMut(&ViewState) -> bool) -> ViewState {
        let mut state_rx = handle.state();
        let state = time::timeout(WAIT, state_rx.wait_for(pred))
            .await
            .expect("timed out waiting for dashboard state")
            .expect("dashboard closed");
        state.clone()
    }

    async fn idle(handle: &DashboardHandle, generation: u64) -> ViewState {
        settle(handle, |s| {
            s.generation == generation && s.scheduler == SchedulerState::Idle && s.last_update.is_some()
        })
        .await
    }

    async fn wait_for_calls(source: &ScriptedSource, count: usize) {
        time::timeout(WAIT, async {
            while source.calls().len() < count {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for requests");
    }

    fn messages(state: &ViewState) -> Vec<String> {
        state
            .activity
            .iter()
            .map(|e| e.message().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_initial_cycle_fills_every_slice() {
        let source = Arc::new(ScriptedSource::new());
        source.set_page_size(1, 3);
        let (handle, _task) = start(&source, "aapl");

        let state = idle(&handle, 1).await;

        assert_eq!(
            state.price.value().and_then(|q| q.price),
            Some(ScriptedSource::price_of("AAPL"))
        );
        assert!(state.sentiment.is_ready());
        assert_eq!(state.headlines.value().map(Vec::len), Some(3));
        assert_eq!(state.history.value().unwrap()[0].time, "AAPL");

        let log = messages(&state);
        assert_eq!(log.len(), 5);
        assert_eq!(log[0], "Fetching latest data for AAPL...");
        assert!(log.contains(&"Price data updated for AAPL".to_string()));
        assert!(log.contains(&"Headlines updated for AAPL (3 items)".to_string()));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_failing_feed_does_not_block_siblings() {
        let source = Arc::new(ScriptedSource::new());
        source.fail(Feed::Sentiment);
        let (handle, _task) = start(&source, "MSFT");

        let state = idle(&handle, 1).await;

        assert!(state.price.is_ready());
        assert!(state.headlines.is_ready());
        assert!(state.history.is_ready());
        assert!(matches!(state.sentiment, FeedSlice::Unavailable { .. }));

        let errors: Vec<_> = state
            .activity
            .iter()
            .filter(|e| e.kind() == LogKind::Error)
            .map(|e| e.message().to_string())
            .collect();
        assert_eq!(
            errors,
            vec!["Failed to fetch sentiment for MSFT: network failure: sentiment feed unreachable"]
        );

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_failure_keeps_last_known_good_value() {
        let source = Arc::new(ScriptedSource::new());
        let (handle, _task) = start(&source, "TSLA");
        let first = idle(&handle, 1).await;
        let first_price = first.price.value().cloned().unwrap();

        source.fail(Feed::Price);
        assert_eq!(handle.refresh().await.unwrap(), RefreshOutcome::Started);
        let state = settle(&handle, |s| {
            s.scheduler == SchedulerState::Idle
                && s.activity.iter().any(|e| e.kind() == LogKind::Error)
        })
        .await;

        assert_eq!(state.price.value(), Some(&first_price));
        assert_eq!(source.count(Feed::Price), 2);

        source.recover(Feed::Price);
        assert_eq!(handle.refresh().await.unwrap(), RefreshOutcome::Started);
        settle(&handle, |s| {
            s.scheduler == SchedulerState::Idle
                && s.activity
                    .last()
                    .map_or(false, |e| e.kind() == LogKind::Success)
        })
        .await;
        assert_eq!(source.count(Feed::Price), 3);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_selection_change_discards_stale_responses() {
        let source = Arc::new(ScriptedSource::new());
        source.set_page_size(1, 2);
        source.hold();
        let (handle, _task) = start(&source, "AAPL");
        wait_for_calls(&source, 4).await;

        handle
            .set_selection(Market::Global, "msft", Range::OneYear)
            .await
            .unwrap();
        wait_for_calls(&source, 8).await;

        let pending = handle.snapshot();
        assert_eq!(pending.generation, 2);
        assert!(pending.price.is_pending());

        source.release();
        idle(&handle, 2).await;
        // Let the superseded responses drain through the loop as well
        time::sleep(Duration::from_millis(50)).await;
        let state = handle.snapshot();

        assert_eq!(state.selection.ticker, "MSFT");
        assert_eq!(
            state.price.value().and_then(|q| q.price),
            Some(ScriptedSource::price_of("MSFT"))
        );
        assert!(state
            .headlines
            .value()
            .unwrap()
            .iter()
            .all(|h| h.title.starts_with("MSFT")));
        assert_eq!(state.history.value().unwrap()[0].time, "MSFT");
        assert!(!messages(&state).iter().any(|m| m.contains("updated for AAPL")));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_manual_refresh_while_in_flight_is_coalesced() {
        let source = Arc::new(ScriptedSource::new());
        source.hold();
        let (handle, _task) = start(&source, "GOOGL");
        wait_for_calls(&source, 4).await;

        assert_eq!(handle.refresh().await.unwrap(), RefreshOutcome::AlreadyInFlight);
        assert_eq!(handle.refresh().await.unwrap(), RefreshOutcome::AlreadyInFlight);

        source.release();
        idle(&handle, 1).await;

        for feed in Feed::ALL {
            assert_eq!(source.count(feed), 1, "{} fetched more than once", feed);
        }

        assert_eq!(handle.refresh().await.unwrap(), RefreshOutcome::Started);
        let state = idle(&handle, 1).await;
        assert_eq!(source.count(Feed::Price), 2);
        assert!(messages(&state).contains(&"Manual refresh triggered".to_string()));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_load_more_pages_through_headlines() {
        let source = Arc::new(ScriptedSource::new());
        source.set_page_size(1, 10);
        source.set_page_size(2, 4);
        let (handle, _task) = start(&source, "AMZN");
        idle(&handle, 1).await;

        handle.open_headlines("amzn").await.unwrap();
        let opened = handle.snapshot().headlines_view.unwrap();
        assert_eq!(opened.items.len(), 10);
        assert!(opened.has_more);

        source.hold();
        assert!(handle.load_more_headlines().await.unwrap());
        assert!(!handle.load_more_headlines().await.unwrap());
        assert!(handle.snapshot().headlines_view.unwrap().is_loading);
        source.release();

        let state = settle(&handle, |s| {
            s.headlines_view
                .as_ref()
                .map_or(false, |v| !v.is_loading && v.items.len() == 14)
        })
        .await;
        let view = state.headlines_view.unwrap();
        assert!(!view.has_more);
        assert_eq!(view.page, 2);

        assert!(!handle.load_more_headlines().await.unwrap());
        let page_two = source
            .calls()
            .into_iter()
            .filter(|c| c.page == Some(2))
            .count();
        assert_eq!(page_two, 1);

        handle.close_headlines().await.unwrap();
        assert!(handle.snapshot().headlines_view.is_none());

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_empty_page_ends_pagination() {
        let source = Arc::new(ScriptedSource::new());
        source.set_page_size(1, 10);
        let (handle, _task) = start(&source, "AMZN");
        idle(&handle, 1).await;

        handle.open_headlines("AMZN").await.unwrap();
        assert!(handle.load_more_headlines().await.unwrap());

        let state = settle(&handle, |s| {
            s.headlines_view
                .as_ref()
                .map_or(false, |v| !v.is_loading && !v.has_more)
        })
        .await;
        let view = state.headlines_view.as_ref().unwrap();
        assert_eq!(view.items.len(), 10);
        assert_eq!(view.page, 1);
        assert!(messages(&state).contains(&"No more headlines for AMZN".to_string()));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_open_for_other_ticker_starts_empty() {
        let source = Arc::new(ScriptedSource::new());
        source.set_page_size(1, 10);
        let (handle, _task) = start(&source, "AAPL");
        idle(&handle, 1).await;

        handle.open_headlines("TSLA").await.unwrap();
        let view = handle.snapshot().headlines_view.unwrap();
        assert_eq!(view.ticker, "TSLA");
        assert!(view.items.is_empty());
        assert!(!view.has_more);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_timer_triggers_refresh() {
        let source = Arc::new(ScriptedSource::new());
        let selection = Selection::for_market(Market::Domestic);
        let settings = DashboardSettings {
            poll_interval: Duration::from_millis(100),
            ..DashboardSettings::default()
        };
        let (handle, _task) = Dashboard::spawn(Arc::clone(&source), selection, settings);

        time::timeout(WAIT, async {
            while source.count(Feed::History) < 3 {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timer never fired");

        let state = idle(&handle, 1).await;
        assert_eq!(state.generation, 1);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let source = Arc::new(ScriptedSource::new());
        let (handle, task) = start(&source, "AAPL");
        idle(&handle, 1).await;

        handle.shutdown();
        time::timeout(WAIT, task).await.unwrap().unwrap();

        assert!(handle.is_closed());
        assert_eq!(handle.refresh().await, Err(DashboardError::Closed));
        assert_eq!(handle.load_more_headlines().await, Err(DashboardError::Closed));
    }

    #[tokio::test]
    async fn test_sentiment_analyzes_latest_headlines() {
        let source = Arc::new(ScriptedSource::new());
        source.set_page_size(1, 3);
        let (handle, _task) = start(&source, "AAPL");
        idle(&handle, 1).await;

        assert_eq!(handle.refresh().await.unwrap(), RefreshOutcome::Started);
        idle(&handle, 1).await;

        handle
            .set_selection(Market::Global, "MSFT", Range::OneMonth)
            .await
            .unwrap();
        idle(&handle, 2).await;

        assert_eq!(
            source.sentiment_texts(),
            vec![
                "Latest market news for AAPL".to_string(),
                "AAPL page 1 story 0 AAPL page 1 story 1 AAPL page 1 story 2".to_string(),
                "Latest market news for MSFT".to_string(),
            ]
        );

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_page_for_closed_view_is_dropped() {
        let source = Arc::new(ScriptedSource::new());
        source.set_page_size(1, 10);
        source.set_page_size(2, 10);
        let (handle, _task) = start(&source, "AMZN");
        idle(&handle, 1).await;

        handle.open_headlines("AMZN").await.unwrap();
        source.hold();
        assert!(handle.load_more_headlines().await.unwrap());
        wait_for_calls(&source, 5).await;

        handle.close_headlines().await.unwrap();
        source.release();
        // Let the page response drain through the loop
        time::sleep(Duration::from_millis(50)).await;

        let state = handle.snapshot();
        assert!(state.headlines_view.is_none());
        assert!(!messages(&state).iter().any(|m| m.starts_with("Loaded")));
        assert!(!handle.load_more_headlines().await.unwrap());

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_no_state_written_after_shutdown() {
        let source = Arc::new(ScriptedSource::new());
        source.set_page_size(1, 10);
        source.hold();
        let (handle, task) = start(&source, "NFLX");
        wait_for_calls(&source, 4).await;

        let before = handle.snapshot();
        assert_eq!(before.scheduler, SchedulerState::Fetching);

        handle.shutdown();
        time::timeout(WAIT, task).await.unwrap().unwrap();

        source.release();
        time::sleep(Duration::from_millis(50)).await;

        let after = handle.snapshot();
        assert_eq!(after, before);
        assert!(after.price.is_pending());
        assert!(after.headlines.is_pending());
    }

    #[tokio::test]
    async fn test_zero_settings_fall_back_to_defaults() {
        let settings = DashboardSettings {
            poll_interval: Duration::ZERO,
            health_interval: Duration::ZERO,
            page_size: 0,
        }
        .normalized();
        assert_eq!(settings.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(settings.health_interval, DEFAULT_HEALTH_INTERVAL);
        assert_eq!(settings.page_size, DEFAULT_PAGE_SIZE);

        let source = Arc::new(ScriptedSource::new());
        let selection = Selection::for_market(Market::Global);
        let (handle, task) = Dashboard::spawn(
            Arc::clone(&source),
            selection,
            DashboardSettings {
                poll_interval: Duration::ZERO,
                health_interval: Duration::ZERO,
                page_size: 0,
            },
        );

        idle(&handle, 1).await;
        assert_eq!(handle.refresh().await.unwrap(), RefreshOutcome::Started);
        assert!(!task.is_finished());

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_selection_rejected_before_sending() {
        let source = Arc::new(ScriptedSource::new());
        let (handle, _task) = start(&source, "AAPL");

        let err = handle
            .set_selection(Market::Global, "  ", Range::OneWeek)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::InvalidSelection(_)));

        handle.shutdown();
    }
}
