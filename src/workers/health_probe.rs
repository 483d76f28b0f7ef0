use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::FeedSource;
use crate::error::FeedError;

/// Interval used when none (or zero) is given
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(5);

/// Backend liveness as shown in the footer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Loading,
    Online,
    Offline,
}

impl HealthStatus {
    pub fn from_check(result: &Result<(), FeedError>) -> Self {
        match result {
            Ok(()) => HealthStatus::Online,
            Err(_) => HealthStatus::Offline,
        }
    }
}

/// Worker that polls backend liveness, independent of the selection
pub struct HealthProbe<S: FeedSource> {
    source: Arc<S>,
    status_tx: watch::Sender<HealthStatus>,
    interval: Duration,
    cancel: CancellationToken,
}

impl<S: FeedSource> HealthProbe<S> {
    /// Create a new probe and the receiver its status is published on
    pub fn new(
        source: Arc<S>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<HealthStatus>) {
        let interval = if interval.is_zero() {
            warn!(
                "Zero health check interval, using {:?}",
                DEFAULT_HEALTH_INTERVAL
            );
            DEFAULT_HEALTH_INTERVAL
        } else {
            interval
        };

        let (status_tx, status_rx) = watch::channel(HealthStatus::Loading);
        (
            Self {
                source,
                status_tx,
                interval,
                cancel,
            },
            status_rx,
        )
    }

    /// Run the worker loop until cancelled
    pub async fn run(self) {
        info!("Health probe started (interval: {:?})", self.interval);

        // First tick completes immediately
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Health probe cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.check().await;
                }
            }
        }
    }

    /// Perform a single liveness check
    pub async fn check(&self) -> HealthStatus {
        let result = self.source.check_liveness().await;
        if let Err(e) = &result {
            debug!("Backend liveness check failed: {}", e);
        }

        let status = HealthStatus::from_check(&result);
        self.status_tx.send_if_modified(|current| {
            if *current != status {
                info!("Backend is now {:?}", status);
                *current = status;
                true
            } else {
                false
            }
        });

        status
    }
}
