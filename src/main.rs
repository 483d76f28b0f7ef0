use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_pulse::api::{BackendClient, RetryPolicy};
use market_pulse::config::Config;
use market_pulse::models::{display_number, LogEntry, Market, Range};
use market_pulse::state::ViewState;
use market_pulse::workers::{Dashboard, DashboardHandle, DashboardSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_pulse=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting market-pulse");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded (backend: {})", config.api_base_url);

    // Initialize API client
    let client = BackendClient::new(
        &config.api_base_url,
        Duration::from_secs(config.request_timeout),
        RetryPolicy {
            max_retries: config.request_retries,
            delay: Duration::from_millis(config.retry_delay_ms),
        },
    )?;
    info!("Backend client initialized");

    let (dashboard, dashboard_handle) = Dashboard::spawn(
        Arc::new(client),
        config.default_selection.clone(),
        DashboardSettings::from_config(&config),
    );

    let reporter_handle = tokio::spawn(report_changes(dashboard.clone()));
    let console_handle = tokio::spawn(run_console(dashboard.clone()));

    info!("Dashboard running, type 'help' for commands");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        result = console_handle => {
            if let Err(e) = result {
                error!("Console exited unexpectedly: {:?}", e);
            }
        }
        result = reporter_handle => {
            error!("State reporter exited unexpectedly: {:?}", result);
        }
    }

    dashboard.shutdown();
    if let Err(e) = dashboard_handle.await {
        error!("Dashboard task failed: {:?}", e);
    }

    info!("Shutting down market-pulse");
    Ok(())
}

/// Log new activity entries and health transitions as they happen
async fn report_changes(dashboard: DashboardHandle) {
    let mut state_rx = dashboard.state();
    let mut health_rx = dashboard.health();
    let mut last_seen: Option<LogEntry> = None;

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                for entry in unseen_entries(&state, last_seen.as_ref()) {
                    info!("{}", entry);
                }
                last_seen = state.activity.last().cloned();
            }
            changed = health_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *health_rx.borrow_and_update();
                info!("Backend status: {:?}", status);
            }
        }
    }
}

/// Entries appended after `last_seen`; all of them if it was evicted
fn unseen_entries<'a>(state: &'a ViewState, last_seen: Option<&LogEntry>) -> &'a [LogEntry] {
    let start = last_seen
        .and_then(|seen| state.activity.iter().rposition(|e| e == seen))
        .map(|pos| pos + 1)
        .unwrap_or(0);
    &state.activity[start..]
}

/// Read commands from stdin until EOF or `quit`
async fn run_console(dashboard: DashboardHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let argument = parts.next().unwrap_or_default();
        let current = dashboard.snapshot().selection;

        let result = match command {
            "refresh" => dashboard
                .refresh()
                .await
                .map(|outcome| info!("Refresh: {:?}", outcome)),
            "ticker" => {
                dashboard
                    .set_selection(current.market, argument, current.range)
                    .await
            }
            "market" => match argument.parse::<Market>() {
                Ok(market) => {
                    dashboard
                        .set_selection(market, market.default_ticker(), current.range)
                        .await
                }
                Err(e) => Err(e),
            },
            "range" => match argument.parse::<Range>() {
                Ok(range) => {
                    dashboard
                        .set_selection(current.market, &current.ticker, range)
                        .await
                }
                Err(e) => Err(e),
            },
            "open" => dashboard.open_headlines(&current.ticker).await,
            "more" => dashboard
                .load_more_headlines()
                .await
                .map(|issued| {
                    if !issued {
                        info!("Nothing more to load");
                    }
                }),
            "close" => dashboard.close_headlines().await,
            "status" => {
                print_status(&dashboard.snapshot());
                info!("Backend status: {:?}", dashboard.health_status());
                Ok(())
            }
            "quit" | "exit" => break,
            _ => {
                info!("Commands: refresh | ticker T | market indian|global | range 1W|1M|1Y|5Y|10Y | open | more | close | status | quit");
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("{}: {}", command, e);
        }
    }
}

fn print_status(state: &ViewState) {
    info!(
        "{} | generation {} | {:?}",
        state.selection, state.generation, state.scheduler
    );

    match state.price.value() {
        Some(quote) => info!("Price: {}", quote),
        None => info!("Price: unavailable"),
    }

    match state.sentiment.value() {
        Some(s) => info!(
            "Sentiment: {} (confidence {})",
            s.label,
            display_number(s.confidence)
        ),
        None => info!("Sentiment: unavailable"),
    }

    if let Some(headlines) = state.headlines.value() {
        for headline in headlines {
            info!("  [{}] {}", headline.sentiment, headline.title);
        }
    }

    if let Some(view) = &state.headlines_view {
        info!(
            "Headlines view: {} items, page {}, more: {}",
            view.items.len(),
            view.page,
            view.has_more
        );
    }
}
