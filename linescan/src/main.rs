use std::sync::Arc;

use linescan_core::{
    AppConfig, HttpOddsFetcher, OddsCache, OddsService, RefreshCoordinator, RefreshStatus,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = AppConfig::load();
    if config.upstream.api_key.is_empty() {
        warn!(
            env = linescan_core::config::API_KEY_ENV,
            "no API key configured, every refresh will fail with invalid credentials"
        );
    }

    let client = match HttpOddsFetcher::build_client(&config.upstream) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            return;
        }
    };
    let fetcher = Arc::new(HttpOddsFetcher::new(client, &config.upstream));
    let cache = Arc::new(OddsCache::new(config.cache.clone()));
    let coordinator =
        RefreshCoordinator::new(fetcher.clone(), cache.clone(), config.refresh.clone());
    let service = OddsService::new(fetcher, cache, coordinator.tracker().clone());

    // Sports named on the command line are kept fresh alongside the list.
    for sport_key in std::env::args().skip(1) {
        match service.events(&sport_key).await {
            Ok(result) => info!(
                sport = %sport_key,
                events = result.data.len(),
                source = ?result.source,
                "loaded events"
            ),
            Err(e) => warn!(sport = %sport_key, error = %e, "initial events load failed"),
        }
    }

    let status_task = tokio::spawn(log_status(coordinator.subscribe()));

    coordinator.on_foreground().await;
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown requested");
    if let Err(e) = coordinator.shutdown().await {
        error!(error = %e, "background refresh did not shut down cleanly");
    }

    status_task.abort();
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn log_status(mut status_rx: watch::Receiver<RefreshStatus>) {
    while status_rx.changed().await.is_ok() {
        let status = status_rx.borrow_and_update().clone();
        if status.auto_stopped {
            warn!(
                failures = status.consecutive_failures,
                last_error = status.last_error.as_deref().unwrap_or("unknown"),
                "background refresh disabled until restart"
            );
        } else if status.is_refreshing {
            info!("refreshing");
        } else if let Some(at) = status.last_refresh_completed_at {
            info!(last_updated = %at.to_rfc3339(), phase = ?status.phase, "odds up to date");
        }
    }
}
