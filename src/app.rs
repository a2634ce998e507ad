//! Startup wiring: configuration, service construction, shutdown.
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppConfig, FetcherKind};
use crate::error::AppError;
use crate::fetcher::{Fetcher, LiveFetcher, MockFetcher, RateLimitObserver};
use crate::ingest::IngestionCoordinator;
use crate::server::{self, AppState, ResponseCache};
use crate::store::{RedisStore, Store};
use crate::tracker::RateLimitTracker;
use crate::AppResult;

pub async fn run() -> AppResult<()> {
    init_tracing();

    let config = AppConfig::load()?;
    info!(port = config.server.port, "starting repo-mirror");

    let cancel = CancellationToken::new();
    tokio::spawn(watch_shutdown_signals(cancel.clone()));

    let store = RedisStore::connect(&config.redis).await?;

    let tracker = Arc::new(RateLimitTracker::new());
    let observer: RateLimitObserver = {
        let tracker = tracker.clone();
        Arc::new(move |remaining, reset_at| tracker.set(remaining, reset_at))
    };

    match config.fetcher.kind {
        FetcherKind::Live => {
            info!(fetcher = "live", "configuring fetcher service");
            let fetcher = LiveFetcher::new(&config.fetcher, observer)?;
            run_services(config, store, fetcher, tracker, cancel).await
        }
        FetcherKind::Mock => {
            info!(fetcher = "mock", "configuring fetcher service");
            let fetcher = MockFetcher::new(
                &config.fetcher.mock,
                config.fetcher.fetch_timeout,
                observer,
            )?;
            run_services(config, store, fetcher, tracker, cancel).await
        }
    }
}

/// Runs the ingestion worker and the API server side by side until either
/// finishes; whichever exits first takes the other down with it.
async fn run_services<F: Fetcher, S: Store>(
    config: AppConfig,
    store: S,
    fetcher: F,
    tracker: Arc<RateLimitTracker>,
    cancel: CancellationToken,
) -> AppResult<()> {
    let coordinator = IngestionCoordinator::new(
        config.ingest.clone(),
        fetcher,
        store.clone(),
        tracker,
        cancel.clone(),
    );
    let state = AppState::new(store, ResponseCache::new(config.server.cache_max_age));

    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        let result = server::serve(state, config.server.port, server_cancel.clone()).await;
        server_cancel.cancel();
        result
    });

    let worker_cancel = cancel.clone();
    let worker = tokio::spawn(async move {
        let result = coordinator.run().await;
        worker_cancel.cancel();
        result
    });

    let (worker_result, server_result) = tokio::join!(worker, server);
    worker_result
        .map_err(|err| AppError::Transport(format!("ingestion task failed: {err}")))??;
    server_result.map_err(|err| AppError::Transport(format!("server task failed: {err}")))??;

    info!("shutdown complete");
    Ok(())
}

async fn watch_shutdown_signals(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }

    cancel.cancel();
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repo_mirror=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
