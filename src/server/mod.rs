//! Read-only HTTP surface over the store.
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::AppError;
use crate::store::Store;

pub mod cache;
pub mod handlers;
pub mod types;

pub use cache::ResponseCache;

/// Forced-close deadline for in-flight requests during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
    pub cache: Arc<ResponseCache>,
}

impl<S: Store> AppState<S> {
    pub fn new(store: S, cache: ResponseCache) -> Self {
        Self {
            store,
            cache: Arc::new(cache),
        }
    }
}

/// Builds the router. GET-only routes; axum answers other methods with 405.
pub fn router<S: Store>(state: AppState<S>) -> Router {
    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/repos", get(handlers::repos::<S>))
        .route("/stats", get(handlers::stats::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the API until the token is cancelled, then shuts down gracefully
/// within the grace window.
pub async fn serve<S: Store>(
    state: AppState<S>,
    port: u16,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "api server listening");

    let shutdown = cancel.clone();
    let server = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .into_future();

    tokio::pin!(server);
    let forced_close = async {
        cancel.cancelled().await;
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    };

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::Transport(err.to_string()))?;
            info!("api server stopped");
            Ok(())
        }
        _ = forced_close => {
            warn!("grace window elapsed, closing remaining connections");
            Ok(())
        }
    }
}
