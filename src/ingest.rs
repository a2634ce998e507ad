//! Ingestion coordinator.
//!
//! Each pass mirrors the latest repository list into the store, then fans
//! per-repository language fetches out across a bounded worker pool. Every
//! remote call goes through [`IngestionCoordinator::retry_or_wait`], which
//! backs off on rate limits using the shared tracker and retries timeouts
//! on a small budget.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::IngestConfig;
use crate::error::AppError;
use crate::fetcher::Fetcher;
use crate::models::RepoItem;
use crate::store::Store;
use crate::tracker::RateLimitTracker;

/// Pause between passes.
const PASS_INTERVAL: Duration = Duration::from_secs(5);

/// Retry budget for timed-out requests within one job.
const TIMEOUT_RETRIES: u32 = 3;

/// Pause before retrying a timed-out request.
const TIMEOUT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// How long in-flight language tasks get to finish after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct IngestionCoordinator<F, S> {
    config: IngestConfig,
    fetcher: F,
    store: S,
    tracker: Arc<RateLimitTracker>,
    cancel: CancellationToken,
}

impl<F: Fetcher, S: Store> IngestionCoordinator<F, S> {
    pub fn new(
        config: IngestConfig,
        fetcher: F,
        store: S,
        tracker: Arc<RateLimitTracker>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            fetcher,
            store,
            tracker,
            cancel,
        }
    }

    /// Runs ingestion passes until cancelled or a fatal error occurs.
    ///
    /// Timeouts are a fact of life under load and only end the affected pass;
    /// anything else that survives the retry wrapper points at a store or
    /// protocol fault and stops the loop.
    pub async fn run(&self) -> Result<(), AppError> {
        info!("ingestion loop started");

        loop {
            match self.run_pass().await {
                Ok(()) => info!("pass complete"),
                Err(AppError::Timeout) => warn!("pass timed out, continuing"),
                Err(AppError::Cancelled) => break,
                Err(err) => {
                    error!("ingestion failed: {err}");
                    return Err(err);
                }
            }

            if self.wait_for(PASS_INTERVAL).await.is_err() {
                break;
            }
        }

        info!("ingestion loop stopped");
        Ok(())
    }

    /// One ingestion pass: snapshot the latest list, then fetch languages
    /// for every listed repository across the worker pool.
    pub async fn run_pass(&self) -> Result<(), AppError> {
        let list = self
            .retry_or_wait(|| async {
                let list = self.fetcher.get_repo_list().await.map_err(|err| {
                    log_fetch_error(&err, "repo list");
                    err
                })?;
                info!(count = list.len(), "fetched repository list");

                self.store.set_repo_list(list.clone()).await?;
                info!("stored repository list");
                Ok(list)
            })
            .await?;

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks: JoinSet<Result<(), AppError>> = JoinSet::new();

        for repo in list {
            if self.cancel.is_cancelled() {
                break;
            }
            let worker = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move { worker.language_task(repo, semaphore).await });
        }

        self.join_language_tasks(tasks).await
    }

    /// Fetches and stores the language breakdown for one repository.
    /// Holds a pool permit for the whole job; the permit is released on
    /// every exit path when it drops.
    async fn language_task(
        &self,
        repo: RepoItem,
        semaphore: Arc<Semaphore>,
    ) -> Result<(), AppError> {
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| AppError::Cancelled)?;

        self.retry_or_wait(|| async {
            let languages = self
                .fetcher
                .get_repo_languages(&repo.languages_url)
                .await
                .map_err(|err| {
                    log_fetch_error(&err, "languages");
                    err
                })?;
            info!(repo = %repo.name, "fetched languages");

            match self.store.set_repo_item_languages(repo.id, languages).await {
                // The repository was replaced by a newer snapshot while this
                // task was in flight; its languages no longer matter.
                Err(AppError::NotFound) => {
                    warn!(repo = %repo.name, "repository vanished during pass, dropping languages");
                    Ok(())
                }
                other => other,
            }
        })
        .await
    }

    /// Awaits every dispatched task. Timeouts are tolerated per task; the
    /// first fatal outcome is surfaced once all tasks have finished. After
    /// cancellation, stragglers get a grace window before being aborted.
    async fn join_language_tasks(
        &self,
        mut tasks: JoinSet<Result<(), AppError>>,
    ) -> Result<(), AppError> {
        let cancel = self.cancel.clone();
        let deadline = async {
            cancel.cancelled().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        };
        tokio::pin!(deadline);

        let mut fatal: Option<AppError> = None;
        let mut timeouts = 0usize;

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(AppError::Timeout))) => timeouts += 1,
                    Some(Ok(Err(AppError::Cancelled))) => {}
                    Some(Ok(Err(err))) => {
                        error!("language task failed: {err}");
                        fatal.get_or_insert(err);
                    }
                    Some(Err(join_err)) if join_err.is_panic() => {
                        error!("language task panicked: {join_err}");
                    }
                    Some(Err(_)) => {}
                },
                _ = &mut deadline => {
                    warn!("grace window elapsed, aborting remaining language tasks");
                    tasks.abort_all();
                    return Err(AppError::Cancelled);
                }
            }
        }

        if timeouts > 0 {
            warn!(timeouts, "language fetches timed out this pass");
        }

        match fatal {
            Some(err) => Err(err),
            None if self.cancel.is_cancelled() => Err(AppError::Cancelled),
            None => Ok(()),
        }
    }

    /// Rate-limit-aware retry wrapper.
    ///
    /// Gated on the shared tracker before the first attempt; afterwards,
    /// rate-limited attempts sleep until the remote's reset time plus the
    /// configured sleepover (unbounded), timed-out attempts burn the retry
    /// budget, and any other failure surfaces immediately.
    async fn retry_or_wait<T, Fut>(&self, job: impl Fn() -> Fut) -> Result<T, AppError>
    where
        Fut: Future<Output = Result<T, AppError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        if self.tracker.remaining() == 0 {
            self.wait_until(self.rate_limit_resume_time()).await?;
        }

        let mut retries = TIMEOUT_RETRIES;
        loop {
            match job().await {
                Ok(value) => return Ok(value),
                Err(AppError::RateLimited) => {
                    let resume = self.rate_limit_resume_time();
                    warn!(resume = %resume, "rate limited, sleeping until reset");
                    self.wait_until(resume).await?;
                }
                Err(AppError::Timeout) if retries > 0 => {
                    retries -= 1;
                    self.wait_for(TIMEOUT_RETRY_DELAY).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn rate_limit_resume_time(&self) -> DateTime<Utc> {
        self.tracker.reset_at()
            + chrono::Duration::from_std(self.config.sleepover)
                .unwrap_or_else(|_| chrono::Duration::zero())
    }

    async fn wait_until(&self, until: DateTime<Utc>) -> Result<(), AppError> {
        let delay = (until - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.wait_for(delay).await
    }

    /// Sleeps, waking immediately when the coordinator is cancelled.
    /// Cancellation wins when both are ready.
    async fn wait_for(&self, delay: Duration) -> Result<(), AppError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AppError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

fn log_fetch_error(err: &AppError, endpoint: &str) {
    match err {
        AppError::RateLimited => warn!(endpoint, "rate limit exceeded"),
        AppError::Timeout => warn!(endpoint, "request timed out"),
        _ => {}
    }
}
