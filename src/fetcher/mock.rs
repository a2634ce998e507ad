//! Mock fetcher replaying JSON fixtures from a data directory.
//!
//! Behaves like the live API from the coordinator's point of view: requests
//! take time, a sliding-window quota refuses bursts, and every response
//! reports the simulated rate limit through the observer sink.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::warn;

use crate::config::MockFetcherConfig;
use crate::error::AppError;
use crate::fetcher::limiter::SlidingWindowLimiter;
use crate::fetcher::{Fetcher, RateLimitObserver, RepoListResponse};
use crate::models::{Languages, RepoItem};

const LIST_FILE: &str = "list.json";
const RATE_LIMITED_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct MockFetcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MockFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFetcher")
            .field("data_dir", &self.inner.data_dir)
            .field("avg_request_seconds", &self.inner.avg_request_seconds)
            .field("fetch_timeout", &self.inner.fetch_timeout)
            .finish()
    }
}

struct Inner {
    data_dir: PathBuf,
    avg_request_seconds: f64,
    fetch_timeout: Duration,
    limiter: SlidingWindowLimiter,
    observer: RateLimitObserver,
    // Fixtures are read from disk once and replayed from memory after that.
    file_cache: Mutex<HashMap<PathBuf, Arc<Vec<u8>>>>,
}

impl MockFetcher {
    pub fn new(
        config: &MockFetcherConfig,
        fetch_timeout: Duration,
        observer: RateLimitObserver,
    ) -> Result<Self, AppError> {
        if !config.data_dir.is_dir() {
            return Err(AppError::Config(format!(
                "mock data directory does not exist: {}",
                config.data_dir.display()
            )));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                data_dir: config.data_dir.clone(),
                avg_request_seconds: config.avg_request_seconds,
                fetch_timeout,
                limiter: SlidingWindowLimiter::new(config.rate_limit, config.rate_limit_window),
                observer,
                file_cache: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// One simulated API call: consult the quota, report the observation,
    /// then serve the fixture after a random delay.
    async fn mock_api_request(&self, filename: &str) -> Result<Arc<Vec<u8>>, AppError> {
        let admitted = self.inner.limiter.check().is_ok();

        let (remaining, reset_at) = self.inner.limiter.snapshot();
        (self.inner.observer)(remaining, reset_at);

        if !admitted {
            // Refusals still cost a short round trip.
            tokio::time::sleep(RATE_LIMITED_DELAY).await;
            return Err(AppError::RateLimited);
        }

        let data = self.load_fixture(&self.inner.data_dir.join(filename))?;
        self.simulated_api_call(data).await
    }

    fn load_fixture(&self, path: &Path) -> Result<Arc<Vec<u8>>, AppError> {
        let mut cache = self.inner.file_cache.lock().expect("file cache poisoned");
        if let Some(data) = cache.get(path) {
            return Ok(data.clone());
        }

        let data = Arc::new(std::fs::read(path).map_err(|err| {
            warn!(path = %path.display(), "missing mock fixture");
            AppError::Io(err)
        })?);
        cache.insert(path.to_path_buf(), data.clone());
        Ok(data)
    }

    /// Sleeps uniformly in `[0, 2 * avg]`, bounded by the fetch timeout.
    async fn simulated_api_call(&self, data: Arc<Vec<u8>>) -> Result<Arc<Vec<u8>>, AppError> {
        let latency =
            Duration::from_secs_f64(rand::random::<f64>() * 2.0 * self.inner.avg_request_seconds);

        match tokio::time::timeout(self.inner.fetch_timeout, tokio::time::sleep(latency)).await {
            Ok(()) => Ok(data),
            Err(_) => Err(AppError::Timeout),
        }
    }
}

/// Maps a languages URL onto its fixture filename: the URL path with
/// slashes replaced by underscores, e.g.
/// `https://api.github.com/repos/acme/hello/languages` →
/// `repos_acme_hello_languages.json`.
fn fixture_filename(url: &str) -> String {
    let path = reqwest::Url::parse(url)
        .map(|parsed| parsed.path().to_string())
        .unwrap_or_else(|_| url.to_string());

    format!("{}.json", path.trim_start_matches('/').replace('/', "_"))
}

#[async_trait::async_trait]
impl Fetcher for MockFetcher {
    async fn get_repo_list(&self) -> Result<Vec<RepoItem>, AppError> {
        let data = self.mock_api_request(LIST_FILE).await?;
        let parsed: RepoListResponse = serde_json::from_slice(&data)?;

        Ok(parsed.items.into_iter().map(|item| item.into_item()).collect())
    }

    async fn get_repo_languages(&self, url: &str) -> Result<Languages, AppError> {
        let data = self.mock_api_request(&fixture_filename(url)).await?;
        let languages: Languages = serde_json::from_slice(&data)?;

        Ok(languages)
    }
}
