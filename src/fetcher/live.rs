//! Live fetcher backed by the GitHub REST API.
use chrono::{TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode};

use crate::config::FetcherConfig;
use crate::error::AppError;
use crate::fetcher::{Fetcher, RateLimitObserver, RepoListResponse};
use crate::models::{Languages, RepoItem};

const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Client for the GitHub REST API. Every response carries the rate-limit
/// headers; those observations feed the registered sink so the coordinator
/// can back off before the remote refuses us.
#[derive(Clone)]
pub struct LiveFetcher {
    http: Client,
    api_base: String,
    observer: RateLimitObserver,
}

impl LiveFetcher {
    /// Builds a new fetcher using the provided configuration.
    pub fn new(config: &FetcherConfig, observer: RateLimitObserver) -> Result<Self, AppError> {
        let http = Client::builder()
            .default_headers(Self::default_headers())
            .timeout(config.fetch_timeout)
            .build()
            .map_err(AppError::from)?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            observer,
        })
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("repo-mirror/0.1"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers
    }

    /// Issues a GET, reports the rate-limit headers, then maps the status:
    /// 403/429 mean the remote refused us for quota reasons, any other
    /// non-200 is a transport-level failure.
    async fn fetch(&self, url: &str) -> Result<Response, AppError> {
        let response = self.http.get(url).send().await.map_err(AppError::from)?;

        self.observe_rate_limit(response.headers());

        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => Err(AppError::RateLimited),
            status => Err(AppError::Transport(format!("unexpected status {status}"))),
        }
    }

    /// Reads `X-RateLimit-Remaining` and `X-RateLimit-Reset` (epoch seconds)
    /// and forwards them to the sink. Either header missing or malformed
    /// means no observation.
    fn observe_rate_limit(&self, headers: &HeaderMap) {
        let parse_header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<i64>().ok())
        };

        let remaining = parse_header(RATE_LIMIT_REMAINING_HEADER);
        let reset_at = parse_header(RATE_LIMIT_RESET_HEADER)
            .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single());

        if let (Some(remaining), Some(reset_at)) = (remaining, reset_at) {
            (self.observer)(remaining, reset_at);
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for LiveFetcher {
    async fn get_repo_list(&self) -> Result<Vec<RepoItem>, AppError> {
        let url = format!(
            "{}/search/repositories?q=type:public&per_page=100&sort=created&order=desc",
            self.api_base
        );

        let response = self.fetch(&url).await?;
        let parsed: RepoListResponse = response.json().await.map_err(AppError::from)?;

        Ok(parsed.items.into_iter().map(|item| item.into_item()).collect())
    }

    async fn get_repo_languages(&self, url: &str) -> Result<Languages, AppError> {
        let response = self.fetch(url).await?;
        let languages: Languages = response.json().await.map_err(AppError::from)?;

        Ok(languages)
    }
}
