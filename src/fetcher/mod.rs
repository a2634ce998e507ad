//! Pullers over the remote repository API.
//!
//! Two interchangeable realizations: [`live::LiveFetcher`] speaks to the real
//! GitHub REST API, [`mock::MockFetcher`] replays JSON fixtures from disk with
//! simulated latency and a simulated rate limit. Both report rate-limit
//! observations through the sink registered at construction.
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::{Languages, RepoItem};

pub mod limiter;
pub mod live;
pub mod mock;

pub use live::LiveFetcher;
pub use mock::MockFetcher;

/// Sink for `(remaining, reset_at)` pairs observed on API responses.
pub type RateLimitObserver = Arc<dyn Fn(i64, DateTime<Utc>) + Send + Sync>;

#[async_trait]
pub trait Fetcher: Clone + Send + Sync + 'static {
    /// Fetches the latest created public repositories, newest first,
    /// at most 100, without their language breakdowns.
    async fn get_repo_list(&self) -> Result<Vec<RepoItem>, AppError>;

    /// Fetches the language→bytes breakdown behind a repository's
    /// `languages_url`.
    async fn get_repo_languages(&self, url: &str) -> Result<Languages, AppError>;
}

// Wire types for the remote API payloads, shared by the live fetcher and the
// fixture files the mock fetcher replays.

#[derive(Debug, Deserialize)]
pub(crate) struct RepoListResponse {
    pub items: Vec<RepoJson>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepoJson {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: OwnerJson,
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    pub languages_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub license: Option<LicenseJson>,
    #[serde(default)]
    pub forks_count: i64,
    #[serde(default)]
    pub open_issues_count: i64,
    #[serde(default)]
    pub watchers_count: i64,
    #[serde(default)]
    pub allow_forking: bool,
    #[serde(default)]
    pub has_issues: bool,
    #[serde(default)]
    pub has_projects: bool,
    #[serde(default)]
    pub has_downloads: bool,
    #[serde(default)]
    pub has_wiki: bool,
    #[serde(default)]
    pub has_pages: bool,
    #[serde(default)]
    pub has_discussions: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OwnerJson {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LicenseJson {
    #[serde(default)]
    pub name: Option<String>,
}

impl RepoJson {
    /// Converts the wire representation into the domain entity.
    /// The language breakdown always starts out unfetched.
    pub fn into_item(self) -> RepoItem {
        RepoItem {
            id: self.id,
            name: self.name,
            full_name: self.full_name,
            owner: self.owner.login,
            html_url: self.html_url,
            description: self.description.unwrap_or_default(),
            languages_url: self.languages_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
            size: self.size,
            language: self.language.unwrap_or_default(),
            languages: None,
            license_name: self.license.and_then(|license| license.name).unwrap_or_default(),
            forks_count: self.forks_count,
            open_issues_count: self.open_issues_count,
            watchers_count: self.watchers_count,
            allow_forking: self.allow_forking,
            has_issues: self.has_issues,
            has_projects: self.has_projects,
            has_downloads: self.has_downloads,
            has_wiki: self.has_wiki,
            has_pages: self.has_pages,
            has_discussions: self.has_discussions,
        }
    }
}
