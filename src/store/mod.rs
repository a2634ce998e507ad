//! Indexed repository store.
//!
//! Operations are atomic at single-key granularity; there are no multi-key
//! transactions. [`redis::RedisStore`] is the durable realization,
//! [`memory::MemoryStore`] backs tests and offline development with the same
//! operational contract.
use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{Languages, RepoItem};

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Cap on filtered listings, matching the snapshot size.
pub const LIST_LIMIT: usize = 100;

/// Cap on the number of language groups an aggregate returns.
pub const GROUP_LIMIT: usize = 1000;

/// Optional, conjunctive filters for [`Store::get_repo_list`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoFilters {
    /// Substring match on the repository name.
    pub name: Option<String>,
    /// Membership in the all-languages set (primary or breakdown).
    pub language: Option<String>,
    /// Substring match on the license name.
    pub license: Option<String>,
    /// Exact match on the fork permission flag.
    pub allow_forking: Option<bool>,
    /// True matches repos with at least one open issue, false exactly zero.
    pub has_open_issues: Option<bool>,
}

#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    /// Replaces the stored snapshot with `list`.
    ///
    /// Incoming items without a language breakdown inherit the breakdown of
    /// the stored item with the same id, then every id stored before and not
    /// in `list` is deleted. Upserts run before deletes so an interrupted
    /// replacement leaves a superset of the new snapshot, never a subset.
    async fn set_repo_list(&self, list: Vec<RepoItem>) -> Result<(), AppError>;

    /// Overwrites a repository's language breakdown and rebuilds its
    /// all-languages membership set. `NotFound` if the id is absent.
    async fn set_repo_item_languages(&self, id: i64, languages: Languages)
        -> Result<(), AppError>;

    /// Point lookup by id. `NotFound` if absent.
    async fn get_repo_item(&self, id: i64) -> Result<RepoItem, AppError>;

    /// Repositories satisfying all set filters, capped at [`LIST_LIMIT`].
    async fn get_repo_list(&self, filters: &RepoFilters) -> Result<Vec<RepoItem>, AppError>;

    /// Average fork count per repository, grouped by primary language.
    async fn get_avg_forks_by_language(
        &self,
    ) -> Result<std::collections::HashMap<String, f64>, AppError>;

    /// Average open-issue count, grouped by primary language.
    async fn get_avg_open_issues_by_language(
        &self,
    ) -> Result<std::collections::HashMap<String, f64>, AppError>;

    /// Average repository size, grouped by primary language.
    async fn get_avg_size_by_language(
        &self,
    ) -> Result<std::collections::HashMap<String, f64>, AppError>;

    /// Count of distinct repository names, grouped by primary language.
    async fn get_num_repos_by_language(
        &self,
    ) -> Result<std::collections::HashMap<String, i64>, AppError>;
}
