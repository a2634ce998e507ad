//! In-process response memoization for the read path.
//!
//! One slot per filter fingerprint for `/repos`, a single slot for `/stats`.
//! The whole cache is dropped in bulk once its age exceeds the configured
//! TTL; concurrent misses for the same key may do redundant store work,
//! which the contract allows.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::server::types::{ApiRepoItem, ApiStats};
use crate::store::RepoFilters;

#[derive(Debug)]
pub struct ResponseCache {
    max_age: Duration,
    inner: Mutex<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    repos: HashMap<String, Vec<ApiRepoItem>>,
    stats: Option<ApiStats>,
    last_reset: Instant,
}

impl ResponseCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            inner: Mutex::new(CacheInner {
                repos: HashMap::new(),
                stats: None,
                last_reset: Instant::now(),
            }),
        }
    }

    pub fn get_repos(&self, key: &str) -> Option<Vec<ApiRepoItem>> {
        let mut inner = self.lock();
        Self::expire(&mut inner, self.max_age);
        inner.repos.get(key).cloned()
    }

    pub fn put_repos(&self, key: String, items: Vec<ApiRepoItem>) {
        self.lock().repos.insert(key, items);
    }

    pub fn get_stats(&self) -> Option<ApiStats> {
        let mut inner = self.lock();
        Self::expire(&mut inner, self.max_age);
        inner.stats.clone()
    }

    pub fn put_stats(&self, stats: ApiStats) {
        self.lock().stats = Some(stats);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().expect("response cache poisoned")
    }

    fn expire(inner: &mut CacheInner, max_age: Duration) {
        if inner.last_reset.elapsed() >= max_age {
            inner.repos.clear();
            inner.stats = None;
            inner.last_reset = Instant::now();
        }
    }
}

/// Fingerprint of the filter tuple. Fields are joined with a unit separator
/// so adjacent values cannot alias each other.
pub fn filter_fingerprint(filters: &RepoFilters) -> String {
    let bool_part = |value: Option<bool>| match value {
        Some(true) => "1",
        Some(false) => "0",
        None => "",
    };

    [
        filters.name.as_deref().unwrap_or(""),
        filters.language.as_deref().unwrap_or(""),
        filters.license.as_deref().unwrap_or(""),
        bool_part(filters.allow_forking),
        bool_part(filters.has_open_issues),
    ]
    .join("\u{1f}")
}
