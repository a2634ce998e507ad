//! In-memory store used by tests and offline development.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{Languages, RepoItem};
use crate::store::{RepoFilters, Store, GROUP_LIMIT, LIST_LIMIT};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    items: Arc<Mutex<HashMap<i64, RepoItem>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, RepoItem>> {
        self.items.lock().expect("memory store poisoned")
    }

    /// Averages `metric` over the repositories of each primary-language group.
    fn average_by_language(&self, metric: impl Fn(&RepoItem) -> i64) -> HashMap<String, f64> {
        let items = self.lock();

        let mut totals: HashMap<String, (i64, i64)> = HashMap::new();
        for item in items.values() {
            let entry = totals.entry(item.language.clone()).or_default();
            entry.0 += metric(item);
            entry.1 += 1;
        }

        totals
            .into_iter()
            .take(GROUP_LIMIT)
            .map(|(language, (sum, count))| (language, sum as f64 / count as f64))
            .collect()
    }
}

fn matches(item: &RepoItem, filters: &RepoFilters) -> bool {
    if let Some(name) = &filters.name {
        if !item.name.to_lowercase().contains(&name.to_lowercase()) {
            return false;
        }
    }

    if let Some(language) = &filters.language {
        let query = language.to_lowercase();
        let found = item
            .all_languages()
            .iter()
            .any(|lang| lang.to_lowercase().contains(&query));
        if !found {
            return false;
        }
    }

    if let Some(license) = &filters.license {
        if !item.license_name.to_lowercase().contains(&license.to_lowercase()) {
            return false;
        }
    }

    if let Some(allow_forking) = filters.allow_forking {
        if item.allow_forking != allow_forking {
            return false;
        }
    }

    if let Some(has_open_issues) = filters.has_open_issues {
        if has_open_issues != (item.open_issues_count >= 1) {
            return false;
        }
    }

    true
}

#[async_trait]
impl Store for MemoryStore {
    async fn set_repo_list(&self, list: Vec<RepoItem>) -> Result<(), AppError> {
        let mut items = self.lock();

        let mut stale: HashSet<i64> = items.keys().copied().collect();
        for mut item in list {
            if item.languages.is_none() {
                if let Some(existing) = items.get(&item.id) {
                    item.languages = existing.languages.clone();
                }
            }
            stale.remove(&item.id);
            items.insert(item.id, item);
        }

        for id in stale {
            items.remove(&id);
        }

        Ok(())
    }

    async fn set_repo_item_languages(
        &self,
        id: i64,
        languages: Languages,
    ) -> Result<(), AppError> {
        let mut items = self.lock();
        let item = items.get_mut(&id).ok_or(AppError::NotFound)?;
        item.languages = Some(languages);
        Ok(())
    }

    async fn get_repo_item(&self, id: i64) -> Result<RepoItem, AppError> {
        self.lock().get(&id).cloned().ok_or(AppError::NotFound)
    }

    async fn get_repo_list(&self, filters: &RepoFilters) -> Result<Vec<RepoItem>, AppError> {
        let items = self.lock();

        let mut list: Vec<RepoItem> = items
            .values()
            .filter(|item| matches(item, filters))
            .cloned()
            .collect();

        // Ordering within the cap is unspecified by the contract; sort by id
        // so callers and tests see deterministic results.
        list.sort_by_key(|item| item.id);
        list.truncate(LIST_LIMIT);

        Ok(list)
    }

    async fn get_avg_forks_by_language(&self) -> Result<HashMap<String, f64>, AppError> {
        Ok(self.average_by_language(|item| item.forks_count))
    }

    async fn get_avg_open_issues_by_language(&self) -> Result<HashMap<String, f64>, AppError> {
        Ok(self.average_by_language(|item| item.open_issues_count))
    }

    async fn get_avg_size_by_language(&self) -> Result<HashMap<String, f64>, AppError> {
        Ok(self.average_by_language(|item| item.size))
    }

    async fn get_num_repos_by_language(&self) -> Result<HashMap<String, i64>, AppError> {
        let items = self.lock();

        let mut names_by_language: HashMap<String, HashSet<&str>> = HashMap::new();
        for item in items.values() {
            names_by_language
                .entry(item.language.clone())
                .or_default()
                .insert(item.name.as_str());
        }

        Ok(names_by_language
            .into_iter()
            .take(GROUP_LIMIT)
            .map(|(language, names)| (language, names.len() as i64))
            .collect())
    }
}
