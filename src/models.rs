//! Domain entities shared by the fetcher, store and server layers.
use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Byte counts per language, as reported by the languages endpoint.
pub type Languages = HashMap<String, i64>;

/// A mirrored repository. Identity is `id`; every other field is descriptive.
///
/// `languages` is `None` until a language fetch has succeeded for this repo;
/// the snapshot-replacement rule in the store keeps the last fetched value
/// alive across refreshes.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoItem {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: String,
    pub html_url: String,
    pub description: String,
    pub languages_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub size: i64,
    pub language: String,
    pub languages: Option<Languages>,
    pub license_name: String,
    pub forks_count: i64,
    pub open_issues_count: i64,
    pub watchers_count: i64,
    pub allow_forking: bool,
    pub has_issues: bool,
    pub has_projects: bool,
    pub has_downloads: bool,
    pub has_wiki: bool,
    pub has_pages: bool,
    pub has_discussions: bool,
}

impl RepoItem {
    /// Union of the primary language (when non-empty) and the breakdown keys.
    /// This is the membership set the `language` filter matches against.
    pub fn all_languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self
            .languages
            .as_ref()
            .map(|languages| languages.keys().cloned().collect())
            .unwrap_or_default();
        if !self.language.is_empty() && !langs.contains(&self.language) {
            langs.push(self.language.clone());
        }
        langs
    }
}

/// Aggregate statistics grouped by primary language.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub avg_forks_by_language: HashMap<String, f64>,
    pub avg_open_issues_by_language: HashMap<String, f64>,
    pub avg_size_by_language: HashMap<String, f64>,
    pub num_repos_by_language: HashMap<String, i64>,
}
