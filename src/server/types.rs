//! Wire types returned by the HTTP surface, decoupled from the domain
//! entities so the JSON contract stays stable.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{RepoItem, Stats};

#[derive(Debug, Clone, Serialize)]
pub struct RepoListBody {
    pub repositories: Vec<ApiRepoItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiRepoItem {
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
    pub languages: BTreeMap<String, ApiLanguage>,
    #[serde(rename = "license")]
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

#[derive(Debug, Clone, Serialize)]
pub struct ApiLanguage {
    pub bytes: i64,
}

impl From<RepoItem> for ApiRepoItem {
    fn from(item: RepoItem) -> Self {
        let languages = item
            .languages
            .unwrap_or_default()
            .into_iter()
            .map(|(language, bytes)| (language, ApiLanguage { bytes }))
            .collect();

        Self {
            id: item.id,
            name: item.name,
            full_name: item.full_name,
            owner: item.owner,
            html_url: item.html_url,
            description: item.description,
            languages_url: item.languages_url,
            created_at: item.created_at,
            updated_at: item.updated_at,
            size: item.size,
            language: item.language,
            languages,
            license_name: item.license_name,
            forks_count: item.forks_count,
            open_issues_count: item.open_issues_count,
            watchers_count: item.watchers_count,
            allow_forking: item.allow_forking,
            has_issues: item.has_issues,
            has_projects: item.has_projects,
            has_downloads: item.has_downloads,
            has_wiki: item.has_wiki,
            has_pages: item.has_pages,
            has_discussions: item.has_discussions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiStats {
    pub avg_num_forks_per_repo_by_language: BTreeMap<String, f64>,
    pub avg_num_open_issues_by_language: BTreeMap<String, f64>,
    pub avg_size_by_language: BTreeMap<String, f64>,
    pub num_repos_by_language: BTreeMap<String, i64>,
}

impl From<Stats> for ApiStats {
    fn from(stats: Stats) -> Self {
        Self {
            avg_num_forks_per_repo_by_language: stats.avg_forks_by_language.into_iter().collect(),
            avg_num_open_issues_by_language: stats
                .avg_open_issues_by_language
                .into_iter()
                .collect(),
            avg_size_by_language: stats.avg_size_by_language.into_iter().collect(),
            num_repos_by_language: stats.num_repos_by_language.into_iter().collect(),
        }
    }
}
