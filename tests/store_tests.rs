//! Store contract tests against the in-memory realization: snapshot
//! replacement, language preservation, filters and aggregates.
use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use repo_mirror::error::AppError;
use repo_mirror::models::{Languages, RepoItem};
use repo_mirror::store::{MemoryStore, RepoFilters, Store};

fn sample_repo(id: i64) -> RepoItem {
    RepoItem {
        id,
        name: "2".to_string(),
        full_name: "3".to_string(),
        owner: "4".to_string(),
        html_url: "5".to_string(),
        description: "6".to_string(),
        languages_url: "7".to_string(),
        created_at: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap(),
        size: 8,
        language: "9".to_string(),
        languages: None,
        license_name: "10".to_string(),
        forks_count: 11,
        open_issues_count: 12,
        watchers_count: 13,
        allow_forking: false,
        has_issues: false,
        has_projects: false,
        has_downloads: false,
        has_wiki: false,
        has_pages: false,
        has_discussions: false,
    }
}

fn repo_with(id: i64, name: &str, language: &str, languages: Option<Languages>) -> RepoItem {
    RepoItem {
        name: name.to_string(),
        language: language.to_string(),
        languages,
        ..sample_repo(id)
    }
}

#[tokio::test]
async fn snapshot_then_languages_then_get_round_trips() {
    let store = MemoryStore::new();
    let item = sample_repo(1);

    store.set_repo_list(vec![item.clone()]).await.unwrap();
    assert_eq!(store.get_repo_item(1).await.unwrap(), item);

    let languages = Languages::from([("A".to_string(), 1), ("B".to_string(), 2)]);
    store.set_repo_item_languages(1, languages.clone()).await.unwrap();

    let stored = store.get_repo_item(1).await.unwrap();
    assert_eq!(stored.languages, Some(languages));

    let mut all = stored.all_languages();
    all.sort();
    assert_eq!(all, vec!["9".to_string(), "A".to_string(), "B".to_string()]);
}

#[tokio::test]
async fn snapshot_preserves_languages_across_refresh() {
    let store = MemoryStore::new();

    // First snapshot, then a successful language fetch.
    store.set_repo_list(vec![sample_repo(1)]).await.unwrap();
    let languages = Languages::from([("A".to_string(), 1), ("B".to_string(), 2)]);
    store.set_repo_item_languages(1, languages.clone()).await.unwrap();

    // The next snapshot arrives without language data, as snapshots do.
    store.set_repo_list(vec![sample_repo(1)]).await.unwrap();

    let stored = store.get_repo_item(1).await.unwrap();
    assert_eq!(stored.languages, Some(languages));
}

#[tokio::test]
async fn snapshot_replacement_deletes_absent_ids() {
    let store = MemoryStore::new();

    store.set_repo_list(vec![sample_repo(1)]).await.unwrap();
    store.set_repo_list(vec![sample_repo(2)]).await.unwrap();

    assert!(matches!(
        store.get_repo_item(1).await,
        Err(AppError::NotFound)
    ));
    assert!(store.get_repo_item(2).await.is_ok());
}

#[tokio::test]
async fn stored_ids_always_equal_latest_snapshot() {
    let store = MemoryStore::new();

    store
        .set_repo_list(vec![sample_repo(1), sample_repo(2), sample_repo(3)])
        .await
        .unwrap();
    store
        .set_repo_list(vec![sample_repo(2), sample_repo(4)])
        .await
        .unwrap();

    let ids: Vec<i64> = store
        .get_repo_list(&RepoFilters::default())
        .await
        .unwrap()
        .iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(ids, vec![2, 4]);
}

#[tokio::test]
async fn incoming_languages_win_over_preserved_ones() {
    let store = MemoryStore::new();

    store.set_repo_list(vec![sample_repo(1)]).await.unwrap();
    store
        .set_repo_item_languages(1, Languages::from([("A".to_string(), 1)]))
        .await
        .unwrap();

    let refreshed = Languages::from([("C".to_string(), 3)]);
    store
        .set_repo_list(vec![repo_with(1, "2", "9", Some(refreshed.clone()))])
        .await
        .unwrap();

    assert_eq!(store.get_repo_item(1).await.unwrap().languages, Some(refreshed));
}

#[tokio::test]
async fn languages_write_for_unknown_id_is_not_found() {
    let store = MemoryStore::new();
    let err = store
        .set_repo_item_languages(404, Languages::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test]
async fn language_filter_matches_primary_or_breakdown() {
    let store = MemoryStore::new();
    store
        .set_repo_list(vec![
            repo_with(1, "alpha", "Go", Some(Languages::new())),
            repo_with(
                2,
                "beta",
                "Rust",
                Some(Languages::from([("Go".to_string(), 100)])),
            ),
            repo_with(3, "gamma", "Python", None),
        ])
        .await
        .unwrap();

    let filters = RepoFilters {
        language: Some("go".to_string()),
        ..RepoFilters::default()
    };
    let ids: Vec<i64> = store
        .get_repo_list(&filters)
        .await
        .unwrap()
        .iter()
        .map(|item| item.id)
        .collect();

    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn filters_are_conjunctive() {
    let store = MemoryStore::new();

    let mut forkable = repo_with(1, "mirror-service", "Go", None);
    forkable.allow_forking = true;
    forkable.license_name = "MIT License".to_string();
    forkable.open_issues_count = 3;

    let mut locked = repo_with(2, "mirror-tool", "Go", None);
    locked.allow_forking = false;
    locked.license_name = "MIT License".to_string();
    locked.open_issues_count = 0;

    store.set_repo_list(vec![forkable, locked]).await.unwrap();

    let filters = RepoFilters {
        name: Some("mirror".to_string()),
        license: Some("mit".to_string()),
        allow_forking: Some(true),
        has_open_issues: Some(true),
        ..RepoFilters::default()
    };
    let ids: Vec<i64> = store
        .get_repo_list(&filters)
        .await
        .unwrap()
        .iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(ids, vec![1]);

    let none = RepoFilters {
        name: Some("mirror".to_string()),
        has_open_issues: Some(false),
        allow_forking: Some(true),
        ..RepoFilters::default()
    };
    assert!(store.get_repo_list(&none).await.unwrap().is_empty());
}

#[tokio::test]
async fn listing_is_capped_at_one_hundred() {
    let store = MemoryStore::new();
    let list: Vec<RepoItem> = (1..=150).map(sample_repo).collect();

    store.set_repo_list(list).await.unwrap();

    let listed = store.get_repo_list(&RepoFilters::default()).await.unwrap();
    assert_eq!(listed.len(), 100);
}

#[tokio::test]
async fn aggregates_group_by_primary_language() {
    let store = MemoryStore::new();

    let mut go_one = repo_with(1, "one", "Go", None);
    go_one.forks_count = 10;
    go_one.open_issues_count = 4;
    go_one.size = 100;

    let mut go_two = repo_with(2, "two", "Go", None);
    go_two.forks_count = 20;
    go_two.open_issues_count = 6;
    go_two.size = 300;

    let mut rust_one = repo_with(3, "three", "Rust", None);
    rust_one.forks_count = 30;
    rust_one.open_issues_count = 1;
    rust_one.size = 50;

    store
        .set_repo_list(vec![go_one, go_two, rust_one])
        .await
        .unwrap();

    let num = store.get_num_repos_by_language().await.unwrap();
    assert_eq!(
        num,
        HashMap::from([("Go".to_string(), 2), ("Rust".to_string(), 1)])
    );

    let forks = store.get_avg_forks_by_language().await.unwrap();
    assert_eq!(forks.get("Go"), Some(&15.0));
    assert_eq!(forks.get("Rust"), Some(&30.0));

    let issues = store.get_avg_open_issues_by_language().await.unwrap();
    assert_eq!(issues.get("Go"), Some(&5.0));

    let sizes = store.get_avg_size_by_language().await.unwrap();
    assert_eq!(sizes.get("Go"), Some(&200.0));
    assert_eq!(sizes.get("Rust"), Some(&50.0));
}

#[tokio::test]
async fn repo_count_collapses_shared_names_within_a_language() {
    let store = MemoryStore::new();

    store
        .set_repo_list(vec![
            repo_with(1, "dotfiles", "Shell", None),
            repo_with(2, "dotfiles", "Shell", None),
            repo_with(3, "dotfiles", "Vim Script", None),
        ])
        .await
        .unwrap();

    let num = store.get_num_repos_by_language().await.unwrap();
    assert_eq!(num.get("Shell"), Some(&1));
    assert_eq!(num.get("Vim Script"), Some(&1));
}

#[tokio::test]
async fn empty_store_yields_empty_aggregates() {
    let store = MemoryStore::new();

    assert!(store.get_num_repos_by_language().await.unwrap().is_empty());
    assert!(store.get_avg_forks_by_language().await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_primary_language_forms_its_own_group() {
    let store = MemoryStore::new();
    store
        .set_repo_list(vec![repo_with(1, "unlabeled", "", None)])
        .await
        .unwrap();

    let num = store.get_num_repos_by_language().await.unwrap();
    assert_eq!(num.get(""), Some(&1));
}
