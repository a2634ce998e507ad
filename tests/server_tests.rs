//! HTTP surface tests: endpoint shapes, method handling, query parsing and
//! the TTL-bulk response cache, driven through the router with oneshot calls.
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use repo_mirror::models::{Languages, RepoItem};
use repo_mirror::server::{router, AppState, ResponseCache};
use repo_mirror::store::{MemoryStore, Store};
use tower::util::ServiceExt;

fn sample_repo(id: i64, name: &str, language: &str) -> RepoItem {
    RepoItem {
        id,
        name: name.to_string(),
        full_name: format!("acme/{name}"),
        owner: "acme".to_string(),
        html_url: format!("https://github.com/acme/{name}"),
        description: "sample".to_string(),
        languages_url: format!("https://api.github.com/repos/acme/{name}/languages"),
        created_at: Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 2, 2, 12, 0, 0).unwrap(),
        size: 10,
        language: language.to_string(),
        languages: None,
        license_name: "MIT License".to_string(),
        forks_count: 10,
        open_issues_count: 1,
        watchers_count: 5,
        allow_forking: true,
        has_issues: true,
        has_projects: false,
        has_downloads: false,
        has_wiki: false,
        has_pages: false,
        has_discussions: false,
    }
}

fn app_with(store: MemoryStore, cache_max_age: Duration) -> Router {
    router(AppState::new(store, ResponseCache::new(cache_max_age)))
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn ping_pongs() {
    let app = app_with(MemoryStore::new(), Duration::from_secs(60));

    let (status, body) = get_json(&app, "/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"status": "pong"}));
}

#[tokio::test]
async fn non_get_methods_are_rejected() {
    let app = app_with(MemoryStore::new(), Duration::from_secs(60));

    for path in ["/ping", "/repos", "/stats"] {
        for method in [Method::POST, Method::PUT, Method::DELETE] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method.clone())
                        .uri(path)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(
                response.status(),
                StatusCode::METHOD_NOT_ALLOWED,
                "{method} {path}"
            );
        }
    }
}

#[tokio::test]
async fn repos_returns_the_wire_shape() {
    let store = MemoryStore::new();
    let mut repo = sample_repo(1, "mirror", "Go");
    repo.languages = Some(Languages::from([("Rust".to_string(), 2048)]));
    store.set_repo_list(vec![repo]).await.unwrap();

    let app = app_with(store, Duration::from_secs(60));
    let (status, body) = get_json(&app, "/repos").await;

    assert_eq!(status, StatusCode::OK);
    let repositories = body["repositories"].as_array().unwrap();
    assert_eq!(repositories.len(), 1);

    let item = &repositories[0];
    assert_eq!(item["id"], 1);
    assert_eq!(item["name"], "mirror");
    assert_eq!(item["owner"], "acme");
    assert_eq!(item["language"], "Go");
    assert_eq!(item["license"], "MIT License");
    assert_eq!(item["languages"]["Rust"]["bytes"], 2048);
    assert_eq!(item["created_at"], "2024-02-01T12:00:00Z");
    assert_eq!(item["allow_forking"], true);
}

#[tokio::test]
async fn unfetched_languages_serialize_as_an_empty_object() {
    let store = MemoryStore::new();
    store
        .set_repo_list(vec![sample_repo(1, "mirror", "Go")])
        .await
        .unwrap();

    let app = app_with(store, Duration::from_secs(60));
    let (status, body) = get_json(&app, "/repos").await;

    assert_eq!(status, StatusCode::OK);
    let item = &body["repositories"].as_array().unwrap()[0];
    // The key is always present, even before any language fetch succeeds.
    assert_eq!(item["languages"], serde_json::json!({}));
}

#[tokio::test]
async fn repos_filters_by_primary_or_breakdown_language() {
    let store = MemoryStore::new();
    let mut breakdown_only = sample_repo(2, "beta", "Rust");
    breakdown_only.languages = Some(Languages::from([("Go".to_string(), 100)]));
    store
        .set_repo_list(vec![
            sample_repo(1, "alpha", "Go"),
            breakdown_only,
            sample_repo(3, "gamma", "Python"),
        ])
        .await
        .unwrap();

    let app = app_with(store, Duration::from_secs(60));
    let (status, body) = get_json(&app, "/repos?language=go").await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body["repositories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn unparseable_boolean_filters_are_ignored() {
    let store = MemoryStore::new();
    store
        .set_repo_list(vec![sample_repo(1, "alpha", "Go")])
        .await
        .unwrap();

    let app = app_with(store, Duration::from_secs(60));

    // allow_forking=banana is treated as unset, so the repo still matches.
    let (status, body) = get_json(&app, "/repos?allow_forking=banana&name=alpha").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["repositories"].as_array().unwrap().len(), 1);

    // A parseable false filters it out.
    let (_, body) = get_json(&app, "/repos?allow_forking=f&name=alpha").await;
    assert!(body["repositories"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn stats_returns_all_four_groupings() {
    let store = MemoryStore::new();
    let mut go_one = sample_repo(1, "one", "Go");
    go_one.forks_count = 10;
    let mut go_two = sample_repo(2, "two", "Go");
    go_two.forks_count = 20;
    let mut rust_one = sample_repo(3, "three", "Rust");
    rust_one.forks_count = 30;
    store
        .set_repo_list(vec![go_one, go_two, rust_one])
        .await
        .unwrap();

    let app = app_with(store, Duration::from_secs(60));
    let (status, body) = get_json(&app, "/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["num_repos_by_language"]["Go"], 2);
    assert_eq!(body["num_repos_by_language"]["Rust"], 1);
    assert_eq!(body["avg_num_forks_per_repo_by_language"]["Go"], 15.0);
    assert_eq!(body["avg_num_forks_per_repo_by_language"]["Rust"], 30.0);
    assert!(body["avg_num_open_issues_by_language"].is_object());
    assert!(body["avg_size_by_language"].is_object());
}

#[tokio::test]
async fn responses_are_memoized_within_the_ttl() {
    let store = MemoryStore::new();
    store
        .set_repo_list(vec![sample_repo(1, "alpha", "Go")])
        .await
        .unwrap();

    let app = app_with(store.clone(), Duration::from_secs(600));

    let (_, first) = get_json(&app, "/repos").await;
    let (_, stats_first) = get_json(&app, "/stats").await;

    // The store moves on, the cached responses do not.
    store
        .set_repo_list(vec![sample_repo(2, "beta", "Rust")])
        .await
        .unwrap();

    let (_, second) = get_json(&app, "/repos").await;
    let (_, stats_second) = get_json(&app, "/stats").await;
    assert_eq!(first, second);
    assert_eq!(stats_first, stats_second);

    // A different filter tuple is a different cache slot and sees new data.
    let (_, filtered) = get_json(&app, "/repos?language=rust").await;
    let ids: Vec<i64> = filtered["repositories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![2]);
}

#[tokio::test]
async fn expired_cache_serves_fresh_data() {
    let store = MemoryStore::new();
    store
        .set_repo_list(vec![sample_repo(1, "alpha", "Go")])
        .await
        .unwrap();

    let app = app_with(store.clone(), Duration::ZERO);

    let (_, first) = get_json(&app, "/repos").await;
    assert_eq!(first["repositories"].as_array().unwrap().len(), 1);

    store
        .set_repo_list(vec![sample_repo(2, "beta", "Rust"), sample_repo(3, "gamma", "C")])
        .await
        .unwrap();

    let (_, second) = get_json(&app, "/repos").await;
    assert_eq!(second["repositories"].as_array().unwrap().len(), 2);
}
