//! Request handlers for the read path.
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::AppError;
use crate::models::Stats;
use crate::server::cache::filter_fingerprint;
use crate::server::types::{ApiStats, RepoListBody};
use crate::server::AppState;
use crate::store::{RepoFilters, Store};

#[derive(Debug, Serialize)]
pub struct PingBody {
    pub status: &'static str,
}

pub async fn ping() -> Json<PingBody> {
    Json(PingBody { status: "pong" })
}

/// Raw query parameters of `/repos`. Everything is optional and arrives as
/// text; parsing decides what counts as "set".
#[derive(Debug, Default, Deserialize)]
pub struct RepoQuery {
    pub name: Option<String>,
    pub language: Option<String>,
    pub license: Option<String>,
    pub allow_forking: Option<String>,
    pub has_open_issues: Option<String>,
}

impl RepoQuery {
    pub fn into_filters(self) -> RepoFilters {
        RepoFilters {
            name: self.name.filter(|value| !value.is_empty()),
            language: self.language.filter(|value| !value.is_empty()),
            license: self.license.filter(|value| !value.is_empty()),
            allow_forking: self.allow_forking.as_deref().and_then(parse_bool_param),
            has_open_issues: self.has_open_issues.as_deref().and_then(parse_bool_param),
        }
    }
}

/// Canonical boolean spellings; anything else leaves the filter unset.
fn parse_bool_param(raw: &str) -> Option<bool> {
    const TRUE: &[&str] = &["1", "t", "true"];
    const FALSE: &[&str] = &["0", "f", "false"];

    if TRUE.iter().any(|value| raw.eq_ignore_ascii_case(value)) {
        Some(true)
    } else if FALSE.iter().any(|value| raw.eq_ignore_ascii_case(value)) {
        Some(false)
    } else {
        None
    }
}

pub async fn repos<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<RepoQuery>,
) -> Result<Json<RepoListBody>, StatusCode> {
    let filters = query.into_filters();
    let key = filter_fingerprint(&filters);

    if let Some(repositories) = state.cache.get_repos(&key) {
        return Ok(Json(RepoListBody { repositories }));
    }

    let list = state
        .store
        .get_repo_list(&filters)
        .await
        .map_err(internal_error)?;

    let repositories: Vec<_> = list.into_iter().map(Into::into).collect();
    state.cache.put_repos(key, repositories.clone());

    Ok(Json(RepoListBody { repositories }))
}

pub async fn stats<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<Json<ApiStats>, StatusCode> {
    if let Some(stats) = state.cache.get_stats() {
        return Ok(Json(stats));
    }

    let stats = ApiStats::from(collect_stats(&state.store).await.map_err(internal_error)?);
    state.cache.put_stats(stats.clone());

    Ok(Json(stats))
}

async fn collect_stats<S: Store>(store: &S) -> Result<Stats, AppError> {
    Ok(Stats {
        avg_forks_by_language: store.get_avg_forks_by_language().await?,
        avg_open_issues_by_language: store.get_avg_open_issues_by_language().await?,
        avg_size_by_language: store.get_avg_size_by_language().await?,
        num_repos_by_language: store.get_num_repos_by_language().await?,
    })
}

fn internal_error(err: AppError) -> StatusCode {
    error!("store query failed: {err}");
    StatusCode::INTERNAL_SERVER_ERROR
}
