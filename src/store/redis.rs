//! Redis store backed by RedisJSON documents and a RediSearch index.
//!
//! Each repository lives at `{prefix}repo:{id}` as a JSON document carrying
//! an `all_languages` array alongside the raw fields; `{prefix}idx:repo`
//! indexes the filterable fields so listing and GROUP BY aggregation run
//! inside Redis.
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{JsonAsyncCommands, Value};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RedisConfig;
use crate::error::AppError;
use crate::models::{Languages, RepoItem};
use crate::store::{RepoFilters, Store, GROUP_LIMIT, LIST_LIMIT};

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
}

/// Document shape stored in Redis. Mirrors [`RepoItem`] plus the derived
/// `all_languages` tag array the index filters on.
#[derive(Debug, Serialize, Deserialize)]
struct RepoDoc {
    id: i64,
    name: String,
    full_name: String,
    owner: String,
    html_url: String,
    description: String,
    languages_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    size: i64,
    language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    languages: Option<Languages>,
    license: String,
    forks_count: i64,
    open_issues_count: i64,
    watchers_count: i64,
    allow_forking: bool,
    has_issues: bool,
    has_projects: bool,
    has_downloads: bool,
    has_wiki: bool,
    has_pages: bool,
    has_discussions: bool,
    all_languages: Vec<String>,
}

impl From<RepoItem> for RepoDoc {
    fn from(item: RepoItem) -> Self {
        let all_languages = item.all_languages();
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
            languages: item.languages,
            license: item.license_name,
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
            all_languages,
        }
    }
}

impl RepoDoc {
    fn into_item(self) -> RepoItem {
        RepoItem {
            id: self.id,
            name: self.name,
            full_name: self.full_name,
            owner: self.owner,
            html_url: self.html_url,
            description: self.description,
            languages_url: self.languages_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
            size: self.size,
            language: self.language,
            languages: self.languages,
            license_name: self.license,
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

impl RedisStore {
    /// Connects, waits for the service to become reachable, verifies the
    /// connection with a ping and ensures the search index exists.
    pub async fn connect(config: &RedisConfig) -> Result<Self, AppError> {
        let client = redis::Client::open(format!("redis://{}/", config.host_port).as_str())
            .map_err(|err| AppError::Redis(format!("could not create redis client: {err}")))?;

        let mut conn = Self::wait_for_service(&client).await?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|err| AppError::Redis(format!("could not ping redis: {err}")))?;
        if pong != "PONG" {
            return Err(AppError::Redis(format!("unexpected ping reply: {pong}")));
        }

        let store = Self {
            conn,
            key_prefix: config.key_prefix.clone(),
        };
        store.create_index().await?;

        info!(host_port = %config.host_port, "connected to redis");
        Ok(store)
    }

    async fn wait_for_service(client: &redis::Client) -> Result<ConnectionManager, AppError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match ConnectionManager::new(client.clone()).await {
                Ok(conn) => return Ok(conn),
                Err(err) if attempt < CONNECT_ATTEMPTS => {
                    warn!(attempt, "redis not ready: {err}");
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
                Err(err) => {
                    return Err(AppError::Redis(format!("could not reach redis: {err}")));
                }
            }
        }
    }

    fn repo_key(&self, id: i64) -> String {
        format!("{}repo:{id}", self.key_prefix)
    }

    fn index_name(&self) -> String {
        format!("{}idx:repo", self.key_prefix)
    }

    async fn create_index(&self) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let result: Result<Value, redis::RedisError> = redis::cmd("FT.CREATE")
            .arg(self.index_name())
            .arg("ON")
            .arg("JSON")
            .arg("PREFIX")
            .arg(1)
            .arg(format!("{}repo:", self.key_prefix))
            .arg("SCHEMA")
            .arg("$.id")
            .arg("AS")
            .arg("id")
            .arg("NUMERIC")
            .arg("$.name")
            .arg("AS")
            .arg("name")
            .arg("TEXT")
            .arg("$.language")
            .arg("AS")
            .arg("language")
            .arg("TEXT")
            .arg("$.all_languages")
            .arg("AS")
            .arg("all_languages")
            .arg("TAG")
            .arg("$.license")
            .arg("AS")
            .arg("license")
            .arg("TEXT")
            .arg("$.size")
            .arg("AS")
            .arg("size")
            .arg("NUMERIC")
            .arg("$.watchers_count")
            .arg("AS")
            .arg("watchers_count")
            .arg("NUMERIC")
            .arg("$.forks_count")
            .arg("AS")
            .arg("forks_count")
            .arg("NUMERIC")
            .arg("$.allow_forking")
            .arg("AS")
            .arg("allow_forking")
            .arg("TAG")
            .arg("$.open_issues_count")
            .arg("AS")
            .arg("open_issues_count")
            .arg("NUMERIC")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.to_string().contains("Index already exists") => Ok(()),
            Err(err) => Err(AppError::Redis(format!("could not create index: {err}"))),
        }
    }

    async fn set_repo_item(&self, item: RepoItem) -> Result<(), AppError> {
        let key = self.repo_key(item.id);
        let doc = RepoDoc::from(item);

        let mut conn = self.conn.clone();
        conn.json_set::<_, _, _, ()>(key, "$", &doc)
            .await
            .map_err(|err| AppError::Redis(format!("could not store repo document: {err}")))?;

        Ok(())
    }

    /// Runs one GROUP BY primary-language aggregate and returns the raw
    /// per-group reducer output, keyed by language.
    async fn aggregate_by_language(
        &self,
        field: &str,
        reducer: &str,
    ) -> Result<HashMap<String, String>, AppError> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("FT.AGGREGATE")
            .arg(self.index_name())
            .arg("*")
            .arg("LOAD")
            .arg(1)
            .arg(field)
            .arg("GROUPBY")
            .arg(1)
            .arg("@language")
            .arg("REDUCE")
            .arg(reducer)
            .arg(1)
            .arg(field)
            .arg("AS")
            .arg("count")
            .arg("LIMIT")
            .arg(0)
            .arg(GROUP_LIMIT)
            .query_async(&mut conn)
            .await
            .map_err(|err| AppError::Redis(format!("aggregate query failed: {err}")))?;

        parse_aggregate_reply(reply)
    }

    async fn averages_by_language(&self, field: &str) -> Result<HashMap<String, f64>, AppError> {
        let raw = self.aggregate_by_language(field, "AVG").await?;
        Ok(raw
            .into_iter()
            .map(|(language, value)| (language, value.parse().unwrap_or(0.0)))
            .collect())
    }
}

/// Builds a RediSearch query string out of the optional filters.
fn build_query_from_filters(filters: &RepoFilters) -> String {
    let mut params = Vec::new();

    if let Some(name) = filters.name.as_deref().filter(|value| !value.is_empty()) {
        params.push(format!("@name: *{name}*"));
    }

    if let Some(language) = filters.language.as_deref().filter(|value| !value.is_empty()) {
        params.push(format!("@all_languages: {{*{language}*}}"));
    }

    if let Some(license) = filters.license.as_deref().filter(|value| !value.is_empty()) {
        params.push(format!("@license: *{license}*"));
    }

    if let Some(allow_forking) = filters.allow_forking {
        params.push(format!("@allow_forking:{{{allow_forking}}}"));
    }

    if let Some(has_open_issues) = filters.has_open_issues {
        if has_open_issues {
            params.push("@open_issues_count:[1 +inf]".to_string());
        } else {
            params.push("@open_issues_count:[0 0]".to_string());
        }
    }

    if params.is_empty() {
        "*".to_string()
    } else {
        params.join(" ")
    }
}

/// Decodes a `FT.SEARCH ... NOCONTENT` reply into the matching keys.
fn parse_search_keys(reply: Value) -> Result<Vec<String>, AppError> {
    let Value::Bulk(values) = reply else {
        return Err(AppError::Redis("unexpected search reply shape".to_string()));
    };

    // First element is the total count, the rest are document keys.
    Ok(values
        .into_iter()
        .skip(1)
        .filter_map(|value| value_as_string(&value))
        .collect())
}

/// Decodes an `FT.AGGREGATE` reply into `language -> reducer output`.
fn parse_aggregate_reply(reply: Value) -> Result<HashMap<String, String>, AppError> {
    let Value::Bulk(rows) = reply else {
        return Err(AppError::Redis("unexpected aggregate reply shape".to_string()));
    };

    let mut out = HashMap::new();
    for row in rows.into_iter().skip(1) {
        let Value::Bulk(fields) = row else { continue };

        let mut language = String::new();
        let mut count = None;

        let mut fields = fields.into_iter();
        while let (Some(key), Some(value)) = (fields.next(), fields.next()) {
            match value_as_string(&key).as_deref() {
                Some("language") => language = value_as_string(&value).unwrap_or_default(),
                Some("count") => count = value_as_string(&value),
                _ => {}
            }
        }

        if let Some(count) = count {
            out.insert(language, count);
        }
    }

    Ok(out)
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::Data(bytes) => String::from_utf8(bytes.clone()).ok(),
        Value::Status(status) => Some(status.clone()),
        Value::Int(number) => Some(number.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn set_repo_list(&self, list: Vec<RepoItem>) -> Result<(), AppError> {
        let existing = self.get_repo_list(&RepoFilters::default()).await?;
        let mut existing_by_id: HashMap<i64, RepoItem> = existing
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        // Upsert the incoming snapshot first; ids that were present before
        // and are not any more get deleted afterwards.
        for mut item in list {
            if item.languages.is_none() {
                if let Some(previous) = existing_by_id.get(&item.id) {
                    item.languages = previous.languages.clone();
                }
            }
            existing_by_id.remove(&item.id);
            self.set_repo_item(item).await?;
        }

        let mut conn = self.conn.clone();
        for id in existing_by_id.into_keys() {
            conn.json_del::<_, _, i64>(self.repo_key(id), "$")
                .await
                .map_err(|err| AppError::Redis(format!("could not delete repo document: {err}")))?;
        }

        Ok(())
    }

    async fn set_repo_item_languages(
        &self,
        id: i64,
        languages: Languages,
    ) -> Result<(), AppError> {
        let mut item = self.get_repo_item(id).await?;
        item.languages = Some(languages);
        // Rewriting the whole document keeps `languages` and the derived
        // `all_languages` tag in a single write.
        self.set_repo_item(item).await
    }

    async fn get_repo_item(&self, id: i64) -> Result<RepoItem, AppError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .json_get(self.repo_key(id), "$")
            .await
            .map_err(|err| AppError::Redis(format!("could not read repo document: {err}")))?;

        let raw = raw.ok_or(AppError::NotFound)?;
        let mut docs: Vec<RepoDoc> = serde_json::from_str(&raw)?;
        docs.pop().map(RepoDoc::into_item).ok_or(AppError::NotFound)
    }

    async fn get_repo_list(&self, filters: &RepoFilters) -> Result<Vec<RepoItem>, AppError> {
        let query = build_query_from_filters(filters);

        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("FT.SEARCH")
            .arg(self.index_name())
            .arg(&query)
            .arg("LIMIT")
            .arg(0)
            .arg(LIST_LIMIT)
            .arg("NOCONTENT")
            .query_async(&mut conn)
            .await
            .map_err(|err| AppError::Redis(format!("search query failed: {err}")))?;

        let keys = parse_search_keys(reply)?;

        let mut list = Vec::with_capacity(keys.len());
        for key in keys {
            let raw: Option<String> = conn
                .json_get(&key, "$")
                .await
                .map_err(|err| AppError::Redis(format!("could not read repo document: {err}")))?;

            // A key returned by the search may have been deleted since.
            let Some(raw) = raw else { continue };
            let mut docs: Vec<RepoDoc> = serde_json::from_str(&raw)?;
            if let Some(doc) = docs.pop() {
                list.push(doc.into_item());
            }
        }

        Ok(list)
    }

    async fn get_avg_forks_by_language(&self) -> Result<HashMap<String, f64>, AppError> {
        self.averages_by_language("@forks_count").await
    }

    async fn get_avg_open_issues_by_language(&self) -> Result<HashMap<String, f64>, AppError> {
        self.averages_by_language("@open_issues_count").await
    }

    async fn get_avg_size_by_language(&self) -> Result<HashMap<String, f64>, AppError> {
        self.averages_by_language("@size").await
    }

    async fn get_num_repos_by_language(&self) -> Result<HashMap<String, i64>, AppError> {
        let raw = self.aggregate_by_language("@name", "COUNT_DISTINCT").await?;
        Ok(raw
            .into_iter()
            .map(|(language, value)| (language, value.parse().unwrap_or(0)))
            .collect())
    }
}
