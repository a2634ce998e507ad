//! Configuration loading.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct EnvSource;

impl EnvSource {
    pub fn with_dotenv() -> Self {
        let _ = dotenvy::dotenv();
        Self
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub fetcher: FetcherConfig,
    pub ingest: IngestConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, AppError> {
        let source = EnvSource::with_dotenv();
        Self::from_source(&source)
    }

    /// Allows callers (e.g. tests) to inject a custom configuration source.
    pub fn from_source(source: &impl ConfigSource) -> Result<Self, AppError> {
        Ok(Self {
            server: ServerConfig::from_source(source)?,
            redis: RedisConfig::from_source(source)?,
            fetcher: FetcherConfig::from_source(source)?,
            ingest: IngestConfig::from_source(source)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub cache_max_age: Duration,
}

impl ServerConfig {
    const DEFAULT_PORT: u16 = 5000;
    const DEFAULT_CACHE_MAX_AGE_SECONDS: u64 = 30;

    fn from_source(source: &impl ConfigSource) -> Result<Self, AppError> {
        Ok(Self {
            port: parse_or(source, "PORT", Self::DEFAULT_PORT)?,
            cache_max_age: Duration::from_secs(parse_or(
                source,
                "REQUEST_MEM_CACHE_MAX_AGE_SECONDS",
                Self::DEFAULT_CACHE_MAX_AGE_SECONDS,
            )?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host_port: String,
    pub key_prefix: String,
}

impl RedisConfig {
    const DEFAULT_HOST_PORT: &'static str = "redis:6379";

    fn from_source(source: &impl ConfigSource) -> Result<Self, AppError> {
        Ok(Self {
            host_port: source
                .get("REDIS_HOSTPORT")
                .unwrap_or_else(|| Self::DEFAULT_HOST_PORT.to_string()),
            key_prefix: source.get("REDIS_PREFIX").unwrap_or_default(),
        })
    }
}

/// Which fetcher realization the worker runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherKind {
    Live,
    Mock,
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub kind: FetcherKind,
    pub api_base: String,
    pub fetch_timeout: Duration,
    pub mock: MockFetcherConfig,
}

impl FetcherConfig {
    const DEFAULT_API_BASE: &'static str = "https://api.github.com";
    const DEFAULT_FETCH_TIMEOUT_SECONDS: f64 = 4.0;

    fn from_source(source: &impl ConfigSource) -> Result<Self, AppError> {
        let kind = match source
            .get("USE_FETCHER")
            .unwrap_or_else(|| "mock".to_string())
            .to_lowercase()
            .as_str()
        {
            "live" => FetcherKind::Live,
            "mock" => FetcherKind::Mock,
            other => {
                return Err(AppError::Config(format!("unknown fetcher service: {other}")));
            }
        };

        let timeout_seconds: f64 = parse_or(
            source,
            "FETCH_TIMEOUT_SECONDS",
            Self::DEFAULT_FETCH_TIMEOUT_SECONDS,
        )?;

        Ok(Self {
            kind,
            api_base: source
                .get("GITHUB_API_BASE")
                .unwrap_or_else(|| Self::DEFAULT_API_BASE.to_string()),
            fetch_timeout: Duration::from_secs_f64(timeout_seconds),
            mock: MockFetcherConfig::from_source(source)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MockFetcherConfig {
    pub data_dir: PathBuf,
    pub avg_request_seconds: f64,
    pub rate_limit: usize,
    pub rate_limit_window: Duration,
}

impl MockFetcherConfig {
    const DEFAULT_DATA_DIR: &'static str = "mockdata";
    const DEFAULT_AVG_REQUEST_SECONDS: f64 = 2.5;
    const DEFAULT_RATE_LIMIT: usize = 20;
    const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

    fn from_source(source: &impl ConfigSource) -> Result<Self, AppError> {
        Ok(Self {
            data_dir: PathBuf::from(
                source
                    .get("MOCK_FETCHER_DATA_DIR")
                    .unwrap_or_else(|| Self::DEFAULT_DATA_DIR.to_string()),
            ),
            avg_request_seconds: parse_or(
                source,
                "MOCK_FETCHER_AVG_REQUEST_SECONDS",
                Self::DEFAULT_AVG_REQUEST_SECONDS,
            )?,
            rate_limit: parse_or(source, "MOCK_RATE_LIMIT", Self::DEFAULT_RATE_LIMIT)?,
            rate_limit_window: Duration::from_secs(parse_or(
                source,
                "MOCK_RATE_LIMIT_WINDOW_SECONDS",
                Self::DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
            )?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub sleepover: Duration,
    pub workers: usize,
}

impl IngestConfig {
    const DEFAULT_SLEEPOVER_SECONDS: u64 = 4;

    fn from_source(source: &impl ConfigSource) -> Result<Self, AppError> {
        Ok(Self {
            sleepover: Duration::from_secs(parse_or(
                source,
                "SLEEPOVER_DURATION_SECONDS",
                Self::DEFAULT_SLEEPOVER_SECONDS,
            )?),
            workers: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4),
        })
    }
}

/// Reads a key and parses it, falling back to the default when unset.
/// A value that is set but malformed is a configuration error.
fn parse_or<T: std::str::FromStr>(
    source: &impl ConfigSource,
    key: &str,
    default: T,
) -> Result<T, AppError> {
    match source.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("invalid value for {key}: {raw}"))),
    }
}
