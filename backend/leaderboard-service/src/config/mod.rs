use resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub roster: Vec<String>,
    pub refresh: RefreshConfig,
    pub upstream: UpstreamConfig,
    pub storage: StorageConfig,
    pub warmer: WarmerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

/// Orchestrator budget for one refresh run
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum age of a cached record before it is refetched
    pub cache_ttl: Duration,
    /// Fetches dispatched concurrently per batch
    pub max_concurrent_requests: usize,
    /// Pause between consecutive batches
    pub batch_delay: Duration,
    /// Usernames fetched synchronously when nothing fresh is cached
    pub quick_fetch_count: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            max_concurrent_requests: 5,
            batch_delay: Duration::from_millis(1000),
            quick_fetch_count: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub graphql_url: String,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            graphql_url: default_graphql_url(),
            request_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
    Postgres,
}

impl std::str::FromStr for CacheBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis),
            "postgres" | "postgresql" => Ok(CacheBackend::Postgres),
            other => Err(AppError::Config(format!("unknown CACHE_BACKEND: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct WarmerConfig {
    pub enabled: bool,
    pub interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let roster = parse_roster(&std::env::var("LEADERBOARD_USERNAMES").unwrap_or_default());
        if roster.is_empty() {
            return Err(AppError::Config(
                "LEADERBOARD_USERNAMES must list at least one username".to_string(),
            ));
        }

        let storage = StorageConfig {
            backend: std::env::var("CACHE_BACKEND")
                .unwrap_or_else(|_| "memory".to_string())
                .parse()?,
            redis_url: std::env::var("REDIS_URL").ok(),
            database_url: std::env::var("DATABASE_URL").ok(),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10)?,
        };

        match storage.backend {
            CacheBackend::Redis if storage.redis_url.is_none() => {
                return Err(AppError::Config(
                    "REDIS_URL is required for the redis cache backend".to_string(),
                ));
            }
            CacheBackend::Postgres if storage.database_url.is_none() => {
                return Err(AppError::Config(
                    "DATABASE_URL is required for the postgres cache backend".to_string(),
                ));
            }
            _ => {}
        }

        let max_concurrent_requests: usize = env_parse("MAX_CONCURRENT_REQUESTS", 5)?;
        if max_concurrent_requests == 0 {
            return Err(AppError::Config(
                "MAX_CONCURRENT_REQUESTS must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                port: env_parse("APP_PORT", 8000)?,
            },
            roster,
            refresh: RefreshConfig {
                cache_ttl: Duration::from_secs(env_parse("CACHE_TTL_SECS", 3600)?),
                max_concurrent_requests,
                batch_delay: Duration::from_millis(env_parse("BATCH_DELAY_MS", 1000)?),
                quick_fetch_count: env_parse("QUICK_FETCH_COUNT", 3)?,
            },
            upstream: UpstreamConfig {
                graphql_url: std::env::var("UPSTREAM_GRAPHQL_URL")
                    .unwrap_or_else(|_| default_graphql_url()),
                request_timeout: Duration::from_secs(env_parse("FETCH_TIMEOUT_SECS", 10)?),
                retry: RetryConfig {
                    max_retries: env_parse("FETCH_MAX_RETRIES", 2)?,
                    attempt_delay: Duration::from_millis(env_parse("FETCH_RETRY_DELAY_MS", 500)?),
                    min_call_delay: Duration::from_millis(env_parse("FETCH_MIN_DELAY_MS", 100)?),
                },
            },
            storage,
            warmer: WarmerConfig {
                enabled: env_parse("CACHE_WARMER_ENABLED", false)?,
                interval: Duration::from_secs(env_parse("CACHE_WARMER_INTERVAL_SECS", 1800)?),
            },
        })
    }
}

/// Split a comma-separated roster, dropping blanks and duplicates but keeping order.
pub fn parse_roster(raw: &str) -> Vec<String> {
    let mut roster: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !roster.iter().any(|existing| existing == name) {
            roster.push(name.to_string());
        }
    }
    roster
}

fn env_parse<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("invalid {}: {}", key, e))),
        _ => Ok(default),
    }
}

fn default_graphql_url() -> String {
    "https://leetcode.com/graphql".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roster_keeps_order_and_drops_duplicates() {
        let roster = parse_roster(" alice, bob,,alice , carol ");
        assert_eq!(roster, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_parse_roster_empty() {
        assert!(parse_roster(" , ").is_empty());
    }

    #[test]
    fn test_cache_backend_from_str() {
        assert_eq!("Redis".parse::<CacheBackend>().unwrap(), CacheBackend::Redis);
        assert_eq!(
            "postgresql".parse::<CacheBackend>().unwrap(),
            CacheBackend::Postgres
        );
        assert!("sqlite".parse::<CacheBackend>().is_err());
    }

    #[test]
    fn test_refresh_defaults() {
        let config = RefreshConfig::default();
        assert_eq!(config.max_concurrent_requests, 5);
        assert_eq!(config.quick_fetch_count, 3);
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
    }
}
