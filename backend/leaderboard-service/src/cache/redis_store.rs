use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{CacheError, CacheResult, FreshnessCache};
use crate::models::{CacheEntry, UserRecord};

/// Set of every username ever written
const INDEX_KEY: &str = "leaderboard:users";

/// Upsert that keeps `last_fetch_ms` monotonic per key.
///
/// KEYS[1] = record hash, KEYS[2] = index set
/// ARGV[1] = record JSON, ARGV[2] = now (ms), ARGV[3] = username
const UPSERT_SCRIPT: &str = r#"
    local existing = tonumber(redis.call('HGET', KEYS[1], 'last_fetch_ms') or '0')
    local incoming = tonumber(ARGV[2])
    if existing > incoming then
        incoming = existing
    end
    redis.call('HSET', KEYS[1], 'record', ARGV[1], 'last_fetch_ms', incoming)
    redis.call('SADD', KEYS[2], ARGV[3])
    return incoming
"#;

fn user_key(username: &str) -> String {
    format!("leaderboard:user:{}", username)
}

/// Redis-backed cache shared between service replicas
#[derive(Clone)]
pub struct RedisCache {
    client: Arc<ConnectionManager>,
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        Ok(Self {
            client: Arc::new(manager),
        })
    }

    fn connection(&self) -> ConnectionManager {
        self.client.as_ref().clone()
    }
}

fn decode_entry(key: &str, record: Option<String>, last_fetch_ms: Option<i64>) -> Option<CacheEntry> {
    let (json, ms) = match (record, last_fetch_ms) {
        (Some(json), Some(ms)) => (json, ms),
        _ => return None,
    };

    let record = match serde_json::from_str::<UserRecord>(&json) {
        Ok(record) => record,
        Err(e) => {
            warn!(key = %key, error = %e, "Skipping undecodable cache entry");
            return None;
        }
    };

    let last_fetch = DateTime::<Utc>::from_timestamp_millis(ms)?;
    Some(CacheEntry::new(record, last_fetch))
}

#[async_trait]
impl FreshnessCache for RedisCache {
    async fn get(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheEntry>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("HMGET")
                .arg(user_key(key))
                .arg("record")
                .arg("last_fetch_ms");
        }

        let rows: Vec<(Option<String>, Option<i64>)> = pipe
            .query_async(&mut self.connection())
            .await
            .map_err(|e| {
                warn!("Redis HMGET pipeline failed: {}", e);
                CacheError::from(e)
            })?;

        let found: HashMap<String, CacheEntry> = keys
            .iter()
            .zip(rows)
            .filter_map(|(key, (record, ms))| {
                decode_entry(key, record, ms).map(|entry| (key.clone(), entry))
            })
            .collect();

        debug!(requested = keys.len(), found = found.len(), "Redis cache lookup");
        Ok(found)
    }

    async fn put(&self, key: &str, record: UserRecord) -> CacheResult<CacheEntry> {
        let json = serde_json::to_string(&record)?;
        let now = Utc::now();

        let stored_ms: i64 = redis::Script::new(UPSERT_SCRIPT)
            .key(user_key(key))
            .key(INDEX_KEY)
            .arg(json)
            .arg(now.timestamp_millis())
            .arg(key)
            .invoke_async::<_, i64>(&mut self.connection())
            .await
            .map_err(|e| {
                warn!("Redis upsert failed for {}: {}", key, e);
                CacheError::from(e)
            })?;

        let last_fetch = DateTime::<Utc>::from_timestamp_millis(stored_ms).unwrap_or(now);
        debug!("Cached record for {}", key);
        Ok(CacheEntry::new(record, last_fetch))
    }

    async fn snapshot_all(&self) -> CacheResult<Vec<CacheEntry>> {
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(INDEX_KEY)
            .query_async(&mut self.connection())
            .await?;

        let found = self.get(&members).await?;
        Ok(found.into_values().collect())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
