//! Freshness cache for per-user leaderboard records
//!
//! One capability, several storage adapters:
//! - `MemoryCache`: process-local `DashMap`, used for single-node deployments and tests
//! - `RedisCache`: shared cache keyed by `leaderboard:user:{username}`
//! - `PgCache`: durable table `leaderboard_users`
//!
//! Every adapter upserts per key atomically and never moves `last_fetch`
//! backwards. Unknown keys are simply absent from `get` results.

mod memory;
mod pg_store;
mod redis_store;

pub use memory::MemoryCache;
pub use pg_store::PgCache;
pub use redis_store::RedisCache;

use crate::models::{CacheEntry, UserRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait]
pub trait FreshnessCache: Send + Sync {
    /// Read the entries that exist for `keys`; missing keys are omitted.
    async fn get(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheEntry>>;

    /// Upsert `record` under `key`, stamping it with the current time.
    async fn put(&self, key: &str, record: UserRecord) -> CacheResult<CacheEntry>;

    /// Every stored entry regardless of age.
    async fn snapshot_all(&self) -> CacheResult<Vec<CacheEntry>>;

    /// Short label used in logs and metrics
    fn backend_name(&self) -> &'static str;
}

/// `true` while the entry is younger than `ttl` at `now`.
pub fn is_fresh(entry: &CacheEntry, now: DateTime<Utc>, ttl: Duration) -> bool {
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => now - entry.last_fetch < ttl,
        // TTL beyond chrono's range never expires
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DifficultyCounts;

    fn entry_at(last_fetch: DateTime<Utc>) -> CacheEntry {
        let record = UserRecord::new("alice", "", "", DifficultyCounts::default(), 0, vec![]);
        CacheEntry::new(record, last_fetch)
    }

    #[test]
    fn test_entry_written_now_is_fresh() {
        let now = Utc::now();
        let entry = entry_at(now);
        assert!(is_fresh(&entry, now, Duration::from_secs(1)));
        assert!(is_fresh(&entry, now, Duration::from_secs(3600)));
    }

    #[test]
    fn test_entry_older_than_ttl_is_stale() {
        let now = Utc::now();
        let ttl = Duration::from_secs(3600);
        let entry = entry_at(now - chrono::Duration::seconds(3601));
        assert!(!is_fresh(&entry, now, ttl));
    }

    #[test]
    fn test_entry_exactly_ttl_old_is_stale() {
        let now = Utc::now();
        let entry = entry_at(now - chrono::Duration::seconds(60));
        assert!(!is_fresh(&entry, now, Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_ttl_is_never_fresh() {
        let now = Utc::now();
        assert!(!is_fresh(&entry_at(now), now, Duration::ZERO));
    }
}
