use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{CacheResult, FreshnessCache};
use crate::models::{CacheEntry, UserRecord};

/// Durable cache in PostgreSQL; the record body is stored as JSONB
#[derive(Clone)]
pub struct PgCache {
    pool: PgPool,
}

type Row = (String, serde_json::Value, DateTime<Utc>);

impl PgCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table if it does not exist yet.
    pub async fn ensure_schema(&self) -> CacheResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS leaderboard_users (
                username TEXT PRIMARY KEY,
                record JSONB NOT NULL,
                last_fetch TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn decode_row((username, record, last_fetch): Row) -> Option<(String, CacheEntry)> {
    match serde_json::from_value::<UserRecord>(record) {
        Ok(record) => Some((username, CacheEntry::new(record, last_fetch))),
        Err(e) => {
            warn!(username = %username, error = %e, "Skipping undecodable cache row");
            None
        }
    }
}

#[async_trait]
impl FreshnessCache for PgCache {
    async fn get(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheEntry>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT username, record, last_fetch
            FROM leaderboard_users
            WHERE username = ANY($1)
            "#,
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;

        let found: HashMap<String, CacheEntry> = rows.into_iter().filter_map(decode_row).collect();
        debug!(requested = keys.len(), found = found.len(), "Postgres cache lookup");
        Ok(found)
    }

    async fn put(&self, key: &str, record: UserRecord) -> CacheResult<CacheEntry> {
        let body = serde_json::to_value(&record)?;

        let (last_fetch,): (DateTime<Utc>,) = sqlx::query_as(
            r#"
            INSERT INTO leaderboard_users (username, record, last_fetch)
            VALUES ($1, $2, $3)
            ON CONFLICT (username) DO UPDATE
            SET record = EXCLUDED.record,
                last_fetch = GREATEST(leaderboard_users.last_fetch, EXCLUDED.last_fetch)
            RETURNING last_fetch
            "#,
        )
        .bind(key)
        .bind(body)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(CacheEntry::new(record, last_fetch))
    }

    async fn snapshot_all(&self) -> CacheResult<Vec<CacheEntry>> {
        let rows: Vec<Row> =
            sqlx::query_as("SELECT username, record, last_fetch FROM leaderboard_users")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(decode_row)
            .map(|(_, entry)| entry)
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
