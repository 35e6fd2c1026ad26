use async_trait::async_trait;
use sqlx::PgPool;

use super::{AuditEntry, AuditSink};

/// Audit rows in `leaderboard_refresh_log`
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS leaderboard_refresh_log (
                id BIGSERIAL PRIMARY KEY,
                success BOOLEAN NOT NULL,
                error TEXT,
                source TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, entry: AuditEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO leaderboard_refresh_log (success, error, source, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.success)
        .bind(entry.error)
        .bind(entry.source.as_str())
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
