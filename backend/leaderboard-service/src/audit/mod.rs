//! Append-only audit trail of refresh cycles
//!
//! One entry is written per request cycle and one per background refresh run.
//! Entries are never read back by the service.

mod pg_sink;

pub use pg_sink::PgAuditSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSource {
    /// A request-triggered cycle
    Cycle,
    /// A supervised background refresh run
    Background,
}

impl AuditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSource::Cycle => "cycle",
            AuditSource::Background => "background",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source: AuditSource,
}

impl AuditEntry {
    pub fn success(source: AuditSource) -> Self {
        Self {
            success: true,
            error: None,
            timestamp: Utc::now(),
            source,
        }
    }

    pub fn failure(source: AuditSource, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            timestamp: Utc::now(),
            source,
        }
    }

    /// Successful outcome that still carries a degradation note.
    pub fn degraded(source: AuditSource, note: impl Into<String>) -> Self {
        Self {
            success: true,
            error: Some(note.into()),
            timestamp: Utc::now(),
            source,
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one entry. Failures are reported to the caller, which logs them.
    async fn append(&self, entry: AuditEntry) -> anyhow::Result<()>;
}

/// Writes entries to the structured log only
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, entry: AuditEntry) -> anyhow::Result<()> {
        if entry.success {
            info!(
                target: "leaderboard_audit",
                source = entry.source.as_str(),
                success = entry.success,
                error = entry.error.as_deref().unwrap_or(""),
                timestamp = %entry.timestamp.to_rfc3339(),
                "Refresh audit"
            );
        } else {
            warn!(
                target: "leaderboard_audit",
                source = entry.source.as_str(),
                success = entry.success,
                error = entry.error.as_deref().unwrap_or(""),
                timestamp = %entry.timestamp.to_rfc3339(),
                "Refresh audit"
            );
        }
        Ok(())
    }
}

/// Keeps entries in memory; used by tests and local tooling
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn count(&self, source: AuditSource) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.source == source)
            .count()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: AuditEntry) -> anyhow::Result<()> {
        self.entries.lock().push(entry);
        Ok(())
    }
}

/// Append and swallow sink failures; the audit trail never fails a request.
pub async fn record(sink: &dyn AuditSink, entry: AuditEntry) {
    let source = entry.source;
    if let Err(e) = sink.append(entry).await {
        warn!(source = source.as_str(), error = %e, "Failed to append audit entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn append(&self, _entry: AuditEntry) -> anyhow::Result<()> {
            anyhow::bail!("sink offline")
        }
    }

    #[test]
    fn test_memory_sink_counts_by_source() {
        let sink = MemoryAuditSink::new();
        tokio_test::block_on(async {
            record(&sink, AuditEntry::success(AuditSource::Cycle)).await;
            record(&sink, AuditEntry::failure(AuditSource::Background, "HTTP 503")).await;
            record(&sink, AuditEntry::degraded(AuditSource::Cycle, "bob skipped")).await;
        });

        assert_eq!(sink.count(AuditSource::Cycle), 2);
        assert_eq!(sink.count(AuditSource::Background), 1);
        assert!(sink.entries()[2].success);
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        tokio_test::block_on(record(&FailingSink, AuditEntry::success(AuditSource::Cycle)));
    }

    #[test]
    fn test_entry_serialization_omits_missing_error() {
        let json = serde_json::to_value(AuditEntry::success(AuditSource::Background)).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["source"], "background");
    }
}
