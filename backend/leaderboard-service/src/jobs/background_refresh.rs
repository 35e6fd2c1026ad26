//! Supervised background refresh
//!
//! The refresh run executes in its own task. A supervising task awaits it,
//! so a panic inside the run surfaces as a `JoinError` instead of vanishing.
//! The supervisor always releases the in-flight claims and appends one
//! `background` audit entry, whatever the run's fate.

use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::audit::{self, AuditEntry, AuditSource};
use crate::metrics;
use crate::services::orchestrator::{summarize, RefreshOrchestrator, RefreshOutcome};

pub fn spawn_supervised(
    orchestrator: Arc<RefreshOrchestrator>,
    usernames: Vec<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();

        let worker = {
            let orchestrator = Arc::clone(&orchestrator);
            let usernames = usernames.clone();
            tokio::spawn(async move { orchestrator.refresh_users(&usernames).await })
        };

        let entry = match worker.await {
            Ok(outcome) => {
                info!(
                    requested = usernames.len(),
                    refreshed = outcome.users.len(),
                    failed = outcome.errors.len(),
                    skipped = outcome.skipped.len(),
                    rate_limited = outcome.rate_limited,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Background refresh completed"
                );
                audit_entry_for(&outcome)
            }
            Err(join_err) => {
                error!(
                    requested = usernames.len(),
                    error = %join_err,
                    "Background refresh task failed"
                );
                metrics::record_background_run("panic");
                AuditEntry::failure(
                    AuditSource::Background,
                    format!("background refresh aborted: {}", join_err),
                )
            }
        };

        orchestrator.release(&usernames);
        audit::record(orchestrator.audit_sink(), entry).await;
    })
}

fn audit_entry_for(outcome: &RefreshOutcome) -> AuditEntry {
    let errors = outcome.unresolved();

    if errors.is_empty() {
        metrics::record_background_run("success");
        AuditEntry::success(AuditSource::Background)
    } else if outcome.users.is_empty() {
        warn!(failed = errors.len(), "Background refresh resolved no users");
        metrics::record_background_run("failure");
        AuditEntry::failure(AuditSource::Background, summarize(&errors))
    } else {
        metrics::record_background_run("degraded");
        AuditEntry::degraded(AuditSource::Background, summarize(&errors))
    }
}
