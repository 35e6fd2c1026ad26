//! Cache-and-refresh orchestration
//!
//! A request cycle goes through `CHECK_CACHE` and ends in one of three paths:
//!
//! 1. Fresh records exist: return them now, refresh the rest in the background.
//! 2. Nothing fresh: fetch a short prefix of the roster synchronously so the
//!    response is not empty, then refresh the remainder in the background.
//! 3. The synchronous fetch yields nothing: fall back to every cached record
//!    regardless of age, or fail with 429/500 when the cache is empty too.
//!
//! Refresh runs dispatch fetches in batches of `max_concurrent_requests`,
//! pause `batch_delay` between batches and stop at the first rate limit.

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::{self, AuditEntry, AuditSink, AuditSource};
use crate::cache::{is_fresh, FreshnessCache};
use crate::config::RefreshConfig;
use crate::jobs::background_refresh;
use crate::metrics;
use crate::models::{ErrorRecord, RefreshCycleResult, UserRecord};
use crate::services::fetch_client::{FetchError, ProfileFetcher};
use crate::services::streak::calculate_streak;

/// Roster split produced by `CHECK_CACHE`, both halves in roster order
#[derive(Debug, Clone, Default)]
pub struct CachePartition {
    pub fresh: Vec<UserRecord>,
    pub stale_or_missing: Vec<String>,
}

/// Result of one refresh run over a list of usernames
#[derive(Debug, Clone, Default)]
pub struct RefreshOutcome {
    pub users: Vec<UserRecord>,
    pub errors: Vec<ErrorRecord>,
    pub rate_limited: bool,
    /// Usernames never attempted because the run stopped on a rate limit
    pub skipped: Vec<String>,
}

impl RefreshOutcome {
    /// Fetch failures followed by the usernames skipped after a rate limit.
    pub fn unresolved(&self) -> Vec<ErrorRecord> {
        let mut errors = self.errors.clone();
        errors.extend(self.skipped.iter().map(|username| skipped_error(username)));
        errors
    }
}

fn skipped_error(username: &str) -> ErrorRecord {
    ErrorRecord::new(username, "skipped: upstream rate limit reached")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    Ok,
    RateLimited,
    Error,
}

impl CycleStatus {
    pub fn http_status(&self) -> u16 {
        match self {
            CycleStatus::Ok => 200,
            CycleStatus::RateLimited => 429,
            CycleStatus::Error => 500,
        }
    }
}

pub struct CycleOutcome {
    pub status: CycleStatus,
    pub result: RefreshCycleResult,
    /// Background run launched by this cycle; request handlers never await it
    pub background: Option<JoinHandle<()>>,
}

pub struct RefreshOrchestrator {
    cache: Arc<dyn FreshnessCache>,
    fetcher: Arc<dyn ProfileFetcher>,
    audit: Arc<dyn AuditSink>,
    roster: Vec<String>,
    config: RefreshConfig,
    in_flight: DashSet<String>,
}

impl RefreshOrchestrator {
    pub fn new(
        cache: Arc<dyn FreshnessCache>,
        fetcher: Arc<dyn ProfileFetcher>,
        audit: Arc<dyn AuditSink>,
        roster: Vec<String>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            cache,
            fetcher,
            audit,
            roster,
            config,
            in_flight: DashSet::new(),
        }
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn cache(&self) -> &dyn FreshnessCache {
        self.cache.as_ref()
    }

    pub fn audit_sink(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }

    pub fn is_in_flight(&self, username: &str) -> bool {
        self.in_flight.contains(username)
    }

    /// Split the roster into fresh records and usernames needing a fetch.
    ///
    /// A storage failure is logged and treated as an empty cache.
    pub async fn check_cache(&self, now: DateTime<Utc>) -> CachePartition {
        let cached = match self.cache.get(&self.roster).await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    backend = self.cache.backend_name(),
                    error = %e,
                    "Cache read failed, treating as miss"
                );
                metrics::record_cache_error("get");
                Default::default()
            }
        };

        let mut partition = CachePartition::default();
        for username in &self.roster {
            match cached.get(username) {
                Some(entry) if is_fresh(entry, now, self.config.cache_ttl) => {
                    partition.fresh.push(entry.record.clone());
                }
                _ => partition.stale_or_missing.push(username.clone()),
            }
        }

        debug!(
            fresh = partition.fresh.len(),
            stale_or_missing = partition.stale_or_missing.len(),
            "Cache partitioned"
        );
        partition
    }

    /// Fetch, score and cache `usernames` in bounded concurrent batches.
    pub async fn refresh_users(&self, usernames: &[String]) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::default();
        let batch_size = self.config.max_concurrent_requests.max(1);

        for (index, batch) in usernames.chunks(batch_size).enumerate() {
            if index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let started = Instant::now();
            let results = join_all(batch.iter().map(|username| self.resolve(username))).await;
            metrics::observe_batch(started.elapsed());

            for (username, result) in results {
                match result {
                    Ok(record) => outcome.users.push(record),
                    Err(e) => {
                        warn!(
                            username = %username,
                            class = e.class(),
                            error = %e,
                            "Profile fetch failed"
                        );
                        outcome.rate_limited |= e.is_rate_limited();
                        outcome.errors.push(ErrorRecord::new(username, &e));
                    }
                }
            }

            if outcome.rate_limited {
                let attempted = (index + 1) * batch_size;
                outcome.skipped = usernames.iter().skip(attempted).cloned().collect();
                warn!(
                    batch = index,
                    skipped = outcome.skipped.len(),
                    "Upstream rate limit reached, halting refresh run"
                );
                break;
            }
        }

        outcome
    }

    /// Fetch one username, attach its streak and upsert it.
    async fn resolve(&self, username: &str) -> (String, Result<UserRecord, FetchError>) {
        let mut record = match self.fetcher.fetch(username).await {
            Ok(record) => record,
            Err(e) => return (username.to_string(), Err(e)),
        };

        record.username = username.to_string();
        record.streak = calculate_streak(&record.submission_timestamps, Utc::now().timestamp());

        let record = match self.cache.put(username, record.clone()).await {
            Ok(entry) => entry.record,
            Err(e) => {
                warn!(
                    username = %username,
                    error = %e,
                    "Cache write failed, serving uncached record"
                );
                metrics::record_cache_error("put");
                record
            }
        };

        (username.to_string(), Ok(record))
    }

    /// Spawn a supervised refresh for the usernames not already in flight.
    ///
    /// Returns `None` when every username is already being refreshed.
    pub fn launch_background_refresh(
        self: &Arc<Self>,
        usernames: Vec<String>,
    ) -> Option<JoinHandle<()>> {
        self.claim_and_launch(usernames).map(|(_, handle)| handle)
    }

    /// Like `launch_background_refresh`, also returning the usernames this
    /// call claimed.
    pub fn claim_and_launch(
        self: &Arc<Self>,
        usernames: Vec<String>,
    ) -> Option<(Vec<String>, JoinHandle<()>)> {
        let claimed: Vec<String> = usernames
            .into_iter()
            .filter(|username| self.in_flight.insert(username.clone()))
            .collect();

        if claimed.is_empty() {
            return None;
        }

        let handle = background_refresh::spawn_supervised(Arc::clone(self), claimed.clone());
        Some((claimed, handle))
    }

    /// Drop usernames from the in-flight set once their run has finished.
    pub fn release(&self, usernames: &[String]) {
        for username in usernames {
            self.in_flight.remove(username);
        }
    }

    /// One full request cycle; appends exactly one `cycle` audit entry.
    pub async fn run_cycle(self: &Arc<Self>) -> CycleOutcome {
        let partition = self.check_cache(Utc::now()).await;

        if !partition.fresh.is_empty() {
            return self.serve_cached(partition).await;
        }

        if partition.stale_or_missing.is_empty() {
            self.finish(AuditEntry::success(AuditSource::Cycle), "cached").await;
            return CycleOutcome {
                status: CycleStatus::Ok,
                result: RefreshCycleResult::default(),
                background: None,
            };
        }

        self.quick_fetch(partition.stale_or_missing).await
    }

    async fn serve_cached(self: &Arc<Self>, partition: CachePartition) -> CycleOutcome {
        let refreshing = partition.stale_or_missing;
        let background = if refreshing.is_empty() {
            None
        } else {
            self.launch_background_refresh(refreshing.clone())
        };

        let label = if refreshing.is_empty() { "cached" } else { "partial" };
        info!(
            fresh = partition.fresh.len(),
            refreshing = refreshing.len(),
            "Serving fresh cache"
        );
        self.finish(AuditEntry::success(AuditSource::Cycle), label).await;

        CycleOutcome {
            status: CycleStatus::Ok,
            result: RefreshCycleResult {
                users: partition.fresh,
                errors: Vec::new(),
                from_cache: true,
                rate_limited: false,
                refreshing,
            },
            background,
        }
    }

    async fn quick_fetch(self: &Arc<Self>, stale_or_missing: Vec<String>) -> CycleOutcome {
        let split = self.config.quick_fetch_count.min(stale_or_missing.len());
        let (quick, remainder) = stale_or_missing.split_at(split);

        info!(
            quick = quick.len(),
            remainder = remainder.len(),
            "No fresh cache, fetching synchronously"
        );
        let outcome = self.refresh_users(quick).await;

        // A throttled upstream gets no further traffic from this cycle
        let (refreshing, background) = if outcome.rate_limited || remainder.is_empty() {
            (Vec::new(), None)
        } else {
            let refreshing = remainder.to_vec();
            let background = self.launch_background_refresh(refreshing.clone());
            (refreshing, background)
        };

        let mut errors = outcome.unresolved();
        if outcome.rate_limited {
            errors.extend(remainder.iter().map(|username| skipped_error(username)));
        }

        if !outcome.users.is_empty() {
            let entry = if errors.is_empty() {
                AuditEntry::success(AuditSource::Cycle)
            } else {
                AuditEntry::degraded(AuditSource::Cycle, summarize(&errors))
            };
            self.finish(entry, "quick_fetch").await;

            return CycleOutcome {
                status: CycleStatus::Ok,
                result: RefreshCycleResult {
                    users: outcome.users,
                    errors,
                    from_cache: false,
                    rate_limited: outcome.rate_limited,
                    refreshing,
                },
                background,
            };
        }

        let snapshot = self.roster_snapshot().await;
        if !snapshot.is_empty() {
            warn!(users = snapshot.len(), "Quick fetch failed, serving stale snapshot");
            self.finish(
                AuditEntry::degraded(
                    AuditSource::Cycle,
                    format!("served stale snapshot: {}", summarize(&errors)),
                ),
                "snapshot",
            )
            .await;

            return CycleOutcome {
                status: CycleStatus::Ok,
                result: RefreshCycleResult {
                    users: snapshot,
                    errors,
                    from_cache: true,
                    rate_limited: outcome.rate_limited,
                    refreshing,
                },
                background,
            };
        }

        let (status, label) = if outcome.rate_limited {
            (CycleStatus::RateLimited, "rate_limited")
        } else {
            (CycleStatus::Error, "error")
        };
        warn!(status = status.http_status(), "No leaderboard data available");
        self.finish(
            AuditEntry::failure(AuditSource::Cycle, summarize(&errors)),
            label,
        )
        .await;

        CycleOutcome {
            status,
            result: RefreshCycleResult {
                users: Vec::new(),
                errors,
                from_cache: false,
                rate_limited: outcome.rate_limited,
                refreshing,
            },
            background,
        }
    }

    /// Every cached roster record regardless of age, in roster order.
    async fn roster_snapshot(&self) -> Vec<UserRecord> {
        let entries = match self.cache.snapshot_all().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(backend = self.cache.backend_name(), error = %e, "Snapshot read failed");
                metrics::record_cache_error("snapshot");
                return Vec::new();
            }
        };

        let roster: HashSet<&str> = self.roster.iter().map(String::as_str).collect();
        let mut records: Vec<UserRecord> = entries
            .into_iter()
            .map(|entry| entry.record)
            .filter(|record| roster.contains(record.username.as_str()))
            .collect();

        records.sort_by_key(|record| {
            self.roster
                .iter()
                .position(|username| *username == record.username)
        });
        records
    }

    async fn finish(&self, entry: AuditEntry, label: &str) {
        metrics::record_cycle(label);
        audit::record(self.audit.as_ref(), entry).await;
    }
}

/// Compact error list for audit entries
pub fn summarize(errors: &[ErrorRecord]) -> String {
    if errors.is_empty() {
        return "no data fetched".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.username, e.error))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_status_codes() {
        assert_eq!(CycleStatus::Ok.http_status(), 200);
        assert_eq!(CycleStatus::RateLimited.http_status(), 429);
        assert_eq!(CycleStatus::Error.http_status(), 500);
    }

    #[test]
    fn test_summarize() {
        let errors = vec![
            ErrorRecord::new("alice", "rate limited by upstream"),
            ErrorRecord::new("bob", "user not found upstream: bob"),
        ];
        assert_eq!(
            summarize(&errors),
            "alice: rate limited by upstream; bob: user not found upstream: bob"
        );
        assert_eq!(summarize(&[]), "no data fetched");
    }
}
