//! Shared fixtures: scripted upstream fetcher and orchestrator builders

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use leaderboard_service::audit::MemoryAuditSink;
use leaderboard_service::cache::{CacheError, CacheResult, FreshnessCache, MemoryCache};
use leaderboard_service::config::RefreshConfig;
use leaderboard_service::models::{CacheEntry, DifficultyCounts, UserRecord};
use leaderboard_service::services::{FetchError, ProfileFetcher, RefreshOrchestrator};

#[derive(Clone)]
pub enum Script {
    Ok,
    Fail(FetchError),
    Panic,
}

/// Fetcher answering from a per-username script; unknown names succeed.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    latency: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn script(self, username: &str, script: Script) -> Self {
        self.scripts.lock().insert(username.to_string(), script);
        self
    }

    pub fn fail_all(self, usernames: &[String], err: FetchError) -> Self {
        for username in usernames {
            self.scripts
                .lock()
                .insert(username.clone(), Script::Fail(err.clone()));
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl ProfileFetcher for ScriptedFetcher {
    async fn fetch(&self, username: &str) -> Result<UserRecord, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(username.to_string());

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let script = self
            .scripts
            .lock()
            .get(username)
            .cloned()
            .unwrap_or(Script::Ok);

        match script {
            Script::Ok => Ok(record(username, 3)),
            Script::Fail(err) => Err(err),
            Script::Panic => panic!("scripted panic for {}", username),
        }
    }
}

pub fn record(username: &str, easy: u32) -> UserRecord {
    let today = Utc::now().timestamp();
    UserRecord::new(
        username,
        username.to_uppercase(),
        "",
        DifficultyCounts {
            easy,
            medium: 1,
            hard: 0,
        },
        easy + 5,
        vec![today - 86_400, today],
    )
}

pub fn roster(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

pub fn fresh_entry(username: &str) -> CacheEntry {
    CacheEntry::new(record(username, 7), Utc::now())
}

pub fn stale_entry(username: &str) -> CacheEntry {
    CacheEntry::new(record(username, 7), Utc::now() - ChronoDuration::hours(2))
}

pub fn fast_config(max_concurrent_requests: usize) -> RefreshConfig {
    RefreshConfig {
        cache_ttl: Duration::from_secs(3600),
        max_concurrent_requests,
        batch_delay: Duration::ZERO,
        quick_fetch_count: 3,
    }
}

pub struct Harness {
    pub orchestrator: Arc<RefreshOrchestrator>,
    pub cache: MemoryCache,
    pub fetcher: Arc<ScriptedFetcher>,
    pub audit: Arc<MemoryAuditSink>,
}

pub fn harness(
    roster: Vec<String>,
    fetcher: ScriptedFetcher,
    cache: MemoryCache,
    config: RefreshConfig,
) -> Harness {
    let storage: Arc<dyn FreshnessCache> = Arc::new(cache.clone());
    build(roster, fetcher, cache, storage, config)
}

/// Harness whose storage is `faulty`; `Harness::cache` is the wrapped store.
pub fn faulty_harness(
    roster: Vec<String>,
    fetcher: ScriptedFetcher,
    faulty: FaultyCache,
    config: RefreshConfig,
) -> Harness {
    let inner = faulty.inner.clone();
    build(roster, fetcher, inner, Arc::new(faulty), config)
}

fn build(
    roster: Vec<String>,
    fetcher: ScriptedFetcher,
    cache: MemoryCache,
    storage: Arc<dyn FreshnessCache>,
    config: RefreshConfig,
) -> Harness {
    let fetcher = Arc::new(fetcher);
    let audit = Arc::new(MemoryAuditSink::new());
    let orchestrator = Arc::new(RefreshOrchestrator::new(
        storage,
        fetcher.clone(),
        audit.clone(),
        roster,
        config,
    ));

    Harness {
        orchestrator,
        cache,
        fetcher,
        audit,
    }
}

/// Memory cache whose operations can be switched to fail individually
#[derive(Default)]
pub struct FaultyCache {
    pub inner: MemoryCache,
    fail_get: AtomicBool,
    fail_put: AtomicBool,
    fail_snapshot: AtomicBool,
}

impl FaultyCache {
    pub fn wrapping(inner: MemoryCache) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn failing_get(self) -> Self {
        self.fail_get.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_put(self) -> Self {
        self.fail_put.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_snapshot(self) -> Self {
        self.fail_snapshot.store(true, Ordering::SeqCst);
        self
    }
}

fn storage_down() -> CacheError {
    CacheError::Serialization(serde_json::from_str::<u32>("storage offline").unwrap_err())
}

#[async_trait]
impl FreshnessCache for FaultyCache {
    async fn get(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheEntry>> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(storage_down());
        }
        self.inner.get(keys).await
    }

    async fn put(&self, key: &str, record: UserRecord) -> CacheResult<CacheEntry> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(storage_down());
        }
        self.inner.put(key, record).await
    }

    async fn snapshot_all(&self) -> CacheResult<Vec<CacheEntry>> {
        if self.fail_snapshot.load(Ordering::SeqCst) {
            return Err(storage_down());
        }
        self.inner.snapshot_all().await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}
