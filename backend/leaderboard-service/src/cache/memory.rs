use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{CacheResult, FreshnessCache};
use crate::models::{CacheEntry, UserRecord};

/// Process-local cache; clones share the same map
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry with its own `last_fetch`, e.g. when restoring a snapshot.
    pub fn seed(&self, entry: CacheEntry) {
        self.entries.insert(entry.record.username.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl FreshnessCache for MemoryCache {
    async fn get(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheEntry>> {
        let found: HashMap<String, CacheEntry> = keys
            .iter()
            .filter_map(|key| {
                self.entries
                    .get(key)
                    .map(|entry| (key.clone(), entry.value().clone()))
            })
            .collect();

        debug!(requested = keys.len(), found = found.len(), "Memory cache lookup");
        Ok(found)
    }

    async fn put(&self, key: &str, record: UserRecord) -> CacheResult<CacheEntry> {
        let now = Utc::now();

        let stored = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                let last_fetch = slot.get().last_fetch.max(now);
                let entry = CacheEntry::new(record, last_fetch);
                slot.insert(entry.clone());
                entry
            }
            Entry::Vacant(slot) => {
                let entry = CacheEntry::new(record, now);
                slot.insert(entry.clone());
                entry
            }
        };

        Ok(stored)
    }

    async fn snapshot_all(&self) -> CacheResult<Vec<CacheEntry>> {
        Ok(self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
