//! Cache Warmer Background Job
//!
//! Periodically refreshes stale roster entries so request cycles mostly hit
//! the fresh-cache path. Disabled by default; the request path keeps the
//! cache current on its own.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::config::WarmerConfig;
use crate::services::orchestrator::RefreshOrchestrator;

/// Delay before the first warm cycle, letting the HTTP server come up
const INITIAL_DELAY: Duration = Duration::from_secs(30);

/// Configuration for cache warming
#[derive(Clone)]
pub struct CacheWarmerConfig {
    pub enabled: bool,
    pub warm_interval: Duration,
    pub initial_delay: Duration,
}

impl Default for CacheWarmerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            warm_interval: Duration::from_secs(30 * 60),
            initial_delay: INITIAL_DELAY,
        }
    }
}

impl From<&WarmerConfig> for CacheWarmerConfig {
    fn from(config: &WarmerConfig) -> Self {
        Self {
            enabled: config.enabled,
            warm_interval: config.interval,
            initial_delay: INITIAL_DELAY,
        }
    }
}

/// Start the cache warmer background job
pub async fn start_cache_warmer(orchestrator: Arc<RefreshOrchestrator>, config: CacheWarmerConfig) {
    if !config.enabled {
        tracing::info!("Cache warmer disabled by configuration");
        return;
    }

    tracing::info!(
        interval_secs = config.warm_interval.as_secs(),
        roster = orchestrator.roster().len(),
        "Starting cache warmer background job"
    );

    sleep(config.initial_delay).await;

    loop {
        let cycle_start = Instant::now();
        let warmed = run_warm_cycle(&orchestrator).await;

        tracing::info!(
            users_queued = warmed,
            duration_ms = cycle_start.elapsed().as_millis() as u64,
            "Cache warm cycle completed"
        );

        sleep(config.warm_interval).await;
    }
}

/// Refresh every stale or missing roster entry and wait for the run.
///
/// Returns the number of usernames this cycle claimed; names already
/// being refreshed elsewhere are not counted.
pub async fn run_warm_cycle(orchestrator: &Arc<RefreshOrchestrator>) -> usize {
    let partition = orchestrator.check_cache(Utc::now()).await;

    if partition.stale_or_missing.is_empty() {
        tracing::debug!("No stale roster entries to warm");
        return 0;
    }

    let stale = partition.stale_or_missing.len();
    match orchestrator.claim_and_launch(partition.stale_or_missing) {
        Some((claimed, handle)) => {
            tracing::debug!(
                stale,
                claimed = claimed.len(),
                "Refreshing stale roster entries"
            );
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Cache warm supervisor failed");
            }
            claimed.len()
        }
        None => {
            tracing::debug!("Stale entries already being refreshed");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CacheWarmerConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.warm_interval, Duration::from_secs(1800));
        assert_eq!(config.initial_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_config_from_env_settings() {
        let config = CacheWarmerConfig::from(&WarmerConfig {
            enabled: true,
            interval: Duration::from_secs(60),
        });
        assert!(config.enabled);
        assert_eq!(config.warm_interval, Duration::from_secs(60));
    }
}
