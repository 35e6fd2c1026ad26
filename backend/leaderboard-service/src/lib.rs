pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};

pub use cache::{FreshnessCache, MemoryCache, PgCache, RedisCache};
pub use models::{CacheEntry, ErrorRecord, RefreshCycleResult, UserRecord};
pub use services::{RefreshOrchestrator, SortOrder};
