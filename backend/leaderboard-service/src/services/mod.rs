pub mod assembler;
pub mod fetch_client;
pub mod orchestrator;
pub mod streak;

pub use assembler::{assemble, LeaderboardResponse, SortOrder};
pub use fetch_client::{FetchError, HttpProfileClient, ProfileFetcher};
pub use orchestrator::{CycleOutcome, CycleStatus, RefreshOrchestrator, RefreshOutcome};
pub use streak::calculate_streak;
