use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Accepted-problem counts split by difficulty
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyCounts {
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
}

impl DifficultyCounts {
    pub fn total(&self) -> u32 {
        self.easy.saturating_add(self.medium).saturating_add(self.hard)
    }
}

/// Activity streak measured in calendar days
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub current: u32,
    pub max: u32,
}

/// Aggregated judge statistics for one roster user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub username: String,
    pub name: String,
    pub avatar: String,
    pub total_solved: u32,
    pub problems_by_difficulty: DifficultyCounts,
    pub total_submissions: u32,
    /// Epoch seconds of days with accepted submissions, ascending
    #[serde(default)]
    pub submission_timestamps: Vec<i64>,
    pub streak: Streak,
    pub last_fetch: DateTime<Utc>,
}

impl UserRecord {
    /// Build a record whose `total_solved` is derived from the difficulty split.
    pub fn new(
        username: impl Into<String>,
        name: impl Into<String>,
        avatar: impl Into<String>,
        problems_by_difficulty: DifficultyCounts,
        total_submissions: u32,
        mut submission_timestamps: Vec<i64>,
    ) -> Self {
        submission_timestamps.sort_unstable();
        submission_timestamps.dedup();

        Self {
            username: username.into(),
            name: name.into(),
            avatar: avatar.into(),
            total_solved: problems_by_difficulty.total(),
            problems_by_difficulty,
            total_submissions,
            submission_timestamps,
            streak: Streak::default(),
            last_fetch: Utc::now(),
        }
    }
}

/// Cached record plus the instant it was written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub record: UserRecord,
    pub last_fetch: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(mut record: UserRecord, last_fetch: DateTime<Utc>) -> Self {
        record.last_fetch = last_fetch;
        Self { record, last_fetch }
    }
}

/// A username that could not be resolved during one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub username: String,
    pub error: String,
}

impl ErrorRecord {
    pub fn new(username: impl Into<String>, error: impl ToString) -> Self {
        Self {
            username: username.into(),
            error: error.to_string(),
        }
    }
}

/// Everything one request cycle resolved, before response assembly
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshCycleResult {
    pub users: Vec<UserRecord>,
    pub errors: Vec<ErrorRecord>,
    pub from_cache: bool,
    pub rate_limited: bool,
    /// Usernames handed to the background refresh
    pub refreshing: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_solved_matches_difficulty_split() {
        let record = UserRecord::new(
            "alice",
            "Alice",
            "",
            DifficultyCounts {
                easy: 10,
                medium: 5,
                hard: 2,
            },
            40,
            vec![],
        );
        assert_eq!(record.total_solved, 17);
    }

    #[test]
    fn test_total_saturates_on_extreme_counts() {
        let counts = DifficultyCounts {
            easy: u32::MAX,
            medium: 7,
            hard: 1,
        };
        assert_eq!(counts.total(), u32::MAX);
    }

    #[test]
    fn test_timestamps_are_sorted_and_deduplicated() {
        let record = UserRecord::new(
            "bob",
            "",
            "",
            DifficultyCounts::default(),
            0,
            vec![300, 100, 200, 100],
        );
        assert_eq!(record.submission_timestamps, vec![100, 200, 300]);
    }

    #[test]
    fn test_user_record_serializes_camel_case() {
        let record = UserRecord::new("carol", "Carol", "", DifficultyCounts::default(), 3, vec![]);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("totalSolved").is_some());
        assert!(json.get("problemsByDifficulty").is_some());
        assert!(json.get("lastFetch").is_some());
    }
}
