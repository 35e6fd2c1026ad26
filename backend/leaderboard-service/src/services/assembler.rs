//! Response assembly for the leaderboard endpoint
//!
//! Users and errors follow the configured roster order unless the caller asks
//! for a ranking. Names outside the roster (none in practice) go last.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::AppError;
use crate::models::{ErrorRecord, RefreshCycleResult, UserRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub users: Vec<UserRecord>,
    pub errors: Vec<ErrorRecord>,
    pub from_cache: bool,
    pub rate_limited: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refreshing: Vec<String>,
    /// ISO-8601 generation time
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Roster,
    Solved,
    Streak,
}

impl FromStr for SortOrder {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "roster" => Ok(SortOrder::Roster),
            "solved" => Ok(SortOrder::Solved),
            "streak" => Ok(SortOrder::Streak),
            other => Err(AppError::BadRequest(format!(
                "Invalid sort parameter {:?}. Must be 'roster', 'solved' or 'streak'",
                other
            ))),
        }
    }
}

pub fn assemble(
    result: RefreshCycleResult,
    roster: &[String],
    sort: SortOrder,
) -> LeaderboardResponse {
    let position: HashMap<&str, usize> = roster
        .iter()
        .enumerate()
        .map(|(index, username)| (username.as_str(), index))
        .collect();
    let rank = |username: &str| position.get(username).copied().unwrap_or(usize::MAX);

    let mut users = result.users;
    users.sort_by(|a, b| {
        rank(&a.username)
            .cmp(&rank(&b.username))
            .then_with(|| a.username.cmp(&b.username))
    });
    match sort {
        SortOrder::Roster => {}
        // stable sort keeps roster order among ties before the name tiebreak
        SortOrder::Solved => users.sort_by(|a, b| {
            b.total_solved
                .cmp(&a.total_solved)
                .then(b.problems_by_difficulty.hard.cmp(&a.problems_by_difficulty.hard))
                .then(
                    b.problems_by_difficulty
                        .medium
                        .cmp(&a.problems_by_difficulty.medium),
                )
                .then_with(|| a.username.cmp(&b.username))
        }),
        SortOrder::Streak => users.sort_by(|a, b| {
            b.streak
                .current
                .cmp(&a.streak.current)
                .then(b.streak.max.cmp(&a.streak.max))
                .then_with(|| a.username.cmp(&b.username))
        }),
    }

    let mut errors = result.errors;
    errors.sort_by_key(|e| rank(&e.username));

    LeaderboardResponse {
        users,
        errors,
        from_cache: result.from_cache,
        rate_limited: result.rate_limited,
        refreshing: result.refreshing,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DifficultyCounts, Streak};

    fn user(name: &str, easy: u32, hard: u32, current: u32) -> UserRecord {
        let mut record = UserRecord::new(
            name,
            "",
            "",
            DifficultyCounts {
                easy,
                medium: 0,
                hard,
            },
            0,
            vec![],
        );
        record.streak = Streak {
            current,
            max: current,
        };
        record
    }

    fn roster() -> Vec<String> {
        vec!["carol".into(), "alice".into(), "bob".into()]
    }

    fn names(response: &LeaderboardResponse) -> Vec<&str> {
        response.users.iter().map(|u| u.username.as_str()).collect()
    }

    #[test]
    fn test_roster_order_preserved() {
        let result = RefreshCycleResult {
            users: vec![user("bob", 1, 0, 0), user("carol", 1, 0, 0), user("alice", 1, 0, 0)],
            ..Default::default()
        };
        let response = assemble(result, &roster(), SortOrder::Roster);
        assert_eq!(names(&response), vec!["carol", "alice", "bob"]);
    }

    #[test]
    fn test_rank_by_solved() {
        let result = RefreshCycleResult {
            users: vec![user("carol", 5, 0, 0), user("alice", 3, 2, 0), user("bob", 10, 0, 0)],
            ..Default::default()
        };
        let response = assemble(result, &roster(), SortOrder::Solved);
        // alice ties carol on total but has more hard problems
        assert_eq!(names(&response), vec!["bob", "alice", "carol"]);
    }

    #[test]
    fn test_rank_by_streak() {
        let result = RefreshCycleResult {
            users: vec![user("carol", 0, 0, 1), user("alice", 0, 0, 4), user("bob", 0, 0, 2)],
            ..Default::default()
        };
        let response = assemble(result, &roster(), SortOrder::Streak);
        assert_eq!(names(&response), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_refreshing_omitted_when_empty() {
        let response = assemble(RefreshCycleResult::default(), &roster(), SortOrder::Roster);
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("refreshing").is_none());
        assert_eq!(json["fromCache"], false);
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_errors_follow_roster_order() {
        let result = RefreshCycleResult {
            errors: vec![ErrorRecord::new("bob", "x"), ErrorRecord::new("carol", "y")],
            ..Default::default()
        };
        let response = assemble(result, &roster(), SortOrder::Roster);
        assert_eq!(response.errors[0].username, "carol");
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!("solved".parse::<SortOrder>().unwrap(), SortOrder::Solved);
        assert!("fastest".parse::<SortOrder>().is_err());
    }
}
