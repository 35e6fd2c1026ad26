//! Streak calculation over accepted-submission timestamps
//!
//! Timestamps are grouped into UTC day buckets (`ts / 86400`, floored), so
//! several submissions on one day count as a single active day.
//!
//! - Current streak: only counted while the latest submission is inside the
//!   trailing 24 hours. The walk starts at that submission's day and goes
//!   backward through strictly consecutive active days.
//! - Max streak: forward pass over the active days where a single missed day
//!   (gap of at most 2 buckets) keeps the run alive.

use crate::models::Streak;
use std::collections::BTreeSet;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Largest bucket gap that still continues a run in the max-streak pass
const MAX_GRACE_GAP: i64 = 2;

pub fn day_bucket(timestamp: i64) -> i64 {
    timestamp.div_euclid(SECONDS_PER_DAY)
}

/// Compute `{current, max}` for the given timestamps relative to `now` (epoch seconds).
pub fn calculate_streak(timestamps: &[i64], now: i64) -> Streak {
    if timestamps.is_empty() {
        return Streak::default();
    }

    let days: BTreeSet<i64> = timestamps.iter().map(|&ts| day_bucket(ts)).collect();

    let current = current_streak(timestamps, &days, now);
    let max = longest_run(&days).max(current);

    Streak { current, max }
}

fn current_streak(timestamps: &[i64], days: &BTreeSet<i64>, now: i64) -> u32 {
    let latest = match timestamps.iter().copied().filter(|&ts| ts <= now).max() {
        Some(ts) => ts,
        None => return 0,
    };

    if now - latest >= SECONDS_PER_DAY {
        return 0;
    }

    let mut day = day_bucket(latest);
    let mut count = 0;
    while days.contains(&day) {
        count += 1;
        day -= 1;
    }
    count
}

fn longest_run(days: &BTreeSet<i64>) -> u32 {
    let mut best = 0;
    let mut run = 0;
    let mut previous: Option<i64> = None;

    for &day in days {
        run = match previous {
            Some(prev) if day - prev <= MAX_GRACE_GAP => run + 1,
            _ => 1,
        };
        best = best.max(run);
        previous = Some(day);
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-10 12:00:00 UTC
    const NOW: i64 = 1_710_072_000;

    fn days_ago(n: i64) -> i64 {
        NOW - n * SECONDS_PER_DAY
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(calculate_streak(&[], NOW), Streak { current: 0, max: 0 });
    }

    #[test]
    fn test_single_recent_submission() {
        let streak = calculate_streak(&[NOW - 3600], NOW);
        assert_eq!(streak, Streak { current: 1, max: 1 });
    }

    #[test]
    fn test_single_old_submission() {
        let streak = calculate_streak(&[days_ago(10)], NOW);
        assert_eq!(streak, Streak { current: 0, max: 1 });
    }

    #[test]
    fn test_three_consecutive_days_ending_today() {
        let streak = calculate_streak(&[days_ago(2), days_ago(1), NOW - 60], NOW);
        assert_eq!(streak, Streak { current: 3, max: 3 });
    }

    #[test]
    fn test_two_days_five_apart() {
        let streak = calculate_streak(&[days_ago(12), days_ago(7)], NOW);
        assert_eq!(streak, Streak { current: 0, max: 1 });
    }

    #[test]
    fn test_same_day_repeats_count_once() {
        let today = [NOW - 60, NOW - 120, NOW - 180];
        assert_eq!(calculate_streak(&today, NOW), Streak { current: 1, max: 1 });
    }

    #[test]
    fn test_single_missed_day_extends_max_but_breaks_current() {
        // Active on days -4, -3, then -1 and today
        let ts = [days_ago(4), days_ago(3), days_ago(1), NOW - 10];
        let streak = calculate_streak(&ts, NOW);
        assert_eq!(streak.current, 2);
        assert_eq!(streak.max, 4);
    }

    #[test]
    fn test_submission_late_yesterday_anchors_current() {
        // 23:30 the previous UTC day, checked at 00:30
        let midnight = day_bucket(NOW) * SECONDS_PER_DAY;
        let now = midnight + 1800;
        let ts = [midnight - 1800, midnight - 1800 - SECONDS_PER_DAY];
        assert_eq!(calculate_streak(&ts, now), Streak { current: 2, max: 2 });
    }

    #[test]
    fn test_future_timestamps_do_not_anchor() {
        let streak = calculate_streak(&[NOW + 10 * SECONDS_PER_DAY], NOW);
        assert_eq!(streak, Streak { current: 0, max: 1 });
    }

    #[test]
    fn test_max_never_below_current() {
        let inputs: Vec<Vec<i64>> = vec![
            vec![NOW],
            vec![days_ago(1), NOW],
            vec![days_ago(30), days_ago(29), days_ago(3), NOW],
            vec![days_ago(100)],
        ];
        for ts in inputs {
            let streak = calculate_streak(&ts, NOW);
            assert!(streak.max >= streak.current, "{:?}", ts);
            assert!(streak.max >= 1, "{:?}", ts);
        }
    }
}
