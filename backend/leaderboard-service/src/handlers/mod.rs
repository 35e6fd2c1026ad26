pub mod leaderboard;

pub use leaderboard::{get_leaderboard, get_user, LeaderboardQuery, LeaderboardState};
