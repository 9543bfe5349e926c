//! Records produced by the crawl
//!
//! These are the finished, validated shapes handed to the record sink. Wire
//! formats live in `crawler::parser`; nothing here knows about JSON.

mod encountered;
mod leaderboard;
mod matches;
mod player;

pub use encountered::{EncounteredPlayer, PlayerObservation};
pub use leaderboard::{LeaderboardEntry, LeaderboardRow};
pub use matches::{HeroBreakdown, MatchDetail, MatchPlayerRecord, MatchSummary};
pub use player::PlayerProfile;

/// Placeholder written in place of stats that the API would not disclose
pub const SENTINEL: &str = "N/A";

/// Formats an optional stat, substituting [`SENTINEL`] when it is missing
pub fn display_or_sentinel<T: std::fmt::Display>(value: Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => SENTINEL.to_string(),
    }
}
