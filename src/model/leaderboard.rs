use crate::model::display_or_sentinel;

/// One row of the leaderboard listing, as returned by the API
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub player_name: String,
    pub rank_name: String,
    pub score: f64,
    pub matches: u64,
    pub player_id: String,
}

/// A leaderboard entry captured during a run, joined with the player's rank
/// score from their profile
///
/// `rank_score` is `None` when the profile was private, inaccessible, or
/// could not be fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardRow {
    pub captured_at: String,
    pub entry: LeaderboardEntry,
    pub rank_score: Option<f64>,
}

impl LeaderboardRow {
    pub fn new(captured_at: &str, entry: LeaderboardEntry, rank_score: Option<f64>) -> Self {
        Self {
            captured_at: captured_at.to_string(),
            entry,
            rank_score,
        }
    }

    /// Rank score as it appears in exported history
    pub fn rank_score_display(&self) -> String {
        display_or_sentinel(self.rank_score)
    }
}
