use crate::model::{PlayerObservation, SENTINEL};

/// A player's detail page, reduced to what the crawl needs
///
/// Private profiles carry no stats and no references; every stat field is
/// `None` and renders as the sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerProfile {
    pub player_id: String,
    pub display_name: String,
    pub is_private: bool,
    pub rank_score: Option<f64>,
    pub total_matches: Option<u64>,
    pub total_wins: Option<u64>,
    pub teammate_refs: Vec<String>,
    pub match_refs: Vec<String>,
}

impl PlayerProfile {
    /// Builds the private-profile sentinel for a player whose detail could
    /// not be read (private flag set, or the API refused the resource)
    pub fn private(player_id: &str, display_name: Option<String>) -> Self {
        Self {
            player_id: player_id.to_string(),
            display_name: display_name.unwrap_or_else(|| SENTINEL.to_string()),
            is_private: true,
            rank_score: None,
            total_matches: None,
            total_wins: None,
            teammate_refs: Vec::new(),
            match_refs: Vec::new(),
        }
    }

    /// The observation recorded for this player when met as a teammate
    ///
    /// Returns `None` for private profiles and for public profiles that do
    /// not report a rank score.
    pub fn observation(&self) -> Option<PlayerObservation> {
        if self.is_private {
            return None;
        }

        Some(PlayerObservation {
            player_name: self.display_name.clone(),
            score: self.rank_score?,
            matches: self.total_matches.unwrap_or(0),
            wins: self.total_wins.unwrap_or(0),
        })
    }
}
