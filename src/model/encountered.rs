/// One sighting of a player met through a leaderboard player's teammates
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerObservation {
    pub player_name: String,
    pub score: f64,
    pub matches: u64,
    pub wins: u64,
}

/// Aggregate over every observation of one encountered player
///
/// `highest_score` never decreases. Name, latest score, matches and wins
/// always follow the most recent observation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncounteredPlayer {
    pub player_uid: String,
    pub player_name: String,
    pub highest_score: f64,
    pub latest_score: f64,
    pub matches: u64,
    pub wins: u64,
    pub observations: u32,
}

impl EncounteredPlayer {
    /// Creates the aggregate from a player's first observation
    pub fn first_seen(player_uid: &str, observation: &PlayerObservation) -> Self {
        Self {
            player_uid: player_uid.to_string(),
            player_name: observation.player_name.clone(),
            highest_score: observation.score,
            latest_score: observation.score,
            matches: observation.matches,
            wins: observation.wins,
            observations: 1,
        }
    }

    /// Folds a newer observation into the aggregate
    pub fn observe(&mut self, observation: &PlayerObservation) {
        if observation.score > self.highest_score {
            self.highest_score = observation.score;
        }
        self.latest_score = observation.score;
        self.player_name = observation.player_name.clone();
        self.matches = observation.matches;
        self.wins = observation.wins;
        self.observations = self.observations.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(score: f64) -> PlayerObservation {
        PlayerObservation {
            player_name: "Mantis Main".to_string(),
            score,
            matches: 10,
            wins: 5,
        }
    }

    #[test]
    fn test_highest_and_latest_score() {
        let scores = [50.0, 30.0, 70.0, 60.0];
        let mut player = EncounteredPlayer::first_seen("9", &obs(scores[0]));
        for score in &scores[1..] {
            player.observe(&obs(*score));
        }

        assert_eq!(player.highest_score, 70.0);
        assert_eq!(player.latest_score, 60.0);
        assert_eq!(player.observations, 4);
    }

    #[test]
    fn test_highest_score_never_decreases() {
        let mut player = EncounteredPlayer::first_seen("9", &obs(100.0));
        let mut previous = player.highest_score;
        for score in [20.0, 150.0, 149.0, 0.0, 151.0] {
            player.observe(&obs(score));
            assert!(player.highest_score >= previous);
            previous = player.highest_score;
        }
        assert_eq!(player.highest_score, 151.0);
    }

    #[test]
    fn test_observe_takes_latest_counts_and_name() {
        let mut player = EncounteredPlayer::first_seen("9", &obs(10.0));
        player.observe(&PlayerObservation {
            player_name: "Renamed".to_string(),
            score: 5.0,
            matches: 11,
            wins: 6,
        });

        assert_eq!(player.player_name, "Renamed");
        assert_eq!(player.matches, 11);
        assert_eq!(player.wins, 6);
    }
}
