/// Match identity; unique by `match_uid`
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSummary {
    pub match_uid: String,
    pub replay_id: Option<String>,
    pub gamemode: Option<String>,
}

/// Per-hero stats for one player within one match
#[derive(Debug, Clone, PartialEq)]
pub struct HeroBreakdown {
    pub hero_id: String,
    pub play_time: f64,
    pub kills: u64,
    pub deaths: u64,
    pub assists: u64,
    pub hero_damage: f64,
    pub hero_healed: f64,
    pub damage_taken: f64,
}

/// One player's line in a match; unique by `(match_uid, player_uid)`
#[derive(Debug, Clone, PartialEq)]
pub struct MatchPlayerRecord {
    pub match_uid: String,
    pub player_uid: String,
    pub name: Option<String>,
    pub hero_id: Option<String>,
    pub is_win: bool,
    pub kills: u64,
    pub deaths: u64,
    pub assists: u64,
    pub hero_damage: f64,
    pub hero_healed: f64,
    pub damage_taken: f64,
    pub heroes: Vec<HeroBreakdown>,
}

impl MatchPlayerRecord {
    /// The dedup key of this record
    pub fn key(&self) -> (&str, &str) {
        (&self.match_uid, &self.player_uid)
    }
}

/// A resolved match: its summary plus one record per distinct player
#[derive(Debug, Clone, PartialEq)]
pub struct MatchDetail {
    pub summary: MatchSummary,
    pub players: Vec<MatchPlayerRecord>,
}
