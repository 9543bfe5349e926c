//! API payload parsing
//!
//! Turns decoded JSON bodies into model records. The upstream API is loose
//! about scalar types (ids arrive as strings or numbers, counts as floats or
//! strings), so raw payloads are read as [`serde_json::Value`] leaves and
//! coerced here.

use crate::model::{
    HeroBreakdown, LeaderboardEntry, MatchDetail, MatchPlayerRecord, MatchSummary, PlayerProfile,
};
use crate::ParseError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct RawLeaderboardEntry {
    #[serde(default)]
    rank: Option<Value>,
    #[serde(default, alias = "name")]
    player_name: Option<Value>,
    #[serde(default)]
    rank_name: Option<Value>,
    #[serde(default)]
    score: Option<Value>,
    #[serde(default)]
    matches: Option<Value>,
    #[serde(default, alias = "player_uid")]
    player_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawPlayer {
    #[serde(default, alias = "name")]
    player_name: Option<Value>,
    #[serde(default)]
    stats: Option<RawStats>,
    #[serde(default, deserialize_with = "null_as_default")]
    teammates: Vec<RawPlayerRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    match_history: Vec<RawMatchRef>,
}

#[derive(Debug, Deserialize)]
struct RawStats {
    #[serde(default)]
    rank: Option<RawRank>,
    #[serde(default)]
    total_matches: Option<Value>,
    #[serde(default)]
    total_wins: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawRank {
    #[serde(default)]
    score: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawPlayerRef {
    #[serde(default)]
    player_uid: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawMatchRef {
    #[serde(default)]
    match_uid: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    #[serde(default)]
    match_uid: Option<Value>,
    #[serde(default)]
    replay_id: Option<Value>,
    #[serde(default, alias = "game_mode", alias = "game_mode_id")]
    gamemode: Option<Value>,
    #[serde(default, alias = "players", deserialize_with = "null_as_default")]
    match_players: Vec<RawMatchPlayer>,
}

#[derive(Debug, Deserialize)]
struct RawMatchPlayer {
    #[serde(default)]
    player_uid: Option<Value>,
    #[serde(default, alias = "nick_name", alias = "player_name")]
    name: Option<Value>,
    #[serde(default, alias = "cur_hero_id")]
    hero_id: Option<Value>,
    #[serde(default)]
    is_win: Option<Value>,
    #[serde(default)]
    kills: Option<Value>,
    #[serde(default)]
    deaths: Option<Value>,
    #[serde(default)]
    assists: Option<Value>,
    #[serde(default, alias = "total_hero_damage")]
    hero_damage: Option<Value>,
    #[serde(default, alias = "total_hero_heal")]
    hero_healed: Option<Value>,
    #[serde(default, alias = "total_damage_taken")]
    damage_taken: Option<Value>,
    #[serde(default, alias = "player_heroes", deserialize_with = "null_as_default")]
    heroes: Vec<RawHero>,
}

#[derive(Debug, Deserialize)]
struct RawHero {
    #[serde(default)]
    hero_id: Option<Value>,
    #[serde(default)]
    play_time: Option<Value>,
    #[serde(default)]
    kills: Option<Value>,
    #[serde(default)]
    deaths: Option<Value>,
    #[serde(default)]
    assists: Option<Value>,
    #[serde(default, alias = "total_hero_damage")]
    hero_damage: Option<Value>,
    #[serde(default, alias = "total_hero_heal")]
    hero_healed: Option<Value>,
    #[serde(default, alias = "total_damage_taken")]
    damage_taken: Option<Value>,
}

/// Parses the leaderboard listing into ordered entries
///
/// Accepts a top-level array or an object wrapping it under `players`,
/// `leaderboard`, or `data`. Entries without a player id are skipped.
pub fn parse_leaderboard(body: Value) -> Result<Vec<LeaderboardEntry>, ParseError> {
    let list = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => ["players", "leaderboard", "data"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| ParseError::Shape {
                entity: "leaderboard",
                message: "object without a player list".to_string(),
            })?,
        other => {
            return Err(ParseError::Shape {
                entity: "leaderboard",
                message: format!("expected a list, got {}", type_name(&other)),
            })
        }
    };

    let mut entries = Vec::with_capacity(list.len());
    for (position, item) in list.into_iter().enumerate() {
        let raw: RawLeaderboardEntry = decode("leaderboard", item)?;

        let Some(player_id) = raw.player_id.as_ref().and_then(text) else {
            warn!("Skipping leaderboard entry {} without a player id", position + 1);
            continue;
        };

        entries.push(LeaderboardEntry {
            rank: raw
                .rank
                .as_ref()
                .and_then(count)
                .and_then(|r| u32::try_from(r).ok())
                .unwrap_or_else(|| u32::try_from(position + 1).unwrap_or(u32::MAX)),
            player_name: raw.player_name.as_ref().and_then(text).unwrap_or_default(),
            rank_name: raw.rank_name.as_ref().and_then(text).unwrap_or_default(),
            score: raw.score.as_ref().and_then(number).unwrap_or(0.0),
            matches: raw.matches.as_ref().and_then(count).unwrap_or(0),
            player_id,
        });
    }

    Ok(entries)
}

/// Parses a player detail document
///
/// A missing `is_profile_private` flag counts as private. Private profiles
/// collapse to [`PlayerProfile::private`].
pub fn parse_player(player_id: &str, body: Value) -> Result<PlayerProfile, ParseError> {
    if !body.is_object() {
        return Err(ParseError::Shape {
            entity: "player",
            message: format!("expected an object, got {}", type_name(&body)),
        });
    }

    // Privacy is decided before the rest of the body is decoded; private
    // profiles may carry any shape in their stat fields
    let is_private = body
        .get("is_profile_private")
        .and_then(flag)
        .unwrap_or(true);
    if is_private {
        debug!("Player {} has a private profile", player_id);
        let display_name = body
            .get("player_name")
            .or_else(|| body.get("name"))
            .and_then(text);
        return Ok(PlayerProfile::private(player_id, display_name));
    }

    let raw: RawPlayer = decode("player", body)?;
    let display_name = raw.player_name.as_ref().and_then(text);

    let (rank_score, total_matches, total_wins) = match raw.stats {
        Some(stats) => (
            stats
                .rank
                .and_then(|rank| rank.score)
                .as_ref()
                .and_then(number),
            stats.total_matches.as_ref().and_then(count),
            stats.total_wins.as_ref().and_then(count),
        ),
        None => (None, None, None),
    };

    let teammate_refs = raw
        .teammates
        .iter()
        .filter_map(|t| t.player_uid.as_ref().and_then(text))
        .filter(|uid| uid != player_id)
        .collect();

    let match_refs = raw
        .match_history
        .iter()
        .filter_map(|m| m.match_uid.as_ref().and_then(text))
        .collect();

    Ok(PlayerProfile {
        player_id: player_id.to_string(),
        display_name: display_name.unwrap_or_else(|| player_id.to_string()),
        is_private: false,
        rank_score,
        total_matches,
        total_wins,
        teammate_refs,
        match_refs,
    })
}

/// Parses a match detail document
///
/// The document may be the match itself or wrap it under `match_details`.
/// Player lines are unique by player uid; later duplicates are dropped.
pub fn parse_match(match_id: &str, body: Value) -> Result<MatchDetail, ParseError> {
    let body = match body {
        Value::Object(mut map) => match map.remove("match_details") {
            Some(inner @ Value::Object(_)) => inner,
            Some(_) | None => Value::Object(map),
        },
        other => {
            return Err(ParseError::Shape {
                entity: "match",
                message: format!("expected an object, got {}", type_name(&other)),
            })
        }
    };

    let raw: RawMatch = decode("match", body)?;

    // Records are keyed by the id that was claimed and requested
    let match_uid = match_id.to_string();
    if let Some(reported) = raw.match_uid.as_ref().and_then(text) {
        if reported != match_uid {
            warn!("Match {} reported uid {}, keeping {}", match_id, reported, match_uid);
        }
    }

    let mut seen = HashSet::new();
    let mut players = Vec::with_capacity(raw.match_players.len());
    for line in raw.match_players {
        let Some(player_uid) = line.player_uid.as_ref().and_then(text) else {
            debug!("Skipping player line without uid in match {}", match_uid);
            continue;
        };
        if !seen.insert(player_uid.clone()) {
            debug!("Duplicate player {} in match {}", player_uid, match_uid);
            continue;
        }

        players.push(MatchPlayerRecord {
            match_uid: match_uid.clone(),
            player_uid,
            name: line.name.as_ref().and_then(text),
            hero_id: line.hero_id.as_ref().and_then(text),
            is_win: line.is_win.as_ref().and_then(flag).unwrap_or(false),
            kills: line.kills.as_ref().and_then(count).unwrap_or(0),
            deaths: line.deaths.as_ref().and_then(count).unwrap_or(0),
            assists: line.assists.as_ref().and_then(count).unwrap_or(0),
            hero_damage: line.hero_damage.as_ref().and_then(number).unwrap_or(0.0),
            hero_healed: line.hero_healed.as_ref().and_then(number).unwrap_or(0.0),
            damage_taken: line.damage_taken.as_ref().and_then(number).unwrap_or(0.0),
            heroes: line.heroes.iter().filter_map(hero_breakdown).collect(),
        });
    }

    Ok(MatchDetail {
        summary: MatchSummary {
            match_uid,
            replay_id: raw.replay_id.as_ref().and_then(text),
            gamemode: raw.gamemode.as_ref().and_then(text),
        },
        players,
    })
}

fn hero_breakdown(raw: &RawHero) -> Option<HeroBreakdown> {
    Some(HeroBreakdown {
        hero_id: raw.hero_id.as_ref().and_then(text)?,
        play_time: raw.play_time.as_ref().and_then(number).unwrap_or(0.0),
        kills: raw.kills.as_ref().and_then(count).unwrap_or(0),
        deaths: raw.deaths.as_ref().and_then(count).unwrap_or(0),
        assists: raw.assists.as_ref().and_then(count).unwrap_or(0),
        hero_damage: raw.hero_damage.as_ref().and_then(number).unwrap_or(0.0),
        hero_healed: raw.hero_healed.as_ref().and_then(number).unwrap_or(0.0),
        damage_taken: raw.damage_taken.as_ref().and_then(number).unwrap_or(0.0),
    })
}

/// Reads `null` as the type's default, for lists the API sometimes nulls out
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn decode<T: DeserializeOwned>(entity: &'static str, value: Value) -> Result<T, ParseError> {
    serde_json::from_value(value).map_err(|source| ParseError::Json { entity, source })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Identifier or label; numbers are rendered without a fraction when integral
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
