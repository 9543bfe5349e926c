//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the history database.
//! Every record table carries a unique constraint on its dedup key so that
//! `INSERT OR IGNORE` makes appends idempotent.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Leaderboard snapshots, one row per player per capture
CREATE TABLE IF NOT EXISTS leaderboard (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    captured_at TEXT NOT NULL,
    rank INTEGER NOT NULL,
    player_name TEXT NOT NULL,
    rank_name TEXT NOT NULL,
    score REAL NOT NULL,
    matches INTEGER NOT NULL,
    player_id TEXT NOT NULL,
    rank_score REAL,
    run_id INTEGER REFERENCES runs(id),
    UNIQUE(captured_at, player_id)
);

CREATE INDEX IF NOT EXISTS idx_leaderboard_player ON leaderboard(player_id);

-- Players met as teammates, merged across observations
CREATE TABLE IF NOT EXISTS encountered_players (
    player_uid TEXT PRIMARY KEY,
    player_name TEXT NOT NULL,
    highest_score REAL NOT NULL,
    latest_score REAL NOT NULL,
    matches INTEGER NOT NULL,
    wins INTEGER NOT NULL,
    observations INTEGER NOT NULL DEFAULT 1,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL
);

-- Match identity
CREATE TABLE IF NOT EXISTS matches (
    match_uid TEXT PRIMARY KEY,
    replay_id TEXT,
    gamemode TEXT,
    recorded_at TEXT NOT NULL,
    run_id INTEGER REFERENCES runs(id)
);

-- One line per player per match
CREATE TABLE IF NOT EXISTS match_players (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    match_uid TEXT NOT NULL,
    player_uid TEXT NOT NULL,
    name TEXT,
    hero_id TEXT,
    is_win INTEGER NOT NULL,
    kills INTEGER NOT NULL,
    deaths INTEGER NOT NULL,
    assists INTEGER NOT NULL,
    hero_damage REAL NOT NULL,
    hero_healed REAL NOT NULL,
    damage_taken REAL NOT NULL,
    run_id INTEGER REFERENCES runs(id),
    UNIQUE(match_uid, player_uid)
);

CREATE INDEX IF NOT EXISTS idx_match_players_player ON match_players(player_uid);

-- Per-hero breakdown of a match line
CREATE TABLE IF NOT EXISTS match_player_heroes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    match_uid TEXT NOT NULL,
    player_uid TEXT NOT NULL,
    hero_id TEXT NOT NULL,
    play_time REAL NOT NULL,
    kills INTEGER NOT NULL,
    deaths INTEGER NOT NULL,
    assists INTEGER NOT NULL,
    hero_damage REAL NOT NULL,
    hero_healed REAL NOT NULL,
    damage_taken REAL NOT NULL,
    UNIQUE(match_uid, player_uid, hero_id)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
