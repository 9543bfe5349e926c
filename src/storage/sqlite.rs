//! SQLite storage implementation
//!
//! This module provides a SQLite-backed [`RecordSink`] plus the read queries
//! used for history statistics.

use crate::model::{
    EncounteredPlayer, LeaderboardEntry, LeaderboardRow, MatchDetail, MatchPlayerRecord,
    MatchSummary, PlayerObservation,
};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{MatchAppend, RecordSink, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// Row counts per history table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryCounts {
    pub runs: u64,
    pub leaderboard_rows: u64,
    pub encountered_players: u64,
    pub matches: u64,
    pub match_players: u64,
    pub match_player_heroes: u64,
}

/// SQLite history sink
pub struct SqliteSink {
    conn: Connection,
    active_run: Option<i64>,
}

impl SqliteSink {
    /// Opens or creates the database at `path`, creating parent directories
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn,
            active_run: None,
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            active_run: None,
        })
    }

    /// The run appends are currently attributed to
    pub fn active_run(&self) -> Option<i64> {
        self.active_run
    }

    fn require_run(&self) -> StorageResult<i64> {
        self.active_run.ok_or(StorageError::NoActiveRun)
    }

    // ===== Runs =====

    pub fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                map_run,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    pub fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                map_run,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Reads =====

    pub fn history_counts(&self) -> StorageResult<HistoryCounts> {
        Ok(HistoryCounts {
            runs: self.count("SELECT COUNT(*) FROM runs")?,
            leaderboard_rows: self.count("SELECT COUNT(*) FROM leaderboard")?,
            encountered_players: self.count("SELECT COUNT(*) FROM encountered_players")?,
            matches: self.count("SELECT COUNT(*) FROM matches")?,
            match_players: self.count("SELECT COUNT(*) FROM match_players")?,
            match_player_heroes: self.count("SELECT COUNT(*) FROM match_player_heroes")?,
        })
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn encountered_player(&self, player_uid: &str) -> StorageResult<Option<EncounteredPlayer>> {
        let player = self
            .conn
            .query_row(
                "SELECT player_uid, player_name, highest_score, latest_score, matches, wins, observations
                 FROM encountered_players WHERE player_uid = ?1",
                params![player_uid],
                map_encountered,
            )
            .optional()?;
        Ok(player)
    }

    /// Encountered players ordered by highest score, best first
    pub fn top_encountered(&self, limit: usize) -> StorageResult<Vec<EncounteredPlayer>> {
        let mut stmt = self.conn.prepare(
            "SELECT player_uid, player_name, highest_score, latest_score, matches, wins, observations
             FROM encountered_players ORDER BY highest_score DESC, player_uid LIMIT ?1",
        )?;
        let players = stmt
            .query_map(params![limit as i64], map_encountered)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(players)
    }

    /// Leaderboard rows captured at `captured_at`, in rank order
    pub fn leaderboard_rows(&self, captured_at: &str) -> StorageResult<Vec<LeaderboardRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT captured_at, rank, player_name, rank_name, score, matches, player_id, rank_score
             FROM leaderboard WHERE captured_at = ?1 ORDER BY rank, player_id",
        )?;
        let rows = stmt
            .query_map(params![captured_at], |row| {
                Ok(LeaderboardRow {
                    captured_at: row.get(0)?,
                    entry: LeaderboardEntry {
                        rank: row.get::<_, i64>(1)? as u32,
                        player_name: row.get(2)?,
                        rank_name: row.get(3)?,
                        score: row.get(4)?,
                        matches: row.get::<_, i64>(5)? as u64,
                        player_id: row.get(6)?,
                    },
                    rank_score: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Distinct capture timestamps, newest first
    pub fn captures(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT captured_at FROM leaderboard ORDER BY captured_at DESC")?;
        let captures = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(captures)
    }
}

impl RecordSink for SqliteSink {
    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        let run_id = self.conn.last_insert_rowid();
        self.active_run = Some(run_id);
        Ok(run_id)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        if self.active_run == Some(run_id) {
            self.active_run = None;
        }
        Ok(())
    }

    fn append_leaderboard_row(&mut self, row: &LeaderboardRow) -> StorageResult<bool> {
        let run_id = self.require_run()?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO leaderboard
             (captured_at, rank, player_name, rank_name, score, matches, player_id, rank_score, run_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.captured_at,
                row.entry.rank as i64,
                row.entry.player_name,
                row.entry.rank_name,
                row.entry.score,
                row.entry.matches as i64,
                row.entry.player_id,
                row.rank_score,
                run_id
            ],
        )?;
        Ok(inserted > 0)
    }

    fn append_match_summary(&mut self, summary: &MatchSummary) -> StorageResult<bool> {
        let run_id = self.require_run()?;
        insert_match_summary(&self.conn, summary, run_id)
    }

    fn append_match_player_record(&mut self, record: &MatchPlayerRecord) -> StorageResult<bool> {
        let run_id = self.require_run()?;
        let tx = self.conn.transaction()?;
        let inserted = insert_match_player(&tx, record, run_id)?;
        tx.commit()?;
        Ok(inserted)
    }

    fn append_match(&mut self, detail: &MatchDetail) -> StorageResult<MatchAppend> {
        let run_id = self.require_run()?;
        let tx = self.conn.transaction()?;

        let mut outcome = MatchAppend::default();
        for record in &detail.players {
            if insert_match_player(&tx, record, run_id)? {
                outcome.players_inserted += 1;
            } else {
                outcome.players_skipped += 1;
            }
        }
        outcome.summary_inserted = insert_match_summary(&tx, &detail.summary, run_id)?;

        // Dropping the transaction on any error above rolls the match back
        tx.commit()?;
        Ok(outcome)
    }

    fn upsert_encountered_player(
        &mut self,
        player_uid: &str,
        observation: &PlayerObservation,
    ) -> StorageResult<EncounteredPlayer> {
        self.require_run()?;
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        let existing = tx
            .query_row(
                "SELECT player_uid, player_name, highest_score, latest_score, matches, wins, observations
                 FROM encountered_players WHERE player_uid = ?1",
                params![player_uid],
                map_encountered,
            )
            .optional()?;

        let merged = match existing {
            Some(mut player) => {
                player.observe(observation);
                player
            }
            None => EncounteredPlayer::first_seen(player_uid, observation),
        };

        tx.execute(
            "INSERT INTO encountered_players
             (player_uid, player_name, highest_score, latest_score, matches, wins, observations,
              first_seen_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(player_uid) DO UPDATE SET
                player_name = excluded.player_name,
                highest_score = excluded.highest_score,
                latest_score = excluded.latest_score,
                matches = excluded.matches,
                wins = excluded.wins,
                observations = excluded.observations,
                last_seen_at = excluded.last_seen_at",
            params![
                merged.player_uid,
                merged.player_name,
                merged.highest_score,
                merged.latest_score,
                merged.matches as i64,
                merged.wins as i64,
                merged.observations as i64,
                now
            ],
        )?;

        tx.commit()?;
        Ok(merged)
    }

    fn seen_match_ids(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT match_uid FROM matches")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

fn map_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
    })
}

fn map_encountered(row: &Row<'_>) -> rusqlite::Result<EncounteredPlayer> {
    Ok(EncounteredPlayer {
        player_uid: row.get(0)?,
        player_name: row.get(1)?,
        highest_score: row.get(2)?,
        latest_score: row.get(3)?,
        matches: row.get::<_, i64>(4)? as u64,
        wins: row.get::<_, i64>(5)? as u64,
        observations: row.get::<_, i64>(6)? as u32,
    })
}

fn insert_match_summary(
    conn: &Connection,
    summary: &MatchSummary,
    run_id: i64,
) -> StorageResult<bool> {
    let now = Utc::now().to_rfc3339();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO matches (match_uid, replay_id, gamemode, recorded_at, run_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            summary.match_uid,
            summary.replay_id,
            summary.gamemode,
            now,
            run_id
        ],
    )?;
    Ok(inserted > 0)
}

/// Inserts one match line and, when it is new, its hero breakdown
fn insert_match_player(
    conn: &Connection,
    record: &MatchPlayerRecord,
    run_id: i64,
) -> StorageResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO match_players
         (match_uid, player_uid, name, hero_id, is_win, kills, deaths, assists,
          hero_damage, hero_healed, damage_taken, run_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            record.match_uid,
            record.player_uid,
            record.name,
            record.hero_id,
            record.is_win,
            record.kills as i64,
            record.deaths as i64,
            record.assists as i64,
            record.hero_damage,
            record.hero_healed,
            record.damage_taken,
            run_id
        ],
    )? > 0;

    if inserted {
        for hero in &record.heroes {
            conn.execute(
                "INSERT OR IGNORE INTO match_player_heroes
                 (match_uid, player_uid, hero_id, play_time, kills, deaths, assists,
                  hero_damage, hero_healed, damage_taken)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.match_uid,
                    record.player_uid,
                    hero.hero_id,
                    hero.play_time,
                    hero.kills as i64,
                    hero.deaths as i64,
                    hero.assists as i64,
                    hero.hero_damage,
                    hero.hero_healed,
                    hero.damage_taken
                ],
            )?;
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HeroBreakdown;

    fn entry(player_id: &str, rank: u32) -> LeaderboardEntry {
        LeaderboardEntry {
            rank,
            player_name: format!("player-{}", player_id),
            rank_name: "Celestial".to_string(),
            score: 5000.0 - rank as f64,
            matches: 200,
            player_id: player_id.to_string(),
        }
    }

    fn obs(score: f64) -> PlayerObservation {
        PlayerObservation {
            player_name: "Loki Enjoyer".to_string(),
            score,
            matches: 50,
            wins: 30,
        }
    }

    fn record(match_uid: &str, player_uid: &str) -> MatchPlayerRecord {
        MatchPlayerRecord {
            match_uid: match_uid.to_string(),
            player_uid: player_uid.to_string(),
            name: Some("Alpha".to_string()),
            hero_id: Some("1011".to_string()),
            is_win: true,
            kills: 10,
            deaths: 2,
            assists: 7,
            hero_damage: 12000.0,
            hero_healed: 0.0,
            damage_taken: 8000.0,
            heroes: vec![HeroBreakdown {
                hero_id: "1011".to_string(),
                play_time: 540.0,
                kills: 10,
                deaths: 2,
                assists: 7,
                hero_damage: 12000.0,
                hero_healed: 0.0,
                damage_taken: 8000.0,
            }],
        }
    }

    #[test]
    fn test_run_lifecycle() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let run_id = sink.begin_run("abc123").unwrap();
        assert!(run_id > 0);
        assert_eq!(sink.active_run(), Some(run_id));

        let run = sink.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.config_hash, "abc123");
        assert!(run.finished_at.is_none());

        sink.finish_run(run_id, RunStatus::Completed).unwrap();
        let run = sink.latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
        assert!(sink.active_run().is_none());
    }

    #[test]
    fn test_finish_unknown_run() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        assert!(matches!(
            sink.finish_run(99, RunStatus::Failed),
            Err(StorageError::RunNotFound(99))
        ));
    }

    #[test]
    fn test_append_requires_run() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let row = LeaderboardRow::new("2025-01-01T00:00:00Z", entry("1", 1), None);
        assert!(matches!(
            sink.append_leaderboard_row(&row),
            Err(StorageError::NoActiveRun)
        ));
    }

    #[test]
    fn test_leaderboard_rows_are_idempotent() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        sink.begin_run("h").unwrap();

        let row = LeaderboardRow::new("2025-01-01T00:00:00Z", entry("1", 1), Some(4200.0));
        assert!(sink.append_leaderboard_row(&row).unwrap());
        assert!(!sink.append_leaderboard_row(&row).unwrap());

        let private = LeaderboardRow::new("2025-01-01T00:00:00Z", entry("2", 2), None);
        assert!(sink.append_leaderboard_row(&private).unwrap());

        let rows = sink.leaderboard_rows("2025-01-01T00:00:00Z").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], row);
        assert_eq!(rows[1].rank_score_display(), "N/A");
        assert_eq!(sink.captures().unwrap(), vec!["2025-01-01T00:00:00Z"]);
    }

    #[test]
    fn test_match_records_are_idempotent() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        sink.begin_run("h").unwrap();

        let summary = MatchSummary {
            match_uid: "m-1".to_string(),
            replay_id: Some("r-1".to_string()),
            gamemode: Some("2".to_string()),
        };
        assert!(sink.append_match_summary(&summary).unwrap());
        assert!(!sink.append_match_summary(&summary).unwrap());

        assert!(sink.append_match_player_record(&record("m-1", "1001")).unwrap());
        assert!(!sink.append_match_player_record(&record("m-1", "1001")).unwrap());
        assert!(sink.append_match_player_record(&record("m-1", "2002")).unwrap());

        let counts = sink.history_counts().unwrap();
        assert_eq!(counts.matches, 1);
        assert_eq!(counts.match_players, 2);
        assert_eq!(counts.match_player_heroes, 2);

        let play_time: f64 = sink
            .conn
            .query_row(
                "SELECT play_time FROM match_player_heroes WHERE match_uid = 'm-1' AND player_uid = '1001'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(play_time, 540.0);

        assert_eq!(sink.seen_match_ids().unwrap(), vec!["m-1"]);
    }

    #[test]
    fn test_upsert_keeps_highest_and_latest() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        sink.begin_run("h").unwrap();

        for score in [50.0, 30.0, 70.0, 60.0] {
            sink.upsert_encountered_player("2002", &obs(score)).unwrap();
        }

        let player = sink.encountered_player("2002").unwrap().unwrap();
        assert_eq!(player.highest_score, 70.0);
        assert_eq!(player.latest_score, 60.0);
        assert_eq!(player.observations, 4);
        assert!(sink.encountered_player("404").unwrap().is_none());
    }

    #[test]
    fn test_top_encountered_ordering() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        sink.begin_run("h").unwrap();
        sink.upsert_encountered_player("a", &obs(10.0)).unwrap();
        sink.upsert_encountered_player("b", &obs(30.0)).unwrap();
        sink.upsert_encountered_player("c", &obs(20.0)).unwrap();

        let top: Vec<String> = sink
            .top_encountered(2)
            .unwrap()
            .into_iter()
            .map(|p| p.player_uid)
            .collect();
        assert_eq!(top, vec!["b", "c"]);
    }

    fn detail(match_uid: &str, players: &[&str]) -> MatchDetail {
        MatchDetail {
            summary: MatchSummary {
                match_uid: match_uid.to_string(),
                replay_id: Some("r-1".to_string()),
                gamemode: Some("2".to_string()),
            },
            players: players.iter().map(|p| record(match_uid, p)).collect(),
        }
    }

    #[test]
    fn test_append_match_writes_summary_and_players() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        sink.begin_run("h").unwrap();

        let outcome = sink.append_match(&detail("m-1", &["1001", "2002"])).unwrap();
        assert_eq!(
            outcome,
            MatchAppend {
                summary_inserted: true,
                players_inserted: 2,
                players_skipped: 0,
            }
        );

        let again = sink.append_match(&detail("m-1", &["1001", "2002"])).unwrap();
        assert!(!again.summary_inserted);
        assert_eq!(again.players_skipped, 2);

        let counts = sink.history_counts().unwrap();
        assert_eq!(counts.matches, 1);
        assert_eq!(counts.match_players, 2);
        assert_eq!(counts.match_player_heroes, 2);
    }

    #[test]
    fn test_append_match_rolls_back_on_failure() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        sink.begin_run("h").unwrap();
        sink.conn
            .execute_batch(
                "CREATE TRIGGER reject_player BEFORE INSERT ON match_players
                 WHEN NEW.player_uid = '2002'
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let result = sink.append_match(&detail("m-1", &["1001", "2002"]));
        assert!(result.is_err());

        let counts = sink.history_counts().unwrap();
        assert_eq!(counts.matches, 0);
        assert_eq!(counts.match_players, 0);
        assert_eq!(counts.match_player_heroes, 0);
        assert!(sink.seen_match_ids().unwrap().is_empty());
    }

    #[test]
    fn test_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");

        {
            let mut sink = SqliteSink::new(&path).unwrap();
            let run_id = sink.begin_run("h").unwrap();
            sink.append_match_summary(&MatchSummary {
                match_uid: "m-7".to_string(),
                replay_id: None,
                gamemode: None,
            })
            .unwrap();
            sink.finish_run(run_id, RunStatus::Completed).unwrap();
        }

        let sink = SqliteSink::new(&path).unwrap();
        assert_eq!(sink.seen_match_ids().unwrap(), vec!["m-7"]);
        assert_eq!(sink.history_counts().unwrap().runs, 1);
    }
}
