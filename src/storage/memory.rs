//! In-memory record sink
//!
//! Same dedup and merge semantics as the SQLite sink, without a database.
//! Used by tests and by callers that want to inspect a run's output
//! directly.

use crate::model::{
    EncounteredPlayer, LeaderboardRow, MatchPlayerRecord, MatchSummary, PlayerObservation,
};
use crate::storage::traits::{RecordSink, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Default)]
pub struct MemorySink {
    runs: Vec<RunRecord>,
    active_run: Option<i64>,
    leaderboard: Vec<LeaderboardRow>,
    leaderboard_keys: HashSet<(String, String)>,
    matches: Vec<MatchSummary>,
    match_keys: HashSet<String>,
    match_players: Vec<MatchPlayerRecord>,
    match_player_keys: HashSet<(String, String)>,
    encountered: BTreeMap<String, EncounteredPlayer>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose history already contains the given match uids
    pub fn with_matches<I>(match_uids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut sink = Self::default();
        for uid in match_uids {
            let uid = uid.into();
            if sink.match_keys.insert(uid.clone()) {
                sink.matches.push(MatchSummary {
                    match_uid: uid,
                    replay_id: None,
                    gamemode: None,
                });
            }
        }
        sink
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    pub fn leaderboard_rows(&self) -> &[LeaderboardRow] {
        &self.leaderboard
    }

    pub fn match_summaries(&self) -> &[MatchSummary] {
        &self.matches
    }

    pub fn match_player_records(&self) -> &[MatchPlayerRecord] {
        &self.match_players
    }

    pub fn encountered_player(&self, player_uid: &str) -> Option<&EncounteredPlayer> {
        self.encountered.get(player_uid)
    }

    /// Encountered players ordered by uid
    pub fn encountered_players(&self) -> Vec<&EncounteredPlayer> {
        self.encountered.values().collect()
    }

    fn require_run(&self) -> StorageResult<i64> {
        self.active_run.ok_or(StorageError::NoActiveRun)
    }
}

impl RecordSink for MemorySink {
    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let id = self.runs.len() as i64 + 1;
        self.runs.push(RunRecord {
            id,
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
            config_hash: config_hash.to_string(),
            status: RunStatus::Running,
        });
        self.active_run = Some(id);
        Ok(id)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let run = self
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or(StorageError::RunNotFound(run_id))?;
        run.status = status;
        run.finished_at = Some(Utc::now().to_rfc3339());
        if self.active_run == Some(run_id) {
            self.active_run = None;
        }
        Ok(())
    }

    fn append_leaderboard_row(&mut self, row: &LeaderboardRow) -> StorageResult<bool> {
        self.require_run()?;
        let key = (row.captured_at.clone(), row.entry.player_id.clone());
        if !self.leaderboard_keys.insert(key) {
            return Ok(false);
        }
        self.leaderboard.push(row.clone());
        Ok(true)
    }

    fn append_match_summary(&mut self, summary: &MatchSummary) -> StorageResult<bool> {
        self.require_run()?;
        if !self.match_keys.insert(summary.match_uid.clone()) {
            return Ok(false);
        }
        self.matches.push(summary.clone());
        Ok(true)
    }

    fn append_match_player_record(&mut self, record: &MatchPlayerRecord) -> StorageResult<bool> {
        self.require_run()?;
        let key = (record.match_uid.clone(), record.player_uid.clone());
        if !self.match_player_keys.insert(key) {
            return Ok(false);
        }
        self.match_players.push(record.clone());
        Ok(true)
    }

    fn upsert_encountered_player(
        &mut self,
        player_uid: &str,
        observation: &PlayerObservation,
    ) -> StorageResult<EncounteredPlayer> {
        self.require_run()?;
        let merged = self
            .encountered
            .entry(player_uid.to_string())
            .and_modify(|p| p.observe(observation))
            .or_insert_with(|| EncounteredPlayer::first_seen(player_uid, observation));
        Ok(merged.clone())
    }

    fn seen_match_ids(&self) -> StorageResult<Vec<String>> {
        Ok(self.matches.iter().map(|m| m.match_uid.clone()).collect())
    }
}
