//! Storage traits and error types
//!
//! This module defines the sink interface the crawl core writes through and
//! the associated error types.

use crate::model::{
    EncounteredPlayer, LeaderboardRow, MatchDetail, MatchPlayerRecord, MatchSummary,
    PlayerObservation,
};
use crate::storage::RunStatus;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("No run is active")]
    NoActiveRun,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// What [`RecordSink::append_match`] wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchAppend {
    pub summary_inserted: bool,
    pub players_inserted: u64,
    pub players_skipped: u64,
}

/// Destination for resolved crawl records
///
/// Appends are idempotent on each record's dedup key and report whether the
/// record was new. Implementations are used from one thread at a time; the
/// coordinator serializes access behind a mutex.
pub trait RecordSink: Send {
    // ===== Run Management =====

    /// Opens a run; subsequent appends are attributed to it
    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Closes a run with its final status and a finish timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Records =====

    /// Appends a leaderboard row; keyed by (captured_at, player_id)
    fn append_leaderboard_row(&mut self, row: &LeaderboardRow) -> StorageResult<bool>;

    /// Appends a match summary; keyed by match_uid
    fn append_match_summary(&mut self, summary: &MatchSummary) -> StorageResult<bool>;

    /// Appends a match-player line and its hero breakdown; keyed by
    /// (match_uid, player_uid)
    fn append_match_player_record(&mut self, record: &MatchPlayerRecord) -> StorageResult<bool>;

    /// Appends a whole match: its player lines, then its summary
    ///
    /// The summary row is what marks a match as recorded in
    /// [`seen_match_ids`](Self::seen_match_ids), so it is written last. A
    /// failure part-way leaves the match unrecorded and it is fetched again
    /// on the next run. Transactional stores override this to write all of
    /// it or nothing.
    fn append_match(&mut self, detail: &MatchDetail) -> StorageResult<MatchAppend> {
        let mut outcome = MatchAppend::default();
        for record in &detail.players {
            if self.append_match_player_record(record)? {
                outcome.players_inserted += 1;
            } else {
                outcome.players_skipped += 1;
            }
        }
        outcome.summary_inserted = self.append_match_summary(&detail.summary)?;
        Ok(outcome)
    }

    /// Merges an observation into the encountered-player history
    ///
    /// `highest_score` never decreases; name, latest score, matches and wins
    /// follow the newest observation. Returns the merged row.
    fn upsert_encountered_player(
        &mut self,
        player_uid: &str,
        observation: &PlayerObservation,
    ) -> StorageResult<EncounteredPlayer>;

    // ===== History =====

    /// Every match uid already recorded, for seeding the dedup ledger
    fn seen_match_ids(&self) -> StorageResult<Vec<String>>;
}
