//! Storage module for persisting crawl history
//!
//! This module handles all history persistence for the crawler, including:
//! - SQLite database initialization and schema management
//! - Append-only record tables deduplicated on their natural keys
//! - The encountered-player highest/latest merge
//! - Run tracking
//!
//! The crawl core only sees the [`RecordSink`] trait; [`SqliteSink`] and
//! [`MemorySink`] implement it.

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemorySink;
pub use sqlite::{HistoryCounts, SqliteSink};
pub use traits::{MatchAppend, RecordSink, StorageError, StorageResult};

use std::path::Path;

/// Opens or creates the history database at `path`
pub fn open_history(path: &Path) -> StorageResult<SqliteSink> {
    SqliteSink::new(path)
}

/// Represents a crawl run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    /// The run deadline passed with work still queued
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_string())
    }
}
