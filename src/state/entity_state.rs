/// Entity outcome definitions for tracking crawl progress
///
/// An entity is queued once the ledger claims it and is in flight while a
/// worker holds a scheduler permit for it. Every claimed player or match
/// ends in exactly one of these states.
use std::fmt;

/// Final state of a claimed entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    // ===== Success States =====
    /// Fetched, parsed and handed to the sink
    Resolved,

    /// Profile is private or refused by the API; recorded with sentinels
    Private,

    // ===== Error States =====
    /// Fetch or parse failed after the retry policy gave up
    Failed,

    /// Dropped because the run deadline passed
    Abandoned,
}

impl EntityState {
    /// Returns the state's name as used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Private => "private",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
