//! Per-run counters and the end-of-run report

use crate::state::{EntityKind, EntityState};
use crate::storage::RunStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters updated by workers while a run is in progress
#[derive(Debug, Default)]
pub struct CrawlReport {
    seeds: AtomicU64,
    players_resolved: AtomicU64,
    private_players: AtomicU64,
    matches_resolved: AtomicU64,
    leaderboard_rows: AtomicU64,
    teammates_recorded: AtomicU64,
    matches_recorded: AtomicU64,
    match_player_rows: AtomicU64,
    entities_failed: AtomicU64,
    entities_abandoned: AtomicU64,
    duplicates_skipped: AtomicU64,
}

impl CrawlReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_seed(&self) {
        self.seeds.fetch_add(1, Ordering::Relaxed);
    }

    /// Tallies one entity reaching a terminal state
    pub fn record_outcome(&self, kind: EntityKind, state: EntityState) {
        let counter = match (kind, state) {
            (EntityKind::Player, EntityState::Resolved) => &self.players_resolved,
            (EntityKind::Player, EntityState::Private) => &self.private_players,
            (EntityKind::Match, EntityState::Resolved | EntityState::Private) => {
                &self.matches_resolved
            }
            (_, EntityState::Failed) => return self.record_failure(),
            (_, EntityState::Abandoned) => &self.entities_abandoned,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// An entity that failed outside the normal outcome path
    pub fn record_failure(&self) {
        self.entities_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_leaderboard_row(&self, inserted: bool) {
        self.tally(&self.leaderboard_rows, inserted);
    }

    pub fn record_teammate(&self) {
        self.teammates_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match_summary(&self, inserted: bool) {
        self.tally(&self.matches_recorded, inserted);
    }

    /// Tallies the player lines of one match append
    pub fn record_match_player_rows(&self, inserted: u64, skipped: u64) {
        self.match_player_rows.fetch_add(inserted, Ordering::Relaxed);
        self.duplicates_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    /// An id that was already claimed when discovered again
    pub fn record_duplicate(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn tally(&self, counter: &AtomicU64, inserted: bool) {
        if inserted {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn entities_abandoned(&self) -> u64 {
        self.entities_abandoned.load(Ordering::Relaxed)
    }

    /// Takes a consistent-enough copy of the counters for reporting
    pub fn snapshot(&self) -> ReportCounts {
        ReportCounts {
            seeds: self.seeds.load(Ordering::Relaxed),
            players_resolved: self.players_resolved.load(Ordering::Relaxed),
            private_players: self.private_players.load(Ordering::Relaxed),
            matches_resolved: self.matches_resolved.load(Ordering::Relaxed),
            leaderboard_rows: self.leaderboard_rows.load(Ordering::Relaxed),
            teammates_recorded: self.teammates_recorded.load(Ordering::Relaxed),
            matches_recorded: self.matches_recorded.load(Ordering::Relaxed),
            match_player_rows: self.match_player_rows.load(Ordering::Relaxed),
            entities_failed: self.entities_failed.load(Ordering::Relaxed),
            entities_abandoned: self.entities_abandoned.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`CrawlReport`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportCounts {
    pub seeds: u64,
    pub players_resolved: u64,
    pub private_players: u64,
    pub matches_resolved: u64,
    pub leaderboard_rows: u64,
    pub teammates_recorded: u64,
    pub matches_recorded: u64,
    pub match_player_rows: u64,
    pub entities_failed: u64,
    pub entities_abandoned: u64,
    pub duplicates_skipped: u64,
}

/// Final outcome of one run
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub run_id: i64,
    pub status: RunStatus,
    pub captured_at: String,
    pub counts: ReportCounts,
    pub requests: u64,
    pub retries: u64,
    pub rate_limited_waits: u64,
    pub duration: Duration,
}

/// Prints a run summary to stdout
pub fn print_summary(summary: &CrawlSummary) {
    let c = &summary.counts;

    println!("=== Crawl Run {} ({}) ===\n", summary.run_id, summary.status);
    println!("Captured at: {}", summary.captured_at);
    println!("Duration: {:.1}s", summary.duration.as_secs_f64());
    println!();

    println!("Entities:");
    println!("  Leaderboard seeds: {}", c.seeds);
    println!("  Players resolved: {}", c.players_resolved);
    println!("  Private players: {}", c.private_players);
    println!("  Matches resolved: {}", c.matches_resolved);
    println!("  Failed: {}", c.entities_failed);
    println!("  Abandoned: {}", c.entities_abandoned);
    println!();

    println!("Records written:");
    println!("  Leaderboard rows: {}", c.leaderboard_rows);
    println!("  Encountered players: {}", c.teammates_recorded);
    println!("  Matches: {}", c.matches_recorded);
    println!("  Match player rows: {}", c.match_player_rows);
    println!("  Duplicates skipped: {}", c.duplicates_skipped);
    println!();

    println!("Requests:");
    println!("  Issued: {}", summary.requests);
    println!("  Retries: {}", summary.retries);
    println!("  Rate-limited waits: {}", summary.rate_limited_waits);
}
