//! Statistics generation from the history database
//!
//! This module provides functionality for extracting and displaying
//! history statistics from the SQLite sink.

use crate::model::{display_or_sentinel, EncounteredPlayer, LeaderboardRow};
use crate::storage::{HistoryCounts, RunRecord, SqliteSink};
use crate::CrawlError;

/// Number of encountered players listed by `--stats`
const TOP_ENCOUNTERED: usize = 10;

/// History statistics summary
#[derive(Debug, Clone)]
pub struct HistoryStatistics {
    /// Row counts per table
    pub counts: HistoryCounts,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,

    /// Newest leaderboard capture and its rows
    pub latest_capture: Option<(String, Vec<LeaderboardRow>)>,

    /// Encountered players with the highest scores
    pub top_encountered: Vec<EncounteredPlayer>,
}

/// Loads statistics from the history database
pub fn load_statistics(sink: &SqliteSink) -> Result<HistoryStatistics, CrawlError> {
    let counts = sink.history_counts()?;
    let latest_run = sink.latest_run()?;

    let latest_capture = match sink.captures()?.into_iter().next() {
        Some(captured_at) => {
            let rows = sink.leaderboard_rows(&captured_at)?;
            Some((captured_at, rows))
        }
        None => None,
    };

    let top_encountered = sink.top_encountered(TOP_ENCOUNTERED)?;

    Ok(HistoryStatistics {
        counts,
        latest_run,
        latest_capture,
        top_encountered,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HistoryStatistics) {
    println!("=== History Statistics ===\n");

    println!("Overview:");
    println!("  Runs: {}", stats.counts.runs);
    println!("  Leaderboard rows: {}", stats.counts.leaderboard_rows);
    println!("  Encountered players: {}", stats.counts.encountered_players);
    println!("  Matches: {}", stats.counts.matches);
    println!("  Match player rows: {}", stats.counts.match_players);
    println!("  Hero breakdown rows: {}", stats.counts.match_player_heroes);
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest run: #{} ({})", run.id, run.status);
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
        }
        None => println!("No runs recorded yet"),
    }
    println!();

    if let Some((captured_at, rows)) = &stats.latest_capture {
        let private = rows.iter().filter(|r| r.rank_score.is_none()).count();
        println!("Latest leaderboard capture: {}", captured_at);
        println!(
            "  {} players, {} without a rank score",
            rows.len(),
            private
        );
        for row in rows.iter().take(5) {
            println!(
                "  #{} {} ({}) rank score {}",
                row.entry.rank,
                row.entry.player_name,
                row.entry.rank_name,
                row.rank_score_display()
            );
        }
        println!();
    }

    if !stats.top_encountered.is_empty() {
        println!("Top Encountered Players ({}):", stats.top_encountered.len());
        for player in &stats.top_encountered {
            let win_rate = if player.matches > 0 {
                Some(format!(
                    "{:.1}%",
                    player.wins as f64 / player.matches as f64 * 100.0
                ))
            } else {
                None
            };
            println!(
                "  - {} ({}): highest {:.0}, latest {:.0}, win rate {}",
                player.player_name,
                player.player_uid,
                player.highest_score,
                player.latest_score,
                display_or_sentinel(win_rate)
            );
        }
    }
}
