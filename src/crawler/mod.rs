//! Crawler module for API fetching and crawl coordination
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic and a shared rate limiter
//! - JSON payload parsing
//! - Task scheduling over a bounded worker pool
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
pub mod rate_limiter;
pub mod retry;
mod scheduler;
pub mod sleeper;

pub use coordinator::{Coordinator, SharedSink};
pub use fetcher::{build_http_client, user_agent_string, ApiClient, FetchResult, FetchStats};
pub use parser::{parse_leaderboard, parse_match, parse_player};
pub use rate_limiter::RateLimiter;
pub use retry::{parse_retry_after, FailureType, Resource, RetryDecision, RetryPolicy};
pub use scheduler::{CrawlTask, Scheduler};
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};

use crate::config::Config;
use crate::output::CrawlSummary;
use crate::state::{CrawlLedger, EntityKind};
use crate::storage::{open_history, RecordSink};
use crate::CrawlError;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Runs a complete crawl against the configured history database
///
/// This is the main entry point for a scheduled run. It will:
/// 1. Open (or create) the SQLite history
/// 2. Seed the dedup ledger with recorded match ids, unless `fresh`
/// 3. Fetch the leaderboard and crawl players, teammates and matches
/// 4. Record the run outcome
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the config file, stored with the run
/// * `fresh` - Ignore recorded matches when seeding the ledger
pub async fn run_crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
) -> Result<CrawlSummary, CrawlError> {
    let history = open_history(Path::new(&config.output.database_path))?;

    let ledger = Arc::new(CrawlLedger::new());
    if fresh {
        tracing::info!("Fresh run, ignoring recorded match history");
    } else {
        let seeded = ledger.seed(EntityKind::Match, history.seen_match_ids()?);
        tracing::info!("Seeded ledger with {} recorded matches", seeded);
    }

    let sink: SharedSink = Arc::new(Mutex::new(history));
    let mut coordinator = Coordinator::new(config, ledger, sink)?.with_config_hash(config_hash);
    coordinator.run().await
}
