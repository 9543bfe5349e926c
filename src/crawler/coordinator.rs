//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! a run, including:
//! - Opening the run in the record sink
//! - Fetching the leaderboard and claiming seed players
//! - Dispatching typed tasks to a bounded worker pool
//! - Expanding seeds into teammates and matches through the ledger
//! - Abandoning queued work once the run deadline passes

use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, ApiClient, FetchResult};
use crate::crawler::parser::{parse_leaderboard, parse_match, parse_player};
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::retry::{Resource, RetryPolicy};
use crate::crawler::scheduler::{CrawlTask, ScheduledTask, Scheduler};
use crate::crawler::sleeper::{Sleeper, TokioSleeper};
use crate::model::{LeaderboardEntry, LeaderboardRow, PlayerProfile};
use crate::output::{CrawlReport, CrawlSummary};
use crate::state::{CrawlLedger, EntityKind, EntityState};
use crate::storage::{RecordSink, RunStatus, StorageResult};
use crate::{ConfigError, CrawlError};
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// Resolved tasks between progress log lines
const PROGRESS_INTERVAL: u64 = 25;

/// A record sink shared by all workers
pub type SharedSink = Arc<Mutex<dyn RecordSink>>;

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    client: Client,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    ledger: Arc<CrawlLedger>,
    sink: SharedSink,
    scheduler: Scheduler,
    config_hash: String,
}

/// What a worker hands back to the coordinator
struct TaskOutcome {
    kind: EntityKind,
    state: EntityState,
    discovered: Vec<CrawlTask>,
}

/// Shared state handed to every worker
struct WorkerContext {
    api: ApiClient,
    config: Arc<Config>,
    ledger: Arc<CrawlLedger>,
    sink: SharedSink,
    report: Arc<CrawlReport>,
    captured_at: String,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `ledger` - Dedup ledger, already seeded with history if wanted
    /// * `sink` - Destination for resolved records
    pub fn new(config: Config, ledger: Arc<CrawlLedger>, sink: SharedSink) -> Result<Self, CrawlError> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.api.request_timeout_secs),
        )?;
        let limiter = Arc::new(RateLimiter::per_minute(config.crawler.requests_per_minute));
        let policy = RetryPolicy::from_config(&config.crawler);
        let scheduler = Scheduler::new(config.crawler.max_concurrent_requests as usize);

        Ok(Self {
            config: Arc::new(config),
            client,
            limiter,
            policy,
            sleeper: Arc::new(TokioSleeper),
            ledger,
            sink,
            scheduler,
            config_hash: String::new(),
        })
    }

    /// Replaces the sleeper used for retry backoff
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replaces the rate limiter
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Sets the config hash recorded with the run
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    pub fn ledger(&self) -> &Arc<CrawlLedger> {
        &self.ledger
    }

    /// Runs one crawl to completion
    ///
    /// Returns `Err(CrawlError::RootFailure)` when the leaderboard cannot be
    /// fetched or parsed; the run is then marked failed and nothing else is
    /// written. Per-entity failures are logged and counted, never returned.
    pub async fn run(&mut self) -> Result<CrawlSummary, CrawlError> {
        let started = std::time::Instant::now();
        let deadline = Instant::now()
            .checked_add(Duration::from_secs(self.config.crawler.run_timeout_secs))
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "run-timeout-secs {} is out of range",
                    self.config.crawler.run_timeout_secs
                ))
            })?;
        let leaderboard_url = self.config.api.leaderboard_url()?;

        let run_id = with_sink(&self.sink, |sink| sink.begin_run(&self.config_hash))?;
        let captured_at = Utc::now().to_rfc3339();
        info!("Starting crawl run {} at {}", run_id, captured_at);

        let ctx = Arc::new(WorkerContext {
            api: ApiClient::new(
                self.client.clone(),
                self.limiter.clone(),
                self.policy.clone(),
                self.sleeper.clone(),
            )
            .with_deadline(deadline),
            config: self.config.clone(),
            ledger: self.ledger.clone(),
            sink: self.sink.clone(),
            report: Arc::new(CrawlReport::new()),
            captured_at,
        });

        info!("Fetching leaderboard from {}", leaderboard_url);
        let entries = match ctx.api.fetch_json(&leaderboard_url, Resource::Leaderboard).await {
            FetchResult::Success { body, .. } => match parse_leaderboard(body) {
                Ok(entries) => entries,
                Err(e) => return self.fail_run(run_id, &leaderboard_url, e.to_string()),
            },
            other => return self.fail_run(run_id, &leaderboard_url, other.describe()),
        };
        info!(
            "Leaderboard lists {} players, crawling with {} workers",
            entries.len(),
            self.scheduler.max_concurrent()
        );

        for entry in entries {
            if self.ledger.try_claim(EntityKind::Player, &entry.player_id) {
                ctx.report.record_seed();
                self.scheduler.add_to_frontier(CrawlTask::SeedPlayer { entry });
            } else {
                debug!("Player {} listed twice on the leaderboard", entry.player_id);
                ctx.report.record_duplicate();
            }
        }

        let mut workers: JoinSet<TaskOutcome> = JoinSet::new();
        let mut resolved: u64 = 0;

        loop {
            if !self.scheduler.is_empty() && ctx.api.deadline_passed() {
                let abandoned = self.scheduler.drain();
                warn!(
                    "Run deadline passed, abandoning {} queued task(s)",
                    abandoned.len()
                );
                for task in abandoned {
                    debug!("Abandoned {}", task.label());
                    ctx.report.record_outcome(task.kind(), EntityState::Abandoned);
                }
            }

            while let Some(ScheduledTask { task, permit }) = self.scheduler.try_next_task() {
                let ctx = ctx.clone();
                workers.spawn(async move {
                    let outcome = process_task(&ctx, task).await;
                    drop(permit);
                    outcome
                });
            }

            match workers.join_next().await {
                Some(Ok(outcome)) => {
                    debug!("{} task {}", outcome.kind.as_str(), outcome.state);
                    ctx.report.record_outcome(outcome.kind, outcome.state);
                    for task in outcome.discovered {
                        self.scheduler.add_to_frontier(task);
                    }

                    resolved += 1;
                    if resolved % PROGRESS_INTERVAL == 0 {
                        info!(
                            "Progress: {} tasks resolved, {} queued, {} in flight, {} requests, {:.1}s elapsed",
                            resolved,
                            self.scheduler.frontier_size(),
                            self.scheduler.in_flight(),
                            ctx.api.stats().requests(),
                            started.elapsed().as_secs_f64()
                        );
                    }
                }
                Some(Err(e)) => {
                    error!("Worker task failed: {}", e);
                    ctx.report.record_failure();
                }
                // Nothing in flight, and every free slot was offered a task
                None => break,
            }
        }

        let status = if ctx.report.entities_abandoned() > 0 {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        with_sink(&self.sink, |sink| sink.finish_run(run_id, status))?;

        let summary = CrawlSummary {
            run_id,
            status,
            captured_at: ctx.captured_at.clone(),
            counts: ctx.report.snapshot(),
            requests: ctx.api.stats().requests(),
            retries: ctx.api.stats().retries(),
            rate_limited_waits: ctx.api.stats().rate_limited_waits(),
            duration: started.elapsed(),
        };

        info!(
            "Crawl run {} {}: {} tasks resolved, {} requests in {:?}",
            run_id, status, resolved, summary.requests, summary.duration
        );

        Ok(summary)
    }

    fn fail_run(
        &self,
        run_id: i64,
        url: &Url,
        reason: String,
    ) -> Result<CrawlSummary, CrawlError> {
        error!("Leaderboard fetch failed: {}", reason);
        with_sink(&self.sink, |sink| sink.finish_run(run_id, RunStatus::Failed))?;
        Err(CrawlError::RootFailure {
            url: url.to_string(),
            reason,
        })
    }
}

/// Runs `f` against the locked sink
fn with_sink<T>(
    sink: &SharedSink,
    f: impl FnOnce(&mut dyn RecordSink) -> StorageResult<T>,
) -> Result<T, CrawlError> {
    let mut guard = sink
        .lock()
        .map_err(|_| CrawlError::Storage("record sink lock poisoned".to_string()))?;
    Ok(f(&mut *guard)?)
}

/// Resolves one task; never fails the run
async fn process_task(ctx: &WorkerContext, task: CrawlTask) -> TaskOutcome {
    let kind = task.kind();
    let label = task.label();

    let result = match task {
        CrawlTask::SeedPlayer { entry } => process_seed(ctx, entry).await,
        CrawlTask::Teammate {
            player_id,
            discovered_by,
        } => process_teammate(ctx, &player_id, &discovered_by).await,
        CrawlTask::Match {
            match_id,
            discovered_by,
        } => process_match(ctx, &match_id, &discovered_by).await,
    };

    match result {
        Ok((state, discovered)) => TaskOutcome {
            kind,
            state,
            discovered,
        },
        Err(CrawlError::DeadlineExceeded) => {
            debug!("Abandoned {} at run deadline", label);
            TaskOutcome {
                kind,
                state: EntityState::Abandoned,
                discovered: Vec::new(),
            }
        }
        Err(e) => {
            warn!("Failed to process {}: {}", label, e);
            TaskOutcome {
                kind,
                state: EntityState::Failed,
                discovered: Vec::new(),
            }
        }
    }
}

type Resolution = (EntityState, Vec<CrawlTask>);

/// Fetches a seed's profile, writes its leaderboard row, and expands it
async fn process_seed(ctx: &WorkerContext, entry: LeaderboardEntry) -> Result<Resolution, CrawlError> {
    let player_id = entry.player_id.clone();
    let fetched = resolve_player(ctx, &player_id).await;

    // The row is written whatever the profile outcome; rank_score is absent
    // unless the profile was public
    let rank_score = fetched.as_ref().ok().and_then(|p| p.rank_score);
    let row = LeaderboardRow::new(&ctx.captured_at, entry, rank_score);
    let inserted = with_sink(&ctx.sink, |sink| sink.append_leaderboard_row(&row))?;
    ctx.report.record_leaderboard_row(inserted);

    let profile = fetched?;
    if profile.is_private {
        debug!("Seed player {} is private", player_id);
        return Ok((EntityState::Private, Vec::new()));
    }

    let mut discovered = Vec::new();
    for teammate in &profile.teammate_refs {
        if ctx.ledger.try_claim(EntityKind::Player, teammate) {
            discovered.push(CrawlTask::Teammate {
                player_id: teammate.clone(),
                discovered_by: player_id.clone(),
            });
        } else {
            ctx.report.record_duplicate();
        }
    }
    discovered.extend(claim_matches(ctx, &profile));

    debug!(
        "Seed player {} expanded into {} task(s)",
        player_id,
        discovered.len()
    );
    Ok((EntityState::Resolved, discovered))
}

/// Fetches a teammate and folds it into the encountered-player history
///
/// Teammates never expand player discovery.
async fn process_teammate(
    ctx: &WorkerContext,
    player_id: &str,
    discovered_by: &str,
) -> Result<Resolution, CrawlError> {
    let profile = resolve_player(ctx, player_id).await?;
    if profile.is_private {
        debug!("Teammate {} of {} is private", player_id, discovered_by);
        return Ok((EntityState::Private, Vec::new()));
    }

    match profile.observation() {
        Some(observation) => {
            let merged = with_sink(&ctx.sink, |sink| {
                sink.upsert_encountered_player(player_id, &observation)
            })?;
            ctx.report.record_teammate();
            debug!(
                "Encountered {} ({}): highest {}, latest {}",
                merged.player_name, player_id, merged.highest_score, merged.latest_score
            );
        }
        None => debug!("Teammate {} has no rank score", player_id),
    }

    let discovered = if ctx.config.crawler.expand_teammate_matches {
        claim_matches(ctx, &profile)
    } else {
        Vec::new()
    };

    Ok((EntityState::Resolved, discovered))
}

/// Fetches a match and appends its summary and player lines
async fn process_match(
    ctx: &WorkerContext,
    match_id: &str,
    discovered_by: &str,
) -> Result<Resolution, CrawlError> {
    let url = ctx.config.api.match_url(match_id)?;
    let body = fetch_body(ctx, &url, Resource::Match)
        .await?
        .ok_or_else(|| CrawlError::Fetch {
            url: url.to_string(),
            reason: "match inaccessible".to_string(),
        })?;
    let detail = parse_match(match_id, body)?;

    let outcome = with_sink(&ctx.sink, |sink| sink.append_match(&detail))?;
    ctx.report.record_match_summary(outcome.summary_inserted);
    ctx.report
        .record_match_player_rows(outcome.players_inserted, outcome.players_skipped);

    debug!(
        "Match {} (from {}) recorded with {} player(s)",
        match_id,
        discovered_by,
        detail.players.len()
    );
    Ok((EntityState::Resolved, Vec::new()))
}

/// Claims every unseen match in a profile's history
fn claim_matches(ctx: &WorkerContext, profile: &PlayerProfile) -> Vec<CrawlTask> {
    let mut tasks = Vec::new();
    for match_id in &profile.match_refs {
        if ctx.ledger.try_claim(EntityKind::Match, match_id) {
            tasks.push(CrawlTask::Match {
                match_id: match_id.clone(),
                discovered_by: profile.player_id.clone(),
            });
        } else {
            ctx.report.record_duplicate();
        }
    }
    tasks
}

/// Fetches a player; an inaccessible profile becomes the private sentinel
async fn resolve_player(ctx: &WorkerContext, player_id: &str) -> Result<PlayerProfile, CrawlError> {
    let url = ctx.config.api.player_url(player_id)?;
    match fetch_body(ctx, &url, Resource::Player).await? {
        Some(body) => Ok(parse_player(player_id, body)?),
        None => {
            debug!("Player {} inaccessible, treating as private", player_id);
            Ok(PlayerProfile::private(player_id, None))
        }
    }
}

/// `Ok(None)` means the resource is inaccessible
async fn fetch_body(
    ctx: &WorkerContext,
    url: &Url,
    resource: Resource,
) -> Result<Option<Value>, CrawlError> {
    match ctx.api.fetch_json(url, resource).await {
        FetchResult::Success { body, .. } => Ok(Some(body)),
        FetchResult::Inaccessible { .. } => Ok(None),
        FetchResult::DeadlineExceeded => Err(CrawlError::DeadlineExceeded),
        other => Err(CrawlError::Fetch {
            url: url.to_string(),
            reason: other.describe(),
        }),
    }
}
