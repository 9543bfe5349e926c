//! Scheduler for managing the crawl frontier and worker concurrency
//!
//! This module handles:
//! - A single priority queue of typed crawl tasks
//! - Global concurrency limiting via a semaphore
//!
//! Player tasks are served before match tasks; tasks of equal priority are
//! served in the order they were queued.

use crate::model::LeaderboardEntry;
use crate::state::EntityKind;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Priority of seed players (lower is served first)
pub const SEED_PRIORITY: u32 = 0;

/// Priority of teammates discovered from a seed
pub const TEAMMATE_PRIORITY: u32 = 10;

/// Priority of matches
pub const MATCH_PRIORITY: u32 = 20;

/// A unit of crawl work
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlTask {
    /// A player taken from the leaderboard
    SeedPlayer { entry: LeaderboardEntry },

    /// A teammate listed on a seed's profile
    Teammate {
        player_id: String,
        discovered_by: String,
    },

    /// A match from a player's history
    Match {
        match_id: String,
        discovered_by: String,
    },
}

impl CrawlTask {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::SeedPlayer { .. } | Self::Teammate { .. } => EntityKind::Player,
            Self::Match { .. } => EntityKind::Match,
        }
    }

    /// The id of the entity this task resolves
    pub fn id(&self) -> &str {
        match self {
            Self::SeedPlayer { entry } => &entry.player_id,
            Self::Teammate { player_id, .. } => player_id,
            Self::Match { match_id, .. } => match_id,
        }
    }

    pub fn priority(&self) -> u32 {
        match self {
            Self::SeedPlayer { .. } => SEED_PRIORITY,
            Self::Teammate { .. } => TEAMMATE_PRIORITY,
            Self::Match { .. } => MATCH_PRIORITY,
        }
    }

    /// Short label for logs, e.g. `teammate 2002`
    pub fn label(&self) -> String {
        let kind = match self {
            Self::SeedPlayer { .. } => "seed player",
            Self::Teammate { .. } => "teammate",
            Self::Match { .. } => "match",
        };
        format!("{} {}", kind, self.id())
    }
}

/// A task queued on the frontier with its ordering information
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub task: CrawlTask,

    /// Priority value (lower is higher priority)
    pub priority: u32,

    /// Insertion order, for FIFO within a priority
    pub sequence: u64,
}

// Lower priority values, then lower sequence numbers, are popped first from
// the max-heap
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedTask {}

/// A dispatched task holding its worker slot
///
/// The slot is released when the permit is dropped.
pub struct ScheduledTask {
    pub task: CrawlTask,
    pub permit: OwnedSemaphorePermit,
}

/// Scheduler manages the frontier queue and the worker pool width
pub struct Scheduler {
    /// Global semaphore for limiting concurrent workers
    semaphore: Arc<Semaphore>,

    /// Frontier priority queue of tasks
    frontier: BinaryHeap<QueuedTask>,

    max_concurrent: usize,
    next_sequence: u64,
}

impl Scheduler {
    /// Creates a scheduler with a pool of `max_concurrent` workers (at least 1)
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            frontier: BinaryHeap::new(),
            max_concurrent,
            next_sequence: 0,
        }
    }

    /// Queues a task
    pub fn add_to_frontier(&mut self, task: CrawlTask) {
        let priority = task.priority();
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        tracing::trace!("Queued {} (priority {})", task.label(), priority);
        self.frontier.push(QueuedTask {
            task,
            priority,
            sequence,
        });
    }

    /// Takes a task only if a worker slot is free right now
    pub fn try_next_task(&mut self) -> Option<ScheduledTask> {
        if self.frontier.is_empty() {
            return None;
        }

        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        let queued = self.frontier.pop()?;

        Some(ScheduledTask {
            task: queued.task,
            permit,
        })
    }

    /// Removes every queued task, in dispatch order
    pub fn drain(&mut self) -> Vec<CrawlTask> {
        let mut drained = Vec::with_capacity(self.frontier.len());
        while let Some(queued) = self.frontier.pop() {
            drained.push(queued.task);
        }
        drained
    }

    pub fn frontier_size(&self) -> usize {
        self.frontier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frontier.is_empty()
    }

    /// Number of worker slots currently held
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
