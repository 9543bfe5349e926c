//! Dedup ledger for claimed entity ids
//!
//! A claim is the only way an id enters the frontier. The check and the
//! insert happen under one lock, so two workers discovering the same
//! teammate at once cannot both enqueue it.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The kinds of entity the ledger tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Player,
    Match,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Match => "match",
        }
    }
}

#[derive(Debug, Default)]
struct LedgerSets {
    players: HashSet<String>,
    matches: HashSet<String>,
}

impl LedgerSets {
    fn set_mut(&mut self, kind: EntityKind) -> &mut HashSet<String> {
        match kind {
            EntityKind::Player => &mut self.players,
            EntityKind::Match => &mut self.matches,
        }
    }

    fn set(&self, kind: EntityKind) -> &HashSet<String> {
        match kind {
            EntityKind::Player => &self.players,
            EntityKind::Match => &self.matches,
        }
    }
}

/// Record of every player and match id claimed for fetching
///
/// Player ids are normally claimed fresh each run. Match ids are seeded from
/// history so a match is fetched at most once across runs.
#[derive(Debug, Default)]
pub struct CrawlLedger {
    inner: Mutex<LedgerSets>,
}

impl CrawlLedger {
    /// Creates an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger pre-seeded with ids from earlier runs
    pub fn with_history<P, M>(players: P, matches: M) -> Self
    where
        P: IntoIterator<Item = String>,
        M: IntoIterator<Item = String>,
    {
        let ledger = Self::new();
        ledger.seed(EntityKind::Player, players);
        ledger.seed(EntityKind::Match, matches);
        ledger
    }

    /// Marks ids as already claimed, returning how many were new
    pub fn seed<I>(&self, kind: EntityKind, ids: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut sets = self.lock();
        let set = sets.set_mut(kind);
        ids.into_iter().filter(|id| set.insert(id.clone())).count()
    }

    /// Claims an id for fetching
    ///
    /// Returns `true` the first time an id is claimed and `false` on every
    /// later call for the same id.
    pub fn try_claim(&self, kind: EntityKind, id: &str) -> bool {
        let mut sets = self.lock();
        let set = sets.set_mut(kind);
        if set.contains(id) {
            return false;
        }
        set.insert(id.to_string())
    }

    /// Returns whether an id has been claimed
    pub fn is_claimed(&self, kind: EntityKind, id: &str) -> bool {
        self.lock().set(kind).contains(id)
    }

    /// Returns the number of claimed ids of a kind
    pub fn len(&self, kind: EntityKind) -> usize {
        self.lock().set(kind).len()
    }

    /// Returns true if no id of either kind has been claimed
    pub fn is_empty(&self) -> bool {
        let sets = self.lock();
        sets.players.is_empty() && sets.matches.is_empty()
    }

    /// Returns the claimed ids of a kind, sorted
    pub fn snapshot(&self, kind: EntityKind) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().set(kind).iter().cloned().collect();
        ids.sort();
        ids
    }

    // A panic while holding the lock cannot leave a half-inserted set behind.
    fn lock(&self) -> MutexGuard<'_, LedgerSets> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
