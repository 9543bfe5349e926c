//! State module for tracking crawl progress
//!
//! This module provides the per-entity outcomes and the dedup ledger that
//! decides which entities get fetched at all.
//!
//! # Components
//!
//! - `EntityState`: How a claimed player or match ended within one run
//! - `CrawlLedger`: Thread-safe record of claimed player and match ids

mod entity_state;
mod ledger;

// Re-export main types
pub use entity_state::EntityState;
pub use ledger::{CrawlLedger, EntityKind};
