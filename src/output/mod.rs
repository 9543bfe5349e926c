//! Output module for run reports and history statistics
//!
//! This module handles:
//! - Counting what a run resolved and wrote
//! - Printing the end-of-run summary
//! - Reading and printing history statistics

pub mod report;
pub mod stats;

pub use report::{print_summary, CrawlReport, CrawlSummary, ReportCounts};
pub use stats::{load_statistics, print_statistics, HistoryStatistics};
