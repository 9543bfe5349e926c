//! rivals-crawl: incremental crawler for a game-statistics API
//!
//! This crate polls a leaderboard, expands from leaderboard players to their
//! teammates and matches, and appends only the records it has not seen before
//! to an on-disk history. Outbound requests are bounded by a shared rate
//! limiter and a fixed-width worker pool.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Payload error: {0}")]
    Parse(#[from] ParseError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    /// The leaderboard could not be fetched, so there is nothing to crawl
    #[error("Leaderboard fetch from {url} failed: {reason}")]
    RootFailure { url: String, reason: String },

    /// A player or match could not be fetched
    #[error("Fetch of {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Run deadline exceeded")]
    DeadlineExceeded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised while turning API payloads into records
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid {entity} payload: {source}")]
    Json {
        entity: &'static str,
        source: serde_json::Error,
    },

    #[error("Unexpected {entity} payload shape: {message}")]
    Shape {
        entity: &'static str,
        message: String,
    },
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{CrawlLedger, EntityKind, EntityState};
