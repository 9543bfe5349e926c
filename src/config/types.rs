use crate::ConfigError;
use serde::Deserialize;
use url::Url;

/// Main configuration structure for rivals-crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
}

/// Upstream API endpoints
///
/// Paths are resolved against `base_url`; player and match paths carry an
/// `{id}` placeholder.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(rename = "base-url")]
    pub base_url: String,

    #[serde(rename = "leaderboard-path", default = "default_leaderboard_path")]
    pub leaderboard_path: String,

    #[serde(rename = "player-path", default = "default_player_path")]
    pub player_path: String,

    #[serde(rename = "match-path", default = "default_match_path")]
    pub match_path: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    /// URL of the leaderboard listing
    pub fn leaderboard_url(&self) -> Result<Url, ConfigError> {
        self.resolve(&self.leaderboard_path, None)
    }

    /// URL of one player's detail
    pub fn player_url(&self, player_id: &str) -> Result<Url, ConfigError> {
        self.resolve(&self.player_path, Some(player_id))
    }

    /// URL of one match's detail
    pub fn match_url(&self, match_id: &str) -> Result<Url, ConfigError> {
        self.resolve(&self.match_path, Some(match_id))
    }

    fn resolve(&self, template: &str, id: Option<&str>) -> Result<Url, ConfigError> {
        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

        let path = match id {
            Some(id) => {
                let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
                template.replace("{id}", &encoded)
            }
            None => template.to_string(),
        };

        base.join(path.trim_start_matches('/'))
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid endpoint '{}': {}", path, e)))
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Width of the worker pool
    #[serde(rename = "max-concurrent-requests", default = "default_max_concurrent")]
    pub max_concurrent_requests: u32,

    /// Requests allowed per 60-second window, across all workers
    #[serde(rename = "requests-per-minute", default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Attempts per entity before giving up, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between budgeted attempts (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Wait after a 429 without a usable Retry-After (milliseconds)
    #[serde(rename = "default-retry-after-ms", default = "default_retry_after_ms")]
    pub default_retry_after_ms: u64,

    /// Overall run deadline (seconds)
    #[serde(rename = "run-timeout-secs", default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// Whether teammates' match histories feed the match frontier
    #[serde(rename = "expand-teammate-matches", default)]
    pub expand_teammate_matches: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent(),
            requests_per_minute: default_requests_per_minute(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            default_retry_after_ms: default_retry_after_ms(),
            run_timeout_secs: default_run_timeout_secs(),
            expand_teammate_matches: false,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite history database
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_leaderboard_path() -> String {
    "leaderboard".to_string()
}

fn default_player_path() -> String {
    "player/{id}".to_string()
}

fn default_match_path() -> String {
    "match/{id}".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent() -> u32 {
    10
}

fn default_requests_per_minute() -> u32 {
    480
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_retry_after_ms() -> u64 {
    5000
}

fn default_run_timeout_secs() -> u64 {
    3600
}
