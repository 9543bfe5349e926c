//! Retry policy and failure classification for API fetches
//!
//! Every failed attempt is classified into a [`FailureType`], and the
//! [`RetryPolicy`] turns that classification into a [`RetryDecision`].
//! The policy never sleeps itself; the fetcher applies the delay through its
//! injected sleeper.
//!
//! | Condition | Classification | Action |
//! |-----------|----------------|--------|
//! | HTTP 429 | RateLimited | Wait Retry-After (default 5s), not budgeted |
//! | HTTP 500 on a player | Inaccessible | Stop, profile treated as private |
//! | Other HTTP 5xx | Transient | Retry after fixed delay, budgeted |
//! | Timeout / connection error | Transient | Retry after fixed delay, budgeted |
//! | Other HTTP 4xx, non-JSON 200 | Permanent | Stop |

use crate::config::CrawlerConfig;
use std::time::Duration;
use tracing::{debug, warn};

/// Default attempt budget, including the first attempt
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default fixed delay between budgeted attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Default wait after a 429 that carries no usable Retry-After
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Upper bound on any server-supplied Retry-After
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// The API resource a request addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Leaderboard,
    Player,
    Match,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leaderboard => "leaderboard",
            Self::Player => "player",
            Self::Match => "match",
        }
    }
}

/// Classification of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// May succeed on retry: network errors and server errors
    Transient,

    /// HTTP 429; retry after the given delay without spending budget
    RateLimited { retry_after: Duration },

    /// HTTP 500 on a player resource: the profile is private
    Inaccessible,

    /// Will not succeed on retry: client errors and non-JSON bodies
    Permanent,
}

/// Decision on whether to retry a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`
    Retry {
        delay: Duration,
        /// Whether the failed attempt consumed retry budget
        budgeted: bool,
    },

    /// Give up on this entity
    DoNotRetry { reason: String },
}

/// Fixed-delay retry policy with an attempt budget
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    retry_delay: Duration,
    default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            default_retry_after: DEFAULT_RETRY_AFTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least 1
    pub fn new(max_attempts: u32, retry_delay: Duration, default_retry_after: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            default_retry_after,
        }
    }

    /// Builds the policy described by the `[crawler]` config section
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.retry_delay_ms),
            Duration::from_millis(config.default_retry_after_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn default_retry_after(&self) -> Duration {
        self.default_retry_after
    }

    /// Classifies a non-success HTTP status
    ///
    /// `retry_after` is the already-parsed Retry-After header, if any.
    pub fn classify_status(
        &self,
        status: u16,
        retry_after: Option<Duration>,
        resource: Resource,
    ) -> FailureType {
        match status {
            429 => FailureType::RateLimited {
                retry_after: retry_after.unwrap_or(self.default_retry_after),
            },
            500 if resource == Resource::Player => FailureType::Inaccessible,
            500..=599 => FailureType::Transient,
            _ => FailureType::Permanent,
        }
    }

    /// Decides whether to retry
    ///
    /// `attempt` is the number of budgeted attempts made so far (1-indexed).
    /// Rate-limited attempts are not budgeted, so they are always retried.
    pub fn should_retry(&self, failure: FailureType, attempt: u32) -> RetryDecision {
        match failure {
            FailureType::Permanent => RetryDecision::DoNotRetry {
                reason: "permanent failure".to_string(),
            },
            FailureType::Inaccessible => RetryDecision::DoNotRetry {
                reason: "resource inaccessible".to_string(),
            },
            FailureType::RateLimited { retry_after } => RetryDecision::Retry {
                delay: retry_after,
                budgeted: false,
            },
            FailureType::Transient if attempt >= self.max_attempts => {
                RetryDecision::DoNotRetry {
                    reason: format!("retry budget exhausted after {} attempts", attempt),
                }
            }
            FailureType::Transient => RetryDecision::Retry {
                delay: self.retry_delay,
                budgeted: true,
            },
        }
    }
}

/// Parses a Retry-After header value
///
/// Accepts delta-seconds or an HTTP-date. Values above one hour are capped;
/// a date in the past yields zero. Returns `None` for unparseable input.
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!("Ignoring negative Retry-After value {}", seconds);
            return None;
        }
        return Some(cap_retry_after(Duration::from_secs(seconds as u64)));
    }

    match httpdate::parse_http_date(header_value) {
        Ok(at) => match at.duration_since(std::time::SystemTime::now()) {
            Ok(delay) => Some(cap_retry_after(delay)),
            Err(_) => Some(Duration::ZERO),
        },
        Err(_) => {
            debug!("Unparseable Retry-After value '{}'", header_value);
            None
        }
    }
}

fn cap_retry_after(delay: Duration) -> Duration {
    if delay > MAX_RETRY_AFTER {
        warn!(
            "Retry-After of {}s exceeds cap, using {}s",
            delay.as_secs(),
            MAX_RETRY_AFTER.as_secs()
        );
        MAX_RETRY_AFTER
    } else {
        delay
    }
}
