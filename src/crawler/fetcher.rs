//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - Passing every attempt through the shared rate limiter
//! - Retry logic driven by [`RetryPolicy`]
//! - Content-Type and JSON body checks

use crate::config::UserAgentConfig;
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::retry::{parse_retry_after, FailureType, Resource, RetryDecision, RetryPolicy};
use crate::crawler::sleeper::Sleeper;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{redirect::Policy, Client};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched a JSON document
    Success {
        /// Decoded response body
        body: Value,
        /// Requests issued for this entity, rate-limited ones included
        attempts: u32,
    },

    /// HTTP 500 on a player resource; the profile is private
    Inaccessible { status_code: u16 },

    /// Non-retryable failure: client error, non-JSON body
    Rejected {
        status_code: Option<u16>,
        reason: String,
    },

    /// Retry budget spent on transient failures
    Exhausted { attempts: u32, last_error: String },

    /// The run deadline passed before the next attempt or backoff
    DeadlineExceeded,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            Self::Success { attempts, .. } => format!("success after {} request(s)", attempts),
            Self::Inaccessible { status_code } => format!("inaccessible (HTTP {})", status_code),
            Self::Rejected {
                status_code: Some(code),
                reason,
            } => format!("rejected (HTTP {}): {}", code, reason),
            Self::Rejected {
                status_code: None,
                reason,
            } => format!("rejected: {}", reason),
            Self::Exhausted {
                attempts,
                last_error,
            } => format!("gave up after {} attempts: {}", attempts, last_error),
            Self::DeadlineExceeded => "run deadline exceeded".to_string(),
        }
    }
}

/// Why a single attempt failed
#[derive(Debug, Error)]
enum AttemptError {
    #[error("HTTP {status}")]
    Status {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("expected JSON, got '{content_type}'")]
    NotJson { content_type: String },

    #[error("invalid JSON body: {0}")]
    Decode(String),

    #[error("{0}")]
    Network(String),
}

impl AttemptError {
    fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Request counters shared by all workers
#[derive(Debug, Default)]
pub struct FetchStats {
    requests: AtomicU64,
    retries: AtomicU64,
    rate_limited_waits: AtomicU64,
}

impl FetchStats {
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn rate_limited_waits(&self) -> u64 {
        self.rate_limited_waits.load(Ordering::Relaxed)
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Per-request timeout
///
/// # Example
///
/// ```no_run
/// use rivals_crawl::config::UserAgentConfig;
/// use rivals_crawl::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "rivals-crawl".to_string(),
///     crawler_version: "0.1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(5))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Format: CrawlerName/Version (+ContactURL)
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{})",
        config.crawler_name, config.crawler_version, config.contact_url
    )
}

/// Rate-limited, retrying JSON client for the upstream API
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | HTTP 429 | Sleep Retry-After, retry outside the budget |
/// | HTTP 500 on a player | Immediate → Inaccessible |
/// | HTTP 5xx | Retry within the budget |
/// | Timeout / connection error | Retry within the budget |
/// | Other HTTP >= 400 | Immediate → Rejected |
/// | Non-JSON 200 | Immediate → Rejected |
pub struct ApiClient {
    client: Client,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    deadline: Option<Instant>,
    stats: FetchStats,
}

impl ApiClient {
    pub fn new(
        client: Client,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            client,
            limiter,
            policy,
            sleeper,
            deadline: None,
            stats: FetchStats::default(),
        }
    }

    /// Sets the instant after which no further attempt or backoff starts
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn stats(&self) -> &FetchStats {
        &self.stats
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Fetches `url` and decodes the body as JSON
    pub async fn fetch_json(&self, url: &Url, resource: Resource) -> FetchResult {
        let mut budgeted = 0u32;
        let mut requests = 0u32;

        loop {
            if self.deadline_passed() {
                return FetchResult::DeadlineExceeded;
            }

            self.limiter.acquire().await;
            requests += 1;
            self.stats.requests.fetch_add(1, Ordering::Relaxed);

            let error = match self.attempt(url).await {
                Ok(body) => {
                    return FetchResult::Success {
                        body,
                        attempts: requests,
                    }
                }
                Err(e) => e,
            };

            let failure = match &error {
                AttemptError::Status {
                    status,
                    retry_after,
                } => self.policy.classify_status(*status, *retry_after, resource),
                AttemptError::NotJson { .. } | AttemptError::Decode(_) => FailureType::Permanent,
                AttemptError::Network(_) => FailureType::Transient,
            };

            if !matches!(failure, FailureType::RateLimited { .. }) {
                budgeted += 1;
            }

            match self.policy.should_retry(failure, budgeted) {
                RetryDecision::Retry { delay, budgeted: counts } => {
                    if counts {
                        self.stats.retries.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            "{} {} failed ({}), retry {}/{} in {:?}",
                            resource.as_str(),
                            url,
                            error,
                            budgeted,
                            self.policy.max_attempts(),
                            delay
                        );
                    } else {
                        self.stats.rate_limited_waits.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "Rate limited on {} {}, waiting {:?}",
                            resource.as_str(),
                            url,
                            delay
                        );
                    }

                    if let Some(deadline) = self.deadline {
                        if Instant::now() + delay >= deadline {
                            return FetchResult::DeadlineExceeded;
                        }
                    }
                    self.sleeper.sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!("Not retrying {} {}: {}", resource.as_str(), url, reason);
                    return match failure {
                        FailureType::Inaccessible => FetchResult::Inaccessible {
                            status_code: error.status_code().unwrap_or(500),
                        },
                        FailureType::Permanent => FetchResult::Rejected {
                            status_code: error.status_code(),
                            reason: error.to_string(),
                        },
                        _ => FetchResult::Exhausted {
                            attempts: budgeted,
                            last_error: error.to_string(),
                        },
                    };
                }
            }
        }
    }

    /// One request, no retries
    async fn attempt(&self, url: &Url) -> Result<Value, AttemptError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AttemptError::Network(describe_network_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(AttemptError::Status {
                status: status.as_u16(),
                retry_after,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_json_content_type(&content_type) {
            return Err(AttemptError::NotJson { content_type });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Network(describe_network_error(&e)))?;

        serde_json::from_slice(&bytes).map_err(|e| AttemptError::Decode(e.to_string()))
    }
}

fn describe_network_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        e.to_string()
    }
}

/// Accepts `application/json` and `+json` media types
fn is_json_content_type(content_type: &str) -> bool {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    media_type == "application/json" || media_type.ends_with("+json")
}
