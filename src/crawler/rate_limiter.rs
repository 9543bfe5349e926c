//! Process-wide request rate limiting
//!
//! A fixed-window counter shared by every worker. Up to `limit` requests may
//! start inside one window; the request after that waits for the window to
//! roll over. The default cap of 480 per minute sits under the API's
//! published 500.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default requests allowed per window
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 480;

/// Length of one rate-limit window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Global fixed-window rate limiter
///
/// Share it with `Arc`. The window state is behind a tokio mutex, and a
/// caller that exhausts the quota sleeps while holding it so that every other
/// caller queues behind the same reset.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<Window>,
    issued: AtomicU64,
    throttled: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter allowing `limit` requests per `window`
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            state: Mutex::new(Window {
                started: Instant::now(),
                count: 0,
            }),
            issued: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
        }
    }

    /// Creates a limiter allowing `limit` requests per minute
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, DEFAULT_WINDOW)
    }

    /// Returns the per-window cap
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns the window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Total requests let through so far
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Number of times a caller had to wait for a window reset
    pub fn throttled(&self) -> u64 {
        self.throttled.load(Ordering::SeqCst)
    }

    /// Waits until one more request may be issued, then counts it
    pub async fn acquire(&self) {
        let mut window = self.state.lock().await;

        let elapsed = window.started.elapsed();
        if elapsed >= self.window {
            window.started = Instant::now();
            window.count = 0;
        }

        if window.count >= self.limit {
            let wait = self.window.saturating_sub(window.started.elapsed());
            warn!(
                "Rate limit of {} requests per {:?} reached, sleeping {:.2}s",
                self.limit,
                self.window,
                wait.as_secs_f64()
            );
            self.throttled.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(wait).await;
            window.started = Instant::now();
            window.count = 0;
        }

        window.count += 1;
        self.issued.fetch_add(1, Ordering::SeqCst);
        debug!("Request {} of {} in current window", window.count, self.limit);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_minute(DEFAULT_REQUESTS_PER_MINUTE)
    }
}
