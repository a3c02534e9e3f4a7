//! Sliding-window rate limiter for outbound source requests.
//!
//! One limiter instance is shared (via `Arc`) by every job that talks to
//! the source. It never blocks: when the budget for a window is spent,
//! `check` returns `ScrapeError::RateLimited` and the caller decides
//! whether to abort or reschedule.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{ScrapeError, ScrapeResult};

/// Budget configuration for one sliding window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum requests allowed inside a window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Per-source sliding-window limiter.
///
/// Explicitly constructed and injected rather than held as a global, so
/// tests can create isolated instances. All state lives behind one mutex;
/// the lock is never held across I/O (the limiter does none).
pub struct SourceRateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SourceRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request against `source`, or refuse it.
    ///
    /// Expired timestamps are pruned on every call, so an idle source's
    /// window drains without a background task.
    pub fn check(&self, source: &str) -> ScrapeResult<()> {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let window = windows.entry(source.to_string()).or_default();

        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) >= self.config.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.config.max_requests as usize {
            tracing::warn!(source, "rate limit budget exhausted");
            return Err(ScrapeError::RateLimited {
                source_key: source.to_string(),
            });
        }

        window.push_back(now);
        Ok(())
    }

    /// Drop every source's window atomically.
    ///
    /// Used for test isolation and operational recovery; safe to call
    /// while other threads are mid-`check`.
    pub fn reset(&self) {
        self.windows
            .lock()
            .expect("rate limiter mutex poisoned")
            .clear();
    }

    /// Requests currently counted against `source` (diagnostics).
    pub fn in_flight(&self, source: &str) -> usize {
        self.windows
            .lock()
            .expect("rate limiter mutex poisoned")
            .get(source)
            .map(|w| w.len())
            .unwrap_or(0)
    }
}

impl Default for SourceRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
