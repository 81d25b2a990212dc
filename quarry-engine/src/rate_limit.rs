//! Sliding-window rate limiting for one provider client.
//!
//! Each [`RateLimiter`] keeps the start times of recent calls. A call is
//! admitted only while fewer than `max_requests` starts fall inside the
//! trailing `period`. The check and the record happen under one lock, so
//! the bound holds for any number of concurrent callers; waiting happens
//! outside the lock.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::ProviderError;

/// Requests allowed per rolling period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum call starts inside one window.
    pub requests: u32,
    /// Window length in seconds.
    pub period_secs: u64,
}

impl RateLimitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// What `acquire` does when the window is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitMode {
    /// Sleep until the oldest start leaves the window.
    Block,
    /// Return [`ProviderError::RateLimited`] immediately.
    FailFast,
}

/// Per-provider sliding-window limiter.
#[derive(Debug)]
pub struct RateLimiter {
    limit: Option<RateLimitConfig>,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// A limiter enforcing `config`.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limit: Some(config),
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// A limiter that admits every call.
    pub fn unlimited() -> Self {
        Self {
            limit: None,
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Build from an optional config; `None` means unlimited.
    pub fn from_config(config: Option<RateLimitConfig>) -> Self {
        config.map_or_else(Self::unlimited, Self::new)
    }

    /// Wait for (or fail to get) a call slot, according to `mode`.
    pub async fn acquire(&self, mode: LimitMode) -> Result<(), ProviderError> {
        loop {
            let wait = match self.try_admit() {
                None => return Ok(()),
                Some(wait) => wait,
            };
            match mode {
                LimitMode::FailFast => {
                    return Err(ProviderError::RateLimited {
                        message: self.exceeded_message(),
                        retry_after: Some(wait),
                    });
                }
                LimitMode::Block => {
                    tracing::trace!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Number of calls that may start right now.
    pub fn remaining(&self) -> u32 {
        let Some(limit) = self.limit else {
            return u32::MAX;
        };
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut window, Instant::now(), limit.period());
        limit.requests.saturating_sub(window.len() as u32)
    }

    /// Admit the call and return `None`, or return how long until a slot frees.
    fn try_admit(&self) -> Option<Duration> {
        let limit = self.limit?;
        let now = Instant::now();
        let period = limit.period();

        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut window, now, period);

        if window.len() < limit.requests as usize {
            window.push_back(now);
            return None;
        }

        // Full window: the oldest start decides when the next slot opens.
        let oldest = window.front().copied().unwrap_or(now);
        let free_at = oldest + period;
        Some(free_at.saturating_duration_since(now).max(Duration::from_millis(1)))
    }

    fn exceeded_message(&self) -> String {
        match self.limit {
            Some(limit) => format!(
                "local limit of {} requests per {}s reached",
                limit.requests, limit.period_secs
            ),
            None => "rate limit reached".to_owned(),
        }
    }
}

/// Drop starts that are at least `period` old.
fn prune(window: &mut VecDeque<Instant>, now: Instant, period: Duration) {
    while let Some(&first) = window.front() {
        if now.saturating_duration_since(first) >= period {
            window.pop_front();
        } else {
            break;
        }
    }
}
