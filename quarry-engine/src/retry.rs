//! Bounded retry with exponential backoff and jitter.
//!
//! | error | behaviour |
//! |-------|-----------|
//! | `Auth` | fail fast |
//! | `RateLimited` | wait `retry_after` (or backoff), retry |
//! | `TransientUpstream` | exponential backoff + jitter, retry |
//! | anything else | fail fast |
//!
//! `max_retries` is the attempt budget: an operation that keeps failing
//! transiently runs exactly `max_retries` times (at least once) and the
//! last classified error is returned.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::ProviderError;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default cap on any single wait.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// A successful value plus how many retries it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    /// Attempts beyond the first.
    pub retry_count: u32,
}

/// Retry policy for one provider.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Policy with the default backoff curve.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }

    /// Override the backoff curve.
    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay.max(base_delay);
        self
    }

    /// Total attempts allowed, never less than one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Run `operation` until it succeeds, fails permanently, or the budget
    /// is spent. The closure receives the 0-based attempt number.
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        mut operation: F,
    ) -> Result<Retried<T>, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.max_attempts();
        let mut attempt = 0;
        loop {
            let error = match operation(attempt).await {
                Ok(value) => {
                    return Ok(Retried {
                        value,
                        retry_count: attempt,
                    });
                }
                Err(error) => error,
            };

            attempt += 1;
            if !error.is_retryable() || attempt >= attempts {
                if error.is_retryable() {
                    tracing::warn!(provider = label, attempts, error = %error, "retries exhausted");
                }
                return Err(error);
            }

            let delay = match &error {
                ProviderError::RateLimited {
                    retry_after: Some(wait),
                    ..
                } => (*wait).min(self.max_delay),
                _ => self.backoff_delay(attempt),
            };
            tracing::debug!(
                provider = label,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after failure"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`,
    /// capped at `max_delay`, plus up to half of that as jitter.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let base = self
            .base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay);
        let jitter_cap = base.as_millis() as u64 / 2;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        base + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
