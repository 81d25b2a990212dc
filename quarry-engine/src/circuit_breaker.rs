//! Per-provider circuit breaker.
//!
//! Tracks consecutive failures per provider and takes a provider out of
//! routing after it fails repeatedly. After a cooldown the provider is
//! half-open: the next call is a probe whose outcome closes or re-opens
//! the circuit.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  N failures   ┌────────┐  cooldown   ┌──────────┐
//! │ Closed ├──────────────►│  Open  ├────────────►│ HalfOpen │
//! └───▲────┘               └────────┘             └────┬─────┘
//!     │                         ▲                      │
//!     │  success                │  failure             │
//!     └─────────────────────────┴──────────────────────┘
//! ```
//!
//! Only upstream health counts: transient errors, upstream rate limits and
//! timeouts. Auth, permanent 4xx and parse failures describe the request or
//! the credential, not the provider's availability.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::types::ProviderKind;

/// Circuit state for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Healthy; calls go through.
    Closed,
    /// Tripped; the router skips the provider until the cooldown expires.
    Open,
    /// Cooldown elapsed; the next call decides.
    HalfOpen,
}

#[derive(Debug, Clone)]
struct ProviderHealth {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
        }
    }
}

/// Breaker thresholds. A `failure_threshold` of 0 disables tripping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_secs() -> u64 {
    60
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// Health snapshot for one tracked provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthEntry {
    pub provider: ProviderKind,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Circuit breaker shared by every provider of one engine instance.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    providers: Mutex<HashMap<ProviderKind, ProviderHealth>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a call to `provider` should be attempted now.
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open and
    /// admits the call.
    pub fn should_attempt(&self, provider: ProviderKind) -> bool {
        let mut providers = self.lock();
        let health = providers.entry(provider).or_default();
        match health.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = health
                    .last_failure_at
                    .is_none_or(|t| t.elapsed().as_secs() >= self.config.cooldown_secs);
                if cooled {
                    tracing::debug!(provider = %provider, "circuit half-open, probing");
                    health.state = CircuitState::HalfOpen;
                }
                cooled
            }
        }
    }

    /// Record a successful call; closes the circuit.
    pub fn record_success(&self, provider: ProviderKind) {
        let mut providers = self.lock();
        let health = providers.entry(provider).or_default();
        health.state = CircuitState::Closed;
        health.consecutive_failures = 0;
    }

    /// Record a failed call. Errors that say nothing about upstream health
    /// are ignored.
    pub fn record_failure(&self, provider: ProviderKind, error: &ProviderError) {
        if !counts_against_health(error) || self.config.failure_threshold == 0 {
            return;
        }
        let mut providers = self.lock();
        let health = providers.entry(provider).or_default();
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_failure_at = Some(Instant::now());

        let tripped = health.state == CircuitState::HalfOpen
            || health.consecutive_failures >= self.config.failure_threshold;
        if tripped && health.state != CircuitState::Open {
            tracing::warn!(
                provider = %provider,
                failures = health.consecutive_failures,
                "circuit opened"
            );
            health.state = CircuitState::Open;
        }
    }

    /// Current state; untracked providers are closed.
    pub fn state(&self, provider: ProviderKind) -> CircuitState {
        self.lock()
            .get(&provider)
            .map_or(CircuitState::Closed, |h| h.state)
    }

    /// Every tracked provider, sorted by kind.
    pub fn health_report(&self) -> Vec<HealthEntry> {
        let mut report: Vec<HealthEntry> = self
            .lock()
            .iter()
            .map(|(provider, health)| HealthEntry {
                provider: *provider,
                state: health.state,
                consecutive_failures: health.consecutive_failures,
            })
            .collect();
        report.sort_by_key(|entry| entry.provider);
        report
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ProviderKind, ProviderHealth>> {
        self.providers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

fn counts_against_health(error: &ProviderError) -> bool {
    matches!(
        error,
        ProviderError::TransientUpstream(_)
            | ProviderError::Timeout(_)
            | ProviderError::RateLimited { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown_secs,
        })
    }

    fn transient() -> ProviderError {
        ProviderError::TransientUpstream("HTTP 502".into())
    }

    #[test]
    fn initial_state_is_closed() {
        let breaker = breaker(3, 60);
        assert_eq!(breaker.state(ProviderKind::Serper), CircuitState::Closed);
        assert!(breaker.should_attempt(ProviderKind::Serper));
    }

    #[test]
    fn trips_at_threshold() {
        let breaker = breaker(3, 600);
        breaker.record_failure(ProviderKind::Exa, &transient());
        breaker.record_failure(ProviderKind::Exa, &transient());
        assert_eq!(breaker.state(ProviderKind::Exa), CircuitState::Closed);
        breaker.record_failure(ProviderKind::Exa, &transient());
        assert_eq!(breaker.state(ProviderKind::Exa), CircuitState::Open);
        assert!(!breaker.should_attempt(ProviderKind::Exa));
    }

    #[test]
    fn auth_and_permanent_errors_do_not_trip() {
        let breaker = breaker(1, 600);
        breaker.record_failure(ProviderKind::Tavily, &ProviderError::Auth("401".into()));
        breaker.record_failure(
            ProviderKind::Tavily,
            &ProviderError::PermanentUpstream("404".into()),
        );
        assert_eq!(breaker.state(ProviderKind::Tavily), CircuitState::Closed);
    }

    #[test]
    fn cooldown_moves_to_half_open_and_success_closes() {
        let breaker = breaker(1, 0);
        breaker.record_failure(ProviderKind::Jina, &transient());
        assert_eq!(breaker.state(ProviderKind::Jina), CircuitState::Open);

        assert!(breaker.should_attempt(ProviderKind::Jina));
        assert_eq!(breaker.state(ProviderKind::Jina), CircuitState::HalfOpen);

        breaker.record_success(ProviderKind::Jina);
        assert_eq!(breaker.state(ProviderKind::Jina), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_retrips() {
        let breaker = breaker(2, 0);
        breaker.record_failure(ProviderKind::Serper, &transient());
        breaker.record_failure(ProviderKind::Serper, &transient());
        let _ = breaker.should_attempt(ProviderKind::Serper);
        breaker.record_failure(ProviderKind::Serper, &transient());
        assert_eq!(breaker.state(ProviderKind::Serper), CircuitState::Open);
    }

    #[test]
    fn providers_are_independent() {
        let breaker = breaker(1, 600);
        breaker.record_failure(ProviderKind::Serper, &transient());
        assert!(!breaker.should_attempt(ProviderKind::Serper));
        assert!(breaker.should_attempt(ProviderKind::Exa));
    }

    #[test]
    fn zero_threshold_never_trips() {
        let breaker = breaker(0, 600);
        for _ in 0..10 {
            breaker.record_failure(ProviderKind::Firecrawl, &transient());
        }
        assert!(breaker.should_attempt(ProviderKind::Firecrawl));
    }

    #[test]
    fn success_resets_failures() {
        let breaker = breaker(3, 60);
        for _ in 0..10 {
            breaker.record_failure(ProviderKind::Exa, &transient());
            breaker.record_success(ProviderKind::Exa);
        }
        let report = breaker.health_report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].consecutive_failures, 0);
        assert_eq!(report[0].state, CircuitState::Closed);
    }
}
