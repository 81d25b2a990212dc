//! Provider client trait and the managed wrapper the engine calls through.
//!
//! A [`ProviderClient`] performs exactly one backend call and maps the
//! answer into engine types. [`ManagedProvider`] adds everything around that
//! call: rate limiting, retries, the per-call timeout, circuit breaker
//! bookkeeping, and usage accounting.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{DomainAffinity, ProviderConfig};
use crate::error::ProviderError;
use crate::rate_limit::{LimitMode, RateLimiter};
use crate::retry::RetryPolicy;
use crate::types::{OutputFormat, ProviderKind, ProviderMetadata, SearchQuery, SearchResult};
use crate::usage::{UsageAccumulator, UsageRecord};

/// Results of one provider search call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderSearchOutput {
    pub results: Vec<SearchResult>,
    pub usage: UsageRecord,
}

/// Content of one provider scrape call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderScrapeOutput {
    pub content: String,
    pub format: OutputFormat,
    pub title: Option<String>,
    pub metadata: ProviderMetadata,
    pub usage: UsageRecord,
}

/// One backend. Implementations translate engine requests into backend
/// requests and backend responses into engine types; they never retry,
/// rate limit, or time out on their own.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Which URLs this client is bound to.
    fn affinity(&self) -> &DomainAffinity;

    /// Whether this client can serve `url`.
    fn handles(&self, url: &str) -> bool {
        self.affinity().matches(url)
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProviderSearchOutput, ProviderError> {
        let _ = query;
        Err(ProviderError::Unsupported(format!(
            "{} does not support search",
            self.kind()
        )))
    }

    async fn scrape(
        &self,
        url: &str,
        format: OutputFormat,
    ) -> Result<ProviderScrapeOutput, ProviderError> {
        let _ = (url, format);
        Err(ProviderError::Unsupported(format!(
            "{} does not support scrape",
            self.kind()
        )))
    }
}

/// A client plus its limiter, retry policy, timeout and usage total.
pub struct ManagedProvider {
    client: Arc<dyn ProviderClient>,
    has_credentials: bool,
    output_format: OutputFormat,
    timeout: Duration,
    limiter: RateLimiter,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    usage: UsageAccumulator,
}

impl ManagedProvider {
    pub fn new(
        client: Arc<dyn ProviderClient>,
        config: &ProviderConfig,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            client,
            has_credentials: config.has_credentials(),
            output_format: config.output_format,
            timeout: config.timeout(),
            limiter: RateLimiter::from_config(config.rate_limit),
            retry: RetryPolicy::new(config.max_retries),
            breaker,
            usage: UsageAccumulator::new(),
        }
    }

    /// Replace the retry policy (tests shorten the backoff curve).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.client.kind()
    }

    pub fn affinity(&self) -> &DomainAffinity {
        self.client.affinity()
    }

    pub fn handles(&self, url: &str) -> bool {
        self.client.handles(url)
    }

    pub fn has_credentials(&self) -> bool {
        self.has_credentials
    }

    /// Whether the circuit breaker currently admits calls.
    pub fn is_available(&self) -> bool {
        self.breaker.should_attempt(self.kind())
    }

    /// Call starts the limiter would admit right now.
    pub fn remaining_requests(&self) -> u32 {
        self.limiter.remaining()
    }

    /// Lifetime usage of this provider.
    pub fn usage(&self) -> UsageRecord {
        self.usage.snapshot()
    }

    /// Search, waiting for a limiter slot when the window is full.
    pub async fn search(&self, query: &SearchQuery) -> Result<ProviderSearchOutput, ProviderError> {
        let output = self
            .call("search", LimitMode::Block, || self.client.search(query))
            .await?;
        self.usage.add(&output.usage);
        Ok(output)
    }

    /// Scrape, failing fast when the limiter has no free slot so the
    /// caller can move on to the next candidate.
    pub async fn scrape(&self, url: &str) -> Result<ProviderScrapeOutput, ProviderError> {
        let output = self
            .call("scrape", LimitMode::FailFast, || {
                self.client.scrape(url, self.output_format)
            })
            .await?;
        self.usage.add(&output.usage);
        Ok(output)
    }

    async fn call<T, F, Fut>(&self, operation: &str, first_slot: LimitMode, op: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let kind = self.kind();
        self.limiter.acquire(first_slot).await?;

        let limiter = &self.limiter;
        let op = &op;
        let timeout = self.timeout;
        let outcome = self
            .retry
            .execute(kind.name(), |attempt| async move {
                if attempt > 0 {
                    limiter.acquire(LimitMode::Block).await?;
                }
                tokio::time::timeout(timeout, op()).await.unwrap_or_else(|_| {
                    Err(ProviderError::TransientUpstream(format!(
                        "{kind}: no response within {}s",
                        timeout.as_secs()
                    )))
                })
            })
            .await;

        match outcome {
            Ok(retried) => {
                self.breaker.record_success(kind);
                tracing::debug!(
                    provider = %kind,
                    operation,
                    retries = retried.retry_count,
                    "provider call succeeded"
                );
                Ok(retried.value)
            }
            Err(error) => {
                self.breaker.record_failure(kind, &error);
                tracing::warn!(provider = %kind, operation, error = %error, "provider call failed");
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for ManagedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProvider")
            .field("kind", &self.kind())
            .field("has_credentials", &self.has_credentials)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable in-memory client shared by unit tests.

    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    pub(crate) fn result(kind: ProviderKind, url: &str, score: f64) -> SearchResult {
        SearchResult {
            title: format!("{kind} {url}"),
            url: url.to_owned(),
            content: format!("snippet from {kind}"),
            provider: kind,
            score,
            published_date: None,
            author: None,
            provider_metadata: ProviderMetadata::new(),
        }
    }

    /// Results `https://{host}/{i}` for `i` in `0..n`.
    pub(crate) fn results(kind: ProviderKind, host: &str, n: usize) -> Vec<SearchResult> {
        (0..n)
            .map(|i| result(kind, &format!("https://{host}/{i}"), 1.0 / (1.0 + 0.1 * i as f64)))
            .collect()
    }

    pub(crate) struct MockClient {
        kind: ProviderKind,
        affinity: DomainAffinity,
        delay: Duration,
        search_outcomes: Mutex<Vec<Result<Vec<SearchResult>, ProviderError>>>,
        scrape_outcome: Result<String, ProviderError>,
        pub(crate) calls: AtomicU32,
    }

    impl MockClient {
        pub(crate) fn new(kind: ProviderKind) -> Self {
            Self {
                kind,
                affinity: DomainAffinity::default_for(kind),
                delay: Duration::ZERO,
                search_outcomes: Mutex::new(Vec::new()),
                scrape_outcome: Ok(format!("content via {kind}")),
                calls: AtomicU32::new(0),
            }
        }

        /// Every search returns `results`.
        pub(crate) fn with_results(self, results: Vec<SearchResult>) -> Self {
            self.with_search_outcomes(vec![Ok(results)])
        }

        /// Searches pop outcomes in order; the last one repeats.
        pub(crate) fn with_search_outcomes(
            self,
            outcomes: Vec<Result<Vec<SearchResult>, ProviderError>>,
        ) -> Self {
            *self.search_outcomes.lock().expect("lock") = outcomes;
            self
        }

        pub(crate) fn with_scrape_error(mut self, error: ProviderError) -> Self {
            self.scrape_outcome = Err(error);
            self
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn with_affinity(mut self, affinity: DomainAffinity) -> Self {
            self.affinity = affinity;
            self
        }

        pub(crate) fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderClient for MockClient {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn affinity(&self) -> &DomainAffinity {
            &self.affinity
        }

        async fn search(&self, _query: &SearchQuery) -> Result<ProviderSearchOutput, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let outcome = {
                let mut outcomes = self.search_outcomes.lock().expect("lock");
                if outcomes.len() > 1 {
                    outcomes.remove(0)
                } else {
                    outcomes.first().cloned().unwrap_or_else(|| Ok(Vec::new()))
                }
            };
            let results = outcome?;
            Ok(ProviderSearchOutput {
                usage: UsageRecord::approximate("query", &"x".repeat(results.len() * 4)),
                results,
            })
        }

        async fn scrape(
            &self,
            url: &str,
            format: OutputFormat,
        ) -> Result<ProviderScrapeOutput, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let content = self.scrape_outcome.clone()?;
            Ok(ProviderScrapeOutput {
                usage: UsageRecord::approximate(url, &content),
                content,
                format,
                title: None,
                metadata: ProviderMetadata::new(),
            })
        }
    }
}
