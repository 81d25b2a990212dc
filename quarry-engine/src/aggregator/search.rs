//! Concurrent multi-provider search under one overall deadline.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::error::{ProviderError, ProviderFailure};
use crate::provider::{ManagedProvider, ProviderSearchOutput};
use crate::types::{ProviderKind, SearchQuery, SearchResponse};
use crate::usage::{UsageAccumulator, UsageRecord};

use super::cache::{Aggregation, CacheKey, SearchCache};
use super::merge::{combine, paginate};

/// Fans a query out to routed providers and folds the answers into one
/// [`SearchResponse`].
#[derive(Debug)]
pub struct SearchAggregator {
    deadline: Duration,
    cache: Option<SearchCache>,
}

impl SearchAggregator {
    /// An aggregator whose fan-out is abandoned after `deadline`.
    /// A zero `cache_ttl` disables caching.
    pub fn new(deadline: Duration, cache_ttl: Duration) -> Self {
        Self {
            deadline,
            cache: (!cache_ttl.is_zero()).then(|| SearchCache::new(cache_ttl)),
        }
    }

    /// Query every provider in `providers` concurrently.
    ///
    /// # Pipeline
    ///
    /// 1. Serve from the cache when an identical query was fully answered;
    ///    a cached answer reports zero usage
    /// 2. Start one search per provider
    /// 3. Collect answers until all settle or the deadline fires; providers
    ///    still running are dropped and reported as `TIMEOUT`
    /// 4. Combine lists in provider order under the query's strategy
    /// 5. Count results per provider, sum usage, slice the page
    ///
    /// # Errors
    ///
    /// - [`ProviderError::NoEligibleProviders`] when `providers` is empty
    /// - [`ProviderError::Timeout`] when the deadline fires before any
    ///   provider succeeded
    /// - [`ProviderError::AggregateFailure`] when every provider failed
    pub async fn search(
        &self,
        query: &SearchQuery,
        providers: &[Arc<ManagedProvider>],
    ) -> Result<SearchResponse, ProviderError> {
        if providers.is_empty() {
            return Err(ProviderError::NoEligibleProviders(
                "no search provider is configured, credentialed and available".into(),
            ));
        }
        tracing::trace!(query = query.text(), "aggregating search");

        let kinds: Vec<ProviderKind> = providers.iter().map(|p| p.kind()).collect();
        let key = CacheKey::new(query, &kinds);
        if let Some(cache) = &self.cache {
            if let Some(mut hit) = cache.get(&key).await {
                tracing::debug!(providers = kinds.len(), "search cache hit");
                // No provider was called.
                hit.usage = UsageRecord::default();
                return Ok(respond(query, hit, Vec::new()));
            }
        }

        let outcomes = self.fan_out(query, providers).await;

        let usage = UsageAccumulator::new();
        let mut lists = Vec::new();
        let mut providers_used = Vec::new();
        let mut failures = Vec::new();
        let mut timed_out = false;
        for (kind, outcome) in kinds.iter().copied().zip(outcomes) {
            match outcome {
                Some(Ok(output)) => {
                    tracing::debug!(provider = %kind, count = output.results.len(), "provider returned results");
                    usage.add(&output.usage);
                    providers_used.push(kind);
                    lists.push(output.results);
                }
                Some(Err(error)) => failures.push(ProviderFailure::new(kind.name(), &error)),
                None => {
                    timed_out = true;
                    let error = ProviderError::Timeout(format!(
                        "{kind}: no answer within the {:?} search deadline",
                        self.deadline
                    ));
                    tracing::warn!(provider = %kind, "provider cancelled at search deadline");
                    failures.push(ProviderFailure::new(kind.name(), &error));
                }
            }
        }

        if providers_used.is_empty() {
            if timed_out {
                return Err(ProviderError::Timeout(format!(
                    "no provider answered within {:?}",
                    self.deadline
                )));
            }
            return Err(ProviderError::AggregateFailure(failures));
        }

        let results = combine(query.strategy(), lists);
        let mut results_by_provider: BTreeMap<String, usize> = providers_used
            .iter()
            .map(|kind| (kind.name().to_owned(), 0))
            .collect();
        for result in &results {
            *results_by_provider
                .entry(result.provider.name().to_owned())
                .or_default() += 1;
        }

        let aggregation = Aggregation {
            results,
            results_by_provider,
            usage: usage.snapshot(),
            providers_used,
        };
        if failures.is_empty() {
            if let Some(cache) = &self.cache {
                cache.insert(key, aggregation.clone()).await;
            }
        }
        Ok(respond(query, aggregation, failures))
    }

    /// One slot per provider, in provider order; `None` for providers
    /// still running at the deadline.
    async fn fan_out(
        &self,
        query: &SearchQuery,
        providers: &[Arc<ManagedProvider>],
    ) -> Vec<Option<Result<ProviderSearchOutput, ProviderError>>> {
        let mut outcomes: Vec<Option<Result<ProviderSearchOutput, ProviderError>>> =
            providers.iter().map(|_| None).collect();
        let mut pending: FuturesUnordered<_> = providers
            .iter()
            .enumerate()
            .map(|(index, provider)| async move { (index, provider.search(query).await) })
            .collect();

        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some((index, outcome)) => outcomes[index] = Some(outcome),
                    None => break,
                },
                () = &mut deadline => {
                    tracing::warn!(
                        outstanding = pending.len(),
                        deadline = ?self.deadline,
                        "search deadline reached"
                    );
                    break;
                }
            }
        }
        outcomes
    }
}

fn respond(
    query: &SearchQuery,
    aggregation: Aggregation,
    failed_providers: Vec<ProviderFailure>,
) -> SearchResponse {
    let page = paginate(aggregation.results, query.page(), query.per_page());
    SearchResponse {
        results: page.results,
        total_results: page.total_results,
        page: query.page(),
        per_page: query.per_page(),
        total_pages: page.total_pages,
        results_by_provider: aggregation.results_by_provider,
        usage: aggregation.usage,
        providers_used: aggregation.providers_used,
        aggregation_strategy: query.strategy(),
        failed_providers,
    }
}
