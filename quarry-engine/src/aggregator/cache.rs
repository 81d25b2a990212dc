//! TTL cache of aggregated search answers.
//!
//! Holds the full deduplicated sequence, not a page, so every page of a
//! cached query is served without another fan-out. Keyed by the query with
//! its page selection cleared plus the ordered provider set it was routed
//! to. Owned by one [`SearchAggregator`](super::SearchAggregator).

use std::collections::BTreeMap;
use std::time::Duration;

use moka::future::Cache;

use crate::types::{ProviderKind, SearchQuery, SearchResult};
use crate::usage::UsageRecord;

/// Maximum number of cached aggregations.
const MAX_CACHE_ENTRIES: u64 = 100;

/// Composite cache key: page-independent query + routed providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: SearchQuery,
    providers: Vec<ProviderKind>,
}

impl CacheKey {
    pub fn new(query: &SearchQuery, providers: &[ProviderKind]) -> Self {
        Self {
            query: query.clone().with_page(1, 1),
            providers: providers.to_vec(),
        }
    }
}

/// A fully successful aggregation before pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub results: Vec<SearchResult>,
    pub results_by_provider: BTreeMap<String, usize>,
    pub usage: UsageRecord,
    pub providers_used: Vec<ProviderKind>,
}

#[derive(Clone)]
pub struct SearchCache {
    inner: Cache<CacheKey, Aggregation>,
}

impl SearchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(MAX_CACHE_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Aggregation> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: CacheKey, aggregation: Aggregation) {
        self.inner.insert(key, aggregation).await;
    }
}

impl std::fmt::Debug for SearchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}
