//! The retrieval engine facade.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::aggregator::SearchAggregator;
use crate::circuit_breaker::CircuitState;
use crate::config::EngineConfig;
use crate::error::ProviderError;
use crate::provider::ProviderClient;
use crate::registry::ProviderRegistry;
use crate::router::ProviderRouter;
use crate::scrape::{validate_url, ScrapeOrchestrator};
use crate::types::{ProviderKind, ScrapeRequest, ScrapeResult, SearchQuery, SearchResponse};
use crate::usage::{UsageAccumulator, UsageRecord};

/// Routing-relevant state of one configured provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub provider: ProviderKind,
    pub search: bool,
    pub scrape: bool,
    pub credentialed: bool,
    pub exclusive: bool,
    pub circuit: CircuitState,
    /// Failures since the last success that counted against the circuit.
    pub consecutive_failures: u32,
    /// Free limiter slots; `None` when the provider is not rate limited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_requests: Option<u32>,
    pub usage: UsageRecord,
}

/// Owns the provider table, router, aggregator and scrape orchestrator
/// built from one [`EngineConfig`].
///
/// # Example
///
/// ```no_run
/// use quarry_engine::{EngineConfig, ProviderConfig, ProviderKind, RetrievalEngine, SearchQuery};
///
/// # async fn run() -> Result<(), quarry_engine::ProviderError> {
/// let config = EngineConfig::with_providers(vec![
///     ProviderConfig::new(ProviderKind::Serper).with_api_key("serper-key"),
///     ProviderConfig::new(ProviderKind::Direct),
/// ]);
/// let engine = RetrievalEngine::new(config)?;
/// let response = engine.search(&SearchQuery::new("rust async runtimes")).await?;
/// for result in &response.results {
///     println!("{} - {}", result.title, result.url);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RetrievalEngine {
    config: EngineConfig,
    registry: ProviderRegistry,
    router: ProviderRouter,
    aggregator: SearchAggregator,
    scraper: ScrapeOrchestrator,
}

impl RetrievalEngine {
    /// Validate `config` and build one client per configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] if the configuration is invalid or
    /// a client cannot be built.
    pub fn new(config: EngineConfig) -> Result<Self, ProviderError> {
        config.validate()?;
        let registry = ProviderRegistry::from_config(&config)?;
        Ok(Self::assemble(config, registry))
    }

    /// Like [`new`](Self::new), but with caller-supplied clients. Every
    /// client's kind must be configured in `config`; its settings (timeout,
    /// retries, rate limit, credential) come from there.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] if the configuration is invalid or
    /// a client's kind is not configured.
    pub fn with_clients(
        config: EngineConfig,
        clients: Vec<Arc<dyn ProviderClient>>,
    ) -> Result<Self, ProviderError> {
        config.validate()?;
        let paired = clients
            .into_iter()
            .map(|client| {
                let kind = client.kind();
                let provider = config.provider(kind).cloned().ok_or_else(|| {
                    ProviderError::Config(format!("client '{kind}' has no provider config"))
                })?;
                Ok((client, provider))
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;
        let registry = ProviderRegistry::from_clients(paired, config.circuit_breaker);
        Ok(Self::assemble(config, registry))
    }

    fn assemble(config: EngineConfig, registry: ProviderRegistry) -> Self {
        let router = ProviderRouter::new(&config);
        let aggregator = SearchAggregator::new(
            config.search_timeout(),
            std::time::Duration::from_secs(config.cache_ttl_secs),
        );
        tracing::info!(
            providers = registry.len(),
            order = ?router.order(),
            "retrieval engine ready"
        );
        Self {
            config,
            registry,
            router,
            aggregator,
            scraper: ScrapeOrchestrator::new(),
        }
    }

    /// Search every eligible provider concurrently and return one page of
    /// the combined, deduplicated results.
    ///
    /// # Errors
    ///
    /// Invalid queries fail with [`ProviderError::Config`]; otherwise see
    /// [`SearchAggregator::search`].
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ProviderError> {
        query.validate()?;
        let providers = self.router.search_candidates(&self.registry, query.providers());
        self.aggregator.search(query, &providers).await
    }

    /// Scrape one URL, falling back through eligible providers.
    ///
    /// # Errors
    ///
    /// A URL that is not absolute `http`/`https` fails with
    /// [`ProviderError::Config`]; otherwise see
    /// [`ScrapeOrchestrator::scrape`].
    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResult, ProviderError> {
        validate_url(&request.url)?;
        let candidates = self.router.scrape_candidates(&self.registry, request);
        self.scraper.scrape(&request.url, &candidates).await
    }

    /// Usage of every provider since the engine was built.
    pub fn usage(&self) -> UsageRecord {
        let total = UsageAccumulator::new();
        for provider in self.registry.iter() {
            let usage = provider.usage();
            if usage != UsageRecord::default() {
                total.add(&usage);
            }
        }
        total.snapshot()
    }

    /// Every configured provider in priority order.
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        let failures: HashMap<ProviderKind, u32> = self
            .registry
            .breaker()
            .health_report()
            .into_iter()
            .map(|entry| (entry.provider, entry.consecutive_failures))
            .collect();
        self.router
            .order()
            .iter()
            .filter_map(|kind| self.registry.get(*kind))
            .map(|provider| {
                let kind = provider.kind();
                let limited = self
                    .config
                    .provider(kind)
                    .is_some_and(|c| c.rate_limit.is_some());
                ProviderStatus {
                    provider: kind,
                    search: kind.supports_search(),
                    scrape: kind.supports_scrape(),
                    credentialed: provider.has_credentials(),
                    exclusive: provider.affinity().is_exclusive(),
                    circuit: self.registry.breaker().state(kind),
                    consecutive_failures: failures.get(&kind).copied().unwrap_or(0),
                    remaining_requests: limited.then(|| provider.remaining_requests()),
                    usage: provider.usage(),
                }
            })
            .collect()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::provider::testing::{results, MockClient};
    use crate::rate_limit::RateLimitConfig;
    use crate::types::AggregationStrategy;

    fn engine(config: EngineConfig, clients: Vec<MockClient>) -> RetrievalEngine {
        let clients = clients
            .into_iter()
            .map(|c| Arc::new(c) as Arc<dyn ProviderClient>)
            .collect();
        RetrievalEngine::with_clients(config, clients).expect("engine")
    }

    #[tokio::test]
    async fn search_routes_and_merges() {
        let mut config = EngineConfig::with_providers(vec![
            ProviderConfig::new(ProviderKind::Jina).with_api_key("k"),
            ProviderConfig::new(ProviderKind::Serper).with_api_key("k"),
            ProviderConfig::new(ProviderKind::Reddit),
        ]);
        config.default_provider = Some(ProviderKind::Serper);
        let engine = engine(
            config,
            vec![
                MockClient::new(ProviderKind::Jina).with_results(results(ProviderKind::Jina, "j.com", 5)),
                MockClient::new(ProviderKind::Serper).with_results(results(ProviderKind::Serper, "s.com", 5)),
                MockClient::new(ProviderKind::Reddit),
            ],
        );

        let response = engine
            .search(&SearchQuery::new("rust").with_strategy(AggregationStrategy::Priority))
            .await
            .expect("search");
        assert_eq!(response.providers_used, [ProviderKind::Serper, ProviderKind::Jina]);
        assert_eq!(response.total_results, 10);
        assert!(engine.usage().total_tokens > 0);
    }

    #[tokio::test]
    async fn invalid_query_is_rejected_before_routing() {
        let engine = engine(EngineConfig::default(), Vec::new());
        let err = engine.search(&SearchQuery::new("")).await.unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }

    #[tokio::test]
    async fn search_without_providers_is_not_eligible() {
        let engine = engine(
            EngineConfig::with_providers(vec![ProviderConfig::new(ProviderKind::Serper)]),
            vec![MockClient::new(ProviderKind::Serper)],
        );
        let err = engine.search(&SearchQuery::new("rust")).await.unwrap_err();
        assert_eq!(err.code(), "NO_ELIGIBLE_PROVIDERS");
    }

    #[tokio::test]
    async fn scrape_rejects_non_http_urls() {
        let engine = engine(
            EngineConfig::with_providers(vec![ProviderConfig::new(ProviderKind::Direct)]),
            vec![MockClient::new(ProviderKind::Direct)],
        );
        let err = engine
            .scrape(&ScrapeRequest::new("file:///etc/passwd"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");

        let ok = engine
            .scrape(&ScrapeRequest::new("https://example.com"))
            .await
            .expect("scrape");
        assert_eq!(ok.provider_used, ProviderKind::Direct);
    }

    #[tokio::test]
    async fn reddit_failure_does_not_fall_back_to_generic() {
        let engine = engine(
            EngineConfig::with_providers(vec![
                ProviderConfig::new(ProviderKind::Direct),
                ProviderConfig::new(ProviderKind::Reddit).with_max_retries(1),
            ]),
            vec![
                MockClient::new(ProviderKind::Direct),
                MockClient::new(ProviderKind::Reddit)
                    .with_scrape_error(ProviderError::PermanentUpstream("reddit: HTTP 404: not found".into())),
            ],
        );
        let err = engine
            .scrape(&ScrapeRequest::new("https://www.reddit.com/r/rust/comments/abc/x"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SCRAPE_EXHAUSTED");
        let providers: Vec<&str> = err.failures().iter().map(|f| f.provider.as_str()).collect();
        assert_eq!(providers, ["reddit"]);
    }

    #[test]
    fn unconfigured_client_is_rejected() {
        let err = RetrievalEngine::with_clients(
            EngineConfig::default(),
            vec![Arc::new(MockClient::new(ProviderKind::Exa)) as Arc<dyn ProviderClient>],
        )
        .unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }

    #[test]
    fn status_lists_providers_in_priority_order() {
        let mut config = EngineConfig::with_providers(vec![
            ProviderConfig::new(ProviderKind::Direct),
            ProviderConfig::new(ProviderKind::Exa).with_rate_limit(RateLimitConfig {
                requests: 5,
                period_secs: 60,
            }),
        ]);
        config.priority = vec![ProviderKind::Exa];
        let engine = engine(
            config,
            vec![MockClient::new(ProviderKind::Direct), MockClient::new(ProviderKind::Exa)],
        );

        let status = engine.provider_status();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].provider, ProviderKind::Exa);
        assert!(!status[0].credentialed);
        assert_eq!(status[0].remaining_requests, Some(5));
        assert_eq!(status[1].provider, ProviderKind::Direct);
        assert!(status[1].scrape && !status[1].search);
        assert_eq!(status[1].remaining_requests, None);
        assert_eq!(status[1].circuit, CircuitState::Closed);
        assert_eq!(status[1].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn status_reports_failures_counted_by_the_breaker() {
        let mut config = EngineConfig::with_providers(vec![
            ProviderConfig::new(ProviderKind::Direct).with_max_retries(1),
        ]);
        config.circuit_breaker.failure_threshold = 2;
        let engine = engine(
            config,
            vec![MockClient::new(ProviderKind::Direct)
                .with_scrape_error(ProviderError::TransientUpstream("direct: HTTP 503".into()))],
        );

        let request = ScrapeRequest::new("https://example.com");
        engine.scrape(&request).await.unwrap_err();
        let status = engine.provider_status();
        assert_eq!(status[0].consecutive_failures, 1);
        assert_eq!(status[0].circuit, CircuitState::Closed);

        engine.scrape(&request).await.unwrap_err();
        let status = engine.provider_status();
        assert_eq!(status[0].consecutive_failures, 2);
        assert_eq!(status[0].circuit, CircuitState::Open);
    }
}
