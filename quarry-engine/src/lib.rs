//! # quarry-engine
//!
//! Multi-provider web search aggregation and scrape fallback.
//!
//! The engine drives several independent retrieval backends (search APIs,
//! reader/scrape APIs, plain HTTP and a domain-bound Reddit client) behind
//! one request shape and one response shape.
//!
//! ## Design
//!
//! - One [`ProviderClient`] per backend, wrapped in a [`ManagedProvider`]
//!   that adds a sliding-window rate limiter, retry with exponential
//!   backoff, a per-call timeout and a per-instance circuit breaker
//! - Search fans out to every eligible provider concurrently under one
//!   deadline; lists are combined by `merge`, `round_robin` or `priority`,
//!   deduplicated by canonical URL and paginated
//! - Scrape walks eligible providers one at a time until one succeeds;
//!   domain-exclusive providers own the URLs they are bound to
//! - Partial failure is a success with `failed_providers` filled in
//! - Token usage is summed per call and per provider
//!
//! ## Security
//!
//! - No network listeners: this is a library, not a server
//! - Queries are logged only at trace level
//! - Upstream error bodies are reduced to short plain-text messages
//! - API keys are redacted from `Debug` output
//! - No global state: every cache, limiter and breaker belongs to one engine

pub mod aggregator;
pub mod circuit_breaker;
pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod http;
pub mod provider;
pub mod providers;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod router;
pub mod scrape;
pub mod types;
pub mod usage;

pub use aggregator::SearchAggregator;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, HealthEntry};
pub use config::{DomainAffinity, EngineConfig, ProviderConfig};
pub use engine::{ProviderStatus, RetrievalEngine};
pub use error::{error_codes, ErrorReport, ProviderError, ProviderFailure, Result};
pub use provider::{ManagedProvider, ProviderClient, ProviderScrapeOutput, ProviderSearchOutput};
pub use rate_limit::{LimitMode, RateLimitConfig, RateLimiter};
pub use registry::ProviderRegistry;
pub use retry::{Retried, RetryPolicy};
pub use router::ProviderRouter;
pub use scrape::ScrapeOrchestrator;
pub use types::{
    AggregationStrategy, DateRange, OutputFormat, ProviderKind, ProviderMetadata, ScrapeRequest,
    ScrapeResult, SearchQuery, SearchResponse, SearchResult, SearchType,
};
pub use usage::{CountingMethod, UsageAccumulator, UsageRecord};
