//! Core value types: provider identity, queries, results and responses.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderFailure};
use crate::usage::UsageRecord;

/// Opaque bag of backend-only fields kept on results.
pub type ProviderMetadata = serde_json::Map<String, serde_json::Value>;

/// The closed set of backends the engine can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Serper.dev Google search API.
    Serper,
    /// Tavily search API.
    Tavily,
    /// Exa neural/keyword search API.
    Exa,
    /// Jina search (`s.jina.ai`) and reader (`r.jina.ai`).
    Jina,
    /// Firecrawl scrape API.
    Firecrawl,
    /// Plain HTTP fetch with local text extraction.
    Direct,
    /// Reddit thread JSON, bound to reddit domains.
    Reddit,
}

impl ProviderKind {
    /// Wire name used in configuration and responses.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Serper => "serper",
            Self::Tavily => "tavily",
            Self::Exa => "exa",
            Self::Jina => "jina",
            Self::Firecrawl => "firecrawl",
            Self::Direct => "direct",
            Self::Reddit => "reddit",
        }
    }

    /// Whether the backend refuses calls without an API key.
    pub fn requires_credentials(&self) -> bool {
        !matches!(self, Self::Direct | Self::Reddit)
    }

    /// Whether the backend can answer search queries.
    pub fn supports_search(&self) -> bool {
        matches!(self, Self::Serper | Self::Tavily | Self::Exa | Self::Jina)
    }

    /// Whether the backend can scrape a single URL.
    pub fn supports_scrape(&self) -> bool {
        matches!(
            self,
            Self::Jina | Self::Firecrawl | Self::Direct | Self::Reddit
        )
    }

    /// Returns all provider variants.
    pub fn all() -> &'static [ProviderKind] {
        &[
            Self::Serper,
            Self::Tavily,
            Self::Exa,
            Self::Jina,
            Self::Firecrawl,
            Self::Direct,
            Self::Reddit,
        ]
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| ProviderError::Config(format!("unknown provider '{s}'")))
    }
}

/// How per-provider result lists are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// Concatenate in provider order, then deduplicate.
    #[default]
    Merge,
    /// Interleave one result per provider per round, then deduplicate.
    RoundRobin,
    /// Append whole provider lists in order, dropping URLs already present.
    Priority,
}

impl FromStr for AggregationStrategy {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "merge" => Ok(Self::Merge),
            "round_robin" => Ok(Self::RoundRobin),
            "priority" => Ok(Self::Priority),
            other => Err(ProviderError::Config(format!(
                "unknown aggregation strategy '{other}'"
            ))),
        }
    }
}

/// Search mode hint forwarded to providers that understand it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Let the provider decide.
    #[default]
    Auto,
    /// Embedding-based search.
    Neural,
    /// Classic keyword search.
    Keyword,
}

impl SearchType {
    /// Wire name of the mode.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Neural => "neural",
            Self::Keyword => "keyword",
        }
    }
}

impl FromStr for SearchType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "neural" => Ok(Self::Neural),
            "keyword" => Ok(Self::Keyword),
            other => Err(ProviderError::Config(format!("unknown search type '{other}'"))),
        }
    }
}

/// Inclusive publication date window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest publication date.
    pub start: Option<NaiveDate>,
    /// Latest publication date.
    pub end: Option<NaiveDate>,
}

/// A search request. Built once through the `with_*` methods and then
/// only read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchQuery {
    text: String,
    num_results: usize,
    providers: Option<Vec<ProviderKind>>,
    strategy: AggregationStrategy,
    search_type: SearchType,
    include_domains: Vec<String>,
    exclude_domains: Vec<String>,
    date_range: Option<DateRange>,
    page: usize,
    per_page: usize,
}

impl SearchQuery {
    /// Create a query with default settings: 10 results per provider,
    /// every eligible provider, `merge`, `auto`, first page of 10.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            num_results: 10,
            providers: None,
            strategy: AggregationStrategy::default(),
            search_type: SearchType::default(),
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
            date_range: None,
            page: 1,
            per_page: 10,
        }
    }

    /// Results requested from each provider.
    pub fn with_num_results(mut self, num: usize) -> Self {
        self.num_results = num;
        self
    }

    /// Restrict the fan-out to these providers, in this order.
    pub fn with_providers(mut self, providers: Vec<ProviderKind>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Set the aggregation strategy.
    pub fn with_strategy(mut self, strategy: AggregationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the search mode hint.
    pub fn with_search_type(mut self, search_type: SearchType) -> Self {
        self.search_type = search_type;
        self
    }

    /// Only return results from these domains.
    pub fn with_include_domains(mut self, domains: Vec<String>) -> Self {
        self.include_domains = domains;
        self
    }

    /// Never return results from these domains.
    pub fn with_exclude_domains(mut self, domains: Vec<String>) -> Self {
        self.exclude_domains = domains;
        self
    }

    /// Restrict results to a publication window.
    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// Select the 1-based page and its size.
    pub fn with_page(mut self, page: usize, per_page: usize) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn num_results(&self) -> usize {
        self.num_results
    }

    pub fn providers(&self) -> Option<&[ProviderKind]> {
        self.providers.as_deref()
    }

    pub fn strategy(&self) -> AggregationStrategy {
        self.strategy
    }

    pub fn search_type(&self) -> SearchType {
        self.search_type
    }

    pub fn include_domains(&self) -> &[String] {
        &self.include_domains
    }

    pub fn exclude_domains(&self) -> &[String] {
        &self.exclude_domains
    }

    pub fn date_range(&self) -> Option<&DateRange> {
        self.date_range.as_ref()
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    /// Reject queries no provider could answer.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.text.trim().is_empty() {
            return Err(ProviderError::Config("query text must not be empty".into()));
        }
        if self.num_results == 0 {
            return Err(ProviderError::Config(
                "num_results must be greater than 0".into(),
            ));
        }
        if self.page == 0 {
            return Err(ProviderError::Config("page must be 1 or greater".into()));
        }
        if self.per_page == 0 {
            return Err(ProviderError::Config(
                "per_page must be greater than 0".into(),
            ));
        }
        if let Some(DateRange {
            start: Some(start),
            end: Some(end),
        }) = self.date_range
        {
            if start > end {
                return Err(ProviderError::Config(
                    "date range start must not be after end".into(),
                ));
            }
        }
        Ok(())
    }
}

/// A single search hit, normalised across providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    /// Snippet or extracted text.
    pub content: String,
    /// Provider that returned this hit.
    pub provider: ProviderKind,
    /// Relevance score, higher is better. Provider-native when reported,
    /// position decay otherwise.
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Backend-only fields, passed through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub provider_metadata: ProviderMetadata,
}

/// Format of scraped content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Html,
    Text,
}

impl OutputFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Text => "text",
        }
    }
}

/// A request to extract the content of one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub url: String,
    /// Provider to try first, bypassing priority order.
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    /// Whether other providers may be tried after the first fails.
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ScrapeRequest {
    /// Scrape `url` through the configured priority chain.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            provider: None,
            fallback_enabled: true,
        }
    }

    /// Try `provider` first.
    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Disable or enable fallback to later candidates.
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }
}

/// Content extracted from one URL by one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub url: String,
    pub content: String,
    pub format: OutputFormat,
    pub provider_used: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: ProviderMetadata,
    pub usage: UsageRecord,
}

/// The unified answer to a search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// The requested page of deduplicated results.
    pub results: Vec<SearchResult>,
    /// Deduplicated results across all pages.
    pub total_results: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    /// Deduplicated result count per provider wire name.
    pub results_by_provider: BTreeMap<String, usize>,
    pub usage: UsageRecord,
    /// Providers that answered, in merge order.
    pub providers_used: Vec<ProviderKind>,
    pub aggregation_strategy: AggregationStrategy,
    /// Providers that failed or timed out while others succeeded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_providers: Vec<ProviderFailure>,
}
