//! Backend client implementations, one per [`ProviderKind`].
//!
//! Each client owns its `reqwest::Client` and endpoint and performs a
//! single HTTP exchange per call. Response fields the engine has no slot
//! for are kept in `provider_metadata`.

pub mod direct;
pub mod exa;
pub mod firecrawl;
pub mod jina;
pub mod reddit;
pub mod serper;
pub mod tavily;

pub use direct::DirectClient;
pub use exa::ExaClient;
pub use firecrawl::FirecrawlClient;
pub use jina::JinaClient;
pub use reddit::RedditClient;
pub use serper::SerperClient;
pub use tavily::TavilyClient;

use std::sync::Arc;

use url::Url;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::provider::ProviderClient;
use crate::types::{ProviderKind, SearchResult};

/// Build the client for `config.kind`.
///
/// # Errors
///
/// Returns [`ProviderError::Config`] if the HTTP client cannot be built.
pub fn build(config: &ProviderConfig) -> Result<Arc<dyn ProviderClient>, ProviderError> {
    let client: Arc<dyn ProviderClient> = match config.kind {
        ProviderKind::Serper => Arc::new(SerperClient::new(config)?),
        ProviderKind::Tavily => Arc::new(TavilyClient::new(config)?),
        ProviderKind::Exa => Arc::new(ExaClient::new(config)?),
        ProviderKind::Jina => Arc::new(JinaClient::new(config)?),
        ProviderKind::Firecrawl => Arc::new(FirecrawlClient::new(config)?),
        ProviderKind::Direct => Arc::new(DirectClient::new(config)?),
        ProviderKind::Reddit => Arc::new(RedditClient::new(config)?),
    };
    Ok(client)
}

/// The configured key, or an auth error naming the provider.
pub(crate) fn require_key(kind: ProviderKind, key: Option<&str>) -> Result<&str, ProviderError> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ProviderError::Auth(format!("{kind}: no api key configured")))
}

/// Lower-cased host of `url` without a leading `www.`.
pub(crate) fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_owned).unwrap_or(host))
}

/// Whether `host` is `domain` or one of its subdomains.
pub(crate) fn host_in_domain(host: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_start_matches("www.").to_ascii_lowercase();
    host == domain
        || host
            .strip_suffix(domain.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Apply include/exclude domain lists locally, for backends that cannot.
pub(crate) fn filter_domains(
    results: Vec<SearchResult>,
    include: &[String],
    exclude: &[String],
) -> Vec<SearchResult> {
    if include.is_empty() && exclude.is_empty() {
        return results;
    }
    results
        .into_iter()
        .filter(|r| {
            let Some(host) = host_of(&r.url) else {
                return include.is_empty();
            };
            let included = include.is_empty() || include.iter().any(|d| host_in_domain(&host, d));
            let excluded = exclude.iter().any(|d| host_in_domain(&host, d));
            included && !excluded
        })
        .collect()
}

/// `None` for missing or blank strings.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
