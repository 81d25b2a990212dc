//! Sequential scrape fallback over routed candidates.

use std::sync::Arc;

use url::Url;

use crate::error::{ProviderError, ProviderFailure};
use crate::provider::ManagedProvider;
use crate::types::ScrapeResult;

/// Tries candidates one at a time until one returns content.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScrapeOrchestrator;

impl ScrapeOrchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Scrape `url` with the first candidate that succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ScrapeExhausted`] with one failure per
    /// attempted candidate, in attempt order. An empty candidate list
    /// yields the same error with no failures.
    pub async fn scrape(
        &self,
        url: &str,
        candidates: &[Arc<ManagedProvider>],
    ) -> Result<ScrapeResult, ProviderError> {
        if candidates.is_empty() {
            tracing::warn!(url, "no eligible scrape provider");
        }

        let mut failures = Vec::with_capacity(candidates.len());
        for provider in candidates {
            let kind = provider.kind();
            match provider.scrape(url).await {
                Ok(output) => {
                    if !failures.is_empty() {
                        tracing::info!(provider = %kind, url, skipped = failures.len(), "scrape succeeded after fallback");
                    }
                    return Ok(ScrapeResult {
                        url: url.to_owned(),
                        content: output.content,
                        format: output.format,
                        provider_used: kind,
                        title: output.title,
                        metadata: output.metadata,
                        usage: output.usage,
                    });
                }
                Err(error) => {
                    tracing::debug!(provider = %kind, url, error = %error, "scrape candidate failed, trying next");
                    failures.push(ProviderFailure::new(kind.name(), &error));
                }
            }
        }

        Err(ProviderError::ScrapeExhausted {
            url: url.to_owned(),
            failures,
        })
    }
}

/// Reject anything but an absolute `http`/`https` URL.
pub fn validate_url(url: &str) -> Result<(), ProviderError> {
    let parsed =
        Url::parse(url).map_err(|e| ProviderError::Config(format!("invalid url '{url}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        scheme => Err(ProviderError::Config(format!(
            "unsupported url '{url}': scheme '{scheme}' is not http or https"
        ))),
    }
}
