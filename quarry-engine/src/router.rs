//! Provider selection for search and scrape requests.
//!
//! Priority order is `default_provider`, then the `priority` list, then
//! every other configured provider in declaration order. Providers without
//! their required credential never appear in any candidate list, and
//! providers with an open circuit are skipped until their cooldown ends.
//!
//! Domain-exclusive providers (reddit by default) never take part in
//! search. For a scrape whose URL they handle, they are the only
//! candidates; generic providers are not tried for that URL.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::provider::ManagedProvider;
use crate::registry::ProviderRegistry;
use crate::types::{ProviderKind, ScrapeRequest};

#[derive(Debug, Clone)]
pub struct ProviderRouter {
    order: Vec<ProviderKind>,
    fallback_enabled: bool,
}

impl ProviderRouter {
    pub fn new(config: &EngineConfig) -> Self {
        let configured: Vec<ProviderKind> = config.providers.iter().map(|p| p.kind).collect();
        let mut order: Vec<ProviderKind> = Vec::with_capacity(configured.len());
        let preferred = config.default_provider.into_iter().chain(config.priority.iter().copied());
        for kind in preferred.chain(configured.iter().copied()) {
            if !configured.contains(&kind) {
                tracing::debug!(provider = %kind, "priority entry is not configured, ignoring");
                continue;
            }
            if !order.contains(&kind) {
                order.push(kind);
            }
        }
        Self {
            order,
            fallback_enabled: config.fallback_enabled,
        }
    }

    /// Configured providers in priority order.
    pub fn order(&self) -> &[ProviderKind] {
        &self.order
    }

    /// Providers to fan a search out to.
    ///
    /// With an allow-list the result follows the allow-list's order;
    /// otherwise priority order. Either way only search-capable,
    /// credentialed, available, generic providers survive.
    pub fn search_candidates(
        &self,
        registry: &ProviderRegistry,
        allow: Option<&[ProviderKind]>,
    ) -> Vec<Arc<ManagedProvider>> {
        let wanted: Vec<ProviderKind> = match allow {
            Some(allow) => {
                let mut wanted = Vec::with_capacity(allow.len());
                for kind in allow {
                    if !wanted.contains(kind) {
                        wanted.push(*kind);
                    }
                }
                wanted
            }
            None => self.order.clone(),
        };

        wanted
            .into_iter()
            .filter_map(|kind| {
                let Some(provider) = registry.get(kind) else {
                    tracing::debug!(provider = %kind, "requested provider is not configured");
                    return None;
                };
                let eligible = kind.supports_search()
                    && provider.has_credentials()
                    && !provider.affinity().is_exclusive()
                    && provider.is_available();
                if !eligible {
                    tracing::debug!(provider = %kind, "provider not eligible for search");
                }
                eligible.then(|| Arc::clone(provider))
            })
            .collect()
    }

    /// Providers to try, in order, for one scrape.
    pub fn scrape_candidates(
        &self,
        registry: &ProviderRegistry,
        request: &ScrapeRequest,
    ) -> Vec<Arc<ManagedProvider>> {
        let capable: Vec<&Arc<ManagedProvider>> = self
            .order
            .iter()
            .filter_map(|kind| registry.get(*kind))
            .filter(|p| p.kind().supports_scrape() && p.has_credentials())
            .collect();

        let exclusive: Vec<&Arc<ManagedProvider>> = capable
            .iter()
            .copied()
            .filter(|p| p.affinity().is_exclusive() && p.handles(&request.url))
            .collect();
        let pool = if exclusive.is_empty() {
            capable
                .into_iter()
                .filter(|p| !p.affinity().is_exclusive())
                .collect()
        } else {
            tracing::debug!(
                url = %request.url,
                providers = exclusive.len(),
                "url bound to domain-exclusive providers"
            );
            exclusive
        };
        let mut candidates: Vec<Arc<ManagedProvider>> = pool
            .into_iter()
            .filter(|p| p.is_available())
            .map(Arc::clone)
            .collect();

        if let Some(preferred) = request.provider {
            match candidates.iter().position(|p| p.kind() == preferred) {
                Some(index) => {
                    let provider = candidates.remove(index);
                    candidates.insert(0, provider);
                }
                None => tracing::debug!(
                    provider = %preferred,
                    url = %request.url,
                    "requested provider cannot scrape this url, ignoring"
                ),
            }
        }

        if !(request.fallback_enabled && self.fallback_enabled) {
            candidates.truncate(1);
        }
        candidates
    }
}
