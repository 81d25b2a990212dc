//! The static provider table built at engine start.

use std::sync::Arc;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::{EngineConfig, ProviderConfig};
use crate::error::ProviderError;
use crate::provider::{ManagedProvider, ProviderClient};
use crate::providers;
use crate::types::ProviderKind;

/// One [`ManagedProvider`] per configured backend, in declaration order,
/// sharing a single circuit breaker.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: Vec<Arc<ManagedProvider>>,
    breaker: Arc<CircuitBreaker>,
}

impl ProviderRegistry {
    /// Build a client for every provider in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] if a client cannot be built.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ProviderError> {
        let clients = config
            .providers
            .iter()
            .map(|provider| Ok((providers::build(provider)?, provider.clone())))
            .collect::<Result<Vec<_>, ProviderError>>()?;
        Ok(Self::from_clients(clients, config.circuit_breaker))
    }

    /// Wrap caller-supplied clients, each with the settings it runs under.
    pub fn from_clients(
        clients: Vec<(Arc<dyn ProviderClient>, ProviderConfig)>,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(breaker));
        let providers = clients
            .into_iter()
            .map(|(client, config)| {
                tracing::debug!(
                    provider = %config.kind,
                    credentialed = config.has_credentials(),
                    exclusive = config.affinity.is_exclusive(),
                    "registered provider"
                );
                Arc::new(ManagedProvider::new(client, &config, Arc::clone(&breaker)))
            })
            .collect();
        Self { providers, breaker }
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&Arc<ManagedProvider>> {
        self.providers.iter().find(|p| p.kind() == kind)
    }

    /// Providers in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ManagedProvider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_every_configured_provider() {
        let config = EngineConfig::with_providers(vec![
            ProviderConfig::new(ProviderKind::Serper).with_api_key("k"),
            ProviderConfig::new(ProviderKind::Direct),
            ProviderConfig::new(ProviderKind::Reddit),
        ]);
        let registry = ProviderRegistry::from_config(&config).expect("registry");
        assert_eq!(registry.len(), 3);
        let kinds: Vec<ProviderKind> = registry.iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, [ProviderKind::Serper, ProviderKind::Direct, ProviderKind::Reddit]);
        assert!(registry.get(ProviderKind::Reddit).is_some_and(|p| p.affinity().is_exclusive()));
        assert!(registry.get(ProviderKind::Exa).is_none());
    }

    #[test]
    fn missing_key_is_recorded_not_rejected() {
        let config = EngineConfig::with_providers(vec![ProviderConfig::new(ProviderKind::Tavily)]);
        let registry = ProviderRegistry::from_config(&config).expect("registry");
        assert!(registry.get(ProviderKind::Tavily).is_some_and(|p| !p.has_credentials()));
    }

    #[test]
    fn empty_registry() {
        let registry = ProviderRegistry::from_config(&EngineConfig::default()).expect("registry");
        assert!(registry.is_empty());
        assert!(registry.breaker().health_report().is_empty());
    }
}
