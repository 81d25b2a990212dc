//! Engine configuration.
//!
//! [`EngineConfig`] is built once (usually by the host from a TOML file),
//! validated, and then only read. Each configured backend gets one
//! [`ProviderConfig`].

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use url::Url;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::ProviderError;
use crate::rate_limit::RateLimitConfig;
use crate::types::{OutputFormat, ProviderKind};

/// Default per-call timeout for provider requests.
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Default attempt budget per provider call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default overall deadline for a search fan-out.
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 30;

/// Which URLs a provider is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DomainAffinity {
    /// Generic provider, usable for any URL.
    #[default]
    None,
    /// Only usable for URLs on these domains (and their subdomains), and
    /// never part of generic search.
    Exclusive { domains: Vec<String> },
}

impl DomainAffinity {
    /// Default affinity of a provider kind.
    pub fn default_for(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Reddit => Self::Exclusive {
                domains: vec!["reddit.com".into(), "redd.it".into()],
            },
            _ => Self::None,
        }
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive { .. })
    }

    /// Whether `url`'s host is one of the domains or a subdomain of one.
    /// Generic affinity matches every URL.
    pub fn matches(&self, url: &str) -> bool {
        let Self::Exclusive { domains } = self else {
            return true;
        };
        let Some(host) = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_end_matches('.').to_ascii_lowercase()))
        else {
            return false;
        };
        domains.iter().any(|domain| {
            let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

/// Settings for one backend.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// API credential; required unless the kind is credential-free.
    pub api_key: Option<String>,
    /// Overrides the provider's public endpoint (tests, proxies).
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    /// Attempt budget for one call.
    pub max_retries: u32,
    /// Local rate limit; `None` is unlimited.
    pub rate_limit: Option<RateLimitConfig>,
    /// Format requested from scrape-capable providers.
    pub output_format: OutputFormat,
    pub affinity: DomainAffinity,
}

impl ProviderConfig {
    /// Defaults for `kind`: no credential, public endpoint, kind's affinity.
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            base_url: None,
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit: None,
            output_format: OutputFormat::default(),
            affinity: DomainAffinity::default_for(kind),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_rate_limit(mut self, limit: RateLimitConfig) -> Self {
        self.rate_limit = Some(limit);
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_affinity(mut self, affinity: DomainAffinity) -> Self {
        self.affinity = affinity;
        self
    }

    /// Whether the provider can be called: credential-free kinds always,
    /// others only with a non-blank key.
    pub fn has_credentials(&self) -> bool {
        !self.kind.requires_credentials()
            || self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `base_url` without a trailing slash, or `default`.
    pub fn endpoint(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_owned()
    }

    fn validate(&self) -> Result<(), ProviderError> {
        let kind = self.kind;
        if self.timeout_secs == 0 {
            return Err(ProviderError::Config(format!(
                "{kind}: timeout_secs must be greater than 0"
            )));
        }
        if let Some(limit) = self.rate_limit {
            if limit.requests == 0 || limit.period_secs == 0 {
                return Err(ProviderError::Config(format!(
                    "{kind}: rate_limit needs non-zero requests and period_secs"
                )));
            }
        }
        if let Some(base) = &self.base_url {
            let parsed = Url::parse(base)
                .map_err(|e| ProviderError::Config(format!("{kind}: invalid base_url: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ProviderError::Config(format!(
                    "{kind}: base_url must use http or https"
                )));
            }
        }
        if let DomainAffinity::Exclusive { domains } = &self.affinity {
            if domains.iter().all(|d| d.trim().is_empty()) {
                return Err(ProviderError::Config(format!(
                    "{kind}: exclusive affinity needs at least one domain"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("rate_limit", &self.rate_limit)
            .field("output_format", &self.output_format)
            .field("affinity", &self.affinity)
            .finish()
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Configured backends in declaration order.
    pub providers: Vec<ProviderConfig>,
    /// Provider tried first for scrapes and listed first for search.
    pub default_provider: Option<ProviderKind>,
    /// Whether scrapes may fall back past the first candidate.
    pub fallback_enabled: bool,
    /// Preferred order after `default_provider`. Entries that are not
    /// configured are ignored.
    pub priority: Vec<ProviderKind>,
    /// Overall deadline for one search fan-out.
    pub search_timeout_secs: u64,
    /// How long aggregated responses are cached. 0 disables caching.
    pub cache_ttl_secs: u64,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            default_provider: None,
            fallback_enabled: true,
            priority: Vec::new(),
            search_timeout_secs: DEFAULT_SEARCH_TIMEOUT_SECS,
            cache_ttl_secs: 0,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// A config with these providers and every other setting at its default.
    pub fn with_providers(providers: Vec<ProviderConfig>) -> Self {
        Self {
            providers,
            ..Default::default()
        }
    }

    /// The config for `kind`, if configured.
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.kind == kind)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    /// Validates this configuration.
    ///
    /// Checks:
    /// - each provider kind appears at most once
    /// - per-provider timeouts, rate limits, base URLs and affinities are sane
    /// - `default_provider`, when set, is configured
    /// - `search_timeout_secs` is greater than 0
    pub fn validate(&self) -> Result<(), ProviderError> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.kind) {
                return Err(ProviderError::Config(format!(
                    "provider '{}' is configured more than once",
                    provider.kind
                )));
            }
            provider.validate()?;
        }
        if let Some(default) = self.default_provider {
            if !seen.contains(&default) {
                return Err(ProviderError::Config(format!(
                    "default_provider '{default}' is not configured"
                )));
            }
        }
        if self.search_timeout_secs == 0 {
            return Err(ProviderError::Config(
                "search_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
