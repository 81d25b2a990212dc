//! Host configuration loaded from TOML.
//!
//! ```toml
//! [engine]
//! default_provider = "serper"
//! priority = ["serper", "exa", "jina", "firecrawl", "direct"]
//! search_timeout_secs = 30
//!
//! [providers.serper]
//! api_key = { type = "env", var = "SERPER_API_KEY" }
//! rate_limit = { requests = 5, period_secs = 60 }
//!
//! [logging]
//! filter = "quarry=info,quarry_engine=info"
//! ```
//!
//! [`QuarryConfig::into_engine_config`] resolves secrets and produces the
//! engine's validated [`EngineConfig`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use quarry_engine::{
    CircuitBreakerConfig, DomainAffinity, EngineConfig, OutputFormat, ProviderConfig, ProviderKind,
    RateLimitConfig,
};
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};

/// Default tracing filter when neither `RUST_LOG` nor `[logging]` set one.
pub const DEFAULT_LOG_FILTER: &str = "quarry=info,quarry_engine=info";

/// A reference to a secret value (API key or similar).
///
/// Secrets are never stored in plain text in the config file by default.
/// `Env` reads from an environment variable at call time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SecretRef {
    /// No secret configured.
    #[default]
    None,
    /// Read from an environment variable.
    Env { var: String },
    /// Literal value (avoid outside local testing).
    Literal { value: String },
}

impl SecretRef {
    /// Resolve the secret to its value.
    ///
    /// An unset environment variable resolves to `Ok(None)`: the provider
    /// then has no credential and routing leaves it out.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Secret`] if the variable is set but not
    /// valid Unicode.
    pub fn resolve(&self) -> Result<Option<String>> {
        match self {
            Self::None => Ok(None),
            Self::Literal { value } => Ok(Some(value.clone())),
            Self::Env { var } => match std::env::var(var) {
                Ok(value) => Ok(Some(value)),
                Err(std::env::VarError::NotPresent) => {
                    tracing::debug!(var = %var, "secret env var not set");
                    Ok(None)
                }
                Err(std::env::VarError::NotUnicode(_)) => Err(QuarryError::Secret(format!(
                    "env var {var} is not valid unicode"
                ))),
            },
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<ProviderKind>,
    pub fallback_enabled: bool,
    pub priority: Vec<ProviderKind>,
    pub search_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for EngineSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            default_provider: engine.default_provider,
            fallback_enabled: engine.fallback_enabled,
            priority: engine.priority,
            search_timeout_secs: engine.search_timeout_secs,
            cache_ttl_secs: engine.cache_ttl_secs,
            circuit_breaker: engine.circuit_breaker,
        }
    }
}

/// One `[providers.<name>]` table. Unset fields take the engine defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// Set to `false` to keep the table but not register the provider.
    pub enabled: bool,
    #[serde(skip_serializing_if = "SecretRef::is_none")]
    pub api_key: SecretRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
    /// Bind the provider to these domains only. Replaces the kind's
    /// default affinity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_domains: Option<Vec<String>>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: SecretRef::None,
            base_url: None,
            timeout_secs: None,
            max_retries: None,
            rate_limit: None,
            output_format: None,
            exclusive_domains: None,
        }
    }
}

impl ProviderSection {
    fn to_provider_config(&self, kind: ProviderKind) -> Result<ProviderConfig> {
        let mut config = ProviderConfig::new(kind);
        config.api_key = self.api_key.resolve()?;
        config.base_url.clone_from(&self.base_url);
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        config.rate_limit = self.rate_limit;
        if let Some(format) = self.output_format {
            config.output_format = format;
        }
        if let Some(domains) = &self.exclusive_domains {
            config.affinity = DomainAffinity::Exclusive {
                domains: domains.clone(),
            };
        }
        Ok(config)
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `tracing-subscriber` filter directives. `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_owned(),
        }
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarryConfig {
    pub engine: EngineSection,
    /// Keyed by provider name (`serper`, `tavily`, ...).
    pub providers: BTreeMap<String, ProviderSection>,
    pub logging: LoggingSection,
}

impl QuarryConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load `path` if given, else the default path if it exists, else the
    /// built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit or existing default file cannot be
    /// read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let default = Self::default_config_path();
        if default.is_file() {
            tracing::debug!(path = %default.display(), "loading default config");
            Self::from_file(&default)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default config file path: `$XDG_CONFIG_HOME/quarry/config.toml`,
    /// falling back to the platform config directory.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("quarry").join("config.toml")
        } else if let Some(config) = dirs::config_dir() {
            config.join("quarry").join("config.toml")
        } else {
            PathBuf::from("/tmp/quarry-config/config.toml")
        }
    }

    /// Resolve secrets and build a validated [`EngineConfig`].
    ///
    /// Providers are registered in the engine's canonical kind order. With
    /// no `[providers]` tables at all, every kind is registered and keyed
    /// kinds read `<NAME>_API_KEY` from the environment; kinds whose
    /// variable is unset end up uncredentialed and are never routed to.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown provider names, unresolvable secrets,
    /// or an engine config that fails validation.
    pub fn into_engine_config(&self) -> Result<EngineConfig> {
        for name in self.providers.keys() {
            name.parse::<ProviderKind>()?;
        }

        let mut providers = Vec::new();
        for &kind in ProviderKind::all() {
            let section = if self.providers.is_empty() {
                default_section(kind)
            } else {
                match self.providers.get(kind.name()) {
                    Some(section) => section.clone(),
                    None => continue,
                }
            };
            if !section.enabled {
                tracing::debug!(provider = %kind, "provider disabled in config");
                continue;
            }
            providers.push(section.to_provider_config(kind)?);
        }

        let config = EngineConfig {
            providers,
            default_provider: self.engine.default_provider,
            fallback_enabled: self.engine.fallback_enabled,
            priority: self.engine.priority.clone(),
            search_timeout_secs: self.engine.search_timeout_secs,
            cache_ttl_secs: self.engine.cache_ttl_secs,
            circuit_breaker: self.engine.circuit_breaker,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Environment variable conventionally holding `kind`'s API key.
pub fn default_key_var(kind: ProviderKind) -> String {
    format!("{}_API_KEY", kind.name().to_ascii_uppercase())
}

fn default_section(kind: ProviderKind) -> ProviderSection {
    let api_key = if kind.requires_credentials() {
        SecretRef::Env {
            var: default_key_var(kind),
        }
    } else {
        SecretRef::None
    };
    ProviderSection {
        api_key,
        ..Default::default()
    }
}
