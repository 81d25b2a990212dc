//! Error taxonomy for the retrieval engine.
//!
//! Every variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and available through
//! [`ProviderError::code()`]. Upstream response bodies are sanitised before
//! they reach any variant, so messages never contain raw markup or secrets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Missing or rejected credential.
    pub const AUTH_FAILED: &str = "AUTH_FAILED";

    /// Local rate limiter or upstream 429.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";

    /// Timeouts, 5xx and gateway-timeout pages.
    pub const UPSTREAM_TRANSIENT: &str = "UPSTREAM_TRANSIENT";

    /// Other 4xx responses.
    pub const UPSTREAM_PERMANENT: &str = "UPSTREAM_PERMANENT";

    /// Provider answered with a payload we could not interpret.
    pub const PARSE_FAILED: &str = "PARSE_FAILED";

    /// Provider does not offer the requested capability.
    pub const UNSUPPORTED: &str = "UNSUPPORTED";

    /// Invalid engine configuration or request.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Overall deadline elapsed before any provider answered.
    pub const TIMEOUT: &str = "TIMEOUT";

    /// Routing produced an empty provider set.
    pub const NO_ELIGIBLE_PROVIDERS: &str = "NO_ELIGIBLE_PROVIDERS";

    /// Every provider in a search fan-out failed.
    pub const ALL_PROVIDERS_FAILED: &str = "ALL_PROVIDERS_FAILED";

    /// Every candidate in a scrape fallback chain failed.
    pub const SCRAPE_EXHAUSTED: &str = "SCRAPE_EXHAUSTED";
}

/// One provider's failure inside an aggregate error or partial response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    /// Provider wire name, e.g. `"serper"`.
    pub provider: String,
    /// Stable error code of the underlying failure.
    pub code: String,
    /// Sanitised, human-readable reason.
    pub message: String,
}

impl ProviderFailure {
    /// Record `error` as the failure of `provider`.
    pub fn new(provider: impl Into<String>, error: &ProviderError) -> Self {
        Self {
            provider: provider.into(),
            code: error.code().to_owned(),
            message: error.message(),
        }
    }
}

/// Errors produced by provider calls and the components that drive them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Credential missing or rejected (401/403). Never retried.
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    Auth(String),

    /// Rate limit hit, locally or upstream.
    #[error("[{}] {message}", error_codes::RATE_LIMITED)]
    RateLimited {
        /// Sanitised reason.
        message: String,
        /// How long to wait before the next attempt, when known.
        retry_after: Option<Duration>,
    },

    /// Network timeout, 5xx, or gateway-timeout signature. Retried with backoff.
    #[error("[{}] {}", error_codes::UPSTREAM_TRANSIENT, .0)]
    TransientUpstream(String),

    /// Any other 4xx. Never retried.
    #[error("[{}] {}", error_codes::UPSTREAM_PERMANENT, .0)]
    PermanentUpstream(String),

    /// Provider payload could not be decoded.
    #[error("[{}] {}", error_codes::PARSE_FAILED, .0)]
    Parse(String),

    /// Provider lacks the requested capability.
    #[error("[{}] {}", error_codes::UNSUPPORTED, .0)]
    Unsupported(String),

    /// Invalid configuration or request.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// Overall deadline elapsed with nothing to return.
    #[error("[{}] {}", error_codes::TIMEOUT, .0)]
    Timeout(String),

    /// No provider survived routing.
    #[error("[{}] {}", error_codes::NO_ELIGIBLE_PROVIDERS, .0)]
    NoEligibleProviders(String),

    /// All providers in a search fan-out failed.
    #[error("[{}] {}", error_codes::ALL_PROVIDERS_FAILED, join_failures(.0))]
    AggregateFailure(Vec<ProviderFailure>),

    /// All scrape candidates failed.
    #[error("[{}] {url}: {}", error_codes::SCRAPE_EXHAUSTED, join_failures(.failures))]
    ScrapeExhausted {
        /// The URL that could not be scraped.
        url: String,
        /// One entry per attempted provider, in attempt order.
        failures: Vec<ProviderFailure>,
    },
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no provider was attempted".to_owned();
    }
    failures
        .iter()
        .map(|f| format!("{}: [{}] {}", f.provider, f.code, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ProviderError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => error_codes::AUTH_FAILED,
            Self::RateLimited { .. } => error_codes::RATE_LIMITED,
            Self::TransientUpstream(_) => error_codes::UPSTREAM_TRANSIENT,
            Self::PermanentUpstream(_) => error_codes::UPSTREAM_PERMANENT,
            Self::Parse(_) => error_codes::PARSE_FAILED,
            Self::Unsupported(_) => error_codes::UNSUPPORTED,
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Timeout(_) => error_codes::TIMEOUT,
            Self::NoEligibleProviders(_) => error_codes::NO_ELIGIBLE_PROVIDERS,
            Self::AggregateFailure(_) => error_codes::ALL_PROVIDERS_FAILED,
            Self::ScrapeExhausted { .. } => error_codes::SCRAPE_EXHAUSTED,
        }
    }

    /// Returns the message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Auth(m)
            | Self::TransientUpstream(m)
            | Self::PermanentUpstream(m)
            | Self::Parse(m)
            | Self::Unsupported(m)
            | Self::Config(m)
            | Self::Timeout(m)
            | Self::NoEligibleProviders(m) => m.clone(),
            Self::RateLimited { message, .. } => message.clone(),
            Self::AggregateFailure(failures) => join_failures(failures),
            Self::ScrapeExhausted { url, failures } => {
                format!("{url}: {}", join_failures(failures))
            }
        }
    }

    /// Returns true if a [`RetryPolicy`](crate::retry::RetryPolicy) may try again.
    ///
    /// Only rate limits and transient upstream failures qualify. Auth,
    /// permanent 4xx, parse, capability and config errors fail fast; the
    /// aggregate variants are terminal by construction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::TransientUpstream(_))
    }

    /// Per-provider failures carried by the aggregate variants.
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            Self::AggregateFailure(failures) | Self::ScrapeExhausted { failures, .. } => failures,
            _ => &[],
        }
    }

    /// Build the user-visible structured error object.
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code().to_owned(),
            message: self.to_string(),
            failures: self.failures().to_vec(),
        }
    }
}

/// Structured error object returned to callers on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Per-provider reasons, empty for single-provider errors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ProviderFailure>,
}

/// Convenience alias for engine results.
pub type Result<T> = std::result::Result<T, ProviderError>;
