//! Error types for the quarry host.

use quarry_engine::{ErrorReport, ProviderError};

/// Top-level error type for configuration loading and CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum QuarryError {
    /// Engine error (routing, provider calls, engine config validation).
    #[error(transparent)]
    Engine(#[from] ProviderError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Secret reference could not be resolved.
    #[error("secret error: {0}")]
    Secret(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QuarryError {
    /// Structured report for printing. Host-side errors are reported under
    /// the engine's `CONFIG_INVALID` code.
    pub fn to_report(&self) -> ErrorReport {
        match self {
            Self::Engine(err) => err.to_report(),
            other => ProviderError::Config(other.to_string()).to_report(),
        }
    }
}

impl From<toml::de::Error> for QuarryError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, QuarryError>;
