//! # quarry
//!
//! Host for [`quarry_engine`]: TOML configuration with secret references,
//! tracing setup, and the `quarry` command-line interface.
//!
//! ```toml
//! [providers.serper]
//! api_key = { type = "env", var = "SERPER_API_KEY" }
//!
//! [providers.direct]
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;

pub use config::{QuarryConfig, SecretRef};
pub use error::{QuarryError, Result};
pub use quarry_engine;
