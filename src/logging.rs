//! Tracing initialisation for the `quarry` binary.

use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` when set and valid, else `configured`,
/// else plain `info`.
pub fn env_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Install the global fmt subscriber, writing to stderr so stdout stays
/// machine-readable. Later calls are no-ops.
pub fn init_tracing(configured: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(configured))
        .with_writer(std::io::stderr)
        .try_init();
}
