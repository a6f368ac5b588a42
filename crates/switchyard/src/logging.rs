//! Diagnostics setup.

use tracing_subscriber::EnvFilter;

use crate::config::DEFAULT_LOG;

/// Builds the filter: the explicit directive, else `RUST_LOG`, else `warn`.
pub fn env_filter(directive: Option<&str>) -> EnvFilter {
    match directive {
        Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG)),
    }
}

/// Installs a stderr `fmt` subscriber.
///
/// Returns false when a global subscriber was already installed; the
/// existing one stays in place.
pub fn init_tracing(directive: Option<&str>) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(directive))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
