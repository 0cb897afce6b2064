//! Logging setup: `tracing` with an env-overridable filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::LoggingError;

/// Install the global subscriber. `RUST_LOG`, when set, replaces `default_filter`.
///
/// Fails if a global subscriber is already installed.
pub fn init(default_filter: &str) -> Result<(), LoggingError> {
    let filter = build_filter(default_filter)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
        .try_init()?;

    Ok(())
}

fn build_filter(default_filter: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(default_filter)?),
    }
}
