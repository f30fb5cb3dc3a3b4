//! Tracing subscriber setup

use crate::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber
///
/// `RUST_LOG` overrides the configured filter. Logs go to stderr so command
/// output on stdout stays clean.
///
/// # Errors
/// Fails if a global subscriber is already installed
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to init tracing subscriber: {e}"))?;

    tracing::debug!(filter = %config.filter, json = config.json, "tracing initialized");
    Ok(())
}
