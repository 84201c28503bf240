//! Tracing initialization and startup configuration logging.

use concord_config::ConcordConfig;
use eyre::{Context, Result};

use crate::LogFormat;

/// Initialize the tracing subscriber for logging.
///
/// `level` is an [`EnvFilter`](tracing_subscriber::EnvFilter) directive such as
/// `info` or `concord_consensus=debug`. An unparsable directive falls back to
/// `info`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .wrap_err("failed to create log filter")?;

    let registry = tracing_subscriber::registry();
    match format {
        LogFormat::Text => registry.with(fmt::layer()).with(filter).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).with(filter).try_init(),
    }
    .wrap_err("failed to install tracing subscriber")
}

/// Logs a summary of the configuration at startup.
#[derive(Debug, Default, Clone, Copy)]
pub struct Logger;

impl Logger {
    /// Create a new Logger instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Log a summary of the configuration.
    pub fn log(&self, config: &ConcordConfig) {
        info!(
            group = %config.consensus.group,
            poll_interval_ms = config.consensus.poll_interval_ms,
            "Consensus configuration"
        );

        info!(count = config.backends.len(), "Backends configured");

        for backend in &config.backends {
            debug!(
                name = %backend.name,
                url = %backend.url,
                timeout_ms = backend.timeout_ms,
                rate_limit_cooldown_ms = backend.rate_limit_cooldown_ms,
                offline_cooldown_ms = backend.offline_cooldown_ms,
                "Backend"
            );
        }

        if config.server.enabled {
            info!(host = %config.server.host, port = config.server.port, "Status API enabled");
        }

        if config.metrics.enabled {
            info!(host = %config.metrics.host, port = config.metrics.port, "Metrics enabled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::minimal_config;

    #[test]
    fn test_logger_without_subscriber() {
        let mut config = minimal_config();
        config.metrics.enabled = true;
        Logger::new().log(&config);
    }
}
