//! Backend creation from configuration.

use std::sync::Arc;

use concord_config::ConcordConfig;
use concord_consensus::{HttpBackend, HttpBackendConfig};
use concord_traits::Backend;
use eyre::{Context, Result};

/// Factory for creating HTTP backends from configuration.
///
/// # Example
///
/// ```ignore
/// use concord_cli::BackendFactory;
///
/// let backends = BackendFactory::new().create(&config)?;
/// let poller = ConsensusPoller::builder(backends).build();
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct BackendFactory;

impl BackendFactory {
    /// Create a new backend factory.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Create one [`HttpBackend`] per configured backend, in configuration order.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn create(&self, config: &ConcordConfig) -> Result<Vec<Arc<dyn Backend>>> {
        config
            .backends
            .iter()
            .map(|backend| {
                let http_config = HttpBackendConfig {
                    timeout: backend.timeout(),
                    rate_limit_cooldown: backend.rate_limit_cooldown(),
                    offline_cooldown: backend.offline_cooldown(),
                };
                let http =
                    HttpBackend::new(backend.name.clone(), backend.url.clone(), http_config)
                        .wrap_err_with(|| format!("failed to create backend {}", backend.name))?;
                trace!(name = %backend.name, url = %backend.url, "Created backend");
                Ok(Arc::new(http) as Arc<dyn Backend>)
            })
            .collect()
    }
}

/// Create HTTP backends from configuration.
///
/// Shorthand for [`BackendFactory::create`].
///
/// # Errors
///
/// Returns an error if backend creation fails.
pub fn create_backends(config: &ConcordConfig) -> Result<Vec<Arc<dyn Backend>>> {
    BackendFactory::new().create(config)
}

#[cfg(test)]
mod tests {
    use concord_config::BackendConfig;

    use super::*;
    use crate::testutils::minimal_config;

    #[test]
    fn test_create_backends() {
        let backends = create_backends(&minimal_config()).unwrap();
        assert_eq!(backends.len(), 1);
        assert_eq!(backends[0].name(), "primary");
        assert_eq!(backends[0].rpc_url(), "https://eth.example.com");
        assert!(backends[0].is_online());
    }

    #[test]
    fn test_create_backends_keeps_order() {
        let mut config = minimal_config();
        config.backends.push(BackendConfig {
            name: "secondary".to_string(),
            url: "http://127.0.0.1:8545".to_string(),
            timeout_ms: 500,
            rate_limit_cooldown_ms: 1000,
            offline_cooldown_ms: 1000,
        });

        let backends = BackendFactory::new().create(&config).unwrap();
        let names: Vec<_> = backends.iter().map(|backend| backend.name()).collect();
        assert_eq!(names, vec!["primary", "secondary"]);
    }
}
