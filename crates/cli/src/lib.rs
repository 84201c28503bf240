#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/refcell/concord/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod backends;
pub use backends::{BackendFactory, create_backends};

mod cli;
pub use cli::{Cli, LogFormat};
// Note: check_config! macro is automatically exported via #[macro_export]

mod logging;
pub use logging::{Logger, init_tracing};

mod metrics;
pub use metrics::{ConcordMetrics, metrics_handler};

mod server;
pub use server::{run, run_until};

mod status;
pub use status::{ConsensusView, consensus_handler, health_handler, status_router};

// Re-export for convenience
pub use clap;
pub use eyre;

/// Test utilities for creating test configurations.
#[cfg(test)]
pub(crate) mod testutils {
    use concord_config::{BackendConfig, ConcordConfig};

    /// Create a minimal configuration for testing.
    pub(crate) fn minimal_config() -> ConcordConfig {
        ConcordConfig {
            backends: vec![BackendConfig {
                name: "primary".to_string(),
                url: "https://eth.example.com".to_string(),
                timeout_ms: 10000,
                rate_limit_cooldown_ms: 5000,
                offline_cooldown_ms: 1000,
            }],
            ..Default::default()
        }
    }
}
