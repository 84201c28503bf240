#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/refcell/concord/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::{collections::HashSet, path::Path, time::Duration};

use eyre::{Context, bail, ensure};
use serde::{Deserialize, Serialize};

/// Default consensus group name.
pub const DEFAULT_GROUP: &str = "main";
/// Default interval between polling cycles in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
/// Default backend request timeout in milliseconds.
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 10000;
/// Default rate limit cooldown after an HTTP 429, in milliseconds.
pub const DEFAULT_RATE_LIMIT_COOLDOWN_MS: u64 = 5000;
/// Default offline cooldown after a transport failure, in milliseconds.
pub const DEFAULT_OFFLINE_COOLDOWN_MS: u64 = 1000;
/// Default host address for the status and metrics servers.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default status server port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Consensus polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Name of the polled group, used in logs and metric labels.
    pub group: String,
    /// Interval between refresh and resolution cycles in milliseconds.
    pub poll_interval_ms: u64,
}

impl ConsensusConfig {
    /// The poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self { group: DEFAULT_GROUP.to_string(), poll_interval_ms: DEFAULT_POLL_INTERVAL_MS }
    }
}

/// Backend RPC endpoint configuration.
///
/// Defines a single node in the polled pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// Unique name for this backend.
    pub name: String,
    /// The URL of the RPC endpoint.
    pub url: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_backend_timeout")]
    pub timeout_ms: u64,
    /// How long the backend is treated as rate limited after an HTTP 429, in milliseconds.
    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_ms: u64,
    /// How long the backend is treated as offline after a transport failure, in milliseconds.
    #[serde(default = "default_offline_cooldown")]
    pub offline_cooldown_ms: u64,
}

impl BackendConfig {
    /// The request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The rate limit cooldown as a [`Duration`].
    #[must_use]
    pub const fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }

    /// The offline cooldown as a [`Duration`].
    #[must_use]
    pub const fn offline_cooldown(&self) -> Duration {
        Duration::from_millis(self.offline_cooldown_ms)
    }
}

const fn default_backend_timeout() -> u64 {
    DEFAULT_BACKEND_TIMEOUT_MS
}

const fn default_rate_limit_cooldown() -> u64 {
    DEFAULT_RATE_LIMIT_COOLDOWN_MS
}

const fn default_offline_cooldown() -> u64 {
    DEFAULT_OFFLINE_COOLDOWN_MS
}

/// Status server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Whether the status API is served.
    pub enabled: bool,
    /// The host address to bind to.
    pub host: String,
    /// The port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { enabled: true, host: DEFAULT_HOST.to_string(), port: DEFAULT_PORT }
    }
}

/// Metrics configuration.
///
/// Controls the Prometheus metrics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Host address for the metrics server.
    pub host: String,
    /// Port for the metrics server.
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: false, host: DEFAULT_HOST.to_string(), port: DEFAULT_METRICS_PORT }
    }
}

/// Root configuration for concord.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConcordConfig {
    /// Consensus polling configuration.
    pub consensus: ConsensusConfig,
    /// Status server configuration.
    pub server: ServerConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
    /// Backend configurations, in pool order.
    pub backends: Vec<BackendConfig>,
}

impl ConcordConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if validation fails.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use concord_config::ConcordConfig;
    ///
    /// let config = ConcordConfig::from_file(Path::new("concord.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or if validation fails.
    ///
    /// # Example
    ///
    /// ```
    /// use concord_config::ConcordConfig;
    ///
    /// let toml = r#"
    /// [consensus]
    /// poll_interval_ms = 500
    ///
    /// [[backends]]
    /// name = "primary"
    /// url = "https://eth.example.com"
    /// "#;
    ///
    /// let config = ConcordConfig::parse(toml).unwrap();
    /// assert_eq!(config.consensus.group, "main");
    /// ```
    pub fn parse(s: &str) -> eyre::Result<Self> {
        let config: Self = toml::from_str(s).wrap_err("failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Checks that:
    /// - At least one backend is configured
    /// - Backend names are unique and non-empty
    /// - Backend URLs are non-empty and use http or https
    /// - The poll interval and backend timeouts are non-zero
    /// - Enabled servers have non-zero ports
    ///
    /// # Errors
    ///
    /// Returns an error describing the first validation failure.
    pub fn validate(&self) -> eyre::Result<()> {
        ensure!(!self.consensus.group.is_empty(), "consensus group name must not be empty");
        ensure!(self.consensus.poll_interval_ms > 0, "poll interval must be greater than 0");

        ensure!(!self.backends.is_empty(), "at least one backend must be configured");

        // Backends are looked up by name, so names must be unique.
        let mut backend_names = HashSet::new();
        for backend in &self.backends {
            ensure!(!backend.name.is_empty(), "backend name must not be empty");
            ensure!(
                backend_names.insert(&backend.name),
                "duplicate backend name: {}",
                backend.name
            );
            ensure!(!backend.url.is_empty(), "backend '{}' has empty URL", backend.name);
            if !backend.url.starts_with("http://") && !backend.url.starts_with("https://") {
                bail!("backend '{}' URL must use http or https: {}", backend.name, backend.url);
            }
            ensure!(
                backend.timeout_ms > 0,
                "backend '{}' timeout must be greater than 0",
                backend.name
            );
        }

        if self.server.enabled {
            ensure!(self.server.port > 0, "server port must be greater than 0");
        }

        if self.metrics.enabled {
            ensure!(self.metrics.port > 0, "metrics port must be greater than 0");
            if self.server.enabled {
                ensure!(
                    self.server.host != self.metrics.host || self.server.port != self.metrics.port,
                    "server and metrics cannot share {}:{}",
                    self.server.host,
                    self.server.port
                );
            }
        }

        Ok(())
    }

    /// Serialize the configuration to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> eyre::Result<String> {
        toml::to_string_pretty(self).wrap_err("failed to serialize configuration to TOML")
    }
}
