//! HTTP backend implementation.

use std::{
    borrow::Cow,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use alloy_json_rpc::{Id, Request, Response, ResponsePayload};
use concord_traits::{Backend, BackendMeta};
use concord_types::BackendError;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::time::Instant;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time a backend stays rate limited after an HTTP 429.
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(5);

/// Default time a backend stays offline after a transport failure.
pub const DEFAULT_OFFLINE_COOLDOWN: Duration = Duration::from_secs(1);

/// Configuration for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// How long the backend reports itself rate limited after an HTTP 429.
    pub rate_limit_cooldown: Duration,
    /// How long the backend reports itself offline after a transport failure.
    pub offline_cooldown: Duration,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            rate_limit_cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
            offline_cooldown: DEFAULT_OFFLINE_COOLDOWN,
        }
    }
}

/// An optional deadline; the condition holds until it passes.
#[derive(Debug, Default)]
struct Cooldown(Mutex<Option<Instant>>);

impl Cooldown {
    fn start(&self, duration: Duration) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now() + duration);
    }

    fn clear(&self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn is_active(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|until| Instant::now() < until)
    }
}

/// Health flags shared between clones of one backend.
#[derive(Debug, Default)]
struct Health {
    offline: Cooldown,
    rate_limited: Cooldown,
}

/// JSON-RPC over HTTP backend.
///
/// Reports itself offline for a cooldown after a transport failure, so the
/// next poll after it expires queries the node again. Any HTTP response brings
/// it back online. Reports itself rate limited for a cooldown after an HTTP 429.
/// Retries and load balancing are left to the caller.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    name: Arc<str>,
    rpc_url: Arc<str>,
    client: reqwest::Client,
    config: HttpBackendConfig,
    health: Arc<Health>,
    next_id: Arc<AtomicU64>,
}

impl HttpBackend {
    /// Create a new HTTP backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(
        name: String,
        rpc_url: String,
        config: HttpBackendConfig,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: Arc::from(name.as_str()),
            rpc_url: Arc::from(rpc_url.as_str()),
            client,
            config,
            health: Arc::new(Health::default()),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }
}

impl BackendMeta for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

impl Backend for HttpBackend {
    fn is_online(&self) -> bool {
        !self.health.offline.is_active()
    }

    fn is_rate_limited(&self) -> bool {
        self.health.rate_limited.is_active()
    }

    fn forward_rpc(
        &self,
        method: &str,
        params: Value,
    ) -> BoxFuture<'static, Result<Value, BackendError>> {
        let id = Id::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = Request::new(Cow::Owned(method.to_string()), id, params);
        let client = self.client.clone();
        let rpc_url = self.rpc_url.clone();
        let name = self.name.clone();
        let health = self.health.clone();
        let config = self.config.clone();

        Box::pin(async move {
            let response = match client.post(rpc_url.as_ref()).json(&request).send().await {
                Ok(response) => response,
                Err(e) => {
                    health.offline.start(config.offline_cooldown);
                    return Err(if e.is_timeout() {
                        BackendError::Timeout { backend: name.to_string() }
                    } else {
                        BackendError::Offline { backend: name.to_string() }
                    });
                }
            };
            health.offline.clear();

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                health.rate_limited.start(config.rate_limit_cooldown);
                return Err(BackendError::RateLimited { retry_after: config.rate_limit_cooldown });
            }

            if !response.status().is_success() {
                return Err(BackendError::Offline { backend: name.to_string() });
            }

            let response: Response = response
                .json()
                .await
                .map_err(|e| BackendError::Internal(format!("failed to parse response: {e}")))?;

            match response.payload {
                ResponsePayload::Success(raw) => serde_json::from_str(raw.get())
                    .map_err(|e| BackendError::Internal(format!("invalid result: {e}"))),
                ResponsePayload::Failure(err) => {
                    Err(BackendError::Rpc { code: err.code, message: err.message.to_string() })
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_backend_meta() {
        let backend = HttpBackend::new(
            "primary".to_string(),
            "http://localhost:8545".to_string(),
            HttpBackendConfig::default(),
        )
        .unwrap();
        assert_eq!(backend.name(), "primary");
        assert_eq!(backend.rpc_url(), "http://localhost:8545");
        assert!(backend.is_online());
        assert!(!backend.is_rate_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_cooldown_expires() {
        let backend = HttpBackend::new(
            "primary".to_string(),
            "http://localhost:8545".to_string(),
            HttpBackendConfig::default(),
        )
        .unwrap();

        backend.health.rate_limited.start(DEFAULT_RATE_LIMIT_COOLDOWN);
        assert!(backend.is_rate_limited());

        tokio::time::advance(DEFAULT_RATE_LIMIT_COOLDOWN).await;
        assert!(!backend.is_rate_limited());
    }

    #[tokio::test]
    async fn test_unreachable_backend_goes_offline() {
        let backend = HttpBackend::new(
            "primary".to_string(),
            // Nothing listens on the discard port.
            "http://127.0.0.1:9".to_string(),
            HttpBackendConfig {
                timeout: Duration::from_secs(2),
                offline_cooldown: Duration::from_secs(60),
                ..Default::default()
            },
        )
        .unwrap();

        let err = backend.forward_rpc("eth_blockNumber", serde_json::json!([])).await.unwrap_err();
        assert!(err.is_transient());
        assert!(!backend.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_cooldown_expires() {
        let backend = HttpBackend::new(
            "primary".to_string(),
            "http://localhost:8545".to_string(),
            HttpBackendConfig::default(),
        )
        .unwrap();

        backend.health.offline.start(DEFAULT_OFFLINE_COOLDOWN);
        assert!(!backend.is_online());

        tokio::time::advance(DEFAULT_OFFLINE_COOLDOWN).await;
        assert!(backend.is_online());
    }
}
