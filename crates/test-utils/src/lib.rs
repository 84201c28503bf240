#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/refcell/concord/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use concord_traits::{Backend, BackendMeta};
use concord_types::{BackendError, BlockNumber, BlockTag, decode_quantity};
use futures::future::BoxFuture;
use serde_json::{Value, json};

// ============================================================================
// Mock Backend
// ============================================================================

const GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";

#[derive(Debug)]
struct MockState {
    blocks: BTreeMap<BlockNumber, String>,
    requests: Vec<(String, Value)>,
    online: bool,
    rate_limited: bool,
    failing: bool,
    malformed: bool,
    latency: Duration,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            blocks: BTreeMap::new(),
            requests: Vec::new(),
            online: true,
            rate_limited: false,
            failing: false,
            malformed: false,
            latency: Duration::ZERO,
        }
    }
}

/// A mock node backend serving blocks from an in-memory chain.
///
/// Answers `eth_getBlockByNumber` for `latest` (the highest stored block) and
/// for fixed heights, and returns `null` for heights it does not hold. Clones
/// share state, so a test can keep a handle while the poller owns another and
/// flip health flags or rewrite the chain mid-test.
///
/// # Example
///
/// ```
/// use concord_test_utils::MockBackend;
///
/// let backend = MockBackend::new("node-a").with_chain("a", 100).with_block(100, "0xfork");
///
/// assert_eq!(backend.tip(), 100);
/// assert_eq!(backend.hash_at(99).as_deref(), Some("0xa99"));
/// assert_eq!(backend.hash_at(100).as_deref(), Some("0xfork"));
/// assert_eq!(backend.call_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockBackend {
    name: String,
    url: String,
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create a new mock backend with the given name and an empty chain.
    ///
    /// # Example
    ///
    /// ```
    /// use concord_test_utils::MockBackend;
    ///
    /// let backend = MockBackend::new("my-backend");
    /// assert_eq!(backend.tip(), 0);
    /// assert!(backend.hash_at(0).is_none());
    /// ```
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            url: format!("http://mock-{name}.local"),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the RPC URL for the mock backend.
    #[must_use]
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    /// Fill blocks `0..=tip`, hashing block `n` as `0x{prefix}{n}`.
    ///
    /// Two backends built with the same prefix agree on every shared height.
    #[must_use]
    pub fn with_chain(self, prefix: &str, tip: BlockNumber) -> Self {
        self.extend_chain(prefix, tip);
        self
    }

    /// Store `hash` at height `number`, replacing any existing block.
    #[must_use]
    pub fn with_block(self, number: BlockNumber, hash: &str) -> Self {
        self.set_block(number, hash);
        self
    }

    /// Delay every response by `latency`.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Like [`Self::with_chain`], through a shared handle.
    pub fn extend_chain(&self, prefix: &str, tip: BlockNumber) {
        let mut state = self.lock();
        for number in 0..=tip {
            state.blocks.insert(number, chain_hash(prefix, number));
        }
    }

    /// Like [`Self::with_block`], through a shared handle.
    pub fn set_block(&self, number: BlockNumber, hash: &str) {
        self.lock().blocks.insert(number, hash.to_string());
    }

    /// Drop every block above `tip`, simulating a node rolled back by a reorg.
    pub fn truncate(&self, tip: BlockNumber) {
        self.lock().blocks.retain(|&number, _| number <= tip);
    }

    /// Highest stored block, or 0 for an empty chain.
    pub fn tip(&self) -> BlockNumber {
        self.lock().blocks.last_key_value().map_or(0, |(&number, _)| number)
    }

    /// Hash stored at `number`.
    pub fn hash_at(&self, number: BlockNumber) -> Option<String> {
        self.lock().blocks.get(&number).cloned()
    }

    /// Mark the backend online or offline. Offline backends still answer calls.
    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    /// Mark the backend rate limited. Rate limited backends still answer calls.
    pub fn set_rate_limited(&self, rate_limited: bool) {
        self.lock().rate_limited = rate_limited;
    }

    /// Fail every call with [`BackendError::Offline`].
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Answer every call with a result that is not a block object.
    pub fn set_malformed(&self, malformed: bool) {
        self.lock().malformed = malformed;
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Number of `eth_getBlockByNumber` calls received for `tag`.
    pub fn calls_for(&self, tag: BlockTag) -> usize {
        let tag = tag.to_string();
        self.lock()
            .requests
            .iter()
            .filter(|(method, params)| {
                method == GET_BLOCK_BY_NUMBER && params[0].as_str() == Some(tag.as_str())
            })
            .count()
    }

    /// Every `(method, params)` pair received, in order.
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.lock().requests.clone()
    }

    /// Clear recorded calls.
    pub fn reset_requests(&self) {
        self.lock().requests.clear();
    }

    /// A shared handle as the trait object the poller consumes.
    pub fn shared(&self) -> Arc<dyn Backend> {
        Arc::new(self.clone())
    }

    fn respond(
        &self,
        state: &MockState,
        method: &str,
        params: &Value,
    ) -> Result<Value, BackendError> {
        if state.failing {
            return Err(BackendError::Offline { backend: self.name.clone() });
        }
        if state.malformed {
            return Ok(json!("0x1"));
        }
        if method != GET_BLOCK_BY_NUMBER {
            return Err(BackendError::Internal(format!("unsupported method {method}")));
        }

        let number = match params[0].as_str() {
            Some("latest") => state.blocks.last_key_value().map(|(&number, _)| number),
            Some(quantity) => decode_quantity(quantity),
            None => None,
        };
        let Some((number, hash)) =
            number.and_then(|number| state.blocks.get(&number).map(|hash| (number, hash)))
        else {
            return Ok(Value::Null);
        };

        let parent_hash = number
            .checked_sub(1)
            .and_then(|parent| state.blocks.get(&parent).cloned())
            .unwrap_or_else(|| format!("0x{:064x}", 0));
        Ok(fixtures::block_result(number, hash, &parent_hash))
    }
}

impl BackendMeta for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn rpc_url(&self) -> &str {
        &self.url
    }
}

impl Backend for MockBackend {
    fn is_online(&self) -> bool {
        self.lock().online
    }

    fn is_rate_limited(&self) -> bool {
        self.lock().rate_limited
    }

    fn forward_rpc(
        &self,
        method: &str,
        params: Value,
    ) -> BoxFuture<'static, Result<Value, BackendError>> {
        let (response, latency) = {
            let mut state = self.lock();
            state.requests.push((method.to_string(), params.clone()));
            (self.respond(&state, method, &params), state.latency)
        };

        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            response
        })
    }
}

/// Hash [`MockBackend::with_chain`] stores at `number` for `prefix`.
pub fn chain_hash(prefix: &str, number: BlockNumber) -> String {
    format!("0x{prefix}{number}")
}

// ============================================================================
// Fixtures
// ============================================================================

/// JSON fixtures for node responses.
pub mod fixtures {
    use concord_types::BlockNumber;
    use serde_json::{Value, json};

    /// Header-only `eth_getBlockByNumber` result.
    ///
    /// # Example
    ///
    /// ```
    /// use concord_test_utils::fixtures::block_result;
    ///
    /// let block = block_result(100, "0xabc", "0xabb");
    /// assert_eq!(block["number"], "0x64");
    /// ```
    pub fn block_result(number: BlockNumber, hash: &str, parent_hash: &str) -> Value {
        json!({
            "number": format!("{number:#x}"),
            "hash": hash,
            "parentHash": parent_hash,
            "transactions": [],
        })
    }

    /// Full JSON-RPC success envelope around `result`.
    pub fn success_response(id: u64, result: Value) -> String {
        json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string()
    }

    /// Full JSON-RPC error envelope.
    pub fn error_response(id: u64, code: i64, message: &str) -> String {
        json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
            .to_string()
    }
}

// ============================================================================
// Async Test Helpers
// ============================================================================

/// Run a future with a timeout.
///
/// `Ok(T)` if the future completes in time, `Err("timeout")` otherwise.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use concord_test_utils::with_timeout;
///
/// #[tokio::main]
/// async fn main() {
///     let result = with_timeout(async { 42 }, Duration::from_secs(1)).await;
///     assert_eq!(result, Ok(42));
/// }
/// ```
pub async fn with_timeout<F, T>(future: F, timeout: Duration) -> Result<T, &'static str>
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(timeout, future).await.map_err(|_| "timeout")
}

/// Assert that a future completes within a timeout.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use concord_test_utils::assert_completes;
///
/// #[tokio::main]
/// async fn main() {
///     let result = assert_completes!(async { 42 }, Duration::from_secs(1));
///     assert_eq!(result, 42);
/// }
/// ```
#[macro_export]
macro_rules! assert_completes {
    ($future:expr, $timeout:expr) => {
        $crate::with_timeout($future, $timeout).await.expect("future did not complete in time")
    };
}

// ============================================================================
// Test Configuration Builder
// ============================================================================

/// Builder for test configuration files.
///
/// # Example
///
/// ```
/// use concord_test_utils::TestConfigBuilder;
///
/// let config = TestConfigBuilder::new()
///     .with_backend("primary", "http://localhost:8545")
///     .with_backend("fallback", "http://localhost:8546")
///     .with_poll_interval_ms(250)
///     .build_toml();
///
/// assert!(config.contains("primary"));
/// assert!(config.contains("poll_interval_ms = 250"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TestConfigBuilder {
    group: Option<String>,
    poll_interval_ms: Option<u64>,
    backends: Vec<(String, String)>,
    server_port: Option<u16>,
    metrics_port: Option<u16>,
}

impl TestConfigBuilder {
    /// Create a new test configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the consensus group name.
    #[must_use]
    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    /// Set the poll interval in milliseconds.
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, interval: u64) -> Self {
        self.poll_interval_ms = Some(interval);
        self
    }

    /// Add a backend to the configuration.
    #[must_use]
    pub fn with_backend(mut self, name: &str, url: &str) -> Self {
        self.backends.push((name.to_string(), url.to_string()));
        self
    }

    /// Set the status server port.
    #[must_use]
    pub const fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = Some(port);
        self
    }

    /// Enable the metrics endpoint on `port`.
    #[must_use]
    pub const fn with_metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }

    /// Build the configuration as a TOML string.
    pub fn build_toml(self) -> String {
        let mut toml = String::from("[consensus]\n");
        if let Some(group) = &self.group {
            toml.push_str(&format!("group = \"{group}\"\n"));
        }
        if let Some(interval) = self.poll_interval_ms {
            toml.push_str(&format!("poll_interval_ms = {interval}\n"));
        }
        toml.push('\n');

        if let Some(port) = self.server_port {
            toml.push_str(&format!("[server]\nport = {port}\n\n"));
        }

        if let Some(port) = self.metrics_port {
            toml.push_str(&format!("[metrics]\nenabled = true\nport = {port}\n\n"));
        }

        for (name, url) in &self.backends {
            toml.push_str("[[backends]]\n");
            toml.push_str(&format!("name = \"{name}\"\n"));
            toml.push_str(&format!("url = \"{url}\"\n\n"));
        }

        toml
    }
}

// ============================================================================
// Tests
// ============================================================================
