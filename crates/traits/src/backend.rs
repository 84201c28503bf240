//! Backend traits for identity, health probes and RPC forwarding.

use concord_types::BackendError;
use futures::future::BoxFuture;
use serde_json::Value;

/// Backend identity/metadata trait.
pub trait BackendMeta: Send + Sync + 'static {
    /// Backend identifier. Stable for the lifetime of the backend.
    fn name(&self) -> &str;

    /// RPC endpoint URL.
    fn rpc_url(&self) -> &str;
}

/// A node backend the consensus poller can probe.
///
/// The poller never constructs or destroys backends; it receives a fixed pool
/// and only calls the methods below.
pub trait Backend: BackendMeta + std::fmt::Debug {
    /// Whether the backend is currently reachable.
    fn is_online(&self) -> bool;

    /// Whether the backend is currently refusing calls because of rate limiting.
    fn is_rate_limited(&self) -> bool;

    /// Forward a JSON-RPC call and return its `result` value.
    ///
    /// `params` is the positional parameter array. The returned future is
    /// `'static` so callers can race it against a cancellation signal.
    fn forward_rpc(
        &self,
        method: &str,
        params: Value,
    ) -> BoxFuture<'static, Result<Value, BackendError>>;
}
