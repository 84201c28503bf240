//! Error types for backend RPC calls and block fetches.

use std::time::Duration;

use derive_more::{Debug, Display, Error};

/// Error returned by a backend when forwarding an RPC call.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
#[error(ignore)]
pub enum BackendError {
    /// The backend could not be reached.
    #[display("backend offline: {backend}")]
    Offline {
        /// Name of the offline backend.
        backend: String,
    },

    /// The backend did not answer in time.
    #[display("backend timeout: {backend}")]
    Timeout {
        /// Name of the timed out backend.
        backend: String,
    },

    /// The backend refused the call because of rate limiting.
    #[display("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Duration to wait before retrying.
        retry_after: Duration,
    },

    /// The node answered with a JSON-RPC error object.
    #[display("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// Internal error.
    #[display("internal error: {_0}")]
    Internal(String),
}

impl BackendError {
    /// Whether the condition is expected to clear without operator action.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Offline { .. } | Self::Timeout { .. } | Self::RateLimited { .. })
    }
}

/// Error returned when fetching a block from a backend.
///
/// None of these are fatal: the refresh cycle skips the tick, and the
/// resolution cycle leaves the backend out of the current round.
#[derive(Debug, Display, Error)]
pub enum FetchError {
    /// The RPC call itself failed.
    #[display("transport error from {backend}: {source}")]
    Transport {
        /// Name of the backend that was queried.
        backend: String,
        /// Underlying backend error.
        source: BackendError,
    },

    /// The backend answered with something that is not a block record.
    #[display("malformed block response from {backend}: {reason}")]
    MalformedResponse {
        /// Name of the backend that was queried.
        backend: String,
        /// What was wrong with the response.
        reason: String,
    },

    /// The fetch was abandoned because shutdown was requested.
    #[display("fetch from {backend} cancelled")]
    Cancelled {
        /// Name of the backend that was queried.
        backend: String,
    },
}

impl FetchError {
    /// Build a [`FetchError::MalformedResponse`].
    pub fn malformed(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse { backend: backend.into(), reason: reason.into() }
    }

    /// Short label for the error kind, used as a metrics label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::MalformedResponse { .. } => "malformed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::offline(BackendError::Offline { backend: "primary".to_string() }, true)]
    #[case::timeout(BackendError::Timeout { backend: "secondary".to_string() }, true)]
    #[case::rate_limited(BackendError::RateLimited { retry_after: Duration::from_secs(5) }, true)]
    #[case::rpc(BackendError::Rpc { code: -32000, message: "header not found".to_string() }, false)]
    #[case::internal(BackendError::Internal("bad state".to_string()), false)]
    fn test_is_transient(#[case] error: BackendError, #[case] expected: bool) {
        assert_eq!(error.is_transient(), expected);
    }

    #[rstest]
    #[case::offline(BackendError::Offline { backend: "primary".to_string() }, "primary")]
    #[case::timeout(BackendError::Timeout { backend: "node-2".to_string() }, "node-2")]
    #[case::rate_limited(BackendError::RateLimited { retry_after: Duration::from_secs(5) }, "rate limited")]
    #[case::rpc(BackendError::Rpc { code: -32000, message: "header not found".to_string() }, "header not found")]
    #[case::internal(BackendError::Internal("bad state".to_string()), "bad state")]
    fn test_backend_error_display(#[case] error: BackendError, #[case] expected_substring: &str) {
        assert!(
            error.to_string().contains(expected_substring),
            "Expected '{}' to contain '{}'",
            error,
            expected_substring
        );
    }

    #[rstest]
    #[case::transport(
        FetchError::Transport {
            backend: "a".to_string(),
            source: BackendError::Offline { backend: "a".to_string() },
        },
        "transport"
    )]
    #[case::malformed(FetchError::malformed("a", "missing hash"), "malformed")]
    #[case::cancelled(FetchError::Cancelled { backend: "a".to_string() }, "cancelled")]
    fn test_fetch_error_kind(#[case] error: FetchError, #[case] expected: &str) {
        assert_eq!(error.kind(), expected);
    }

    #[test]
    fn test_transport_error_exposes_source() {
        let err = FetchError::Transport {
            backend: "primary".to_string(),
            source: BackendError::Timeout { backend: "primary".to_string() },
        };
        let source = err.source().expect("transport error has a source");
        assert_eq!(source.to_string(), "backend timeout: primary");
        assert!(err.to_string().contains("transport error from primary"));
    }

    #[test]
    fn test_malformed_error_has_no_source() {
        let err = FetchError::malformed("primary", "result is not an object");
        assert!(err.source().is_none());
        assert!(err.to_string().contains("result is not an object"));
    }
}
