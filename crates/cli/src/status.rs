//! Status API exposing the published consensus.

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use concord_consensus::ConsensusPoller;
use serde::Serialize;

/// JSON body of `GET /consensus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsensusView {
    /// Name of the polled group.
    pub group: String,
    /// Agreed block height.
    pub block_number: u64,
    /// Agreed block hash, empty until the first resolution.
    pub block_hash: String,
    /// Names of the backends in the consensus group.
    pub backends: Vec<String>,
}

/// Build the status router.
///
/// - `GET /consensus`: the last published [`ConsensusView`]
/// - `GET /healthz`: `200` once a consensus group has been published, `503` before
pub fn status_router(poller: Arc<ConsensusPoller>) -> Router {
    Router::new()
        .route("/consensus", get(consensus_handler))
        .route("/healthz", get(health_handler))
        .with_state(poller)
}

/// Handler for `GET /consensus`.
pub async fn consensus_handler(
    State(poller): State<Arc<ConsensusPoller>>,
) -> Json<ConsensusView> {
    let snapshot = poller.consensus_snapshot();
    Json(ConsensusView {
        group: poller.group().to_string(),
        block_number: snapshot.block_number,
        block_hash: snapshot.block_hash,
        backends: snapshot.backends.iter().map(|backend| backend.name().to_string()).collect(),
    })
}

/// Handler for `GET /healthz`.
pub async fn health_handler(
    State(poller): State<Arc<ConsensusPoller>>,
) -> (StatusCode, &'static str) {
    if poller.consensus_group().is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "no consensus")
    } else {
        (StatusCode::OK, "ok")
    }
}
