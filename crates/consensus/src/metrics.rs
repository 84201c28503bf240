//! Consensus metrics.
//!
//! Emitted through the [`metrics`] facade. Without an installed recorder every
//! call is a no-op, so the poller can be used in tests and libraries without
//! exporter setup.
//!
//! All metrics use the `concord_` prefix. Counters end with `_total`.

use metrics::{counter, gauge, histogram};

// ============================================================================
// Backend Metrics
// ============================================================================

/// Record a backend's new latest block.
///
/// Sets the `concord_backend_latest_block` gauge for the backend.
pub fn record_backend_latest_block(backend: &str, block_number: u64) {
    gauge!("concord_backend_latest_block", "backend" => backend.to_string())
        .set(block_number as f64);
}

/// Record a failed block fetch.
///
/// Increments `concord_backend_fetch_errors_total` with backend and error kind labels.
pub fn record_fetch_error(backend: &str, kind: &'static str) {
    counter!(
        "concord_backend_fetch_errors_total",
        "backend" => backend.to_string(),
        "kind" => kind
    )
    .increment(1);
}

// ============================================================================
// Group Metrics
// ============================================================================

/// Record the resolved consensus height of a group.
pub fn record_group_consensus_latest_block(group: &str, block_number: u64) {
    gauge!("concord_group_consensus_latest_block", "group" => group.to_string())
        .set(block_number as f64);
}

/// Record how many backends agree with the consensus and how many were filtered out.
pub fn record_group_membership(group: &str, agreeing: usize, filtered: usize) {
    gauge!("concord_group_consensus_count", "group" => group.to_string()).set(agreeing as f64);
    gauge!("concord_group_filtered_count", "group" => group.to_string()).set(filtered as f64);
}

/// Record a broken-consensus event.
///
/// A live backend contradicted a height that was already published as agreed.
pub fn record_consensus_broken(group: &str) {
    counter!("concord_consensus_broken_total", "group" => group.to_string()).increment(1);
}

/// Record how many blocks one resolution cycle walked back before agreeing.
pub fn record_walk_back(group: &str, steps: u64) {
    histogram!("concord_consensus_walk_back_steps", "group" => group.to_string())
        .record(steps as f64);
}
