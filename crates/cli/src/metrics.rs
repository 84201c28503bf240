//! Prometheus exporter for the consensus metrics.

use std::sync::Arc;

use axum::{
    Router, extract::State, http::header::CONTENT_TYPE, response::IntoResponse, routing::get,
};
use eyre::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Handle to the global Prometheus recorder.
///
/// The consensus crate emits through the `metrics` facade; installing this
/// recorder is what makes those emissions visible on `/metrics`.
#[derive(Debug, Clone)]
pub struct ConcordMetrics {
    handle: PrometheusHandle,
}

impl ConcordMetrics {
    /// Install the Prometheus recorder as the global metrics recorder.
    ///
    /// # Errors
    ///
    /// Returns an error if a recorder has already been installed.
    pub fn new() -> eyre::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .wrap_err("failed to install Prometheus recorder")?;
        Ok(Self { handle })
    }

    /// Metrics in Prometheus text exposition format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Router serving `GET /metrics`.
    pub fn router(self) -> Router {
        Router::new().route("/metrics", get(metrics_handler)).with_state(Arc::new(self))
    }
}

/// Handler for the `/metrics` endpoint.
pub async fn metrics_handler(State(metrics): State<Arc<ConcordMetrics>>) -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], metrics.render())
}
