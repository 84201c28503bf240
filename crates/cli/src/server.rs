//! Process lifecycle: start polling, serve the status and metrics APIs, shut down on signal.

use std::{future::Future, sync::Arc};

use axum::Router;
use concord_config::ConcordConfig;
use concord_consensus::{ConsensusPoller, PollingScheduler};
use eyre::{Context, Result};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{ConcordMetrics, create_backends, status_router};

/// Wait for a shutdown signal (SIGINT or SIGTERM on Unix, Ctrl+C elsewhere).
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "failed to install signal handlers, falling back to Ctrl+C");
                tokio::signal::ctrl_c().await.ok();
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown..."),
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown..."),
    }
}

/// Wait for a shutdown signal (Ctrl+C on non-Unix platforms).
#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("Received Ctrl+C, initiating graceful shutdown...");
}

/// Bind a listener on `host:port`.
async fn bind(name: &'static str, host: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("failed to bind {name} server to {addr}"))?;
    info!(address = %addr, "{name} server listening");
    Ok(listener)
}

/// Serve `app` on a task until `shutdown` fires.
fn serve(
    name: &'static str,
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .wrap_err_with(|| format!("{name} server error"))
    })
}

/// Run concord until a shutdown signal is received.
///
/// Starts the consensus poller over the configured backends, serves the status
/// API and the Prometheus endpoint when enabled, then waits for SIGINT/SIGTERM.
///
/// # Errors
///
/// Returns an error if backends cannot be created, a listener cannot be bound,
/// or a server fails while running.
pub async fn run(config: &ConcordConfig) -> Result<()> {
    run_until(config, shutdown_signal()).await
}

/// Like [`run`], stopping when `signal` resolves instead of on SIGINT/SIGTERM.
///
/// # Errors
///
/// See [`run`].
pub async fn run_until<F>(config: &ConcordConfig, signal: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let status_listener = if config.server.enabled {
        Some(bind("status", &config.server.host, config.server.port).await?)
    } else {
        None
    };
    let metrics_listener = if config.metrics.enabled {
        Some(bind("metrics", &config.metrics.host, config.metrics.port).await?)
    } else {
        None
    };

    // The recorder must be installed before the poller emits.
    let metrics = if config.metrics.enabled { Some(ConcordMetrics::new()?) } else { None };

    let backends = create_backends(config)?;
    let scheduler = Arc::new(PollingScheduler::new(config.consensus.poll_interval()));
    let poller = ConsensusPoller::builder(backends)
        .group(config.consensus.group.clone())
        .scheduler(scheduler.clone())
        .build();

    let shutdown = CancellationToken::new();
    let mut servers = Vec::new();

    if let Some(listener) = status_listener {
        servers.push(serve("status", listener, status_router(poller.clone()), shutdown.clone()));
    }

    if let (Some(listener), Some(metrics)) = (metrics_listener, metrics) {
        servers.push(serve("metrics", listener, metrics.router(), shutdown.clone()));
    }

    signal.await;

    poller.shutdown();
    shutdown.cancel();
    scheduler.join().await;

    for server in servers {
        server.await.wrap_err("server task panicked")??;
    }

    info!("Shut down successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::minimal_config;

    #[tokio::test]
    async fn test_run_until_immediate_signal() {
        let mut config = minimal_config();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.enabled = false;
        config.backends[0].url = "http://127.0.0.1:9".to_string();

        run_until(&config, async {}).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_until_serves_status() {
        let mut config = minimal_config();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.backends[0].url = "http://127.0.0.1:9".to_string();

        run_until(&config, tokio::time::sleep(std::time::Duration::from_millis(50)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_until_bind_failure() {
        let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = minimal_config();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = occupied.local_addr().unwrap().port();

        let err = run_until(&config, async {}).await.unwrap_err();
        assert!(err.to_string().contains("failed to bind status server"));
    }
}
