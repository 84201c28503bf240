//! Scheduling of the refresh and resolution cycles.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::ConsensusPoller;

/// Drives the recurring cycles of a [`ConsensusPoller`].
pub trait Scheduler: Send + Sync + std::fmt::Debug {
    /// Start the recurring cycles for `poller`.
    fn init(&self, poller: Arc<ConsensusPoller>);

    /// Stop the recurring cycles. Calling it more than once has no further effect.
    fn shutdown(&self);
}

/// Scheduler that never ticks.
///
/// The owner drives [`ConsensusPoller::refresh_backend`] and
/// [`ConsensusPoller::resolve_group`] by hand, which keeps tests deterministic.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl NoopScheduler {
    /// Create a new no-op scheduler.
    #[must_use]
    pub fn new() -> Self {
        warn!("using no-op consensus scheduler, cycles must be driven manually");
        Self
    }
}

impl Scheduler for NoopScheduler {
    fn init(&self, _poller: Arc<ConsensusPoller>) {}

    fn shutdown(&self) {}
}

/// Scheduler running one tokio task per backend plus one for the group.
///
/// Each task runs a cycle, then waits until one interval after the cycle
/// started. Cancellation is observed between cycles and inside in-flight
/// fetches; a cycle is never interrupted otherwise.
#[derive(Debug)]
pub struct PollingScheduler {
    interval: Duration,
    cancel: CancellationToken,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PollingScheduler {
    /// Create a scheduler ticking every `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The polling interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether [`Scheduler::shutdown`] has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for every spawned task to finish.
    ///
    /// Only returns after [`Scheduler::shutdown`] has been called (or if
    /// nothing was started).
    pub async fn join(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "consensus task ended abnormally");
            }
        }
    }
}

/// Sleep until `deadline`. Returns `false` if `cancel` fired first.
async fn wait_for_tick(deadline: Instant, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep_until(deadline) => true,
    }
}

impl Scheduler for PollingScheduler {
    fn init(&self, poller: Arc<ConsensusPoller>) {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!(group = poller.group(), "consensus scheduler already started");
            return;
        }

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let interval = self.interval;

        for index in 0..poller.member_count() {
            let poller = poller.clone();
            let cancel = self.cancel.clone();
            tasks.push(tokio::spawn(async move {
                while !cancel.is_cancelled() {
                    let deadline = Instant::now() + interval;
                    poller.refresh_member(&cancel, index).await;
                    if !wait_for_tick(deadline, &cancel).await {
                        break;
                    }
                }
            }));
        }

        let group_poller = poller.clone();
        let cancel = self.cancel.clone();
        tasks.push(tokio::spawn(async move {
            while !cancel.is_cancelled() {
                let deadline = Instant::now() + interval;
                group_poller.resolve_group(&cancel).await;
                if !wait_for_tick(deadline, &cancel).await {
                    break;
                }
            }
            debug!(group = group_poller.group(), "consensus polling stopped");
        }));

        info!(
            group = poller.group(),
            backends = poller.member_count(),
            ?interval,
            "consensus polling started"
        );
    }

    fn shutdown(&self) {
        self.cancel.cancel();
    }
}
