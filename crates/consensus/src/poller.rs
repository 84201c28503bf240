//! Consensus poller.
//!
//! Owns the backend pool, one [`BackendState`] per backend, the
//! [`ConsensusTracker`] and the published consensus group. Refresh and
//! resolution cycles are driven by a [`Scheduler`].

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use concord_traits::{Backend, ConsensusTracker};
use concord_types::{BlockNumber, BlockTag, FetchError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    BackendSnapshot, InMemoryTracker, PollingScheduler, Resolution, Scheduler, fetch_block,
    metrics,
    resolver::{GroupResolver, Member},
};

/// Default interval between refresh and resolution cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default name of the polled backend group.
pub const DEFAULT_GROUP_NAME: &str = "main";

/// Consensus published by one resolution cycle.
///
/// Height, hash and group are replaced together, so a reader sees all three
/// from the same cycle.
#[derive(Debug, Clone, Default)]
pub struct ConsensusSnapshot {
    /// Agreed block height.
    pub block_number: BlockNumber,
    /// Agreed block hash.
    pub block_hash: String,
    /// Backends agreeing on the block, in pool order.
    pub backends: Vec<Arc<dyn Backend>>,
}

/// Builder for [`ConsensusPoller`].
#[derive(Debug)]
pub struct ConsensusPollerBuilder {
    group: String,
    backends: Vec<Arc<dyn Backend>>,
    tracker: Option<Arc<dyn ConsensusTracker>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl ConsensusPollerBuilder {
    /// Set the group name used in logs and metric labels.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Store the consensus height in `tracker` instead of in memory.
    #[must_use]
    pub fn tracker(mut self, tracker: Arc<dyn ConsensusTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Drive the cycles with `scheduler` instead of a [`PollingScheduler`].
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Build the poller and start its scheduler.
    ///
    /// With the default [`PollingScheduler`] this spawns tokio tasks and must
    /// be called from within a tokio runtime.
    pub fn build(self) -> Arc<ConsensusPoller> {
        let members: Vec<Member> = self.backends.into_iter().map(Member::new).collect();
        let poller = Arc::new(ConsensusPoller {
            group: self.group,
            members,
            published: Mutex::new(ConsensusSnapshot::default()),
            tracker: self.tracker.unwrap_or_else(|| Arc::new(InMemoryTracker::new())),
            scheduler: self
                .scheduler
                .unwrap_or_else(|| Arc::new(PollingScheduler::new(DEFAULT_POLL_INTERVAL))),
        });
        poller.scheduler.init(poller.clone());
        poller
    }
}

/// Tracks the highest block a quorum of live backends agrees on.
///
/// Routing code reads the result through [`Self::consensus_group`],
/// [`Self::consensus_block_number`] and [`Self::consensus_snapshot`] at any
/// time, concurrently with the cycles rewriting it.
#[derive(Debug)]
pub struct ConsensusPoller {
    group: String,
    members: Vec<Member>,
    published: Mutex<ConsensusSnapshot>,
    tracker: Arc<dyn ConsensusTracker>,
    scheduler: Arc<dyn Scheduler>,
}

impl ConsensusPoller {
    /// Start building a poller over a fixed pool of backends.
    #[must_use]
    pub fn builder(backends: Vec<Arc<dyn Backend>>) -> ConsensusPollerBuilder {
        ConsensusPollerBuilder {
            group: DEFAULT_GROUP_NAME.to_string(),
            backends,
            tracker: None,
            scheduler: None,
        }
    }

    /// Name of the polled group.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    pub(crate) fn member_count(&self) -> usize {
        self.members.len()
    }

    fn member(&self, name: &str) -> Option<(usize, &Member)> {
        self.members.iter().enumerate().find(|(_, member)| member.backend.name() == name)
    }

    fn lock_published(&self) -> MutexGuard<'_, ConsensusSnapshot> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Backends agreeing on the current consensus block.
    ///
    /// Returns a copy; the published group is replaced wholesale each cycle.
    #[must_use]
    pub fn consensus_group(&self) -> Vec<Arc<dyn Backend>> {
        self.lock_published().backends.clone()
    }

    /// The agreed block number, as held by the tracker.
    #[must_use]
    pub fn consensus_block_number(&self) -> BlockNumber {
        self.tracker.consensus_block_number()
    }

    /// Height, hash and group published by the last resolution cycle.
    #[must_use]
    pub fn consensus_snapshot(&self) -> ConsensusSnapshot {
        self.lock_published().clone()
    }

    /// Copy of the state recorded for backend `name`.
    #[must_use]
    pub fn backend_state(&self, name: &str) -> Option<BackendSnapshot> {
        self.member(name).map(|(_, member)| member.state.snapshot())
    }

    /// Exclude backend `name` from refreshes and resolution until `until`.
    ///
    /// Returns `false` if no backend has that name.
    pub fn ban_backend(&self, name: &str, until: Instant) -> bool {
        let Some((_, member)) = self.member(name) else { return false };
        member.state.ban_until(until);
        warn!(backend = name, banned_until = ?until, "backend banned");
        true
    }

    /// Lift a ban on backend `name`.
    ///
    /// Returns `false` if no backend has that name.
    pub fn unban_backend(&self, name: &str) -> bool {
        let Some((_, member)) = self.member(name) else { return false };
        member.state.unban();
        info!(backend = name, "backend unbanned");
        true
    }

    /// Stop the scheduler. Idempotent.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Refresh the latest block of backend `name`.
    pub async fn refresh_backend(&self, cancel: &CancellationToken, name: &str) {
        match self.member(name) {
            Some((index, _)) => self.refresh_member(cancel, index).await,
            None => warn!(backend = name, "refresh requested for unknown backend"),
        }
    }

    /// Refresh every backend, one after another.
    pub async fn refresh_all(&self, cancel: &CancellationToken) {
        for index in 0..self.members.len() {
            self.refresh_member(cancel, index).await;
        }
    }

    pub(crate) async fn refresh_member(&self, cancel: &CancellationToken, index: usize) {
        let Some(member) = self.members.get(index) else { return };
        let name = member.backend.name();

        let state = member.state.snapshot();
        if state.is_banned(Instant::now()) {
            warn!(backend = name, banned_until = ?state.banned_until, "skipping banned backend");
            return;
        }

        if member.backend.is_rate_limited() || !member.backend.is_online() {
            debug!(backend = name, "skipping unavailable backend");
            return;
        }

        let head = match fetch_block(cancel, member.backend.as_ref(), BlockTag::Latest).await {
            Ok(head) => head,
            Err(FetchError::Cancelled { .. }) => return,
            Err(err) => {
                let transient =
                    matches!(&err, FetchError::Transport { source, .. } if source.is_transient());
                warn!(backend = name, transient, error = %err, "error updating backend");
                metrics::record_fetch_error(name, err.kind());
                return;
            }
        };

        if member.state.set(head.number, &head.hash) {
            metrics::record_backend_latest_block(name, head.number);
            info!(
                backend = name,
                block_number = head.number,
                block_hash = %head.hash,
                "backend state updated"
            );
        }
    }

    /// Resolve the group consensus from the current backend states and publish it.
    ///
    /// Returns the published resolution, or `None` if nothing was published
    /// because no backend has reported a block yet or `cancel` fired.
    pub async fn resolve_group(&self, cancel: &CancellationToken) -> Option<Resolution> {
        let current = self.consensus_block_number();
        let outcome = GroupResolver::new(&self.members, cancel).resolve(current).await?;
        let resolution = outcome.resolution;

        if resolution.broken {
            // Interested parties, such as a cache invalidator, hook in here.
            metrics::record_consensus_broken(&self.group);
            info!(
                group = %self.group,
                current_consensus_block_number = current,
                block_number = resolution.block_number,
                block_hash = %resolution.block_hash,
                "consensus broken"
            );
        }

        let backends =
            outcome.members.iter().map(|&index| self.members[index].backend.clone()).collect();

        self.tracker.set_consensus_block_number(resolution.block_number);
        *self.lock_published() = ConsensusSnapshot {
            block_number: resolution.block_number,
            block_hash: resolution.block_hash.clone(),
            backends,
        };

        metrics::record_group_consensus_latest_block(&self.group, resolution.block_number);
        metrics::record_group_membership(
            &self.group,
            resolution.consensus_backends.len(),
            resolution.filtered_backends.len(),
        );
        metrics::record_walk_back(&self.group, resolution.walk_back);

        info!(
            group = %self.group,
            block_number = resolution.block_number,
            consensus_backends = %resolution.consensus_backends.join(", "),
            filtered_backends = %resolution.filtered_backends.join(", "),
            "group state"
        );

        Some(resolution)
    }
}

#[cfg(test)]
mod tests {
    use concord_test_utils::MockBackend;
    use rstest::rstest;

    use super::*;
    use crate::NoopScheduler;

    fn manual_poller(backends: &[&MockBackend]) -> Arc<ConsensusPoller> {
        ConsensusPoller::builder(backends.iter().map(|backend| backend.shared()).collect())
            .scheduler(Arc::new(NoopScheduler))
            .build()
    }

    fn names(backends: &[Arc<dyn Backend>]) -> Vec<&str> {
        backends.iter().map(|backend| backend.name()).collect()
    }

    #[tokio::test]
    async fn test_refresh_records_latest_block() {
        let a = MockBackend::new("a").with_chain("a", 100);
        let poller = manual_poller(&[&a]);
        let cancel = CancellationToken::new();

        poller.refresh_backend(&cancel, "a").await;

        let state = poller.backend_state("a").unwrap();
        assert_eq!(state.latest_block_number, 100);
        assert_eq!(state.latest_block_hash, a.hash_at(100).unwrap());
        assert!(state.last_update.is_some());
    }

    #[tokio::test]
    async fn test_refresh_skips_unavailable_backends() {
        let offline = MockBackend::new("offline").with_chain("a", 100);
        let limited = MockBackend::new("limited").with_chain("a", 100);
        offline.set_online(false);
        limited.set_rate_limited(true);
        let poller = manual_poller(&[&offline, &limited]);

        poller.refresh_all(&CancellationToken::new()).await;

        assert_eq!(offline.call_count(), 0);
        assert_eq!(limited.call_count(), 0);
        assert_eq!(poller.backend_state("offline").unwrap().latest_block_number, 0);
    }

    #[tokio::test]
    async fn test_refresh_skips_banned_backend() {
        let a = MockBackend::new("a").with_chain("a", 100);
        let poller = manual_poller(&[&a]);
        assert!(poller.ban_backend("a", Instant::now() + Duration::from_secs(60)));

        poller.refresh_backend(&CancellationToken::new(), "a").await;
        assert_eq!(a.call_count(), 0);

        assert!(poller.unban_backend("a"));
        poller.refresh_backend(&CancellationToken::new(), "a").await;
        assert_eq!(a.call_count(), 1);
    }

    #[rstest]
    #[case::malformed(MockBackend::set_malformed)]
    #[case::transport(MockBackend::set_failing)]
    #[tokio::test]
    async fn test_refresh_failure_keeps_stale_state(#[case] fail: fn(&MockBackend, bool)) {
        let a = MockBackend::new("a").with_chain("a", 100);
        let poller = manual_poller(&[&a]);
        let cancel = CancellationToken::new();
        poller.refresh_backend(&cancel, "a").await;

        fail(&a, true);
        a.extend_chain("a", 101);
        poller.refresh_backend(&cancel, "a").await;

        assert_eq!(poller.backend_state("a").unwrap().latest_block_number, 100);
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let a = MockBackend::new("a").with_chain("a", 100);
        let poller = manual_poller(&[&a]);
        poller.refresh_backend(&CancellationToken::new(), "nope").await;
        assert!(poller.backend_state("nope").is_none());
        assert!(!poller.ban_backend("nope", Instant::now()));
        assert!(!poller.unban_backend("nope"));
    }

    #[tokio::test]
    async fn test_resolve_publishes_group_and_height() {
        let a = MockBackend::new("a").with_chain("a", 100);
        let b = MockBackend::new("b").with_chain("a", 100);
        let poller = manual_poller(&[&a, &b]);
        let cancel = CancellationToken::new();

        poller.refresh_all(&cancel).await;
        let resolution = poller.resolve_group(&cancel).await.unwrap();

        assert_eq!(resolution.block_number, 100);
        assert_eq!(poller.consensus_block_number(), 100);
        assert_eq!(names(&poller.consensus_group()), vec!["a", "b"]);

        let snapshot = poller.consensus_snapshot();
        assert_eq!(snapshot.block_number, 100);
        assert_eq!(snapshot.block_hash, a.hash_at(100).unwrap());
        assert_eq!(names(&snapshot.backends), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_resolve_without_data_changes_nothing() {
        let a = MockBackend::new("a").with_chain("a", 100);
        let poller = manual_poller(&[&a]);

        assert!(poller.resolve_group(&CancellationToken::new()).await.is_none());
        assert_eq!(poller.consensus_block_number(), 0);
        assert!(poller.consensus_group().is_empty());
        assert_eq!(a.call_count(), 0);
    }

    #[tokio::test]
    async fn test_banned_backend_left_out_of_group() {
        let a = MockBackend::new("a").with_chain("a", 100);
        let b = MockBackend::new("b").with_chain("a", 100);
        let poller = manual_poller(&[&a, &b]);
        let cancel = CancellationToken::new();
        poller.refresh_all(&cancel).await;

        poller.ban_backend("b", Instant::now() + Duration::from_secs(60));
        let resolution = poller.resolve_group(&cancel).await.unwrap();

        assert_eq!(resolution.filtered_backends, vec!["b"]);
        assert_eq!(names(&poller.consensus_group()), vec!["a"]);
    }

    #[tokio::test]
    async fn test_custom_tracker_receives_height() {
        let a = MockBackend::new("a").with_chain("a", 42);
        let tracker = Arc::new(InMemoryTracker::new());
        let poller = ConsensusPoller::builder(vec![a.shared()])
            .group("archive")
            .tracker(tracker.clone())
            .scheduler(Arc::new(NoopScheduler))
            .build();
        let cancel = CancellationToken::new();

        poller.refresh_all(&cancel).await;
        poller.resolve_group(&cancel).await;

        assert_eq!(poller.group(), "archive");
        assert_eq!(tracker.consensus_block_number(), 42);
    }
}
