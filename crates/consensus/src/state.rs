//! Per-backend consensus state.

use std::sync::{Mutex, MutexGuard, PoisonError};

use concord_types::{BlockHead, BlockNumber};
use tokio::time::Instant;

/// A copy of one backend's state, taken under its lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSnapshot {
    /// Last observed block height.
    pub latest_block_number: BlockNumber,
    /// Last observed block hash.
    pub latest_block_hash: String,
    /// Time of the last successful refresh.
    pub last_update: Option<Instant>,
    /// The backend is excluded while `now` is before this instant.
    pub banned_until: Option<Instant>,
}

impl BackendSnapshot {
    /// Whether the backend is banned at `now`.
    #[must_use]
    pub fn is_banned(&self, now: Instant) -> bool {
        self.banned_until.is_some_and(|until| now < until)
    }
}

/// Mutable record of what one backend last reported.
///
/// Every field is read and written under a single lock owned by this backend,
/// so a reader never sees a height from one update paired with the hash of
/// another.
#[derive(Debug, Default)]
pub struct BackendState {
    inner: Mutex<BackendSnapshot>,
}

impl BackendState {
    /// Create an empty state: height 0, no hash, never updated, not banned.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BackendSnapshot> {
        // Critical sections are plain field copies and cannot leave the record half written.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest block height and hash, read as a pair.
    #[must_use]
    pub fn get(&self) -> BlockHead {
        let state = self.lock();
        BlockHead::new(state.latest_block_number, state.latest_block_hash.clone())
    }

    /// Overwrite height and hash and stamp the update time.
    ///
    /// Returns `true` when the hash differs from the stored one. A height change
    /// with an unchanged hash is not reported as a change.
    pub fn set(&self, number: BlockNumber, hash: &str) -> bool {
        let mut state = self.lock();
        let changed = state.latest_block_hash != hash;
        state.latest_block_number = number;
        state.latest_block_hash = hash.to_string();
        state.last_update = Some(Instant::now());
        changed
    }

    /// Full copy of the state.
    #[must_use]
    pub fn snapshot(&self) -> BackendSnapshot {
        self.lock().clone()
    }

    /// Whether the backend is banned at `now`.
    #[must_use]
    pub fn is_banned(&self, now: Instant) -> bool {
        self.lock().is_banned(now)
    }

    /// Exclude the backend until `until`.
    pub fn ban_until(&self, until: Instant) {
        self.lock().banned_until = Some(until);
    }

    /// Lift any ban.
    pub fn unban(&self) {
        self.lock().banned_until = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[test]
    fn test_new_state_is_empty() {
        let state = BackendState::new();
        assert_eq!(state.get(), BlockHead::default());
        let snapshot = state.snapshot();
        assert!(snapshot.last_update.is_none());
        assert!(snapshot.banned_until.is_none());
    }

    #[rstest]
    #[case::new_hash_same_height((100, "0xaa"), (100, "0xbb"), true)]
    #[case::new_hash_new_height((100, "0xaa"), (101, "0xbb"), true)]
    #[case::same_hash_same_height((100, "0xaa"), (100, "0xaa"), false)]
    #[case::same_hash_new_height((100, "0xaa"), (101, "0xaa"), false)]
    fn test_set_reports_hash_changes_only(
        #[case] first: (BlockNumber, &str),
        #[case] second: (BlockNumber, &str),
        #[case] expected: bool,
    ) {
        let state = BackendState::new();
        assert!(state.set(first.0, first.1));
        assert_eq!(state.set(second.0, second.1), expected);
        // The write happens whether or not a change was reported.
        assert_eq!(state.get(), BlockHead::new(second.0, second.1));
    }

    #[test]
    fn test_set_stamps_last_update() {
        let state = BackendState::new();
        let before = Instant::now();
        state.set(1, "0x01");
        let last_update = state.snapshot().last_update.expect("updated");
        assert!(last_update >= before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ban_expires() {
        let state = BackendState::new();
        state.ban_until(Instant::now() + Duration::from_secs(10));
        assert!(state.is_banned(Instant::now()));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!state.is_banned(Instant::now()));
    }

    #[test]
    fn test_unban() {
        let state = BackendState::new();
        state.ban_until(Instant::now() + Duration::from_secs(60));
        state.unban();
        assert!(!state.is_banned(Instant::now()));
    }

    #[test]
    fn test_concurrent_writers_never_tear_pairs() {
        let state = std::sync::Arc::new(BackendState::new());
        let writers: Vec<_> = (0..4u64)
            .map(|id| {
                let state = state.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        state.set(id, &format!("0x{id}"));
                    }
                })
            })
            .collect();

        for _ in 0..2000 {
            let head = state.get();
            if !head.hash.is_empty() {
                assert_eq!(head.hash, format!("0x{}", head.number));
            }
        }

        for writer in writers {
            writer.join().unwrap();
        }
    }
}
