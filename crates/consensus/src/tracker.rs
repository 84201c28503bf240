//! In-memory consensus tracker.

use std::sync::atomic::{AtomicU64, Ordering};

use concord_traits::ConsensusTracker;
use concord_types::BlockNumber;

/// Default [`ConsensusTracker`]: a single atomic height.
///
/// Nothing is persisted; a restarted process resolves consensus from scratch.
#[derive(Debug, Default)]
pub struct InMemoryTracker {
    consensus_block_number: AtomicU64,
}

impl InMemoryTracker {
    /// Create a new tracker at height 0.
    #[must_use]
    pub const fn new() -> Self {
        Self { consensus_block_number: AtomicU64::new(0) }
    }
}

impl ConsensusTracker for InMemoryTracker {
    fn consensus_block_number(&self) -> BlockNumber {
        self.consensus_block_number.load(Ordering::Acquire)
    }

    fn set_consensus_block_number(&self, number: BlockNumber) {
        self.consensus_block_number.store(number, Ordering::Release);
    }
}
