//! Consensus height storage.

use concord_types::BlockNumber;

/// Holds the last resolved consensus height.
///
/// Implementations synchronize internally: the height is read by routing code
/// concurrently with writes from the resolution cycle. Only the latest value
/// is kept.
pub trait ConsensusTracker: Send + Sync + std::fmt::Debug {
    /// Get the agreed block number.
    fn consensus_block_number(&self) -> BlockNumber;

    /// Replace the agreed block number.
    fn set_consensus_block_number(&self, number: BlockNumber);
}
