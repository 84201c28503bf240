//! Group consensus resolution.
//!
//! Starting from the lowest height any backend has reported, every live
//! backend is asked for the block at that exact height. If they all return the
//! same `(height, hash)` the search stops; otherwise it walks one block back and
//! asks again. The search only ever moves downward, so the resolved height is
//! always one that was verified in the current cycle.

use std::sync::Arc;

use concord_traits::Backend;
use concord_types::{BlockHead, BlockNumber, BlockTag, FetchError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{BackendState, fetch_block, metrics};

/// Walk-back depth at which a cycle is reported as unusually deep.
///
/// The search itself is only bounded by genesis. Each step costs one fetch per
/// live backend, so a backend that never agrees, such as a node on another
/// chain, costs roughly `height * live` fetches per cycle.
pub const DEEP_WALK_BACK: u64 = 64;

/// One backend of the pool together with its state slot.
pub(crate) struct Member {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) state: BackendState,
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.backend.name())
            .field("state", &self.state)
            .finish()
    }
}

impl Member {
    pub(crate) fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend, state: BackendState::new() }
    }

    /// Online, not rate limited and not banned at `now`.
    pub(crate) fn is_live(&self, now: Instant) -> bool {
        self.backend.is_online() && !self.backend.is_rate_limited() && !self.state.is_banned(now)
    }
}

/// Result of one resolution cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Agreed block height.
    pub block_number: BlockNumber,
    /// Agreed block hash. Empty if no live backend answered.
    pub block_hash: String,
    /// Names of the backends agreeing on the block, in pool order.
    pub consensus_backends: Vec<String>,
    /// Names of the backends skipped because they were offline, rate limited or banned.
    pub filtered_backends: Vec<String>,
    /// Whether a live backend contradicted a previously published height.
    pub broken: bool,
    /// Number of blocks walked back from the baseline.
    pub walk_back: u64,
}

/// A resolution plus the pool indices of the agreeing members.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub(crate) resolution: Resolution,
    pub(crate) members: Vec<usize>,
}

#[derive(Debug, Default)]
struct Round {
    agreed: bool,
    broken: bool,
    agreeing: Vec<usize>,
    filtered: Vec<String>,
}

/// Walk-back search over a snapshot of the pool.
#[derive(Debug)]
pub(crate) struct GroupResolver<'a> {
    members: &'a [Member],
    cancel: &'a CancellationToken,
}

impl<'a> GroupResolver<'a> {
    pub(crate) const fn new(members: &'a [Member], cancel: &'a CancellationToken) -> Self {
        Self { members, cancel }
    }

    /// Lowest block reported by any backend that has reported one.
    ///
    /// Backends still at height 0 have no data yet and do not pull the
    /// baseline down. Healthy or not, every other backend counts.
    pub(crate) fn baseline(&self) -> Option<BlockHead> {
        self.members
            .iter()
            .map(|member| member.state.get())
            .filter(|head| head.number > 0)
            .min_by_key(|head| head.number)
    }

    /// Search for the highest block all live backends agree on.
    ///
    /// `current_consensus` is the previously published height; disagreement at
    /// or below it is reported as broken consensus. Returns `None` when no
    /// backend has data yet or when the cycle was cancelled.
    pub(crate) async fn resolve(&self, current_consensus: BlockNumber) -> Option<Outcome> {
        let Some(mut proposed) = self.baseline() else {
            debug!("no backend has reported a block yet, skipping resolution");
            return None;
        };

        if proposed.number > current_consensus {
            debug!(block_number = proposed.number, "validating consensus on block");
        }

        let mut broken = false;
        let mut walk_back = 0;
        loop {
            let round = self.check_round(&mut proposed, current_consensus).await;
            if self.cancel.is_cancelled() {
                debug!(block_number = proposed.number, "resolution cancelled");
                return None;
            }
            broken |= round.broken;

            // Height 0 is the floor of the search, agreed or not.
            if round.agreed || proposed.number == 0 {
                let consensus_backends = round
                    .agreeing
                    .iter()
                    .map(|&index| self.members[index].backend.name().to_string())
                    .collect();
                return Some(Outcome {
                    resolution: Resolution {
                        block_number: proposed.number,
                        block_hash: proposed.hash,
                        consensus_backends,
                        filtered_backends: round.filtered,
                        broken,
                        walk_back,
                    },
                    members: round.agreeing,
                });
            }

            proposed = BlockHead::new(proposed.number - 1, String::new());
            walk_back += 1;
            debug!(block_number = proposed.number, "no consensus, now trying");
            if walk_back == DEEP_WALK_BACK {
                warn!(
                    block_number = proposed.number,
                    walk_back,
                    "consensus walk-back is unusually deep, a backend may be on another chain"
                );
            }
        }
    }

    /// Ask every live backend for `proposed` and compare.
    ///
    /// Adopts the first fetched hash when `proposed` has none. Stops at the
    /// first disagreeing backend. Backends whose fetch fails are left out of
    /// the round without failing it.
    async fn check_round(
        &self,
        proposed: &mut BlockHead,
        current_consensus: BlockNumber,
    ) -> Round {
        let now = Instant::now();
        let mut round = Round { agreed: true, ..Default::default() };

        for (index, member) in self.members.iter().enumerate() {
            let name = member.backend.name();
            if !member.is_live(now) {
                round.filtered.push(name.to_string());
                continue;
            }

            let tag = BlockTag::Number(proposed.number);
            let actual = match fetch_block(self.cancel, member.backend.as_ref(), tag).await {
                Ok(head) => head,
                Err(FetchError::Cancelled { .. }) => break,
                Err(err) => {
                    warn!(backend = name, error = %err, "error checking backend block");
                    metrics::record_fetch_error(name, err.kind());
                    continue;
                }
            };

            if proposed.hash.is_empty() {
                proposed.hash = actual.hash.clone();
            }

            if actual != *proposed {
                if current_consensus >= actual.number {
                    warn!(
                        backend = name,
                        block_number = actual.number,
                        block_hash = %actual.hash,
                        proposed_block_number = proposed.number,
                        proposed_block_hash = %proposed.hash,
                        "backend broke consensus"
                    );
                    round.broken = true;
                }
                round.agreed = false;
                break;
            }

            round.agreeing.push(index);
        }

        round
    }
}
