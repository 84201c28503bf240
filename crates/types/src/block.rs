//! Block selectors and block heads.

use alloy_primitives::BlockNumber;
use derive_more::Display;
use serde::{Serialize, Serializer};

/// Selects the block a fetch asks a backend for.
///
/// Serializes to the string form nodes expect: `"latest"` or a `0x`-prefixed
/// hex quantity.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockTag {
    /// The backend's current chain tip.
    #[display("latest")]
    Latest,
    /// A fixed height.
    #[display("{_0:#x}")]
    Number(BlockNumber),
}

impl From<BlockNumber> for BlockTag {
    fn from(number: BlockNumber) -> Self {
        Self::Number(number)
    }
}

impl Serialize for BlockTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Height and hash of a block as reported by one backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct BlockHead {
    /// Block height.
    pub number: BlockNumber,
    /// Opaque block hash.
    pub hash: String,
}

impl BlockHead {
    /// Create a new block head.
    pub fn new(number: BlockNumber, hash: impl Into<String>) -> Self {
        Self { number, hash: hash.into() }
    }
}

/// Decode a `0x`-prefixed hex quantity.
///
/// Returns `None` when the prefix is missing, the digits are empty or not hex,
/// or the value does not fit in 64 bits.
pub fn decode_quantity(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}
