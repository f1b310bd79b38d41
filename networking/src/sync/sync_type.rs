//! Classification of a peer's chain relative to ours: which kind of range
//! sync, if any, its status justifies.

use containers::{Bytes32, Status};

/// Lookup into the locally known block tree.
///
/// Abstracts fork choice so classification stays a pure function and tests
/// can substitute a fixed set of roots.
pub trait BlockRootLookup: Send + Sync + 'static {
    /// True when the given block root is known to the local chain.
    fn is_known_block_root(&self, root: &Bytes32) -> bool;
}

/// The type of range sync to perform against a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeSyncType {
    /// The peer's finalized checkpoint is ahead of ours on an unknown
    /// history: sync up to that checkpoint.
    Finalized,
    /// The peer shares our finalized history but its head is ahead:
    /// short-range sync to its head.
    Head,
}

impl RangeSyncType {
    /// Classify a peer from the local and remote status snapshots.
    ///
    /// Returns `None` when the peer offers nothing we do not already have.
    pub fn classify<L: BlockRootLookup>(
        lookup: &L,
        local: &Status,
        remote: &Status,
    ) -> Option<RangeSyncType> {
        if remote.finalized.epoch <= local.finalized.epoch && remote.head_slot <= local.head_slot {
            return None;
        }

        if remote.finalized.epoch > local.finalized.epoch
            && !lookup.is_known_block_root(&remote.finalized.root)
        {
            return Some(RangeSyncType::Finalized);
        }

        if lookup.is_known_block_root(&remote.finalized.root) && remote.head_slot > local.head_slot
        {
            return Some(RangeSyncType::Head);
        }

        None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RangeSyncType::Finalized => "Finalized",
            RangeSyncType::Head => "Head",
        }
    }
}
