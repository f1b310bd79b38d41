use crate::{Bytes32, Slot, ValidatorIndex};
use serde::{Deserialize, Serialize};
use tree_hash_derive::TreeHash;

/// A beacon block header as carried over the block-range transport.
///
/// Range sync never executes block bodies; it only needs the slot and the
/// parent link, so blocks travel as headers with the body condensed to its
/// root.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize, TreeHash)]
#[serde(rename_all = "camelCase")]
pub struct BeaconBlock {
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_root: Bytes32,
    pub state_root: Bytes32,
    pub body_root: Bytes32,
}

/// Proposer signature over a block message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub alloy_primitives::FixedBytes<96>);

impl Default for Signature {
    fn default() -> Self {
        Signature(alloy_primitives::FixedBytes::ZERO)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedBeaconBlock {
    pub message: BeaconBlock,
    pub signature: Signature,
}

impl SignedBeaconBlock {
    pub fn slot(&self) -> Slot {
        self.message.slot
    }

    pub fn parent_root(&self) -> Bytes32 {
        self.message.parent_root
    }

    /// The block root: the hash tree root of the unsigned message.
    pub fn canonical_root(&self) -> Bytes32 {
        hash_tree_root(&self.message)
    }
}

/// Compute the hash tree root for any type implementing `TreeHash`.
pub fn hash_tree_root<T: tree_hash::TreeHash>(value: &T) -> Bytes32 {
    Bytes32(value.tree_hash_root())
}
