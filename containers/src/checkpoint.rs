use crate::{Bytes32, Epoch};
use serde::{Deserialize, Serialize};
use tree_hash_derive::TreeHash;

/// Represents a checkpoint in the chain's history.
///
/// A checkpoint marks a specific moment in the chain. It combines a block
/// identifier with the epoch it belongs to. Checkpoints are used for
/// justification and finalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, TreeHash)]
pub struct Checkpoint {
    /// The epoch of the checkpoint's block.
    pub epoch: Epoch,
    /// The root hash of the checkpoint's block.
    pub root: Bytes32,
}

impl Checkpoint {
    pub fn new(epoch: Epoch, root: Bytes32) -> Self {
        Self { epoch, root }
    }
}
