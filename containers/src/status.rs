use crate::{Bytes32, Checkpoint, Slot};
use serde::{Deserialize, Serialize};

/// Chain status snapshot exchanged with peers during the status handshake.
///
/// Carries the finalized checkpoint and the current head so that sync can
/// decide whether (and how far) a remote chain is ahead of the local one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Status {
    pub finalized: Checkpoint,
    pub head_root: Bytes32,
    pub head_slot: Slot,
}

impl Status {
    pub fn new(finalized: Checkpoint, head_root: Bytes32, head_slot: Slot) -> Self {
        Self {
            finalized,
            head_root,
            head_slot,
        }
    }
}
