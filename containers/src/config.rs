use serde::{Deserialize, Serialize};

/// Network-level chain parameters.
///
/// Only the parameters sync arithmetic depends on; execution parameters
/// live with the state-transition engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    #[serde(default = "default_slots_per_epoch")]
    pub slots_per_epoch: u64,

    #[serde(default = "default_seconds_per_slot")]
    pub seconds_per_slot: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            slots_per_epoch: default_slots_per_epoch(),
            seconds_per_slot: default_seconds_per_slot(),
        }
    }
}

fn default_slots_per_epoch() -> u64 {
    32
}
fn default_seconds_per_slot() -> u64 {
    12
}
