pub mod block;
pub mod checkpoint;
pub mod config;
pub mod epoch;
pub mod slot;
pub mod status;
pub mod types;

pub use block::{hash_tree_root, BeaconBlock, Signature, SignedBeaconBlock};
pub use checkpoint::Checkpoint;
pub use config::ChainConfig;
pub use epoch::Epoch;
pub use slot::Slot;
pub use status::Status;
pub use types::{Bytes32, ValidatorIndex};

pub use types::Bytes32 as Root;
