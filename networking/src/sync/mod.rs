/// Range sync engine for catching the local chain up to the network.
///
/// Peers ahead of us advertise a target (a head or finalized checkpoint);
/// peers agreeing on a target are grouped into a `SyncChain` that
/// downloads the block range between our finalized epoch and that target
/// in batches, feeds them to the block processor strictly in order, and
/// penalizes peers caught serving bad data. `RangeSync` owns the chains
/// and decides which of them run:
///
/// - **Batch**: one unit of work, `epochs_per_batch` epochs of blocks,
///   with its own download/processing retry budget
/// - **SyncChain**: one target; a downloader that keeps peers busy and a
///   serial processor that advances the validated boundary
/// - **RangeSync**: classifies peers into finalized vs head sync, routes
///   them to chains, and bounds how many chains sync at once
pub mod batch;
pub mod chain;
pub mod chain_ordering;
pub mod config;
pub mod error;
pub mod peer_balancer;
pub mod range_sync;
pub mod sync_type;
pub mod trigger;

pub use batch::{hash_of_blocks, Attempt, Batch, BatchState, BlocksByRangeRequest};
pub use chain::{
    BlockRangeRequester, ChainId, ChainStatus, ChainTarget, OnEnd, PeerReporter, SegmentProcessor,
    SyncChain, SyncChainFns,
};
pub use config::{SyncConfig, BATCH_SLOT_OFFSET};
pub use error::{ChainError, ChainSegmentError, DownloadError};
pub use peer_balancer::ActiveRequests;
pub use range_sync::{ChainEnd, RangeSync, SlotClock};
pub use sync_type::{BlockRootLookup, RangeSyncType};

/// Bundle of collaborator types a sync instance is generic over.
///
/// Implement on a zero-sized marker to wire concrete network, processor,
/// scoring, fork-choice-lookup, and clock implementations together.
pub trait SyncTypes: Send + Sync + Sized + 'static {
    type Network: BlockRangeRequester;
    type Processor: SegmentProcessor;
    type Reporter: PeerReporter;
    type Lookup: BlockRootLookup;
    type Clock: SlotClock;
}

#[cfg(test)]
mod tests;
