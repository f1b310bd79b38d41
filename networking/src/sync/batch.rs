use containers::{Bytes32, Epoch, SignedBeaconBlock, Slot};
use libp2p_identity::PeerId;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use super::config::BATCH_SLOT_OFFSET;
use super::error::ChainError;

/// Domain prefix for batch attempt hashes, so they can never collide with
/// block roots or other hashed structures.
const ATTEMPT_HASH_DOMAIN: &[u8] = b"range-sync-batch-attempt";

/// A `beacon_blocks_by_range` request as handed to the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlocksByRangeRequest {
    pub start_slot: Slot,
    pub count: u64,
    pub step: u64,
}

/// Witness of one download that reached the processor: the peer that served
/// it and a digest of what it served.
///
/// Two peers returning the same blocks collapse to the same attempt hash,
/// which is how re-downloads are judged against the eventually validated
/// version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempt {
    pub peer: PeerId,
    pub hash: Bytes32,
}

/// Digest of an ordered block sequence: SHA-256 over a domain prefix
/// followed by the block hash tree roots.
pub fn hash_of_blocks(blocks: &[SignedBeaconBlock]) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update(ATTEMPT_HASH_DOMAIN);
    for block in blocks {
        hasher.update(block.canonical_root().as_bytes());
    }
    let digest: [u8; 32] = hasher.finalize().into();
    Bytes32::from(digest)
}

/// Lifecycle of a batch.
#[derive(Debug)]
pub enum BatchState {
    /// Nobody is serving this batch; it needs a peer.
    AwaitingDownload,
    /// A request for this batch is in flight.
    Downloading { peer: PeerId },
    /// Downloaded and queued for the processor.
    AwaitingProcessing {
        peer: PeerId,
        blocks: Vec<SignedBeaconBlock>,
    },
    /// Handed to the processor.
    Processing { attempt: Attempt },
    /// Processed successfully; awaiting confirmation by a later batch.
    AwaitingValidation { attempt: Attempt },
    /// Sentinel left behind while a transition moves the payload out.
    /// Observing it outside a transition is an invariant violation.
    Poisoned,
}

impl BatchState {
    pub fn name(&self) -> &'static str {
        match self {
            BatchState::AwaitingDownload => "AwaitingDownload",
            BatchState::Downloading { .. } => "Downloading",
            BatchState::AwaitingProcessing { .. } => "AwaitingProcessing",
            BatchState::Processing { .. } => "Processing",
            BatchState::AwaitingValidation { .. } => "AwaitingValidation",
            BatchState::Poisoned => "Poisoned",
        }
    }
}

/// One unit of sync work: `epochs_per_batch` consecutive epochs of blocks.
///
/// A batch only ever mutates through its transition methods; every other
/// combination of state and method fails with `WrongBatchState`, which the
/// owning chain treats as fatal.
#[derive(Debug)]
pub struct Batch {
    start_epoch: Epoch,
    state: BatchState,
    failed_download_attempts: Vec<PeerId>,
    failed_processing_attempts: Vec<Attempt>,
}

impl Batch {
    pub fn new(start_epoch: Epoch) -> Self {
        Self {
            start_epoch,
            state: BatchState::AwaitingDownload,
            failed_download_attempts: Vec::new(),
            failed_processing_attempts: Vec::new(),
        }
    }

    pub fn start_epoch(&self) -> Epoch {
        self.start_epoch
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// The wire request covering this batch.
    ///
    /// The first slot of the first epoch is skipped: it belongs to the
    /// previous batch, so consecutive batches stay linked through the
    /// epoch boundary block.
    pub fn to_blocks_by_range_request(
        &self,
        slots_per_epoch: u64,
        epochs_per_batch: u64,
    ) -> BlocksByRangeRequest {
        BlocksByRangeRequest {
            start_slot: Slot(self.start_epoch.start_slot(slots_per_epoch).0 + BATCH_SLOT_OFFSET),
            count: epochs_per_batch * slots_per_epoch,
            step: 1,
        }
    }

    /// Peers that already failed this batch, either by erroring the
    /// download or by serving blocks that did not process.
    pub fn failed_peers(&self) -> HashSet<PeerId> {
        self.failed_download_attempts
            .iter()
            .copied()
            .chain(self.failed_processing_attempts.iter().map(|a| a.peer))
            .collect()
    }

    pub fn failed_processing_attempts(&self) -> &[Attempt] {
        &self.failed_processing_attempts
    }

    fn wrong_state(&self, operation: &'static str) -> ChainError {
        ChainError::WrongBatchState {
            start_epoch: self.start_epoch,
            operation,
            state: self.state.name(),
        }
    }

    /// `AwaitingDownload` -> `Downloading`.
    pub fn start_downloading(&mut self, peer: PeerId) -> Result<(), ChainError> {
        match std::mem::replace(&mut self.state, BatchState::Poisoned) {
            BatchState::AwaitingDownload => {
                self.state = BatchState::Downloading { peer };
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.wrong_state("start_downloading"))
            }
        }
    }

    /// `Downloading` -> `AwaitingProcessing`.
    pub fn downloading_success(&mut self, blocks: Vec<SignedBeaconBlock>) -> Result<(), ChainError> {
        match std::mem::replace(&mut self.state, BatchState::Poisoned) {
            BatchState::Downloading { peer } => {
                self.state = BatchState::AwaitingProcessing { peer, blocks };
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.wrong_state("downloading_success"))
            }
        }
    }

    /// `Downloading` -> `AwaitingDownload`, recording the failed peer.
    ///
    /// Fails with `MaxDownloadAttempts` once the batch has burned
    /// `max_download_attempts` downloads over its lifetime.
    pub fn downloading_error(&mut self, max_download_attempts: usize) -> Result<(), ChainError> {
        match std::mem::replace(&mut self.state, BatchState::Poisoned) {
            BatchState::Downloading { peer } => {
                self.failed_download_attempts.push(peer);
                self.state = BatchState::AwaitingDownload;
                if self.failed_download_attempts.len() >= max_download_attempts {
                    Err(ChainError::MaxDownloadAttempts {
                        start_epoch: self.start_epoch,
                        limit: max_download_attempts,
                    })
                } else {
                    Ok(())
                }
            }
            other => {
                self.state = other;
                Err(self.wrong_state("downloading_error"))
            }
        }
    }

    /// `AwaitingProcessing` -> `Processing`, handing the blocks out and
    /// fixing the attempt identity as the hash of what was served.
    pub fn start_processing(&mut self) -> Result<Vec<SignedBeaconBlock>, ChainError> {
        match std::mem::replace(&mut self.state, BatchState::Poisoned) {
            BatchState::AwaitingProcessing { peer, blocks } => {
                let attempt = Attempt {
                    peer,
                    hash: hash_of_blocks(&blocks),
                };
                self.state = BatchState::Processing { attempt };
                Ok(blocks)
            }
            other => {
                self.state = other;
                Err(self.wrong_state("start_processing"))
            }
        }
    }

    /// `Processing` -> `AwaitingValidation`.
    pub fn processing_success(&mut self) -> Result<(), ChainError> {
        match std::mem::replace(&mut self.state, BatchState::Poisoned) {
            BatchState::Processing { attempt } => {
                self.state = BatchState::AwaitingValidation { attempt };
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.wrong_state("processing_success"))
            }
        }
    }

    /// `Processing` -> `AwaitingDownload`, recording the failed attempt.
    pub fn processing_error(&mut self, max_processing_attempts: usize) -> Result<(), ChainError> {
        match std::mem::replace(&mut self.state, BatchState::Poisoned) {
            BatchState::Processing { attempt } => {
                self.record_failed_processing(attempt, max_processing_attempts)
            }
            other => {
                self.state = other;
                Err(self.wrong_state("processing_error"))
            }
        }
    }

    /// `AwaitingValidation` -> `AwaitingDownload`.
    ///
    /// Used when a later batch fails to process: every already-processed
    /// batch behind it becomes suspect and must be re-downloaded.
    pub fn validation_error(&mut self, max_processing_attempts: usize) -> Result<(), ChainError> {
        match std::mem::replace(&mut self.state, BatchState::Poisoned) {
            BatchState::AwaitingValidation { attempt } => {
                self.record_failed_processing(attempt, max_processing_attempts)
            }
            other => {
                self.state = other;
                Err(self.wrong_state("validation_error"))
            }
        }
    }

    /// Terminal transition out of `AwaitingValidation`: the chain advanced
    /// past this batch, so its current attempt won. Returns that attempt
    /// for peer scoring.
    pub fn validation_success(self) -> Result<Attempt, ChainError> {
        match self.state {
            BatchState::AwaitingValidation { attempt } => Ok(attempt),
            _ => Err(self.wrong_state("validation_success")),
        }
    }

    fn record_failed_processing(
        &mut self,
        attempt: Attempt,
        max_processing_attempts: usize,
    ) -> Result<(), ChainError> {
        self.failed_processing_attempts.push(attempt);
        self.state = BatchState::AwaitingDownload;
        if self.failed_processing_attempts.len() >= max_processing_attempts {
            Err(ChainError::MaxProcessingAttempts {
                start_epoch: self.start_epoch,
                limit: max_processing_attempts,
            })
        } else {
            Ok(())
        }
    }
}
