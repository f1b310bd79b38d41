//! Pure helpers over a chain's batch map.
//!
//! Batches are keyed by start epoch and read in ascending order. Their
//! statuses must always match the pattern
//!
//! ```text
//! AwaitingValidation*  Processing?  (AwaitingDownload | Downloading | AwaitingProcessing)*
//! ```
//!
//! since validation is confirmed front to back and the processor runs a
//! single batch at a time. Any deviation means the chain state machine has
//! a bug, and the chain fails fast.

use std::collections::BTreeMap;

use containers::Epoch;

use super::batch::{Batch, BatchState};
use super::error::ChainError;

#[derive(Clone, Copy, PartialEq)]
enum Phase {
    Validated,
    Processing,
    PreProcessing,
}

/// Check the status-ordering invariant over the whole batch map.
pub fn validate_batches_status(batches: &BTreeMap<Epoch, Batch>) -> Result<(), ChainError> {
    let mut phase = Phase::Validated;
    for (epoch, batch) in batches {
        match batch.state() {
            BatchState::AwaitingValidation { .. } => {
                if phase != Phase::Validated {
                    return Err(ChainError::InvalidBatchOrder(format!(
                        "batch {epoch} awaits validation behind an unvalidated batch"
                    )));
                }
            }
            BatchState::Processing { .. } => match phase {
                Phase::Validated => phase = Phase::Processing,
                Phase::Processing => {
                    return Err(ChainError::InvalidBatchOrder(format!(
                        "batch {epoch} is a second batch in processing"
                    )));
                }
                Phase::PreProcessing => {
                    return Err(ChainError::InvalidBatchOrder(format!(
                        "batch {epoch} processes behind a pending batch"
                    )));
                }
            },
            BatchState::AwaitingDownload
            | BatchState::Downloading { .. }
            | BatchState::AwaitingProcessing { .. } => phase = Phase::PreProcessing,
            BatchState::Poisoned => {
                return Err(ChainError::InvalidBatchOrder(format!(
                    "batch {epoch} was left poisoned"
                )));
            }
        }
    }
    Ok(())
}

/// The next batch the processor should take: the first batch past the
/// validated prefix, provided it has finished downloading.
pub fn next_batch_to_process(batches: &BTreeMap<Epoch, Batch>) -> Option<Epoch> {
    for (epoch, batch) in batches {
        match batch.state() {
            BatchState::AwaitingValidation { .. } => continue,
            BatchState::AwaitingProcessing { .. } => return Some(*epoch),
            _ => return None,
        }
    }
    None
}

/// The epoch of the next batch the processor will work on: one batch past
/// the highest batch awaiting validation, or the anchor when none is.
pub fn to_be_processed_start_epoch(
    batches: &BTreeMap<Epoch, Batch>,
    anchor: Epoch,
    epochs_per_batch: u64,
) -> Epoch {
    batches
        .iter()
        .filter(|(_, batch)| matches!(batch.state(), BatchState::AwaitingValidation { .. }))
        .map(|(epoch, _)| *epoch)
        .max()
        .map(|epoch| epoch + epochs_per_batch)
        .unwrap_or(anchor)
}

/// The epoch of the next batch to queue for download: one batch past the
/// last known batch, or the anchor when the map is empty.
pub fn to_be_downloaded_start_epoch(
    batches: &BTreeMap<Epoch, Batch>,
    anchor: Epoch,
    epochs_per_batch: u64,
) -> Epoch {
    batches
        .keys()
        .next_back()
        .map(|epoch| *epoch + epochs_per_batch)
        .unwrap_or(anchor)
}
