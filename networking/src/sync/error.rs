//! Error types for the range sync engine.

use containers::Epoch;
use thiserror::Error;

/// Fatal errors that end a sync chain.
///
/// Transient download and processing failures are absorbed per batch and
/// retried; only these escalate to the chain level.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A batch method was called in a state that does not allow it. This is
    /// an internal invariant violation, fatal to the chain.
    #[error("batch {start_epoch} cannot {operation} in state {state}")]
    WrongBatchState {
        start_epoch: Epoch,
        operation: &'static str,
        state: &'static str,
    },

    /// A batch exhausted its download retries.
    #[error("batch {start_epoch} exceeded {limit} download attempts")]
    MaxDownloadAttempts { start_epoch: Epoch, limit: usize },

    /// A batch exhausted its processing retries.
    #[error("batch {start_epoch} exceeded {limit} processing attempts")]
    MaxProcessingAttempts { start_epoch: Epoch, limit: usize },

    /// The batch map no longer matches the expected status ordering.
    #[error("invalid batch order: {0}")]
    InvalidBatchOrder(String),

    /// A caller tried to restart a chain that already reached a terminal
    /// status.
    #[error("chain cannot be started after it ended")]
    StartAfterEnded,

    /// The chain was cancelled externally. Unwinds silently.
    #[error("chain aborted")]
    Aborted,
}

/// Failure of a single `blocks_by_range` request.
///
/// These are transient from the chain's point of view; the batch retries
/// with another peer until its attempt budget runs out.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request timed out")]
    Timeout,

    /// The response carried blocks outside the requested slot range or out
    /// of ascending order.
    #[error("response contained blocks outside the requested range")]
    OutOfRange,

    #[error("rpc failure: {0}")]
    Rpc(#[from] anyhow::Error),
}

/// Rejection of a chain segment by the block processor.
///
/// Blocks import one by one, so a failure part way through still leaves a
/// prefix applied; `imported_blocks` reports how many.
#[derive(Debug, Error)]
#[error("chain segment rejected after importing {imported_blocks} blocks: {reason}")]
pub struct ChainSegmentError {
    pub imported_blocks: usize,
    pub reason: String,
}
