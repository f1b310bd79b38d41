/// Range sync configuration.
///
/// Operational parameters for batch-based catch-up: batch width, download
/// concurrency, and retry limits.

/// Offset of a batch's first requested slot past the epoch boundary.
///
/// The boundary block is assumed to already be held by the previous batch,
/// so adjacent batches share a parent link across the epoch edge. A bad
/// batch then shows up as a missing link when the next one is processed.
pub const BATCH_SLOT_OFFSET: u64 = 1;

/// Tunables for the range sync engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Epochs covered by one batch. Must be at least 1.
    pub epochs_per_batch: u64,

    /// Maximum batches kept in flight (downloading or waiting for the
    /// processor) before the downloader stops creating new ones.
    pub batch_buffer_size: usize,

    /// Download failures tolerated per batch over its lifetime.
    pub max_download_attempts: usize,

    /// Processing failures tolerated per batch over its lifetime.
    pub max_processing_attempts: usize,

    /// Head chains allowed to sync concurrently.
    pub parallel_head_chains: usize,

    /// Epochs a syncing finalized chain must have validated before chain
    /// selection may switch away from it.
    pub min_finalized_chain_validated_epochs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            epochs_per_batch: 2,
            batch_buffer_size: 5,
            max_download_attempts: 5,
            max_processing_attempts: 3,
            parallel_head_chains: 2,
            min_finalized_chain_validated_epochs: 10,
        }
    }
}
