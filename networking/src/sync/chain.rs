use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use containers::{Bytes32, ChainConfig, Epoch, SignedBeaconBlock, Slot};
use libp2p_identity::PeerId;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::PeerAction;

use super::batch::{Batch, BatchState, BlocksByRangeRequest};
use super::chain_ordering;
use super::config::{SyncConfig, BATCH_SLOT_OFFSET};
use super::error::{ChainError, ChainSegmentError, DownloadError};
use super::peer_balancer::{self, ActiveRequests};
use super::sync_type::RangeSyncType;
use super::trigger::{trigger, Trigger, TriggerListener};
use super::SyncTypes;

/// Identifier of a sync chain, unique within a range sync instance.
pub type ChainId = u64;

/// The head a chain is trying to reach, as claimed by its peers.
///
/// The root separates chains across forks even when slots collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainTarget {
    pub slot: Slot,
    pub root: Bytes32,
}

/// Transport for `beacon_blocks_by_range` requests.
///
/// Implementations deliver at most `request.count` blocks with slots in
/// `[start_slot, start_slot + count)` in ascending order; anything
/// malformed surfaces as a `DownloadError`. Request timeouts are the
/// transport's concern and arrive here as plain errors.
#[async_trait]
pub trait BlockRangeRequester: Send + Sync + 'static {
    async fn blocks_by_range(
        &self,
        peer: PeerId,
        request: BlocksByRangeRequest,
    ) -> Result<Vec<SignedBeaconBlock>, DownloadError>;
}

/// The block import engine.
///
/// Applies a full ordered segment to the local chain; success means every
/// block imported. A structured error reports how many blocks made it in
/// before the failure.
#[async_trait]
pub trait SegmentProcessor: Send + Sync + 'static {
    async fn process_chain_segment(
        &self,
        blocks: Vec<SignedBeaconBlock>,
    ) -> Result<(), ChainSegmentError>;
}

/// Fire-and-forget peer scoring.
pub trait PeerReporter: Send + Sync + 'static {
    fn report_peer(&self, peer: PeerId, action: PeerAction, reason: &'static str);
}

/// The external collaborators a sync chain drives.
pub struct SyncChainFns<T: SyncTypes> {
    pub network: Arc<T::Network>,
    pub processor: Arc<T::Processor>,
    pub reporter: Arc<T::Reporter>,
}

impl<T: SyncTypes> Clone for SyncChainFns<T> {
    fn clone(&self) -> Self {
        Self {
            network: self.network.clone(),
            processor: self.processor.clone(),
            reporter: self.reporter.clone(),
        }
    }
}

/// Callback invoked exactly once when a chain reaches `Synced` or `Error`.
/// An externally aborted chain unwinds without invoking it.
pub type OnEnd = Box<dyn FnOnce(ChainId, Result<(), ChainError>) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    /// Constructed or deselected; holds state but performs no work.
    Stopped,
    /// Actively downloading and processing batches.
    Syncing,
    /// Reached its target slot.
    Synced,
    /// Failed fatally.
    Error,
}

enum ProcessorOutcome {
    /// The chain reached its target.
    Synced,
    /// Nothing left to process right now; wait for the next trigger.
    Pending,
}

struct ChainInner {
    status: ChainStatus,
    /// Greatest epoch known validated. Everything below it is accepted.
    start_epoch: Epoch,
    batches: BTreeMap<Epoch, Batch>,
    /// Peers claiming this chain, with the exact target each advertised.
    peers: HashMap<PeerId, ChainTarget>,
    /// Currently selected target: the most common among the peer set.
    target: Option<ChainTarget>,
    /// Epochs validated over this chain's lifetime. Monotonic; used by
    /// chain selection as a progress measure.
    validated_epochs: u64,
    fatal: Option<ChainError>,
}

struct ChainShared<T: SyncTypes> {
    id: ChainId,
    sync_type: RangeSyncType,
    chain_config: Arc<ChainConfig>,
    config: Arc<SyncConfig>,
    fns: SyncChainFns<T>,
    active_requests: Arc<ActiveRequests>,
    inner: Mutex<ChainInner>,
    trigger: Trigger,
    cancel: CancellationToken,
    on_end: Mutex<Option<OnEnd>>,
}

/// A chain of blocks being synced towards one target root.
///
/// Runs two cooperating halves: a downloader that is plain synchronous
/// scheduling re-entered from every hook (peer added, download finished,
/// batch processed), and a processor task that imports downloaded batches
/// strictly in epoch order, woken through a coalescing trigger.
///
/// Construction does not start the chain; `start_syncing` does.
pub struct SyncChain<T: SyncTypes> {
    shared: Arc<ChainShared<T>>,
    listener: Mutex<Option<TriggerListener>>,
}

impl<T: SyncTypes> SyncChain<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ChainId,
        start_epoch: Epoch,
        sync_type: RangeSyncType,
        fns: SyncChainFns<T>,
        on_end: OnEnd,
        chain_config: Arc<ChainConfig>,
        config: Arc<SyncConfig>,
        active_requests: Arc<ActiveRequests>,
    ) -> Self {
        assert!(config.epochs_per_batch >= 1, "epochs_per_batch must be at least 1");
        let (trigger, listener) = trigger();
        Self {
            shared: Arc::new(ChainShared {
                id,
                sync_type,
                chain_config,
                config,
                fns,
                active_requests,
                inner: Mutex::new(ChainInner {
                    status: ChainStatus::Stopped,
                    start_epoch,
                    batches: BTreeMap::new(),
                    peers: HashMap::new(),
                    target: None,
                    validated_epochs: 0,
                    fatal: None,
                }),
                trigger,
                cancel: CancellationToken::new(),
                on_end: Mutex::new(Some(on_end)),
            }),
            listener: Mutex::new(Some(listener)),
        }
    }

    pub fn id(&self) -> ChainId {
        self.shared.id
    }

    pub fn sync_type(&self) -> RangeSyncType {
        self.shared.sync_type
    }

    pub fn status(&self) -> ChainStatus {
        self.shared.inner.lock().status
    }

    pub fn is_syncing(&self) -> bool {
        self.status() == ChainStatus::Syncing
    }

    pub fn start_epoch(&self) -> Epoch {
        self.shared.inner.lock().start_epoch
    }

    pub fn target(&self) -> Option<ChainTarget> {
        self.shared.inner.lock().target
    }

    pub fn validated_epochs(&self) -> u64 {
        self.shared.inner.lock().validated_epochs
    }

    pub fn peer_count(&self) -> usize {
        self.shared.inner.lock().peers.len()
    }

    /// Snapshot of batch states in ascending epoch order.
    pub fn batch_snapshot(&self) -> Vec<(Epoch, &'static str)> {
        self.shared
            .inner
            .lock()
            .batches
            .iter()
            .map(|(epoch, batch)| (*epoch, batch.state().name()))
            .collect()
    }

    /// Add a peer claiming this chain. Idempotent; a syncing chain puts
    /// the new peer to work immediately.
    pub fn add_peer(&self, peer: PeerId, target: ChainTarget) {
        let syncing = {
            let mut inner = self.shared.inner.lock();
            inner.peers.insert(peer, target);
            Self::recompute_target(&mut inner);
            inner.status == ChainStatus::Syncing
        };
        if syncing {
            self.shared.dispatch_downloads();
        }
    }

    /// Remove a peer. Returns true when the peer was present. An in-flight
    /// download from the peer is left to complete or fail on its own.
    pub fn remove_peer(&self, peer: &PeerId) -> bool {
        let mut inner = self.shared.inner.lock();
        let removed = inner.peers.remove(peer).is_some();
        if removed {
            Self::recompute_target(&mut inner);
        }
        removed
    }

    /// Start or resume syncing.
    ///
    /// The caller's finalized epoch is taken as progress made elsewhere
    /// (other chains may have advanced the local chain while this one was
    /// stopped) and the chain advances to the nearest batch boundary at or
    /// below it.
    pub fn start_syncing(&self, local_finalized_epoch: Epoch) -> Result<(), ChainError> {
        {
            let mut inner = self.shared.inner.lock();
            match inner.status {
                ChainStatus::Syncing => return Ok(()),
                ChainStatus::Synced | ChainStatus::Error => return Err(ChainError::StartAfterEnded),
                ChainStatus::Stopped => {}
            }
            if local_finalized_epoch > inner.start_epoch {
                let epochs_per_batch = self.shared.config.epochs_per_batch;
                let aligned = Epoch(
                    inner.start_epoch.0
                        + (local_finalized_epoch - inner.start_epoch) / epochs_per_batch
                            * epochs_per_batch,
                );
                self.shared.advance_chain(&mut inner, aligned)?;
            }
            inner.status = ChainStatus::Syncing;
            info!(
                chain = self.shared.id,
                sync_type = self.shared.sync_type.as_str(),
                start_epoch = %inner.start_epoch,
                "Sync chain started"
            );
        }
        self.ensure_processor();
        self.shared.trigger.fire();
        self.shared.dispatch_downloads();
        Ok(())
    }

    /// Deselect the chain. State is kept so it can be resumed later;
    /// in-flight downloads complete into the batch map.
    pub fn stop_syncing(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.status == ChainStatus::Syncing {
            inner.status = ChainStatus::Stopped;
            debug!(chain = self.shared.id, "Sync chain stopped");
        }
    }

    /// Abort the chain: the processor task and any in-flight downloads
    /// unwind silently, with no peer reports and no end callback.
    pub fn remove(&self) {
        self.shared.cancel.cancel();
    }

    fn ensure_processor(&self) {
        if let Some(listener) = self.listener.lock().take() {
            let shared = self.shared.clone();
            tokio::spawn(async move { shared.processor_task(listener).await });
        }
    }

    /// Re-select the target as the most common one among the peer set,
    /// ties broken towards the lexicographically greatest root.
    fn recompute_target(inner: &mut ChainInner) {
        let mut counts: HashMap<ChainTarget, usize> = HashMap::new();
        for target in inner.peers.values() {
            *counts.entry(*target).or_default() += 1;
        }
        inner.target = counts
            .into_iter()
            .max_by_key(|(target, count)| (*count, target.root, target.slot))
            .map(|(target, _)| target);
    }
}

impl<T: SyncTypes> Drop for SyncChain<T> {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

impl<T: SyncTypes> ChainShared<T> {
    /// The downloader: idempotent scan-and-dispatch, re-entered from every
    /// hook. Retries batches that lost their download, then hands every
    /// idle peer a fresh batch until the buffer or the target bounds it.
    fn dispatch_downloads(self: &Arc<Self>) {
        let to_send = {
            let mut inner = self.inner.lock();
            if inner.status != ChainStatus::Syncing {
                return;
            }
            let Some(target) = inner.target else {
                return;
            };
            let mut to_send: Vec<(Epoch, PeerId, BlocksByRangeRequest)> = Vec::new();

            let awaiting: Vec<Epoch> = inner
                .batches
                .iter()
                .filter(|(_, batch)| matches!(batch.state(), BatchState::AwaitingDownload))
                .map(|(epoch, _)| *epoch)
                .collect();
            let global_active = self.active_requests.snapshot();
            for epoch in awaiting {
                let Some(batch) = inner.batches.get(&epoch) else {
                    continue;
                };
                let failed = batch.failed_peers();
                let Some(peer) = peer_balancer::best_peer_to_retry(
                    inner.peers.keys(),
                    &inner.batches,
                    &failed,
                    &global_active,
                ) else {
                    continue;
                };
                if let Some(request) = self.assign_batch(&mut inner, epoch, peer) {
                    to_send.push((epoch, peer, request));
                } else {
                    return;
                }
            }

            for peer in peer_balancer::idle_peers(inner.peers.keys(), &inner.batches) {
                let Some(epoch) = self.include_next_batch(&mut inner, target) else {
                    break;
                };
                if let Some(request) = self.assign_batch(&mut inner, epoch, peer) {
                    to_send.push((epoch, peer, request));
                } else {
                    return;
                }
            }
            to_send
        };

        for (epoch, peer, request) in to_send {
            self.spawn_download(epoch, peer, request);
        }
    }

    /// Mark a batch as downloading from the given peer and build its
    /// request. A transition failure here is an invariant violation and
    /// fails the chain.
    fn assign_batch(
        &self,
        inner: &mut ChainInner,
        epoch: Epoch,
        peer: PeerId,
    ) -> Option<BlocksByRangeRequest> {
        let batch = inner.batches.get_mut(&epoch)?;
        match batch.start_downloading(peer) {
            Ok(()) => Some(batch.to_blocks_by_range_request(
                self.chain_config.slots_per_epoch,
                self.config.epochs_per_batch,
            )),
            Err(err) => {
                self.fail_locked(inner, err);
                None
            }
        }
    }

    /// Create the next batch if the buffer allows one and the target still
    /// needs one.
    fn include_next_batch(&self, inner: &mut ChainInner, target: ChainTarget) -> Option<Epoch> {
        let in_flight = inner
            .batches
            .values()
            .filter(|batch| {
                matches!(
                    batch.state(),
                    BatchState::Downloading { .. }
                        | BatchState::AwaitingProcessing { .. }
                        | BatchState::Processing { .. }
                )
            })
            .count();
        if in_flight > self.config.batch_buffer_size {
            return None;
        }

        let start_epoch = chain_ordering::to_be_downloaded_start_epoch(
            &inner.batches,
            inner.start_epoch,
            self.config.epochs_per_batch,
        );
        let start_slot = start_epoch.start_slot(self.chain_config.slots_per_epoch);
        if start_slot.0 + BATCH_SLOT_OFFSET > target.slot.0 {
            return None;
        }
        if inner.batches.contains_key(&start_epoch) {
            warn!(
                chain = self.id,
                epoch = %start_epoch,
                "Batch already exists at the next download epoch"
            );
            return None;
        }
        inner.batches.insert(start_epoch, Batch::new(start_epoch));
        Some(start_epoch)
    }

    fn spawn_download(self: &Arc<Self>, epoch: Epoch, peer: PeerId, request: BlocksByRangeRequest) {
        debug!(
            chain = self.id,
            epoch = %epoch,
            peer = %peer,
            start_slot = %request.start_slot,
            count = request.count,
            "Requesting batch"
        );
        self.active_requests.increment(&peer);
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = shared.cancel.cancelled() => None,
                result = shared.fns.network.blocks_by_range(peer, request) => Some(result),
            };
            shared.active_requests.decrement(&peer);
            match outcome {
                None => {}
                Some(Ok(blocks)) => shared.on_download_success(epoch, peer, &request, blocks),
                Some(Err(err)) => shared.on_download_error(epoch, peer, err),
            }
        });
    }

    fn on_download_success(
        self: &Arc<Self>,
        epoch: Epoch,
        peer: PeerId,
        request: &BlocksByRangeRequest,
        blocks: Vec<SignedBeaconBlock>,
    ) {
        if !response_in_range(request, &blocks) {
            warn!(
                chain = self.id,
                epoch = %epoch,
                peer = %peer,
                "Batch response outside the requested range"
            );
            self.fns
                .reporter
                .report_peer(peer, PeerAction::LowToleranceError, "SyncChainInvalidRange");
            self.on_download_error(epoch, peer, DownloadError::OutOfRange);
            return;
        }

        {
            let mut inner = self.inner.lock();
            let Some(batch) = inner.batches.get_mut(&epoch) else {
                debug!(chain = self.id, epoch = %epoch, "Download completed for a removed batch");
                return;
            };
            if !matches!(batch.state(), BatchState::Downloading { peer: p } if *p == peer) {
                debug!(chain = self.id, epoch = %epoch, "Stale download response");
                return;
            }
            let block_count = blocks.len();
            if let Err(err) = batch.downloading_success(blocks) {
                self.fail_locked(&mut inner, err);
                return;
            }
            debug!(
                chain = self.id,
                epoch = %epoch,
                peer = %peer,
                blocks = block_count,
                "Downloaded batch"
            );
        }
        self.trigger.fire();
        self.dispatch_downloads();
    }

    fn on_download_error(self: &Arc<Self>, epoch: Epoch, peer: PeerId, err: DownloadError) {
        let mut inner = self.inner.lock();
        let Some(batch) = inner.batches.get_mut(&epoch) else {
            return;
        };
        if !matches!(batch.state(), BatchState::Downloading { peer: p } if *p == peer) {
            return;
        }
        debug!(
            chain = self.id,
            epoch = %epoch,
            peer = %peer,
            error = %err,
            "Batch download failed"
        );
        match batch.downloading_error(self.config.max_download_attempts) {
            Ok(()) => {
                drop(inner);
                self.dispatch_downloads();
            }
            Err(err) => self.fail_locked(&mut inner, err),
        }
    }

    /// The processor loop. Strictly serial: one batch in processing at any
    /// time, in ascending epoch order. Ends the chain on sync completion
    /// or a fatal error; cancellation unwinds without the end callback.
    async fn processor_task(self: Arc<Self>, mut listener: TriggerListener) {
        let result = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                alive = listener.next() => {
                    if !alive {
                        return;
                    }
                }
            }
            listener.drain();
            match self.process_ready_batches().await {
                Ok(ProcessorOutcome::Synced) => break Ok(()),
                Ok(ProcessorOutcome::Pending) => continue,
                Err(ChainError::Aborted) => return,
                Err(err) => break Err(err),
            }
        };
        self.finish(result);
    }

    /// Process every batch that is ready, in order, until none is.
    async fn process_ready_batches(self: &Arc<Self>) -> Result<ProcessorOutcome, ChainError> {
        loop {
            let (epoch, blocks) = {
                let mut inner = self.inner.lock();
                match inner.status {
                    ChainStatus::Syncing => {}
                    ChainStatus::Error => {
                        return Err(inner.fatal.take().unwrap_or(ChainError::Aborted));
                    }
                    ChainStatus::Stopped | ChainStatus::Synced => {
                        return Ok(ProcessorOutcome::Pending);
                    }
                }
                chain_ordering::validate_batches_status(&inner.batches)?;
                let Some(target) = inner.target else {
                    return Ok(ProcessorOutcome::Pending);
                };

                let next_epoch = chain_ordering::to_be_processed_start_epoch(
                    &inner.batches,
                    inner.start_epoch,
                    self.config.epochs_per_batch,
                );
                if next_epoch.start_slot(self.chain_config.slots_per_epoch) >= target.slot {
                    // Everything below the target processed; confirm the
                    // trailing validated batches and complete.
                    self.advance_chain(&mut inner, next_epoch)?;
                    return Ok(ProcessorOutcome::Synced);
                }

                let Some(epoch) = chain_ordering::next_batch_to_process(&inner.batches) else {
                    return Ok(ProcessorOutcome::Pending);
                };
                let Some(batch) = inner.batches.get_mut(&epoch) else {
                    return Ok(ProcessorOutcome::Pending);
                };
                (epoch, batch.start_processing()?)
            };

            let block_count = blocks.len();
            debug!(chain = self.id, epoch = %epoch, blocks = block_count, "Processing batch");
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(ChainError::Aborted),
                result = self.fns.processor.process_chain_segment(blocks) => result,
            };

            match result {
                Ok(()) => {
                    let mut inner = self.inner.lock();
                    if let Some(batch) = inner.batches.get_mut(&epoch) {
                        batch.processing_success()?;
                    }
                    // An empty batch proves nothing; only advance past
                    // epochs that produced blocks.
                    if block_count > 0 {
                        self.advance_chain(&mut inner, epoch)?;
                    }
                    drop(inner);
                    self.dispatch_downloads();
                }
                Err(err) => {
                    warn!(
                        chain = self.id,
                        epoch = %epoch,
                        imported = err.imported_blocks,
                        reason = %err.reason,
                        "Batch processing failed"
                    );
                    let mut inner = self.inner.lock();
                    if let Some(batch) = inner.batches.get_mut(&epoch) {
                        batch.processing_error(self.config.max_processing_attempts)?;
                    }
                    if err.imported_blocks > 0 {
                        // Some blocks imported, so every batch before this
                        // one is implicitly valid.
                        self.advance_chain(&mut inner, epoch)?;
                    }
                    // Whatever remains of the processed prefix is suspect;
                    // force it back through download.
                    let suspect: Vec<Epoch> = inner
                        .batches
                        .range(..epoch)
                        .filter(|(_, batch)| {
                            matches!(batch.state(), BatchState::AwaitingValidation { .. })
                        })
                        .map(|(epoch, _)| *epoch)
                        .collect();
                    for suspect_epoch in suspect {
                        if let Some(batch) = inner.batches.get_mut(&suspect_epoch) {
                            batch.validation_error(self.config.max_processing_attempts)?;
                        }
                    }
                    drop(inner);
                    self.dispatch_downloads();
                    return Ok(ProcessorOutcome::Pending);
                }
            }
        }
    }

    /// Move the validated boundary up to `new_start`, dropping every batch
    /// behind it and scoring the peers whose attempts lost out.
    fn advance_chain(&self, inner: &mut ChainInner, new_start: Epoch) -> Result<(), ChainError> {
        if new_start <= inner.start_epoch {
            return Ok(());
        }
        let retained = inner.batches.split_off(&new_start);
        let removed = std::mem::replace(&mut inner.batches, retained);
        for (epoch, batch) in removed {
            if matches!(batch.state(), BatchState::AwaitingValidation { .. }) {
                let failed_attempts = batch.failed_processing_attempts().to_vec();
                let winner = batch.validation_success()?;
                for attempt in failed_attempts {
                    if attempt.hash == winner.hash {
                        continue;
                    }
                    if attempt.peer == winner.peer {
                        // The peer served different data the second time
                        // around and got it right.
                        debug!(
                            chain = self.id,
                            epoch = %epoch,
                            peer = %attempt.peer,
                            "Batch corrected by the same peer"
                        );
                        self.fns.reporter.report_peer(
                            attempt.peer,
                            PeerAction::MidToleranceError,
                            "SyncChainInvalidBatchSelf",
                        );
                    } else {
                        debug!(
                            chain = self.id,
                            epoch = %epoch,
                            peer = %attempt.peer,
                            winner = %winner.peer,
                            "Batch served invalid by one peer, corrected by another"
                        );
                        self.fns.reporter.report_peer(
                            attempt.peer,
                            PeerAction::LowToleranceError,
                            "SyncChainInvalidBatchOther",
                        );
                    }
                }
            } else {
                debug!(
                    chain = self.id,
                    epoch = %epoch,
                    state = batch.state().name(),
                    "Dropping unvalidated batch behind the new chain start"
                );
            }
            inner.validated_epochs += self.config.epochs_per_batch;
        }
        debug!(chain = self.id, from = %inner.start_epoch, to = %new_start, "Advanced chain");
        inner.start_epoch = new_start;
        Ok(())
    }

    /// Record a fatal error and wake the processor so it can terminate the
    /// chain.
    fn fail_locked(&self, inner: &mut ChainInner, err: ChainError) {
        if matches!(inner.status, ChainStatus::Error | ChainStatus::Synced) {
            return;
        }
        warn!(chain = self.id, error = %err, "Sync chain failing");
        inner.fatal = Some(err);
        inner.status = ChainStatus::Error;
        self.trigger.fire();
    }

    /// Terminal bookkeeping, then the end callback. Runs at most once, on
    /// the processor task.
    fn finish(&self, result: Result<(), ChainError>) {
        {
            let mut inner = self.inner.lock();
            match &result {
                Ok(()) => {
                    inner.status = ChainStatus::Synced;
                    info!(
                        chain = self.id,
                        start_epoch = %inner.start_epoch,
                        validated_epochs = inner.validated_epochs,
                        "Sync chain reached its target"
                    );
                }
                Err(err) => {
                    inner.status = ChainStatus::Error;
                    warn!(chain = self.id, error = %err, "Sync chain ended with error");
                    if matches!(err, ChainError::MaxProcessingAttempts { .. }) {
                        // Every peer vouched for a chain that cannot be
                        // processed.
                        for peer in inner.peers.keys() {
                            self.fns.reporter.report_peer(
                                *peer,
                                PeerAction::LowToleranceError,
                                "SyncChainMaxProcessingAttempts",
                            );
                        }
                    }
                }
            }
        }
        let on_end = self.on_end.lock().take();
        if let Some(on_end) = on_end {
            on_end(self.id, result);
        }
    }
}

/// Check that a response only carries blocks for the requested range, in
/// ascending slot order.
fn response_in_range(request: &BlocksByRangeRequest, blocks: &[SignedBeaconBlock]) -> bool {
    let end_slot = request.start_slot.0 + request.count;
    let mut previous: Option<u64> = None;
    for block in blocks {
        let slot = block.slot().0;
        if slot < request.start_slot.0 || slot >= end_slot {
            return false;
        }
        if let Some(previous) = previous {
            if slot <= previous {
                return false;
            }
        }
        previous = Some(slot);
    }
    true
}
