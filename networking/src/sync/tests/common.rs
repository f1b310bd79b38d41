//! Shared fixtures: a scripted network, a parent-verifying processor, and
//! recording doubles for the remaining collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use containers::{
    BeaconBlock, Bytes32, ChainConfig, Epoch, Signature, SignedBeaconBlock, Slot, Status,
    ValidatorIndex,
};
use libp2p_identity::PeerId;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};

use crate::sync::{
    ActiveRequests, BlockRangeRequester, BlockRootLookup, BlocksByRangeRequest, ChainError,
    ChainSegmentError, ChainTarget, DownloadError, OnEnd, PeerReporter, RangeSyncType,
    SegmentProcessor, SlotClock, SyncChain, SyncChainFns, SyncConfig, SyncTypes,
};
use crate::types::PeerAction;

pub struct TestTypes;

impl SyncTypes for TestTypes {
    type Network = MockNetwork;
    type Processor = VerifyingProcessor;
    type Reporter = RecordingReporter;
    type Lookup = MockLookup;
    type Clock = FixedClock;
}

/// Build the canonical chain for slots `0..=head_slot`, each block linked
/// to the previous by parent root.
pub fn canonical_chain(head_slot: u64) -> Vec<SignedBeaconBlock> {
    let mut blocks = Vec::with_capacity(head_slot as usize + 1);
    let mut parent_root = Bytes32::default();
    for slot in 0..=head_slot {
        let block = SignedBeaconBlock {
            message: BeaconBlock {
                slot: Slot(slot),
                proposer_index: ValidatorIndex(slot % 64),
                parent_root,
                state_root: Bytes32::default(),
                body_root: Bytes32::default(),
            },
            signature: Signature::default(),
        };
        parent_root = block.canonical_root();
        blocks.push(block);
    }
    blocks
}

enum NetworkMode {
    /// Serve the canonical chain (subject to scripted bad ranges).
    Serve,
    /// Fail every request.
    FailAll,
    /// Never resolve a request.
    Hang,
}

struct BadRange {
    remaining: usize,
    good_prefix: usize,
}

/// Scripted `blocks_by_range` transport.
pub struct MockNetwork {
    canonical: Vec<SignedBeaconBlock>,
    mode: NetworkMode,
    bad_ranges: Mutex<HashMap<u64, BadRange>>,
    requests: Mutex<Vec<(PeerId, BlocksByRangeRequest)>>,
}

impl MockNetwork {
    /// A network of honest peers holding the canonical chain up to
    /// `head_slot`.
    pub fn honest(head_slot: u64) -> Self {
        Self {
            canonical: canonical_chain(head_slot),
            mode: NetworkMode::Serve,
            bad_ranges: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A network where every request errors.
    pub fn failing() -> Self {
        Self {
            canonical: Vec::new(),
            mode: NetworkMode::FailAll,
            bad_ranges: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A network where requests never resolve.
    pub fn hanging() -> Self {
        Self {
            canonical: Vec::new(),
            mode: NetworkMode::Hang,
            bad_ranges: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script the next `times` responses for the range starting at
    /// `start_slot`: the first `good_prefix` blocks are canonical, the
    /// rest carry unknown parents. Responses vary between repeats so each
    /// serves a distinct bad batch.
    pub fn set_bad_range(&self, start_slot: u64, times: usize, good_prefix: usize) {
        self.bad_ranges.lock().insert(
            start_slot,
            BadRange {
                remaining: times,
                good_prefix,
            },
        );
    }

    pub fn root_at(&self, slot: u64) -> Bytes32 {
        self.canonical[slot as usize].canonical_root()
    }

    pub fn genesis_root(&self) -> Bytes32 {
        self.root_at(0)
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn canonical_range(&self, request: &BlocksByRangeRequest) -> Vec<SignedBeaconBlock> {
        let end = request.start_slot.0 + request.count;
        self.canonical
            .iter()
            .filter(|block| block.slot().0 >= request.start_slot.0 && block.slot().0 < end)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BlockRangeRequester for MockNetwork {
    async fn blocks_by_range(
        &self,
        peer: PeerId,
        request: BlocksByRangeRequest,
    ) -> Result<Vec<SignedBeaconBlock>, DownloadError> {
        self.requests.lock().push((peer, request));
        match self.mode {
            NetworkMode::Hang => std::future::pending().await,
            NetworkMode::FailAll => Err(DownloadError::Timeout),
            NetworkMode::Serve => {
                let mut blocks = self.canonical_range(&request);
                let mut bad_ranges = self.bad_ranges.lock();
                if let Some(bad) = bad_ranges.get_mut(&request.start_slot.0) {
                    if bad.remaining > 0 {
                        bad.remaining -= 1;
                        let marker = bad.remaining as u8;
                        for block in blocks.iter_mut().skip(bad.good_prefix) {
                            block.message.parent_root = Bytes32::from([0xBA; 32]);
                            block.message.state_root = Bytes32::from([marker; 32]);
                        }
                    }
                }
                Ok(blocks)
            }
        }
    }
}

/// A processor that accepts a block iff its parent was already imported,
/// like the real import engine verifying segment linkage.
pub struct VerifyingProcessor {
    imported: Mutex<HashSet<Bytes32>>,
    gate: Option<Arc<Semaphore>>,
}

impl VerifyingProcessor {
    pub fn new(genesis_root: Bytes32) -> Self {
        Self {
            imported: Mutex::new(HashSet::from([genesis_root])),
            gate: None,
        }
    }

    /// A processor that must be fed a permit per segment before it runs.
    pub fn gated(genesis_root: Bytes32, gate: Arc<Semaphore>) -> Self {
        Self {
            imported: Mutex::new(HashSet::from([genesis_root])),
            gate: Some(gate),
        }
    }

    /// Blocks imported so far, genesis excluded.
    pub fn imported_count(&self) -> usize {
        self.imported.lock().len() - 1
    }
}

#[async_trait]
impl SegmentProcessor for VerifyingProcessor {
    async fn process_chain_segment(
        &self,
        blocks: Vec<SignedBeaconBlock>,
    ) -> Result<(), ChainSegmentError> {
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.expect("processor gate closed");
            permit.forget();
        }
        let mut imported = self.imported.lock();
        let mut count = 0usize;
        for block in &blocks {
            let root = block.canonical_root();
            if imported.contains(&root) {
                count += 1;
                continue;
            }
            if imported.contains(&block.parent_root()) {
                imported.insert(root);
                count += 1;
            } else {
                return Err(ChainSegmentError {
                    imported_blocks: count,
                    reason: format!("unknown parent at slot {}", block.slot()),
                });
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(PeerId, PeerAction, &'static str)>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<(PeerId, PeerAction, &'static str)> {
        self.reports.lock().clone()
    }
}

impl PeerReporter for RecordingReporter {
    fn report_peer(&self, peer: PeerId, action: PeerAction, reason: &'static str) {
        self.reports.lock().push((peer, action, reason));
    }
}

#[derive(Default)]
pub struct MockLookup {
    known: Mutex<HashSet<Bytes32>>,
}

impl MockLookup {
    pub fn insert(&self, root: Bytes32) {
        self.known.lock().insert(root);
    }
}

impl BlockRootLookup for MockLookup {
    fn is_known_block_root(&self, root: &Bytes32) -> bool {
        self.known.lock().contains(root)
    }
}

pub struct FixedClock(AtomicU64);

impl FixedClock {
    pub fn new(slot: u64) -> Self {
        Self(AtomicU64::new(slot))
    }
}

impl SlotClock for FixedClock {
    fn current_slot(&self) -> Slot {
        Slot(self.0.load(Ordering::Relaxed))
    }
}

/// A sync chain wired to the test doubles, plus handles to observe it.
pub struct ChainHarness {
    pub chain: SyncChain<TestTypes>,
    pub network: Arc<MockNetwork>,
    pub processor: Arc<VerifyingProcessor>,
    pub reporter: Arc<RecordingReporter>,
    pub ends: mpsc::UnboundedReceiver<Result<(), ChainError>>,
}

pub fn chain_harness(
    network: MockNetwork,
    processor: VerifyingProcessor,
    config: SyncConfig,
) -> ChainHarness {
    let network = Arc::new(network);
    let processor = Arc::new(processor);
    let reporter = Arc::new(RecordingReporter::default());
    let (ends_tx, ends) = mpsc::unbounded_channel();
    let on_end: OnEnd = Box::new(move |_id, result| {
        let _ = ends_tx.send(result);
    });
    let chain = SyncChain::new(
        1,
        Epoch(0),
        RangeSyncType::Finalized,
        SyncChainFns {
            network: network.clone(),
            processor: processor.clone(),
            reporter: reporter.clone(),
        },
        on_end,
        Arc::new(ChainConfig::default()),
        Arc::new(config),
        Arc::new(ActiveRequests::default()),
    );
    ChainHarness {
        chain,
        network,
        processor,
        reporter,
        ends,
    }
}

pub fn target(network: &MockNetwork, slot: u64) -> ChainTarget {
    ChainTarget {
        slot: Slot(slot),
        root: network.root_at(slot),
    }
}

pub fn status(
    finalized_epoch: u64,
    finalized_root: Bytes32,
    head_slot: u64,
    head_root: Bytes32,
) -> Status {
    Status {
        finalized: containers::Checkpoint {
            epoch: Epoch(finalized_epoch),
            root: finalized_root,
        },
        head_root,
        head_slot: Slot(head_slot),
    }
}

/// Poll until the condition holds, failing the test after five seconds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Await the chain's end callback.
pub async fn expect_end(
    ends: &mut mpsc::UnboundedReceiver<Result<(), ChainError>>,
) -> Result<(), ChainError> {
    tokio::time::timeout(Duration::from_secs(5), ends.recv())
        .await
        .expect("chain did not end in time")
        .expect("end channel closed")
}
