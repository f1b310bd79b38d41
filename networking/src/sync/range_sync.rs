use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use containers::{Bytes32, ChainConfig, Slot, Status};
use libp2p_identity::PeerId;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::chain::{ChainId, ChainStatus, ChainTarget, OnEnd, SyncChain, SyncChainFns};
use super::config::SyncConfig;
use super::error::ChainError;
use super::peer_balancer::ActiveRequests;
use super::sync_type::RangeSyncType;
use super::SyncTypes;

/// Clock access, used only to discard peers advertising targets too far in
/// the future. Not part of the sync state machine.
pub trait SlotClock: Send + Sync + 'static {
    fn current_slot(&self) -> Slot;
}

/// Identity of a sync chain within the manager: peers are routed to the
/// chain matching their sync type and claimed target root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ChainKey {
    sync_type: RangeSyncType,
    target_root: Bytes32,
}

/// Notification that a chain reached a terminal status.
#[derive(Debug)]
pub struct ChainEnd {
    pub id: ChainId,
    pub result: Result<(), ChainError>,
}

/// The range sync manager.
///
/// Receives peer status events, classifies each peer into finalized or
/// head sync, routes it to a matching chain (creating one if needed), and
/// keeps a bounded set of chains actively syncing: at most one finalized
/// chain, or up to `parallel_head_chains` head chains when no finalized
/// chain is in flight.
///
/// Never fails outward: chain errors are logged, the chain is removed, and
/// selection re-runs over what is left.
pub struct RangeSync<T: SyncTypes> {
    chain_config: Arc<ChainConfig>,
    config: Arc<SyncConfig>,
    fns: SyncChainFns<T>,
    lookup: Arc<T::Lookup>,
    clock: Arc<T::Clock>,
    active_requests: Arc<ActiveRequests>,
    chains: HashMap<ChainKey, SyncChain<T>>,
    /// Latest local status seen, refreshed on every peer event.
    local: Status,
    next_chain_id: ChainId,
    ends_tx: mpsc::UnboundedSender<ChainEnd>,
    ends_rx: mpsc::UnboundedReceiver<ChainEnd>,
}

struct Candidate {
    key: ChainKey,
    peers: usize,
    syncing: bool,
    validated: u64,
}

impl<T: SyncTypes> RangeSync<T> {
    pub fn new(
        chain_config: ChainConfig,
        config: SyncConfig,
        fns: SyncChainFns<T>,
        lookup: Arc<T::Lookup>,
        clock: Arc<T::Clock>,
    ) -> Self {
        assert!(config.epochs_per_batch >= 1, "epochs_per_batch must be at least 1");
        let (ends_tx, ends_rx) = mpsc::unbounded_channel();
        Self {
            chain_config: Arc::new(chain_config),
            config: Arc::new(config),
            fns,
            lookup,
            clock,
            active_requests: Arc::new(ActiveRequests::default()),
            chains: HashMap::new(),
            local: Status::default(),
            next_chain_id: 0,
            ends_tx,
            ends_rx,
        }
    }

    pub fn chains(&self) -> impl Iterator<Item = &SyncChain<T>> {
        self.chains.values()
    }

    /// A peer's status arrived. Classify it, route it to a chain, and
    /// re-run chain selection.
    pub fn add_peer(&mut self, peer_id: PeerId, local: Status, remote: Status) {
        self.drain_ended();
        self.local = local;

        let Some(sync_type) = RangeSyncType::classify(self.lookup.as_ref(), &local, &remote)
        else {
            debug!(peer = %peer_id, "Peer not relevant for range sync");
            return;
        };

        let slots_per_epoch = self.chain_config.slots_per_epoch;
        let target = match sync_type {
            RangeSyncType::Finalized => ChainTarget {
                slot: remote.finalized.epoch.start_slot(slots_per_epoch),
                root: remote.finalized.root,
            },
            RangeSyncType::Head => ChainTarget {
                slot: remote.head_slot,
                root: remote.head_root,
            },
        };

        // A target further ahead than a batch past the wall clock cannot
        // be canonical; drop the peer rather than chase it.
        let horizon = self
            .clock
            .current_slot()
            .saturating_add(self.config.epochs_per_batch * slots_per_epoch);
        if target.slot > horizon {
            debug!(
                peer = %peer_id,
                target_slot = %target.slot,
                current_slot = %self.clock.current_slot(),
                "Ignoring peer with target beyond the slot horizon"
            );
            return;
        }

        let start_epoch = match sync_type {
            RangeSyncType::Finalized => local.finalized.epoch,
            RangeSyncType::Head => local.head_slot.epoch(slots_per_epoch),
        };

        let key = ChainKey {
            sync_type,
            target_root: target.root,
        };
        if !self.chains.contains_key(&key) {
            let id = self.next_chain_id;
            self.next_chain_id += 1;
            let ends = self.ends_tx.clone();
            let on_end: OnEnd = Box::new(move |id, result| {
                let _ = ends.send(ChainEnd { id, result });
            });
            info!(
                chain = id,
                sync_type = sync_type.as_str(),
                target_slot = %target.slot,
                target_root = %target.root,
                start_epoch = %start_epoch,
                "New sync chain"
            );
            self.chains.insert(
                key,
                SyncChain::new(
                    id,
                    start_epoch,
                    sync_type,
                    self.fns.clone(),
                    on_end,
                    self.chain_config.clone(),
                    self.config.clone(),
                    self.active_requests.clone(),
                ),
            );
        }
        if let Some(chain) = self.chains.get(&key) {
            chain.add_peer(peer_id, target);
            debug!(
                peer = %peer_id,
                chain = chain.id(),
                sync_type = sync_type.as_str(),
                "Added peer to sync chain"
            );
        }

        self.update_chain_selection();
    }

    /// A peer disconnected. Remove it everywhere; chains left without
    /// peers are aborted and dropped.
    pub fn remove_peer(&mut self, peer_id: &PeerId) {
        self.drain_ended();
        let mut emptied = Vec::new();
        for (key, chain) in &self.chains {
            if chain.remove_peer(peer_id) && chain.peer_count() == 0 {
                emptied.push(*key);
            }
        }
        for key in emptied {
            if let Some(chain) = self.chains.remove(&key) {
                info!(chain = chain.id(), "Removing sync chain without peers");
                chain.remove();
            }
        }
        self.update_chain_selection();
    }

    /// Wait for the next chain to end, remove it, and re-run selection.
    pub async fn wait_for_chain_end(&mut self) -> Option<ChainEnd> {
        let end = self.ends_rx.recv().await?;
        self.finalize_chain(&end);
        self.update_chain_selection();
        Some(end)
    }

    fn drain_ended(&mut self) {
        while let Ok(end) = self.ends_rx.try_recv() {
            self.finalize_chain(&end);
        }
    }

    fn finalize_chain(&mut self, end: &ChainEnd) {
        let Some(key) = self
            .chains
            .iter()
            .find(|(_, chain)| chain.id() == end.id)
            .map(|(key, _)| *key)
        else {
            return;
        };
        match &end.result {
            Ok(()) => info!(chain = end.id, "Sync chain completed"),
            Err(err) => warn!(chain = end.id, error = %err, "Sync chain failed"),
        }
        self.chains.remove(&key);
    }

    /// Decide which chains run.
    ///
    /// Finalized chains take absolute priority and only one syncs at a
    /// time; switching away from a syncing finalized chain requires the
    /// challenger to have strictly more peers and the incumbent to have
    /// already validated enough epochs to not thrash. Head chains fill in
    /// only when no finalized chain is syncing, best peer counts first, up
    /// to `parallel_head_chains`.
    fn update_chain_selection(&mut self) {
        let mut finalized: Vec<Candidate> = Vec::new();
        let mut head: Vec<Candidate> = Vec::new();
        for (key, chain) in &self.chains {
            let status = chain.status();
            if matches!(status, ChainStatus::Synced | ChainStatus::Error) {
                continue;
            }
            let candidate = Candidate {
                key: *key,
                peers: chain.peer_count(),
                syncing: status == ChainStatus::Syncing,
                validated: chain.validated_epochs(),
            };
            match key.sync_type {
                RangeSyncType::Finalized => finalized.push(candidate),
                RangeSyncType::Head => head.push(candidate),
            }
        }
        finalized.sort_by_key(|c| (Reverse(c.peers), Reverse(c.syncing)));
        head.sort_by_key(|c| (Reverse(c.peers), Reverse(c.syncing)));

        let mut to_start: Vec<ChainKey> = Vec::new();
        let mut to_stop: Vec<ChainKey> = Vec::new();

        let mut finalized_syncing = false;
        if let Some(best) = finalized.first() {
            let current = finalized.iter().find(|c| c.syncing);
            let selected = match current {
                None => best.key,
                Some(current) if current.key == best.key => best.key,
                Some(current) => {
                    if best.peers > current.peers
                        && current.validated > self.config.min_finalized_chain_validated_epochs
                    {
                        best.key
                    } else {
                        // Keep the incumbent; switching now would throw
                        // away too little progress for too little gain.
                        current.key
                    }
                }
            };
            finalized_syncing = true;
            for candidate in &finalized {
                if candidate.key == selected {
                    if !candidate.syncing {
                        to_start.push(candidate.key);
                    }
                } else if candidate.syncing {
                    to_stop.push(candidate.key);
                }
            }
        }

        if finalized_syncing {
            for candidate in &head {
                if candidate.syncing {
                    to_stop.push(candidate.key);
                }
            }
        } else {
            for (rank, candidate) in head.iter().enumerate() {
                if rank < self.config.parallel_head_chains {
                    if !candidate.syncing {
                        to_start.push(candidate.key);
                    }
                } else if candidate.syncing {
                    to_stop.push(candidate.key);
                }
            }
        }

        for key in to_stop {
            if let Some(chain) = self.chains.get(&key) {
                debug!(chain = chain.id(), "Deselecting sync chain");
                chain.stop_syncing();
            }
        }
        for key in to_start {
            if let Some(chain) = self.chains.get(&key) {
                debug!(chain = chain.id(), "Selecting sync chain");
                if let Err(err) = chain.start_syncing(self.local.finalized.epoch) {
                    warn!(chain = chain.id(), error = %err, "Failed to start sync chain");
                }
            }
        }
    }
}
