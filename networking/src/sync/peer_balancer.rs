//! Peer selection for batch downloads.
//!
//! Stateless helpers over a chain's peer set and batch map: find peers
//! with spare capacity and spread work evenly across them.

use std::collections::{BTreeMap, HashMap, HashSet};

use containers::Epoch;
use libp2p_identity::PeerId;
use parking_lot::Mutex;
use rand::seq::SliceRandom;

use super::batch::{Batch, BatchState};

/// Active `blocks_by_range` requests per peer across every chain.
///
/// Owned by the range sync manager and shared with its chains, so that a
/// peer serving several chains at once still gets picked last.
#[derive(Debug, Default)]
pub struct ActiveRequests {
    counts: Mutex<HashMap<PeerId, usize>>,
}

impl ActiveRequests {
    pub fn increment(&self, peer: &PeerId) {
        *self.counts.lock().entry(*peer).or_default() += 1;
    }

    pub fn decrement(&self, peer: &PeerId) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(peer) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(peer);
            }
        }
    }

    pub fn snapshot(&self) -> HashMap<PeerId, usize> {
        self.counts.lock().clone()
    }
}

/// Number of batches each peer is currently downloading for this chain.
pub fn active_download_counts(batches: &BTreeMap<Epoch, Batch>) -> HashMap<PeerId, usize> {
    let mut counts: HashMap<PeerId, usize> = HashMap::new();
    for batch in batches.values() {
        if let BatchState::Downloading { peer } = batch.state() {
            *counts.entry(*peer).or_default() += 1;
        }
    }
    counts
}

/// Peers with no download in flight for this chain, shuffled so that
/// simultaneous new batches spread across the peer set.
pub fn idle_peers<'a>(
    peers: impl Iterator<Item = &'a PeerId>,
    batches: &BTreeMap<Epoch, Batch>,
) -> Vec<PeerId> {
    let active = active_download_counts(batches);
    let mut idle: Vec<PeerId> = peers.filter(|peer| !active.contains_key(peer)).copied().collect();
    idle.shuffle(&mut rand::thread_rng());
    idle
}

/// The best peer to retry a batch with.
///
/// Peers that already failed the batch rank last but remain eligible, so a
/// batch with no fresh peers left still retries somewhere. Within each
/// group the least loaded peer wins: fewest downloads for this chain, then
/// fewest requests across all chains, then smallest peer id.
pub fn best_peer_to_retry<'a>(
    peers: impl Iterator<Item = &'a PeerId>,
    batches: &BTreeMap<Epoch, Batch>,
    failed: &HashSet<PeerId>,
    global_active: &HashMap<PeerId, usize>,
) -> Option<PeerId> {
    let chain_active = active_download_counts(batches);
    peers
        .min_by_key(|peer| {
            (
                failed.contains(peer),
                chain_active.get(peer).copied().unwrap_or(0),
                global_active.get(peer).copied().unwrap_or(0),
                peer.to_bytes(),
            )
        })
        .copied()
}
