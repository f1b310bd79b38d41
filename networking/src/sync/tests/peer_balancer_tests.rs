use std::collections::{BTreeMap, HashMap, HashSet};

use containers::Epoch;
use libp2p_identity::PeerId;
use pretty_assertions::assert_eq;

use crate::sync::peer_balancer::{
    active_download_counts, best_peer_to_retry, idle_peers, ActiveRequests,
};
use crate::sync::Batch;

fn downloading_batch(epoch: u64, peer: PeerId) -> (Epoch, Batch) {
    let mut batch = Batch::new(Epoch(epoch));
    batch.start_downloading(peer).unwrap();
    (Epoch(epoch), batch)
}

#[test]
fn test_active_download_counts() {
    let busy = PeerId::random();
    let batches: BTreeMap<Epoch, Batch> = [
        downloading_batch(0, busy),
        downloading_batch(2, busy),
        (Epoch(4), Batch::new(Epoch(4))),
    ]
    .into_iter()
    .collect();

    let counts = active_download_counts(&batches);
    assert_eq!(counts.get(&busy), Some(&2));
    assert_eq!(counts.len(), 1);
}

#[test]
fn test_idle_peers_excludes_busy_ones() {
    let busy = PeerId::random();
    let idle = PeerId::random();
    let peers = [busy, idle];
    let batches: BTreeMap<Epoch, Batch> = [downloading_batch(0, busy)].into_iter().collect();

    let selected = idle_peers(peers.iter(), &batches);
    assert_eq!(selected, vec![idle]);
}

#[test]
fn test_best_retry_peer_prefers_unfailed() {
    let failed = PeerId::random();
    let fresh = PeerId::random();
    let peers = [failed, fresh];
    let batches = BTreeMap::new();

    let selected = best_peer_to_retry(
        peers.iter(),
        &batches,
        &HashSet::from([failed]),
        &HashMap::new(),
    );
    assert_eq!(selected, Some(fresh));
}

#[test]
fn test_best_retry_peer_falls_back_to_failed() {
    let failed = PeerId::random();
    let peers = [failed];
    let batches = BTreeMap::new();

    let selected = best_peer_to_retry(
        peers.iter(),
        &batches,
        &HashSet::from([failed]),
        &HashMap::new(),
    );
    assert_eq!(selected, Some(failed));
}

#[test]
fn test_best_retry_peer_prefers_chain_idle() {
    let busy = PeerId::random();
    let idle = PeerId::random();
    let peers = [busy, idle];
    let batches: BTreeMap<Epoch, Batch> = [downloading_batch(0, busy)].into_iter().collect();

    let selected = best_peer_to_retry(peers.iter(), &batches, &HashSet::new(), &HashMap::new());
    assert_eq!(selected, Some(idle));
}

#[test]
fn test_best_retry_peer_breaks_ties_on_global_load() {
    let loaded = PeerId::random();
    let spare = PeerId::random();
    let peers = [loaded, spare];
    let batches = BTreeMap::new();
    let global = HashMap::from([(loaded, 3usize)]);

    let selected = best_peer_to_retry(peers.iter(), &batches, &HashSet::new(), &global);
    assert_eq!(selected, Some(spare));
}

#[test]
fn test_active_requests_counter() {
    let tracker = ActiveRequests::default();
    let peer = PeerId::random();

    tracker.increment(&peer);
    tracker.increment(&peer);
    assert_eq!(tracker.snapshot().get(&peer), Some(&2));

    tracker.decrement(&peer);
    tracker.decrement(&peer);
    assert!(tracker.snapshot().is_empty());
}
