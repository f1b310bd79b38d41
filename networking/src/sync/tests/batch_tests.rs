use containers::{Epoch, Slot};
use libp2p_identity::PeerId;
use pretty_assertions::assert_eq;

use super::common::canonical_chain;
use crate::sync::batch::hash_of_blocks;
use crate::sync::{Batch, BatchState, ChainError};

#[test]
fn test_request_skips_epoch_boundary_slot() {
    let batch = Batch::new(Epoch(2));
    let request = batch.to_blocks_by_range_request(32, 2);
    assert_eq!(request.start_slot, Slot(65));
    assert_eq!(request.count, 64);
    assert_eq!(request.step, 1);
}

#[test]
fn test_happy_path_transitions() {
    let blocks = canonical_chain(64).split_off(1);
    let peer = PeerId::random();
    let mut batch = Batch::new(Epoch(0));

    batch.start_downloading(peer).unwrap();
    assert!(matches!(batch.state(), BatchState::Downloading { .. }));

    batch.downloading_success(blocks.clone()).unwrap();
    assert!(matches!(batch.state(), BatchState::AwaitingProcessing { .. }));

    let handed = batch.start_processing().unwrap();
    assert_eq!(handed.len(), blocks.len());
    assert!(matches!(batch.state(), BatchState::Processing { .. }));

    batch.processing_success().unwrap();
    assert!(matches!(batch.state(), BatchState::AwaitingValidation { .. }));

    let attempt = batch.validation_success().unwrap();
    assert_eq!(attempt.peer, peer);
    assert_eq!(attempt.hash, hash_of_blocks(&blocks));
}

#[test]
fn test_transition_from_wrong_state_fails() {
    let peer = PeerId::random();

    let mut batch = Batch::new(Epoch(0));
    assert!(matches!(
        batch.downloading_success(Vec::new()),
        Err(ChainError::WrongBatchState { .. })
    ));
    assert!(matches!(
        batch.start_processing(),
        Err(ChainError::WrongBatchState { .. })
    ));

    batch.start_downloading(peer).unwrap();
    assert!(matches!(
        batch.start_downloading(peer),
        Err(ChainError::WrongBatchState { .. })
    ));
    // The failed transition must not corrupt the state.
    assert!(matches!(batch.state(), BatchState::Downloading { .. }));
}

#[test]
fn test_download_attempts_capped() {
    let max = 5;
    let mut batch = Batch::new(Epoch(0));
    for attempt in 1..=max {
        batch.start_downloading(PeerId::random()).unwrap();
        let result = batch.downloading_error(max);
        if attempt < max {
            assert!(result.is_ok(), "attempt {attempt} should be tolerated");
        } else {
            assert!(matches!(
                result,
                Err(ChainError::MaxDownloadAttempts { limit, .. }) if limit == max
            ));
        }
    }
    assert_eq!(batch.failed_peers().len(), max);
}

#[test]
fn test_processing_and_validation_errors_share_the_cap() {
    let blocks = canonical_chain(32).split_off(1);
    let peer = PeerId::random();
    let mut batch = Batch::new(Epoch(0));

    // First attempt fails in processing.
    batch.start_downloading(peer).unwrap();
    batch.downloading_success(blocks.clone()).unwrap();
    batch.start_processing().unwrap();
    batch.processing_error(3).unwrap();

    // Second attempt survives processing but is invalidated later.
    batch.start_downloading(peer).unwrap();
    batch.downloading_success(blocks.clone()).unwrap();
    batch.start_processing().unwrap();
    batch.processing_success().unwrap();
    batch.validation_error(3).unwrap();

    // Third failed attempt exhausts the budget.
    batch.start_downloading(peer).unwrap();
    batch.downloading_success(blocks).unwrap();
    batch.start_processing().unwrap();
    assert!(matches!(
        batch.processing_error(3),
        Err(ChainError::MaxProcessingAttempts { limit: 3, .. })
    ));
}

#[test]
fn test_attempt_hash_is_stable_across_peers() {
    let blocks = canonical_chain(64).split_off(1);
    let mut first = Batch::new(Epoch(0));
    first.start_downloading(PeerId::random()).unwrap();
    first.downloading_success(blocks.clone()).unwrap();
    first.start_processing().unwrap();
    first.processing_success().unwrap();

    let mut second = Batch::new(Epoch(0));
    second.start_downloading(PeerId::random()).unwrap();
    second.downloading_success(blocks).unwrap();
    second.start_processing().unwrap();
    second.processing_success().unwrap();

    let first = first.validation_success().unwrap();
    let second = second.validation_success().unwrap();
    assert_eq!(first.hash, second.hash);
    assert_ne!(first.peer, second.peer);
}

#[test]
fn test_attempt_hash_depends_on_blocks() {
    let blocks = canonical_chain(64).split_off(1);
    let shorter = blocks[..10].to_vec();
    assert_ne!(hash_of_blocks(&blocks), hash_of_blocks(&shorter));
    assert_ne!(hash_of_blocks(&blocks), hash_of_blocks(&[]));
}

#[test]
fn test_failed_peers_unions_both_attempt_kinds() {
    let blocks = canonical_chain(32).split_off(1);
    let download_peer = PeerId::random();
    let processing_peer = PeerId::random();
    let mut batch = Batch::new(Epoch(0));

    batch.start_downloading(download_peer).unwrap();
    batch.downloading_error(5).unwrap();

    batch.start_downloading(processing_peer).unwrap();
    batch.downloading_success(blocks).unwrap();
    batch.start_processing().unwrap();
    batch.processing_error(3).unwrap();

    let failed = batch.failed_peers();
    assert!(failed.contains(&download_peer));
    assert!(failed.contains(&processing_peer));
    assert_eq!(failed.len(), 2);
}
