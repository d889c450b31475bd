//! Tests for the store facade: genesis seeding, write-once records, the not-found condition,
//! index maintenance, and the applied-record rewind.

mod common;

use mesh_rs::hashing::{genesis_aggregated_hash, EMPTY_LAYER_HASH};
use mesh_rs::store::{MeshStore, StoreError};
use mesh_rs::types::basic::{BallotId, BlockId, Hash32, LayerId, NodeId, TransactionId};
use mesh_rs::types::block::Block;
use mesh_rs::types::transaction::Transaction;

use common::mem_db::MemDB;
use common::{existing_ballot, GENESIS};

fn setup() -> MeshStore<MemDB> {
    let mut store = MeshStore::new(MemDB::new());
    store.initialize(GENESIS).unwrap();
    store
}

#[test]
fn initialize_seeds_the_genesis_records() {
    let store = setup();
    assert_eq!(store.processed().unwrap(), GENESIS);
    assert_eq!(store.last_applied().unwrap(), GENESIS);
    assert_eq!(store.layer_hash(GENESIS).unwrap(), EMPTY_LAYER_HASH);
    assert_eq!(
        store.aggregated_hash(GENESIS).unwrap(),
        genesis_aggregated_hash()
    );
}

#[test]
fn initialize_is_idempotent() {
    let mut store = setup();
    store.set_processed(GENESIS.add(3)).unwrap();
    store.initialize(GENESIS).unwrap();
    assert_eq!(store.processed().unwrap(), GENESIS.add(3));
}

#[test]
fn hare_output_is_write_once() {
    let mut store = setup();
    let layer = GENESIS.add(1);
    let first = BlockId::new([1u8; 32]);

    assert!(store.hare_output(layer).unwrap_err().is_not_found());
    store.set_hare_output(layer, first).unwrap();
    // the same value is accepted again
    store.set_hare_output(layer, first).unwrap();
    // a different value is rejected
    let err = store
        .set_hare_output(layer, BlockId::new([2u8; 32]))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::AlreadySet { existing, .. } if existing == first
    ));
    assert_eq!(store.hare_output(layer).unwrap(), first);
}

#[test]
fn ballots_fold_in_the_malicious_flag() {
    let mut store = setup();
    let layer = GENESIS.add(1);
    let node = NodeId::new([3u8; 32]);
    let ballot = existing_ballot(1, node, layer);

    store.add_ballot(&ballot).unwrap();
    assert!(!store.ballot(&ballot.id()).unwrap().unwrap().is_malicious());
    assert_eq!(
        store.first_ballot_by_identity(&node, layer).unwrap(),
        Some(ballot.id())
    );
    assert_eq!(store.latest_ballot_layer().unwrap(), Some(layer));

    store.set_malicious(&ballot.id()).unwrap();
    assert!(store.ballot(&ballot.id()).unwrap().unwrap().is_malicious());
    // set-once: marking again changes nothing
    store.set_malicious(&ballot.id()).unwrap();
    assert!(store.ballot(&ballot.id()).unwrap().unwrap().is_malicious());

    assert!(store.ballot(&BallotId::new([9u8; 32])).unwrap().is_none());
}

#[test]
fn layer_indices_cover_ballots_and_blocks() {
    let mut store = setup();
    let layer = GENESIS.add(2);

    let ballot_a = existing_ballot(1, NodeId::new([1u8; 32]), layer);
    let ballot_b = existing_ballot(2, NodeId::new([2u8; 32]), layer);
    store.add_ballot(&ballot_a).unwrap();
    store.add_ballot(&ballot_b).unwrap();
    // re-adding does not duplicate the index entry
    store.add_ballot(&ballot_a).unwrap();

    let block = Block::new(layer, vec![], vec![], 0);
    store.add_block(&block).unwrap();
    store.add_block(&block).unwrap();

    let got = store.get_layer(layer).unwrap();
    assert_eq!(got.index(), layer);
    assert_eq!(got.ballots().len(), 2);
    assert_eq!(got.blocks().len(), 1);
    assert_eq!(store.layer_block_ids(layer).unwrap(), vec![block.id()]);

    // other layers stay empty
    assert!(store.layer_block_ids(layer.add(1)).unwrap().is_empty());
    assert!(store.layer_ballots(layer.add(1)).unwrap().is_empty());
}

#[test]
fn contextual_validity_filters_the_layer() {
    let mut store = setup();
    let layer = GENESIS.add(1);
    let valid = Block::new(layer, vec![TransactionId::new([1u8; 32])], vec![], 0);
    let invalid = Block::new(layer, vec![TransactionId::new([2u8; 32])], vec![], 0);
    let unset = Block::new(layer, vec![TransactionId::new([3u8; 32])], vec![], 0);
    for block in [&valid, &invalid, &unset] {
        store.add_block(block).unwrap();
    }

    store.set_valid(&valid.id()).unwrap();
    store.set_invalid(&invalid.id()).unwrap();

    assert_eq!(store.contextual_validity(&valid.id()).unwrap(), Some(true));
    assert_eq!(
        store.contextual_validity(&invalid.id()).unwrap(),
        Some(false)
    );
    assert_eq!(store.contextual_validity(&unset.id()).unwrap(), None);
    assert_eq!(store.layer_valid_block_ids(layer).unwrap(), vec![valid.id()]);
}

#[test]
fn missing_transactions_are_not_found() {
    let mut store = setup();
    let present = TransactionId::new([1u8; 32]);
    let absent = TransactionId::new([2u8; 32]);
    store
        .add_transaction(&Transaction::new(present, vec![1, 2, 3]))
        .unwrap();

    assert_eq!(store.transactions(&[present]).unwrap().len(), 1);
    let err = store.transactions(&[present, absent]).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn revert_applied_above_rewinds_records_and_watermark() {
    let mut store = setup();
    let hash = |byte: u8| Hash32::new([byte; 32]);
    for i in 1..=3u32 {
        store
            .apply_layer(
                GENESIS.add(i),
                BlockId::new([i as u8; 32]),
                hash(i as u8),
                hash(i as u8 + 10),
            )
            .unwrap();
    }
    assert_eq!(store.last_applied().unwrap(), GENESIS.add(3));

    store.revert_applied_above(GENESIS.add(1)).unwrap();

    assert_eq!(store.last_applied().unwrap(), GENESIS.add(1));
    // records at and below the target survive
    assert_eq!(
        store.applied(GENESIS.add(1)).unwrap(),
        Some(BlockId::new([1u8; 32]))
    );
    assert_eq!(store.layer_hash(GENESIS.add(1)).unwrap(), hash(1));
    // records above are gone
    for i in 2..=3u32 {
        assert_eq!(store.applied(GENESIS.add(i)).unwrap(), None);
        assert!(store.layer_hash(GENESIS.add(i)).unwrap_err().is_not_found());
        assert!(store
            .aggregated_hash(GENESIS.add(i))
            .unwrap_err()
            .is_not_found());
    }
}

#[test]
fn processed_layer_round_trips() {
    let mut store = setup();
    let layer = LayerId::new(42);
    store.set_processed(layer).unwrap();
    assert_eq!(store.processed().unwrap(), layer);
}
