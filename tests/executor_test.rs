//! Unit-level tests for the executor: the VM → cache → hashes+applied pipeline, its error
//! propagation, and the revert helper.

mod common;

use std::sync::Arc;

use mesh_rs::cancel::CancelToken;
use mesh_rs::executor::Executor;
use mesh_rs::hashing::{calc_blocks_hash, genesis_aggregated_hash, OpinionHasher, EMPTY_LAYER_HASH};
use mesh_rs::mesh::MeshError;
use mesh_rs::store::MeshStore;
use mesh_rs::types::basic::{Address, BlockId, LayerId, RatNum, TransactionId};
use mesh_rs::types::block::{AnyReward, Block};
use mesh_rs::types::transaction::Transaction;

use common::fakes::{FakeCache, FakeVm, Trace};
use common::mem_db::MemDB;
use common::GENESIS;

struct TestExecutor {
    executor: Executor<MemDB, FakeVm, FakeCache>,
    store: MeshStore<MemDB>,
    vm: Arc<FakeVm>,
    cache: Arc<FakeCache>,
    trace: Trace,
    ctx: CancelToken,
}

fn setup() -> TestExecutor {
    let kv = MemDB::new();
    let mut store = MeshStore::new(kv.clone());
    store.initialize(GENESIS).unwrap();
    let trace = Trace::new();
    let vm = Arc::new(FakeVm::new(trace.clone()));
    let cache = Arc::new(FakeCache::new(trace.clone()));
    let executor = Executor::new(
        MeshStore::new(kv),
        Arc::clone(&vm),
        Arc::clone(&cache),
    );
    TestExecutor {
        executor,
        store,
        vm,
        cache,
        trace,
        ctx: CancelToken::new(),
    }
}

fn save_block(te: &TestExecutor, layer: LayerId, id_byte: u8, tx_count: usize) -> Block {
    let mut store = te.store.clone();
    let tx_ids: Vec<TransactionId> = (0..tx_count)
        .map(|i| {
            let id = TransactionId::new([id_byte * 16 + i as u8; 32]);
            store
                .add_transaction(&Transaction::new(id, vec![id_byte, i as u8]))
                .unwrap();
            id
        })
        .collect();
    let mut coinbase = [0u8; 24];
    coinbase[0] = id_byte;
    let block = Block::new(
        layer,
        tx_ids,
        vec![AnyReward {
            coinbase: Address::new(coinbase),
            weight: RatNum { num: 1, denom: 4 },
        }],
        7,
    );
    store.add_block(&block).unwrap();
    block
}

#[test]
fn empty_layer_writes_the_empty_records() {
    let te = setup();
    let layer = GENESIS.add(1);

    te.executor.execute_empty(&te.ctx, layer).unwrap();

    assert_eq!(*te.vm.applied.lock().unwrap(), vec![(layer, vec![], vec![])]);
    assert_eq!(te.cache.updated_layers(), vec![(layer, BlockId::EMPTY)]);
    assert_eq!(te.store.applied(layer).unwrap(), Some(BlockId::EMPTY));
    assert_eq!(te.store.last_applied().unwrap(), layer);
    assert_eq!(te.store.layer_hash(layer).unwrap(), EMPTY_LAYER_HASH);

    let mut hasher = OpinionHasher::new();
    hasher.write_previous(&genesis_aggregated_hash());
    hasher.write_abstain();
    assert_eq!(te.store.aggregated_hash(layer).unwrap(), hasher.finish());
}

#[test]
fn block_layer_uses_the_exact_transactions_and_rewards() {
    let te = setup();
    let layer = GENESIS.add(1);
    let block = save_block(&te, layer, 1, 3);

    te.executor.execute_block(&te.ctx, layer, &block).unwrap();

    {
        let applied = te.vm.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].0, layer);
        assert_eq!(applied[0].1, block.tx_ids);
        assert_eq!(applied[0].2, block.rewards);
    }
    assert_eq!(te.cache.updated_layers(), vec![(layer, block.id())]);
    assert_eq!(te.store.applied(layer).unwrap(), Some(block.id()));
    assert_eq!(
        te.store.layer_hash(layer).unwrap(),
        calc_blocks_hash(&[block.id()], None)
    );

    let mut hasher = OpinionHasher::new();
    hasher.write_previous(&genesis_aggregated_hash());
    hasher.write_support(&block.id(), block.tick_height);
    assert_eq!(te.store.aggregated_hash(layer).unwrap(), hasher.finish());
}

#[test]
fn layer_hash_covers_the_settled_valid_set() {
    let te = setup();
    let layer = GENESIS.add(1);
    let block1 = save_block(&te, layer, 1, 1);
    let block2 = save_block(&te, layer, 2, 1);
    let mut store = te.store.clone();
    store.set_valid(&block1.id()).unwrap();
    store.set_valid(&block2.id()).unwrap();

    te.executor.execute_block(&te.ctx, layer, &block1).unwrap();

    assert_eq!(
        te.store.layer_hash(layer).unwrap(),
        calc_blocks_hash(&[block1.id(), block2.id()], None)
    );
}

#[test]
fn missing_transactions_fail_before_the_vm_is_touched() {
    let te = setup();
    let layer = GENESIS.add(1);
    let block = Block::new(layer, vec![TransactionId::new([9u8; 32])], vec![], 0);
    te.store.clone().add_block(&block).unwrap();

    let err = te.executor.execute_block(&te.ctx, layer, &block).unwrap_err();
    assert!(err.is_not_found());
    assert!(te.vm.applied.lock().unwrap().is_empty());
    assert!(te.cache.updates.lock().unwrap().is_empty());
    assert_eq!(te.store.applied(layer).unwrap(), None);
}

#[test]
fn vm_errors_leave_no_records() {
    let te = setup();
    let layer = GENESIS.add(1);
    let block = save_block(&te, layer, 1, 1);

    te.vm.fail_apply(true);
    let err = te.executor.execute_block(&te.ctx, layer, &block).unwrap_err();
    assert!(matches!(err, MeshError::Vm(_)));
    assert!(te.cache.updates.lock().unwrap().is_empty());
    assert_eq!(te.store.applied(layer).unwrap(), None);
    assert!(te.store.layer_hash(layer).unwrap_err().is_not_found());
}

#[test]
fn cache_errors_leave_no_records() {
    let te = setup();
    let layer = GENESIS.add(1);
    let block = save_block(&te, layer, 1, 1);

    te.cache.fail_update(true);
    let err = te.executor.execute_block(&te.ctx, layer, &block).unwrap_err();
    assert!(matches!(err, MeshError::Cache(_)));
    assert_eq!(te.store.applied(layer).unwrap(), None);
    assert!(te.store.aggregated_hash(layer).unwrap_err().is_not_found());
}

#[test]
fn revert_rewinds_vm_then_cache() {
    let te = setup();
    let layer = GENESIS.add(3);

    te.executor.revert(&te.ctx, layer).unwrap();

    assert_eq!(*te.vm.reverts.lock().unwrap(), vec![layer]);
    assert_eq!(*te.cache.reverts.lock().unwrap(), vec![layer]);
    let revert = te.trace.position(&format!("vm.revert {}", layer)).unwrap();
    let cache_revert = te
        .trace
        .position(&format!("cache.revert_cache {}", layer))
        .unwrap();
    let state_root = te.trace.position("vm.get_state_root").unwrap();
    assert!(revert < cache_revert);
    assert!(cache_revert < state_root);
}

#[test]
fn cancellation_short_circuits_execution() {
    let te = setup();
    let layer = GENESIS.add(1);
    let block = save_block(&te, layer, 1, 1);

    te.ctx.cancel();
    assert!(matches!(
        te.executor.execute_block(&te.ctx, layer, &block),
        Err(MeshError::Cancelled)
    ));
    assert!(matches!(
        te.executor.execute_empty(&te.ctx, layer),
        Err(MeshError::Cancelled)
    ));
    assert!(matches!(
        te.executor.revert(&te.ctx, layer),
        Err(MeshError::Cancelled)
    ));
    assert!(te.vm.applied.lock().unwrap().is_empty());
    assert!(te.vm.reverts.lock().unwrap().is_empty());
}
