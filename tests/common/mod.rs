#![allow(dead_code)]

pub(crate) mod fakes;

pub(crate) mod logging;

pub(crate) mod mem_db;

use std::sync::Arc;

use ed25519_dalek::{Signer, SigningKey};
use log::LevelFilter;
use rand::rngs::OsRng;

use mesh_rs::cancel::CancelToken;
use mesh_rs::config::MeshConfiguration;
use mesh_rs::executor::Executor;
use mesh_rs::mesh::Mesh;
use mesh_rs::ports::BlockValidityUpdate;
use mesh_rs::store::MeshStore;
use mesh_rs::types::ballot::{Ballot, Votes};
use mesh_rs::types::basic::{
    ActivationId, Address, BallotId, LayerId, NodeId, RatNum, TransactionId,
};
use mesh_rs::types::block::{sort_blocks, AnyReward, Block};
use mesh_rs::types::transaction::Transaction;

use self::fakes::{FakeCache, FakeTortoise, FakeVm, Trace};
use self::mem_db::MemDB;

/// The effective-genesis layer used throughout the tests.
pub(crate) const GENESIS: LayerId = LayerId::new(4);

pub(crate) const NUM_BLOCKS: usize = 5;
pub(crate) const NUM_TXS: usize = 20;

/// A mesh wired to an in-memory store and recording fakes.
pub(crate) struct TestMesh {
    pub(crate) mesh: Mesh<MemDB, FakeTortoise, FakeVm, FakeCache>,
    pub(crate) store: MeshStore<MemDB>,
    pub(crate) kv: MemDB,
    pub(crate) tortoise: Arc<FakeTortoise>,
    pub(crate) vm: Arc<FakeVm>,
    pub(crate) cache: Arc<FakeCache>,
    pub(crate) trace: Trace,
    pub(crate) ctx: CancelToken,
}

impl TestMesh {
    pub(crate) fn new() -> TestMesh {
        TestMesh::over(MemDB::new())
    }

    /// Wire a mesh (with fresh fakes) over an existing store, as a node restart would.
    pub(crate) fn over(kv: MemDB) -> TestMesh {
        logging::setup_logger(LevelFilter::Warn);
        let trace = Trace::new();
        let tortoise = Arc::new(FakeTortoise::new(trace.clone()));
        let vm = Arc::new(FakeVm::new(trace.clone()));
        let cache = Arc::new(FakeCache::new(trace.clone()));
        let executor = Executor::new(
            MeshStore::new(kv.clone()),
            Arc::clone(&vm),
            Arc::clone(&cache),
        );
        let mesh = Mesh::new(
            MeshStore::new(kv.clone()),
            Arc::clone(&tortoise),
            executor,
            Arc::clone(&cache),
            MeshConfiguration::new(GENESIS),
            None,
        )
        .expect("mesh construction failed");
        TestMesh {
            mesh,
            store: MeshStore::new(kv.clone()),
            kv,
            tortoise,
            vm,
            cache,
            trace,
            ctx: CancelToken::new(),
        }
    }

    /// Store `count` random transactions and return their ids.
    pub(crate) fn save_txs(&self, count: usize) -> Vec<TransactionId> {
        let mut store = self.store.clone();
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = TransactionId::new(rand::random());
            store
                .add_transaction(&Transaction::new(id, rand::random::<[u8; 16]>().to_vec()))
                .unwrap();
            ids.push(id);
        }
        ids
    }

    /// Build a block for the layer with freshly stored transactions and a reward credited to a
    /// coinbase derived from `node`, and persist it in the store.
    pub(crate) fn create_block(&self, layer: LayerId, node: u8) -> Block {
        let tx_ids = self.save_txs(NUM_TXS);
        let mut coinbase = [0u8; 24];
        coinbase[0] = node;
        let block = Block::new(
            layer,
            tx_ids,
            vec![AnyReward {
                coinbase: Address::new(coinbase),
                weight: RatNum {
                    num: node as u64 + 1,
                    denom: 100,
                },
            }],
            0,
        );
        self.store.clone().add_block(&block).unwrap();
        block
    }

    pub(crate) fn create_layer_blocks(&self, layer: LayerId) -> Vec<Block> {
        (0..NUM_BLOCKS)
            .map(|node| self.create_block(layer, node as u8))
            .collect()
    }

    /// The block the hare would pick in these tests: the validity-order winner.
    pub(crate) fn first_in_order(blocks: &[Block]) -> Block {
        sort_blocks(blocks.to_vec()).remove(0)
    }

    pub(crate) fn set_validity(&self, block: &Block, validity: bool) {
        self.store
            .clone()
            .set_validity(&block.id(), validity)
            .unwrap();
    }

    pub(crate) fn check_processed_in_db(&self, expected: LayerId) {
        assert_eq!(self.store.processed().unwrap(), expected);
    }

    pub(crate) fn check_last_applied_in_db(&self, expected: LayerId) {
        assert_eq!(self.store.last_applied().unwrap(), expected);
    }
}

/// Validity updates marking `valid` blocks valid and `invalid` blocks invalid at `layer`.
pub(crate) fn validity_updates(
    layer: LayerId,
    valid: &[Block],
    invalid: &[Block],
) -> Vec<BlockValidityUpdate> {
    let mut updates = Vec::new();
    for block in valid {
        updates.push(BlockValidityUpdate {
            block: block.id(),
            layer,
            validity: true,
        });
    }
    for block in invalid {
        updates.push(BlockValidityUpdate {
            block: block.id(),
            layer,
            validity: false,
        });
    }
    updates
}

/// A ballot with a real Ed25519 signature from a fresh signer.
pub(crate) fn signed_ballot(layer: LayerId) -> Ballot {
    let key = SigningKey::generate(&mut OsRng);
    let node = NodeId::new(key.verifying_key().to_bytes());
    let unsigned = Ballot::new(
        [0u8; 64],
        node,
        layer,
        ActivationId::new(rand::random()),
        Votes::default(),
    );
    let signature = key.sign(&unsigned.signed_bytes());
    Ballot::new(
        signature.to_bytes(),
        node,
        layer,
        unsigned.activation,
        Votes::default(),
    )
}

/// A ballot with a fixed id and node, for exercising identity bookkeeping.
pub(crate) fn existing_ballot(id: u8, node: NodeId, layer: LayerId) -> Ballot {
    Ballot::from_parts(
        BallotId::new([id; 32]),
        [0u8; 64],
        node,
        layer,
        ActivationId::new([0u8; 32]),
        Votes::default(),
    )
}
