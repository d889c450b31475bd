//! Recording fakes for the mesh's collaborator ports.
//!
//! Each fake appends its calls to a shared [`Trace`], so tests can assert cross-collaborator
//! ordering (e.g. VM revert before cache revert), and records typed call arguments for
//! content assertions. The tortoise fake replays scripted `updates()` results in order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mesh_rs::cancel::CancelToken;
use mesh_rs::ports::{
    AppliedTxs, BlockValidityUpdate, CacheError, Tortoise, TxCache, VmError, VmState,
};
use mesh_rs::types::basic::{BlockId, Hash32, LayerId, ProposalId, StateRoot, TransactionId};
use mesh_rs::types::block::{AnyReward, Block};
use mesh_rs::types::transaction::Transaction;

/// Shared, ordered record of collaborator calls.
#[derive(Clone, Default)]
pub(crate) struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub(crate) fn new() -> Trace {
        Trace::default()
    }

    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// The position of the first entry equal to `wanted`, if any.
    pub(crate) fn position(&self, wanted: &str) -> Option<usize> {
        self.entries()
            .iter()
            .position(|entry| entry.as_str() == wanted)
    }
}

pub(crate) struct FakeTortoise {
    trace: Trace,
    scripted_updates: Mutex<VecDeque<(LayerId, Vec<BlockValidityUpdate>)>>,
}

impl FakeTortoise {
    pub(crate) fn new(trace: Trace) -> FakeTortoise {
        FakeTortoise {
            trace,
            scripted_updates: Mutex::new(VecDeque::new()),
        }
    }

    /// Script the result of the next unconsumed `updates()` call.
    pub(crate) fn expect_updates(&self, verified: LayerId, updates: Vec<BlockValidityUpdate>) {
        self.scripted_updates
            .lock()
            .unwrap()
            .push_back((verified, updates));
    }
}

impl Tortoise for FakeTortoise {
    fn on_block(&self, block: &Block) {
        self.trace.push(format!("tortoise.on_block {}", block.id()));
    }

    fn on_hare_output(&self, layer: LayerId, block: BlockId) {
        self.trace
            .push(format!("tortoise.on_hare_output {} {}", layer, block));
    }

    fn tally_votes(&self, _ctx: &CancelToken, layer: LayerId) {
        self.trace.push(format!("tortoise.tally_votes {}", layer));
    }

    fn updates(&self) -> (LayerId, Vec<BlockValidityUpdate>) {
        self.trace.push("tortoise.updates".to_string());
        self.scripted_updates
            .lock()
            .unwrap()
            .pop_front()
            .expect("updates() called without a scripted result")
    }
}

pub(crate) struct FakeVm {
    trace: Trace,
    pub(crate) applied: Mutex<Vec<(LayerId, Vec<TransactionId>, Vec<AnyReward>)>>,
    pub(crate) reverts: Mutex<Vec<LayerId>>,
    fail_apply: AtomicBool,
}

impl FakeVm {
    pub(crate) fn new(trace: Trace) -> FakeVm {
        FakeVm {
            trace,
            applied: Mutex::new(Vec::new()),
            reverts: Mutex::new(Vec::new()),
            fail_apply: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_apply(&self, fail: bool) {
        self.fail_apply.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn applied_layers(&self) -> Vec<LayerId> {
        self.applied
            .lock()
            .unwrap()
            .iter()
            .map(|(layer, _, _)| *layer)
            .collect()
    }
}

impl VmState for FakeVm {
    fn apply(
        &self,
        layer: LayerId,
        transactions: &[Transaction],
        rewards: &[AnyReward],
    ) -> Result<AppliedTxs, VmError> {
        self.trace.push(format!("vm.apply {}", layer));
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(VmError::Apply {
                layer,
                reason: "scripted failure".to_string(),
            });
        }
        self.applied.lock().unwrap().push((
            layer,
            transactions.iter().map(|tx| tx.id).collect(),
            rewards.to_vec(),
        ));
        Ok(AppliedTxs::default())
    }

    fn revert(&self, layer: LayerId) -> Result<StateRoot, VmError> {
        self.trace.push(format!("vm.revert {}", layer));
        self.reverts.lock().unwrap().push(layer);
        Ok(StateRoot::new(Hash32::new([0u8; 32])))
    }

    fn get_state_root(&self) -> Result<StateRoot, VmError> {
        self.trace.push("vm.get_state_root".to_string());
        Ok(StateRoot::new(Hash32::new([0u8; 32])))
    }
}

pub(crate) struct FakeCache {
    trace: Trace,
    pub(crate) updates: Mutex<Vec<(LayerId, BlockId, Vec<TransactionId>, Vec<TransactionId>)>>,
    pub(crate) reverts: Mutex<Vec<LayerId>>,
    pub(crate) linked_blocks: Mutex<Vec<(LayerId, BlockId, Vec<TransactionId>)>>,
    pub(crate) linked_proposals: Mutex<Vec<(LayerId, ProposalId, Vec<TransactionId>)>>,
    fail_link_block: AtomicBool,
    fail_update: AtomicBool,
}

impl FakeCache {
    pub(crate) fn new(trace: Trace) -> FakeCache {
        FakeCache {
            trace,
            updates: Mutex::new(Vec::new()),
            reverts: Mutex::new(Vec::new()),
            linked_blocks: Mutex::new(Vec::new()),
            linked_proposals: Mutex::new(Vec::new()),
            fail_link_block: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_link_block(&self, fail: bool) {
        self.fail_link_block.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn updated_layers(&self) -> Vec<(LayerId, BlockId)> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .map(|(layer, block, _, _)| (*layer, *block))
            .collect()
    }
}

impl TxCache for FakeCache {
    fn link_txs_with_block(
        &self,
        layer: LayerId,
        block: BlockId,
        transactions: &[TransactionId],
    ) -> Result<(), CacheError> {
        self.trace
            .push(format!("cache.link_txs_with_block {} {}", layer, block));
        if self.fail_link_block.load(Ordering::SeqCst) {
            return Err(CacheError::Link {
                layer,
                reason: "scripted failure".to_string(),
            });
        }
        self.linked_blocks
            .lock()
            .unwrap()
            .push((layer, block, transactions.to_vec()));
        Ok(())
    }

    fn link_txs_with_proposal(
        &self,
        layer: LayerId,
        proposal: ProposalId,
        transactions: &[TransactionId],
    ) -> Result<(), CacheError> {
        self.trace.push(format!("cache.link_txs_with_proposal {}", layer));
        self.linked_proposals
            .lock()
            .unwrap()
            .push((layer, proposal, transactions.to_vec()));
        Ok(())
    }

    fn update_cache(
        &self,
        _ctx: &CancelToken,
        layer: LayerId,
        block: BlockId,
        executed: Vec<TransactionId>,
        ineffective: Vec<TransactionId>,
    ) -> Result<(), CacheError> {
        self.trace
            .push(format!("cache.update_cache {} {}", layer, block));
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(CacheError::Update {
                layer,
                reason: "scripted failure".to_string(),
            });
        }
        self.updates
            .lock()
            .unwrap()
            .push((layer, block, executed, ineffective));
        Ok(())
    }

    fn revert_cache(&self, layer: LayerId) -> Result<(), CacheError> {
        self.trace.push(format!("cache.revert_cache {}", layer));
        self.reverts.lock().unwrap().push(layer);
        Ok(())
    }
}
