/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The narrow ports through which the mesh talks to its collaborators: the slow consensus
//! ([Tortoise]), the deterministic virtual machine ([VmState]) and the tx-pool cache ([TxCache]).
//!
//! The mesh holds one implementation of each, wired at construction. This is how the cyclic
//! hare↔mesh↔tortoise dependency of the surrounding node is broken: each side sees only the
//! other's port. Implementations must be callable from multiple engine threads (`&self` methods,
//! `Send + Sync`); tests substitute recording fakes.

use crate::cancel::CancelToken;
use crate::types::basic::{BlockId, LayerId, ProposalId, StateRoot, TransactionId};
use crate::types::block::{AnyReward, Block};
use crate::types::transaction::Transaction;

/// One contextual-validity decision reported by the tortoise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockValidityUpdate {
    pub block: BlockId,
    pub layer: LayerId,
    pub validity: bool,
}

/// The slow, eventual consensus. It learns about blocks and hare decisions from the mesh, and
/// reports settled contextual validity back through [Tortoise::updates].
pub trait Tortoise: Send + Sync + 'static {
    /// Notify the tortoise of a newly ingested block.
    fn on_block(&self, block: &Block);

    /// Notify the tortoise of the hare's decision for a layer ([`BlockId::EMPTY`] for an empty
    /// decision).
    fn on_hare_output(&self, layer: LayerId, block: BlockId);

    /// Tally votes up to and including the given layer.
    fn tally_votes(&self, ctx: &CancelToken, layer: LayerId);

    /// Drain the decisions settled since the last call: the highest verified layer, and the
    /// validity updates (which may touch layers the mesh has already applied).
    fn updates(&self) -> (LayerId, Vec<BlockValidityUpdate>);
}

/// The transactions a VM application touched: those it executed, and those it skipped as
/// ineffective (e.g. wrong nonce, insufficient cover). Both are reported to the tx-pool cache.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppliedTxs {
    pub ineffective: Vec<TransactionId>,
    pub executed: Vec<TransactionId>,
}

/// The deterministic virtual machine. The VM owns its state; the mesh only ever mutates it
/// through [VmState::apply] and [VmState::revert], in layer order.
pub trait VmState: Send + Sync + 'static {
    fn apply(
        &self,
        layer: LayerId,
        transactions: &[Transaction],
        rewards: &[AnyReward],
    ) -> Result<AppliedTxs, VmError>;

    /// Rewind the VM to the state as of the given layer, returning the resulting state root.
    fn revert(&self, layer: LayerId) -> Result<StateRoot, VmError>;

    fn get_state_root(&self) -> Result<StateRoot, VmError>;
}

/// The tx-pool cache: tracks which transactions are packed into which blocks and proposals, and
/// which have been executed.
pub trait TxCache: Send + Sync + 'static {
    fn link_txs_with_block(
        &self,
        layer: LayerId,
        block: BlockId,
        transactions: &[TransactionId],
    ) -> Result<(), CacheError>;

    fn link_txs_with_proposal(
        &self,
        layer: LayerId,
        proposal: ProposalId,
        transactions: &[TransactionId],
    ) -> Result<(), CacheError>;

    /// Record the outcome of applying a layer ([`BlockId::EMPTY`] for an empty layer).
    fn update_cache(
        &self,
        ctx: &CancelToken,
        layer: LayerId,
        block: BlockId,
        executed: Vec<TransactionId>,
        ineffective: Vec<TransactionId>,
    ) -> Result<(), CacheError>;

    /// Rewind the cache to the state as of the given layer.
    fn revert_cache(&self, layer: LayerId) -> Result<(), CacheError>;
}

/// Error reported by the [VM collaborator](VmState). Recoverable from the mesh's point of view:
/// the failed layer is retried on the next processing call.
#[derive(Debug)]
pub enum VmError {
    Apply { layer: LayerId, reason: String },
    Revert { layer: LayerId, reason: String },
    StateRoot { reason: String },
}

/// Error reported by the [tx-pool cache collaborator](TxCache).
#[derive(Debug)]
pub enum CacheError {
    Link { layer: LayerId, reason: String },
    Update { layer: LayerId, reason: String },
    Revert { layer: LayerId, reason: String },
}
