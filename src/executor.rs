/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The executor: applies a single layer — one block, or nothing — to the VM, reports the outcome
//! to the tx-pool cache, and commits the layer's hashes and applied record to the store.
//!
//! The steps of [`Executor::execute_block`] and [`Executor::execute_empty`] run in a fixed order:
//!
//! 1. `vm.apply` with the layer's raw transactions and rewards (both empty for an empty layer).
//!    On error nothing has been persisted and the error propagates.
//! 2. `cache.update_cache` with the executed and ineffective transactions. On error the VM has
//!    moved but no mesh record exists; the engine retries the layer on its next processing call.
//! 3. `vm.get_state_root`, reported in the log line for the layer.
//! 4. The layer hash, aggregated hash, applied block id and last-applied watermark are committed
//!    in one write batch.
//!
//! [`Executor::revert`] is the rewind counterpart used by the engine's revert protocol and by
//! wake-up reconciliation: VM revert, then cache revert, then a state-root read.

use std::sync::Arc;

use log;

use crate::cancel::CancelToken;
use crate::hashing::{calc_blocks_hash, OpinionHasher, EMPTY_LAYER_HASH};
use crate::mesh::MeshError;
use crate::ports::{TxCache, VmState};
use crate::store::kv_store::KVStore;
use crate::store::MeshStore;
use crate::types::basic::{BlockId, LayerId};
use crate::types::block::Block;

pub struct Executor<K: KVStore, V: VmState, C: TxCache> {
    store: MeshStore<K>,
    vm: Arc<V>,
    cache: Arc<C>,
}

impl<K: KVStore, V: VmState, C: TxCache> Executor<K, V, C> {
    pub fn new(store: MeshStore<K>, vm: Arc<V>, cache: Arc<C>) -> Self {
        Self { store, vm, cache }
    }

    /// Apply a layer with no block.
    pub fn execute_empty(&self, ctx: &CancelToken, layer: LayerId) -> Result<(), MeshError> {
        if ctx.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        let applied = self.vm.apply(layer, &[], &[]).map_err(MeshError::Vm)?;
        self.cache
            .update_cache(
                ctx,
                layer,
                BlockId::EMPTY,
                applied.executed,
                applied.ineffective,
            )
            .map_err(MeshError::Cache)?;
        let root = self.vm.get_state_root().map_err(MeshError::Vm)?;
        log::info!("executed empty layer {}, state root {}", layer, root);
        self.persist(layer, None)
    }

    /// Apply a layer using the given block. Uses exactly the block's rewards and its transaction
    /// ids, resolved to raw transactions through the store; an unresolvable id fails the call
    /// before the VM is touched.
    pub fn execute_block(
        &self,
        ctx: &CancelToken,
        layer: LayerId,
        block: &Block,
    ) -> Result<(), MeshError> {
        if ctx.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        let transactions = self.store.transactions(&block.tx_ids)?;
        let applied = self
            .vm
            .apply(layer, &transactions, &block.rewards)
            .map_err(MeshError::Vm)?;
        self.cache
            .update_cache(ctx, layer, block.id(), applied.executed, applied.ineffective)
            .map_err(MeshError::Cache)?;
        let root = self.vm.get_state_root().map_err(MeshError::Vm)?;
        log::info!(
            "executed block {} at layer {}, state root {}",
            block.id(),
            layer,
            root
        );
        self.persist(layer, Some(block))
    }

    /// Rewind the VM and the tx-pool cache to the state as of `layer`.
    pub fn revert(&self, ctx: &CancelToken, layer: LayerId) -> Result<(), MeshError> {
        if ctx.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        self.vm.revert(layer).map_err(MeshError::Vm)?;
        self.cache.revert_cache(layer).map_err(MeshError::Cache)?;
        let root = self.vm.get_state_root().map_err(MeshError::Vm)?;
        log::info!("reverted state to layer {}, state root {}", layer, root);
        Ok(())
    }

    /// Commit the layer's hashes and applied record without touching the VM or the cache. Used by
    /// the engine when the layer was already executed optimistically upstream and only the mesh
    /// records are missing.
    pub(crate) fn persist_applied(
        &self,
        layer: LayerId,
        block: Option<&Block>,
    ) -> Result<(), MeshError> {
        self.persist(layer, block)
    }

    fn persist(&self, layer: LayerId, block: Option<&Block>) -> Result<(), MeshError> {
        let mut ids = self.store.layer_valid_block_ids(layer)?;
        if ids.is_empty() {
            // No settled validity yet: the layer hash covers the block chosen by the fast stream.
            if let Some(block) = block {
                ids.push(block.id());
            }
        }
        let layer_hash = if ids.is_empty() {
            EMPTY_LAYER_HASH
        } else {
            calc_blocks_hash(&ids, None)
        };

        let previous = self.store.aggregated_hash(layer.sub(1))?;
        let mut hasher = OpinionHasher::new();
        hasher.write_previous(&previous);
        match block {
            Some(block) => hasher.write_support(&block.id(), block.tick_height),
            None => hasher.write_abstain(),
        }
        let aggregated_hash = hasher.finish();

        let applied = block.map(Block::id).unwrap_or(BlockId::EMPTY);
        let mut store = self.store.clone();
        store.apply_layer(layer, applied, layer_hash, aggregated_hash)?;
        Ok(())
    }
}
