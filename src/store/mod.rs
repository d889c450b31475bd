/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types and methods used to access and mutate the persistent state that the mesh keeps track of:
//! ballots, blocks, contextual validity, hare outputs, the processed and applied watermarks, and
//! the per-layer hash chain.
//!
//! This state may be stored in any key-value store of the library user's own choosing, as long as
//! that KV store can provide a type that implements [KVStore](crate::store::kv_store::KVStore).
//! The mesh mutates the state through [MeshStore], a facade whose every method commits at most
//! one [write batch](crate::store::write_batch::MeshWriteBatch) — single-call transactionality.
//! Higher-level atomicity (e.g. "nothing of a layer application is visible until all of it is")
//! is composed by the [mesh engine](crate::mesh::Mesh) on top of these calls.
//!
//! `MeshStore` handles are cheap clones of the underlying store handle; the engine and the
//! executor each keep their own.

pub mod kv_store;

pub mod paths;

pub mod write_batch;

use log;

use crate::hashing::{genesis_aggregated_hash, EMPTY_LAYER_HASH};
use crate::store::kv_store::{KVGet, KVGetError, KVStore, Key};
use crate::store::write_batch::{KVSetError, MeshWriteBatch};
use crate::types::ballot::Ballot;
use crate::types::basic::{BallotId, BlockId, Hash32, LayerId, NodeId, TransactionId};
use crate::types::block::Block;
use crate::types::layer::Layer;
use crate::types::transaction::Transaction;

/// A read and write handle into the mesh's persistent state.
#[derive(Clone)]
pub struct MeshStore<K: KVStore>(K);

impl<K: KVStore> MeshStore<K> {
    pub fn new(kv_store: K) -> Self {
        MeshStore(kv_store)
    }

    /* ↓↓↓ Initialize ↓↓↓ */

    /// Seed the store with the effective-genesis records: processed and last-applied watermarks
    /// at genesis, the genesis aggregated hash (digest of the empty input) and the empty layer
    /// hash. A store that already carries a processed layer is left untouched.
    pub fn initialize(&mut self, genesis: LayerId) -> Result<(), StoreError> {
        match self.0.processed() {
            Ok(_) => return Ok(()),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
        let mut wb = MeshWriteBatch::new();
        wb.set_processed(genesis)?;
        wb.set_last_applied(genesis)?;
        wb.set_layer_hash(genesis, &EMPTY_LAYER_HASH)?;
        wb.set_aggregated_hash(genesis, &genesis_aggregated_hash())?;
        self.write(wb);
        log::info!("store initialized at genesis layer {}", genesis);
        Ok(())
    }

    /* ↓↓↓ Ballots ↓↓↓ */

    /// Insert a ballot. This includes updating the per-layer ballot index, the
    /// first-ballot-by-identity index (only if the identity has no earlier ballot in the layer),
    /// the latest-ballot-layer record, and — if the ballot is already marked — the out-of-band
    /// malicious flag.
    pub fn add_ballot(&mut self, ballot: &Ballot) -> Result<(), StoreError> {
        let mut wb = MeshWriteBatch::new();
        wb.set_ballot(ballot)?;
        if ballot.is_malicious() {
            wb.set_ballot_malicious(&ballot.id());
        }

        let mut ids = self.0.layer_ballot_ids(ballot.layer)?;
        if !ids.contains(&ballot.id()) {
            ids.push(ballot.id());
            wb.set_layer_ballot_ids(ballot.layer, &ids)?;
        }

        if self
            .0
            .first_ballot_by_identity(&ballot.node, ballot.layer)?
            .is_none()
        {
            wb.set_first_ballot_by_identity(&ballot.node, ballot.layer, &ballot.id())?;
        }

        if self
            .0
            .latest_ballot_layer()?
            .map_or(true, |latest| ballot.layer > latest)
        {
            wb.set_latest_ballot_layer(ballot.layer)?;
        }

        self.write(wb);
        Ok(())
    }

    /// Read a ballot with its malicious flag folded back in.
    pub fn ballot(&self, id: &BallotId) -> Result<Option<Ballot>, StoreError> {
        let Some(mut ballot) = self.0.ballot(id)? else {
            return Ok(None);
        };
        if self.0.ballot_is_malicious(id)? {
            ballot.set_malicious();
        }
        Ok(Some(ballot))
    }

    /// Mark a ballot malicious. Set-once: marking an already-marked ballot is a no-op.
    pub fn set_malicious(&mut self, id: &BallotId) -> Result<(), StoreError> {
        let mut wb = MeshWriteBatch::new();
        wb.set_ballot_malicious(id);
        self.write(wb);
        Ok(())
    }

    pub fn first_ballot_by_identity(
        &self,
        node: &NodeId,
        layer: LayerId,
    ) -> Result<Option<BallotId>, StoreError> {
        Ok(self.0.first_ballot_by_identity(node, layer)?)
    }

    pub fn layer_ballots(&self, layer: LayerId) -> Result<Vec<Ballot>, StoreError> {
        let ids = self.0.layer_ballot_ids(layer)?;
        let mut ballots = Vec::with_capacity(ids.len());
        for id in &ids {
            let ballot = self.ballot(id)?.ok_or(StoreError::KVGet(
                KVGetError::ValueNotFound {
                    key: Key::Ballot { ballot: *id },
                },
            ))?;
            ballots.push(ballot);
        }
        Ok(ballots)
    }

    pub fn latest_ballot_layer(&self) -> Result<Option<LayerId>, StoreError> {
        Ok(self.0.latest_ballot_layer()?)
    }

    /* ↓↓↓ Blocks ↓↓↓ */

    /// Insert a block and update the per-layer block index.
    pub fn add_block(&mut self, block: &Block) -> Result<(), StoreError> {
        let mut wb = MeshWriteBatch::new();
        wb.set_block(block)?;
        let mut ids = self.0.layer_block_ids(block.layer)?;
        if !ids.contains(&block.id()) {
            ids.push(block.id());
            wb.set_layer_block_ids(block.layer, &ids)?;
        }
        self.write(wb);
        Ok(())
    }

    pub fn block(&self, id: &BlockId) -> Result<Option<Block>, StoreError> {
        Ok(self.0.block(id)?)
    }

    pub fn layer_block_ids(&self, layer: LayerId) -> Result<Vec<BlockId>, StoreError> {
        Ok(self.0.layer_block_ids(layer)?)
    }

    pub fn layer_blocks(&self, layer: LayerId) -> Result<Vec<Block>, StoreError> {
        let ids = self.0.layer_block_ids(layer)?;
        let mut blocks = Vec::with_capacity(ids.len());
        for id in &ids {
            let block = self.0.block(id)?.ok_or(StoreError::KVGet(
                KVGetError::ValueNotFound {
                    key: Key::Block { block: *id },
                },
            ))?;
            blocks.push(block);
        }
        Ok(blocks)
    }

    pub fn get_layer(&self, layer: LayerId) -> Result<Layer, StoreError> {
        Ok(Layer::new(
            layer,
            self.layer_ballots(layer)?,
            self.layer_blocks(layer)?,
        ))
    }

    /* ↓↓↓ Contextual validity ↓↓↓ */

    pub fn set_valid(&mut self, block: &BlockId) -> Result<(), StoreError> {
        self.set_validity(block, true)
    }

    pub fn set_invalid(&mut self, block: &BlockId) -> Result<(), StoreError> {
        self.set_validity(block, false)
    }

    pub fn set_validity(&mut self, block: &BlockId, validity: bool) -> Result<(), StoreError> {
        let mut wb = MeshWriteBatch::new();
        wb.set_contextual_validity(block, validity)?;
        self.write(wb);
        Ok(())
    }

    pub fn contextual_validity(&self, block: &BlockId) -> Result<Option<bool>, StoreError> {
        Ok(self.0.contextual_validity(block)?)
    }

    /// The ids of the layer's blocks whose contextual validity is settled valid.
    pub fn layer_valid_block_ids(&self, layer: LayerId) -> Result<Vec<BlockId>, StoreError> {
        let ids = self.0.layer_block_ids(layer)?;
        let mut valid = Vec::new();
        for id in &ids {
            if self.0.contextual_validity(id)? == Some(true) {
                valid.push(*id);
            }
        }
        Ok(valid)
    }

    /* ↓↓↓ Hare outputs ↓↓↓ */

    /// Record the hare output for a layer. The record is write-once: re-writing the same value is
    /// a no-op, re-writing a different value returns [StoreError::AlreadySet].
    pub fn set_hare_output(&mut self, layer: LayerId, block: BlockId) -> Result<(), StoreError> {
        match self.0.hare_output(layer) {
            Ok(existing) if existing == block => return Ok(()),
            Ok(existing) => {
                return Err(StoreError::AlreadySet {
                    layer,
                    existing,
                    rejected: block,
                })
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
        let mut wb = MeshWriteBatch::new();
        wb.set_hare_output(layer, &block)?;
        self.write(wb);
        Ok(())
    }

    pub fn hare_output(&self, layer: LayerId) -> Result<BlockId, StoreError> {
        Ok(self.0.hare_output(layer)?)
    }

    /* ↓↓↓ Watermarks ↓↓↓ */

    pub fn set_processed(&mut self, layer: LayerId) -> Result<(), StoreError> {
        let mut wb = MeshWriteBatch::new();
        wb.set_processed(layer)?;
        self.write(wb);
        Ok(())
    }

    pub fn processed(&self) -> Result<LayerId, StoreError> {
        Ok(self.0.processed()?)
    }

    pub fn applied(&self, layer: LayerId) -> Result<Option<BlockId>, StoreError> {
        Ok(self.0.applied(layer)?)
    }

    pub fn last_applied(&self) -> Result<LayerId, StoreError> {
        Ok(self.0.last_applied()?)
    }

    /// Commit a layer application: the applied block id (the empty id for an empty layer), the
    /// layer hash, the aggregated hash, and the last-applied watermark, in one write batch. All
    /// four records land or none do.
    pub fn apply_layer(
        &mut self,
        layer: LayerId,
        block: BlockId,
        layer_hash: Hash32,
        aggregated_hash: Hash32,
    ) -> Result<(), StoreError> {
        let mut wb = MeshWriteBatch::new();
        wb.set_applied(layer, &block)?;
        wb.set_layer_hash(layer, &layer_hash)?;
        wb.set_aggregated_hash(layer, &aggregated_hash)?;
        wb.set_last_applied(layer)?;
        self.write(wb);
        Ok(())
    }

    /// Rewind the applied watermark to `layer`, deleting the applied records and hashes of every
    /// layer above it. Records at and below `layer` are untouched; the rewound range is
    /// re-written with fresh values when the layers are re-executed.
    pub fn revert_applied_above(&mut self, layer: LayerId) -> Result<(), StoreError> {
        let last = self.0.last_applied()?;
        let mut wb = MeshWriteBatch::new();
        let mut lid = layer.add(1);
        while lid <= last {
            wb.delete_applied(lid);
            wb.delete_layer_hash(lid);
            wb.delete_aggregated_hash(lid);
            lid = lid.add(1);
        }
        wb.set_last_applied(layer)?;
        self.write(wb);
        Ok(())
    }

    /* ↓↓↓ Per-layer hashes ↓↓↓ */

    pub fn layer_hash(&self, layer: LayerId) -> Result<Hash32, StoreError> {
        Ok(self.0.layer_hash(layer)?)
    }

    pub fn aggregated_hash(&self, layer: LayerId) -> Result<Hash32, StoreError> {
        Ok(self.0.aggregated_hash(layer)?)
    }

    /* ↓↓↓ Transactions ↓↓↓ */

    pub fn add_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        let mut wb = MeshWriteBatch::new();
        wb.set_transaction(transaction)?;
        self.write(wb);
        Ok(())
    }

    /// Resolve transaction ids to their raw records. A single missing id fails the whole lookup
    /// with the distinguished not-found error naming that id.
    pub fn transactions(&self, ids: &[TransactionId]) -> Result<Vec<Transaction>, StoreError> {
        let mut transactions = Vec::with_capacity(ids.len());
        for id in ids {
            let transaction = self.0.transaction(id)?.ok_or(StoreError::KVGet(
                KVGetError::ValueNotFound {
                    key: Key::Transaction { transaction: *id },
                },
            ))?;
            transactions.push(transaction);
        }
        Ok(transactions)
    }

    /* ↓↓↓ WriteBatch commit ↓↓↓ */

    pub fn write(&mut self, write_batch: MeshWriteBatch<K::WriteBatch>) {
        self.0.write(write_batch.0)
    }
}

/// Error when reading or writing the mesh's persistent state. Three kinds of errors may be
/// encountered:
/// 1. Error when trying to get a value from the underlying [key value store][KVStore],
/// 2. Error when trying to set a value for a given key in the underlying [key value store][KVStore],
/// 3. An attempt to overwrite a write-once record (the hare output of a layer) with a different
///    value.
#[derive(Debug)]
pub enum StoreError {
    KVGet(KVGetError),
    KVSet(KVSetError),
    AlreadySet {
        layer: LayerId,
        existing: BlockId,
        rejected: BlockId,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::KVGet(err) if err.is_not_found())
    }
}

impl From<KVGetError> for StoreError {
    fn from(value: KVGetError) -> Self {
        StoreError::KVGet(value)
    }
}

impl From<KVSetError> for StoreError {
    fn from(value: KVSetError) -> Self {
        StoreError::KVSet(value)
    }
}
