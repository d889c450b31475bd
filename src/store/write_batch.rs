/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines the [WriteBatch] trait, which specifies the atomic-write interface the user-provided
//! key-value store must offer, and [MeshWriteBatch], the typed wrapper through which the mesh
//! forms its writes.
//!
//! Every [`crate::store::MeshStore`] mutation builds one `MeshWriteBatch` and commits it with a
//! single [`crate::store::kv_store::KVStore::write`], which is what gives store operations their
//! single-call transactionality.

use borsh::BorshSerialize;

use crate::store::kv_store::Key;
use crate::store::paths::{self, combine};
use crate::types::ballot::Ballot;
use crate::types::basic::{BallotId, BlockId, Hash32, LayerId, NodeId};
use crate::types::block::Block;
use crate::types::transaction::Transaction;

/// A set of key-value pairs to be written atomically into the key-value store.
pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

pub struct MeshWriteBatch<W: WriteBatch>(pub(crate) W);

impl<W: WriteBatch> MeshWriteBatch<W> {
    pub fn new() -> MeshWriteBatch<W> {
        MeshWriteBatch(W::new())
    }

    /* ↓↓↓ Ballots ↓↓↓ */

    pub fn set_ballot(&mut self, ballot: &Ballot) -> Result<(), KVSetError> {
        let bytes = ballot
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::Ballot {
                    ballot: ballot.id(),
                },
                source: err,
            })?;
        self.0
            .set(&combine(&paths::BALLOTS, &ballot.id().bytes()), &bytes);
        Ok(())
    }

    pub fn set_ballot_malicious(&mut self, ballot: &BallotId) {
        self.0
            .set(&combine(&paths::BALLOT_MALICIOUS, &ballot.bytes()), &[]);
    }

    pub fn set_layer_ballot_ids(
        &mut self,
        layer: LayerId,
        ballots: &Vec<BallotId>,
    ) -> Result<(), KVSetError> {
        let bytes = ballots
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::LayerBallots { layer },
                source: err,
            })?;
        self.0
            .set(&combine(&paths::LAYER_BALLOTS, &layer.to_le_bytes()), &bytes);
        Ok(())
    }

    pub fn set_first_ballot_by_identity(
        &mut self,
        node: &NodeId,
        layer: LayerId,
        ballot: &BallotId,
    ) -> Result<(), KVSetError> {
        let bytes = ballot
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::IdentityBallot { node: *node, layer },
                source: err,
            })?;
        let suffix = combine(&node.bytes(), &layer.to_le_bytes());
        self.0
            .set(&combine(&paths::IDENTITY_BALLOTS, &suffix), &bytes);
        Ok(())
    }

    pub fn set_latest_ballot_layer(&mut self, layer: LayerId) -> Result<(), KVSetError> {
        let bytes = layer
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::LatestBallotLayer,
                source: err,
            })?;
        self.0.set(&paths::LATEST_BALLOT_LAYER, &bytes);
        Ok(())
    }

    /* ↓↓↓ Blocks ↓↓↓ */

    pub fn set_block(&mut self, block: &Block) -> Result<(), KVSetError> {
        let bytes = block
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::Block { block: block.id() },
                source: err,
            })?;
        self.0
            .set(&combine(&paths::BLOCKS, &block.id().bytes()), &bytes);
        Ok(())
    }

    pub fn set_layer_block_ids(
        &mut self,
        layer: LayerId,
        blocks: &Vec<BlockId>,
    ) -> Result<(), KVSetError> {
        let bytes = blocks
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::LayerBlocks { layer },
                source: err,
            })?;
        self.0
            .set(&combine(&paths::LAYER_BLOCKS, &layer.to_le_bytes()), &bytes);
        Ok(())
    }

    /* ↓↓↓ Contextual validity ↓↓↓ */

    pub fn set_contextual_validity(
        &mut self,
        block: &BlockId,
        validity: bool,
    ) -> Result<(), KVSetError> {
        let bytes = validity
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::ContextualValidity { block: *block },
                source: err,
            })?;
        self.0
            .set(&combine(&paths::CONTEXTUAL_VALIDITY, &block.bytes()), &bytes);
        Ok(())
    }

    /* ↓↓↓ Hare outputs ↓↓↓ */

    pub fn set_hare_output(&mut self, layer: LayerId, block: &BlockId) -> Result<(), KVSetError> {
        let bytes = block
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::HareOutput { layer },
                source: err,
            })?;
        self.0
            .set(&combine(&paths::HARE_OUTPUT, &layer.to_le_bytes()), &bytes);
        Ok(())
    }

    /* ↓↓↓ Watermarks ↓↓↓ */

    pub fn set_processed(&mut self, layer: LayerId) -> Result<(), KVSetError> {
        let bytes = layer
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::ProcessedLayer,
                source: err,
            })?;
        self.0.set(&paths::PROCESSED_LAYER, &bytes);
        Ok(())
    }

    pub fn set_applied(&mut self, layer: LayerId, block: &BlockId) -> Result<(), KVSetError> {
        let bytes = block
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::Applied { layer },
                source: err,
            })?;
        self.0
            .set(&combine(&paths::APPLIED_BLOCK, &layer.to_le_bytes()), &bytes);
        Ok(())
    }

    pub fn delete_applied(&mut self, layer: LayerId) {
        self.0
            .delete(&combine(&paths::APPLIED_BLOCK, &layer.to_le_bytes()));
    }

    pub fn set_last_applied(&mut self, layer: LayerId) -> Result<(), KVSetError> {
        let bytes = layer
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::LastApplied,
                source: err,
            })?;
        self.0.set(&paths::LAST_APPLIED, &bytes);
        Ok(())
    }

    /* ↓↓↓ Per-layer hashes ↓↓↓ */

    pub fn set_layer_hash(&mut self, layer: LayerId, hash: &Hash32) -> Result<(), KVSetError> {
        let bytes = hash
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::LayerHash { layer },
                source: err,
            })?;
        self.0
            .set(&combine(&paths::LAYER_HASH, &layer.to_le_bytes()), &bytes);
        Ok(())
    }

    pub fn delete_layer_hash(&mut self, layer: LayerId) {
        self.0
            .delete(&combine(&paths::LAYER_HASH, &layer.to_le_bytes()));
    }

    pub fn set_aggregated_hash(&mut self, layer: LayerId, hash: &Hash32) -> Result<(), KVSetError> {
        let bytes = hash
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::AggregatedHash { layer },
                source: err,
            })?;
        self.0
            .set(&combine(&paths::AGGREGATED_HASH, &layer.to_le_bytes()), &bytes);
        Ok(())
    }

    pub fn delete_aggregated_hash(&mut self, layer: LayerId) {
        self.0
            .delete(&combine(&paths::AGGREGATED_HASH, &layer.to_le_bytes()));
    }

    /* ↓↓↓ Transactions ↓↓↓ */

    pub fn set_transaction(&mut self, transaction: &Transaction) -> Result<(), KVSetError> {
        let bytes = transaction
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError {
                key: Key::Transaction {
                    transaction: transaction.id,
                },
                source: err,
            })?;
        self.0
            .set(&combine(&paths::TRANSACTIONS, &transaction.id.bytes()), &bytes);
        Ok(())
    }
}

/// Error when trying to set a value for a given key in the [key value store][super::kv_store::KVStore]:
/// the value could not be serialized.
#[derive(Debug)]
pub enum KVSetError {
    SerializeValueError { key: Key, source: std::io::Error },
}
