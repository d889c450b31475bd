/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines the [KVStore] trait, which specifies the required interface for the key-value store
//! provided by the user.
//!
//! Given a method to obtain the value for a given key in bytes, this module also provides typed
//! getters for the variables the mesh stores, as described in [crate::store::paths]. A handle
//! implementing `KVStore` is expected to be a cheap clone (e.g. an `Arc` around the actual
//! database), since the mesh and its executor keep separate handles.

use std::fmt::Display;

use borsh::BorshDeserialize;

use crate::store::paths::{self, combine};
use crate::store::write_batch::WriteBatch;
use crate::types::ballot::Ballot;
use crate::types::basic::{BallotId, BlockId, Hash32, LayerId, NodeId, TransactionId};
use crate::types::block::Block;
use crate::types::transaction::Transaction;

pub trait KVStore: KVGet + Clone + Send + Sync + 'static {
    type WriteBatch: WriteBatch;

    fn write(&mut self, wb: Self::WriteBatch);
    fn clear(&mut self);
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /* ↓↓↓ Ballots ↓↓↓ */

    fn ballot(&self, ballot: &BallotId) -> Result<Option<Ballot>, KVGetError> {
        if let Some(bytes) = self.get(&combine(&paths::BALLOTS, &ballot.bytes())) {
            Ok(Some(Ballot::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::Ballot { ballot: *ballot },
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    fn ballot_is_malicious(&self, ballot: &BallotId) -> Result<bool, KVGetError> {
        Ok(self
            .get(&combine(&paths::BALLOT_MALICIOUS, &ballot.bytes()))
            .is_some())
    }

    fn layer_ballot_ids(&self, layer: LayerId) -> Result<Vec<BallotId>, KVGetError> {
        if let Some(bytes) = self.get(&combine(&paths::LAYER_BALLOTS, &layer.to_le_bytes())) {
            Vec::<BallotId>::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::LayerBallots { layer },
                    source: err,
                }
            })
        } else {
            Ok(Vec::new())
        }
    }

    fn first_ballot_by_identity(
        &self,
        node: &NodeId,
        layer: LayerId,
    ) -> Result<Option<BallotId>, KVGetError> {
        let suffix = combine(&node.bytes(), &layer.to_le_bytes());
        if let Some(bytes) = self.get(&combine(&paths::IDENTITY_BALLOTS, &suffix)) {
            Ok(Some(BallotId::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::IdentityBallot { node: *node, layer },
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    fn latest_ballot_layer(&self) -> Result<Option<LayerId>, KVGetError> {
        if let Some(bytes) = self.get(&paths::LATEST_BALLOT_LAYER) {
            Ok(Some(LayerId::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::LatestBallotLayer,
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    /* ↓↓↓ Blocks ↓↓↓ */

    fn block(&self, block: &BlockId) -> Result<Option<Block>, KVGetError> {
        if let Some(bytes) = self.get(&combine(&paths::BLOCKS, &block.bytes())) {
            Ok(Some(Block::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::Block { block: *block },
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    fn layer_block_ids(&self, layer: LayerId) -> Result<Vec<BlockId>, KVGetError> {
        if let Some(bytes) = self.get(&combine(&paths::LAYER_BLOCKS, &layer.to_le_bytes())) {
            Vec::<BlockId>::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::LayerBlocks { layer },
                    source: err,
                }
            })
        } else {
            Ok(Vec::new())
        }
    }

    /* ↓↓↓ Contextual validity ↓↓↓ */

    fn contextual_validity(&self, block: &BlockId) -> Result<Option<bool>, KVGetError> {
        if let Some(bytes) = self.get(&combine(&paths::CONTEXTUAL_VALIDITY, &block.bytes())) {
            Ok(Some(bool::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::ContextualValidity { block: *block },
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    /* ↓↓↓ Hare outputs ↓↓↓ */

    fn hare_output(&self, layer: LayerId) -> Result<BlockId, KVGetError> {
        BlockId::deserialize(
            &mut &*self
                .get(&combine(&paths::HARE_OUTPUT, &layer.to_le_bytes()))
                .ok_or(KVGetError::ValueNotFound {
                    key: Key::HareOutput { layer },
                })?,
        )
        .map_err(|err| KVGetError::DeserializeValueError {
            key: Key::HareOutput { layer },
            source: err,
        })
    }

    /* ↓↓↓ Watermarks ↓↓↓ */

    fn processed(&self) -> Result<LayerId, KVGetError> {
        LayerId::deserialize(&mut &*self.get(&paths::PROCESSED_LAYER).ok_or(
            KVGetError::ValueNotFound {
                key: Key::ProcessedLayer,
            },
        )?)
        .map_err(|err| KVGetError::DeserializeValueError {
            key: Key::ProcessedLayer,
            source: err,
        })
    }

    fn applied(&self, layer: LayerId) -> Result<Option<BlockId>, KVGetError> {
        if let Some(bytes) = self.get(&combine(&paths::APPLIED_BLOCK, &layer.to_le_bytes())) {
            Ok(Some(BlockId::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::Applied { layer },
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    fn last_applied(&self) -> Result<LayerId, KVGetError> {
        LayerId::deserialize(&mut &*self.get(&paths::LAST_APPLIED).ok_or(
            KVGetError::ValueNotFound {
                key: Key::LastApplied,
            },
        )?)
        .map_err(|err| KVGetError::DeserializeValueError {
            key: Key::LastApplied,
            source: err,
        })
    }

    /* ↓↓↓ Per-layer hashes ↓↓↓ */

    fn layer_hash(&self, layer: LayerId) -> Result<Hash32, KVGetError> {
        Hash32::deserialize(
            &mut &*self
                .get(&combine(&paths::LAYER_HASH, &layer.to_le_bytes()))
                .ok_or(KVGetError::ValueNotFound {
                    key: Key::LayerHash { layer },
                })?,
        )
        .map_err(|err| KVGetError::DeserializeValueError {
            key: Key::LayerHash { layer },
            source: err,
        })
    }

    fn aggregated_hash(&self, layer: LayerId) -> Result<Hash32, KVGetError> {
        Hash32::deserialize(
            &mut &*self
                .get(&combine(&paths::AGGREGATED_HASH, &layer.to_le_bytes()))
                .ok_or(KVGetError::ValueNotFound {
                    key: Key::AggregatedHash { layer },
                })?,
        )
        .map_err(|err| KVGetError::DeserializeValueError {
            key: Key::AggregatedHash { layer },
            source: err,
        })
    }

    /* ↓↓↓ Transactions ↓↓↓ */

    fn transaction(&self, transaction: &TransactionId) -> Result<Option<Transaction>, KVGetError> {
        if let Some(bytes) = self.get(&combine(&paths::TRANSACTIONS, &transaction.bytes())) {
            Ok(Some(Transaction::deserialize(&mut &*bytes).map_err(
                |err| KVGetError::DeserializeValueError {
                    key: Key::Transaction {
                        transaction: *transaction,
                    },
                    source: err,
                },
            )?))
        } else {
            Ok(None)
        }
    }
}

/// Error when trying to read a value corresponding to a given key from the
/// [key value store][KVStore]. The error may arise in the following circumstances:
/// 1. The value corresponding to a given key cannot be found,
/// 2. The value corresponding to a given key cannot be deserialized into its expected type.
///
/// The first circumstance is the mesh's distinguished "not found" condition; callers discriminate
/// it with [`KVGetError::is_not_found`].
#[derive(Debug)]
pub enum KVGetError {
    ValueNotFound { key: Key },
    DeserializeValueError { key: Key, source: std::io::Error },
}

impl KVGetError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KVGetError::ValueNotFound { .. })
    }
}

#[derive(Debug)]
pub enum Key {
    Ballot { ballot: BallotId },
    BallotMalicious { ballot: BallotId },
    LayerBallots { layer: LayerId },
    IdentityBallot { node: NodeId, layer: LayerId },
    LatestBallotLayer,
    Block { block: BlockId },
    LayerBlocks { layer: LayerId },
    ContextualValidity { block: BlockId },
    HareOutput { layer: LayerId },
    ProcessedLayer,
    Applied { layer: LayerId },
    LastApplied,
    LayerHash { layer: LayerId },
    AggregatedHash { layer: LayerId },
    Transaction { transaction: TransactionId },
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            Key::Ballot { ballot } => write!(f, "Ballot {}", ballot),
            Key::BallotMalicious { ballot } => write!(f, "Malicious flag for ballot {}", ballot),
            Key::LayerBallots { layer } => write!(f, "Ballots of layer {}", layer),
            Key::IdentityBallot { node, layer } => {
                write!(f, "First ballot by {} in layer {}", node, layer)
            }
            Key::LatestBallotLayer => write!(f, "Latest ballot layer"),
            Key::Block { block } => write!(f, "Block {}", block),
            Key::LayerBlocks { layer } => write!(f, "Blocks of layer {}", layer),
            Key::ContextualValidity { block } => {
                write!(f, "Contextual validity of block {}", block)
            }
            Key::HareOutput { layer } => write!(f, "Hare output for layer {}", layer),
            Key::ProcessedLayer => write!(f, "Processed layer"),
            Key::Applied { layer } => write!(f, "Applied block for layer {}", layer),
            Key::LastApplied => write!(f, "Last applied layer"),
            Key::LayerHash { layer } => write!(f, "Hash of layer {}", layer),
            Key::AggregatedHash { layer } => write!(f, "Aggregated hash of layer {}", layer),
            Key::Transaction { transaction } => write!(f, "Transaction {}", transaction),
        }
    }
}
