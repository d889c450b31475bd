/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'block' type and its methods.
//!
//! A block is a transaction container proposed for a specific layer, together with the rewards
//! its publication earns and the tick height it was built at. Blocks are content-addressed: the
//! [id](Block::id) is the SHA-256 digest of the block's [canonical encoding](Block::canonical_bytes)
//! and is fixed at construction. Blocks are immutable after ingest.
//!
//! ## Canonical encoding
//!
//! The identity encoding is written by hand rather than delegated to borsh, so that block ids
//! stay stable across serializer versions. The layout is:
//!
//! ```text
//! layer (u32 LE)
//! len(tx_ids) (LEB128) ‖ tx_ids (32 bytes each)
//! len(rewards) (LEB128) ‖ each reward: coinbase (24 bytes) ‖ num (u64 LE) ‖ denom (u64 LE)
//! tick_height (u64 LE)
//! ```

use borsh::{BorshDeserialize, BorshSerialize};
pub use sha2::Sha256 as CryptoHasher;
use sha2::Digest;

use crate::types::basic::{Address, BlockId, LayerId, RatNum, TransactionId};

/// A reward credited when the block containing it is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct AnyReward {
    pub coinbase: Address,
    pub weight: RatNum,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Block {
    id: BlockId,
    pub layer: LayerId,
    pub tx_ids: Vec<TransactionId>,
    pub rewards: Vec<AnyReward>,
    pub tick_height: u64,
}

impl Block {
    /// Create a block, fixing its id from the canonical encoding of the given fields.
    pub fn new(
        layer: LayerId,
        tx_ids: Vec<TransactionId>,
        rewards: Vec<AnyReward>,
        tick_height: u64,
    ) -> Block {
        let mut block = Block {
            id: BlockId::EMPTY,
            layer,
            tx_ids,
            rewards,
            tick_height,
        };
        block.id = Block::hash(&block.canonical_bytes());
        block
    }

    /// Reconstruct a block whose id is already known, e.g. when receiving it from a peer that
    /// vouches for the id. The id is *not* recomputed; callers on untrusted paths should compare
    /// it against [`Block::hash`] of [`Block::canonical_bytes`] themselves.
    pub fn from_parts(
        id: BlockId,
        layer: LayerId,
        tx_ids: Vec<TransactionId>,
        rewards: Vec<AnyReward>,
        tick_height: u64,
    ) -> Block {
        Block {
            id,
            layer,
            tx_ids,
            rewards,
            tick_height,
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    /// The canonical identity encoding of this block (see the module-level docs for the layout).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            4 + 10 + self.tx_ids.len() * 32 + 10 + self.rewards.len() * 40 + 8,
        );
        buf.extend_from_slice(&self.layer.to_le_bytes());
        write_leb128(&mut buf, self.tx_ids.len() as u64);
        for tx in &self.tx_ids {
            buf.extend_from_slice(&tx.bytes());
        }
        write_leb128(&mut buf, self.rewards.len() as u64);
        for reward in &self.rewards {
            buf.extend_from_slice(&reward.coinbase.bytes());
            buf.extend_from_slice(&reward.weight.num.to_le_bytes());
            buf.extend_from_slice(&reward.weight.denom.to_le_bytes());
        }
        buf.extend_from_slice(&self.tick_height.to_le_bytes());
        buf
    }

    pub fn hash(canonical_bytes: &[u8]) -> BlockId {
        let mut hasher = CryptoHasher::new();
        hasher.update(canonical_bytes);
        BlockId::new(hasher.finalize().into())
    }
}

/// Sort blocks into validity order: descending tick height, ties broken by ascending block id.
/// The first block of the sorted vector is the one the mesh applies when several blocks of a
/// layer are contextually valid.
pub fn sort_blocks(mut blocks: Vec<Block>) -> Vec<Block> {
    blocks.sort_by(|a, b| {
        b.tick_height
            .cmp(&a.tick_height)
            .then_with(|| a.id().cmp(&b.id()))
    });
    blocks
}

// Unsigned LEB128, the varint used by the canonical encoding.
fn write_leb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return;
        }
    }
}
