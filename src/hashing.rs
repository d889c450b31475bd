/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The two hash constructions the mesh persists per layer.
//!
//! ## Layer hash
//!
//! [`calc_blocks_hash`] digests the block ids of a layer (in ascending id order) and, when
//! present, a digest of the rewards' canonical bytes. It doubles as the hash exchanged in
//! inter-node gossip to compare layer contents. A layer applied empty stores
//! [`EMPTY_LAYER_HASH`].
//!
//! ## Aggregated hash
//!
//! [`OpinionHasher`] chains the per-layer applied decisions into a single running hash:
//!
//! ```text
//! aggregated(L) = H( aggregated(L−1) ‖ 0x01 ‖ block_id ‖ tick_height (u64 BE) )   // block applied
//! aggregated(L) = H( aggregated(L−1) ‖ 0x00 )                                     // empty layer
//! aggregated(genesis) = H( ∅ )
//! ```
//!
//! Two nodes with equal aggregated hashes at a layer agree on every applied decision up to that
//! layer, which is what makes the value usable as a cheap state-sync fingerprint.

use sha2::{Digest, Sha256};

use crate::types::basic::{BlockId, Hash32};
use crate::types::block::AnyReward;

/// The layer hash recorded for a layer with no applied block.
pub const EMPTY_LAYER_HASH: Hash32 = Hash32::new([0u8; 32]);

const SUPPORT_MARKER: [u8; 1] = [1];
const ABSTAIN_MARKER: [u8; 1] = [0];

/// The aggregated hash of the effective-genesis layer: the digest of the empty input.
pub fn genesis_aggregated_hash() -> Hash32 {
    Hash32::new(Sha256::new().finalize().into())
}

/// Digest block ids (sorted ascending before hashing) and, optionally, the rewards hashed
/// alongside them.
pub fn calc_blocks_hash(ids: &[BlockId], rewards: Option<&[AnyReward]>) -> Hash32 {
    let mut sorted: Vec<BlockId> = ids.to_vec();
    sorted.sort();
    let mut hasher = Sha256::new();
    for id in &sorted {
        hasher.update(&id.bytes());
    }
    if let Some(rewards) = rewards {
        let mut reward_hasher = Sha256::new();
        for reward in rewards {
            reward_hasher.update(&reward.coinbase.bytes());
            reward_hasher.update(&reward.weight.num.to_le_bytes());
            reward_hasher.update(&reward.weight.denom.to_le_bytes());
        }
        hasher.update(&reward_hasher.finalize());
    }
    Hash32::new(hasher.finalize().into())
}

/// Streaming hasher for the aggregated-hash chain.
pub struct OpinionHasher(Sha256);

impl OpinionHasher {
    pub fn new() -> OpinionHasher {
        OpinionHasher(Sha256::new())
    }

    pub fn write_previous(&mut self, previous: &Hash32) {
        self.0.update(&previous.bytes());
    }

    pub fn write_support(&mut self, block: &BlockId, tick_height: u64) {
        self.0.update(&SUPPORT_MARKER);
        self.0.update(&block.bytes());
        self.0.update(&tick_height.to_be_bytes());
    }

    pub fn write_abstain(&mut self) {
        self.0.update(&ABSTAIN_MARKER);
    }

    pub fn finish(self) -> Hash32 {
        Hash32::new(self.0.finalize().into())
    }
}

impl Default for OpinionHasher {
    fn default() -> Self {
        Self::new()
    }
}
