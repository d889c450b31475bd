/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" types shared across the mesh: layer numbers, content-addressed identifiers, reward
//! values, and hash values.
//!
//! These types follow the newtype pattern: the wrapped representation is kept private and the API
//! for working with the values is defined in this module. Everything here derives borsh's
//! serialization traits, since these are the forms in which values are persisted into the
//! user-provided [key-value store](crate::store::kv_store::KVStore).

use std::fmt::{self, Debug, Display, Formatter};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};

/// Index of a layer: a discrete, clock-driven time slice of the chain. Layer numbers increase
/// monotonically from 0; the layer at which the chain becomes "live" (the effective genesis) is
/// supplied by [configuration](crate::config::MeshConfiguration).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct LayerId(u32);

impl LayerId {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }

    pub fn add(self, rhs: u32) -> LayerId {
        LayerId(self.0 + rhs)
    }

    /// # Panics
    /// Panics if the subtraction would take the layer number below zero.
    pub fn sub(self, rhs: u32) -> LayerId {
        LayerId(
            self.0
                .checked_sub(rhs)
                .expect("Programming error: layer number underflow."),
        )
    }

    pub fn saturating_sub(self, rhs: u32) -> LayerId {
        LayerId(self.0.saturating_sub(rhs))
    }

    pub fn to_le_bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl Display for LayerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The hash of a ballot, obtained at [initialization](crate::types::ballot::Ballot::new).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct BallotId([u8; 32]);

impl BallotId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for BallotId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", first_seven_base64_chars(&self.0))
    }
}

impl Debug for BallotId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The hash of a block, obtained from the block's
/// [canonical encoding](crate::types::block::Block::canonical_bytes).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct BlockId([u8; 32]);

impl BlockId {
    /// The distinguished "no block" marker. A hare output equal to this id means that no block is
    /// canonical for the layer, and the layer is applied empty.
    pub const EMPTY: BlockId = BlockId([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "empty")
        } else {
            write!(f, "{}", first_seven_base64_chars(&self.0))
        }
    }
}

impl Debug for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Content-addressed identifier of a transaction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct TransactionId([u8; 32]);

impl TransactionId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", first_seven_base64_chars(&self.0))
    }
}

impl Debug for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Content-addressed identifier of a proposal. The mesh never stores proposals; the id is only
/// threaded through to the tx-pool cache when
/// [linking transactions](crate::mesh::Mesh::add_txs_from_proposal).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ProposalId([u8; 32]);

impl ProposalId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

/// Identifier of an activation: the proof-of-space-time commitment a ballot refers to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ActivationId([u8; 32]);

impl ActivationId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

/// Identity of a node: the byte form of an Ed25519 verifying key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct NodeId([u8; 32]);

impl NodeId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", first_seven_base64_chars(&self.0))
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Account address credited by a block reward.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Address([u8; 24]);

impl Address {
    pub const fn new(bytes: [u8; 24]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 24] {
        self.0
    }
}

/// A rational number: the weight attached to a block reward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct RatNum {
    pub num: u64,
    pub denom: u64,
}

/// A 32-byte cryptographic hash value. Layer hashes and aggregated hashes are of this type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Hash32([u8; 32]);

impl Hash32 {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for Hash32 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", first_seven_base64_chars(&self.0))
    }
}

impl Debug for Hash32 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The root of the VM's state trie, as reported by the [VM collaborator](crate::ports::VmState).
/// The mesh treats it as opaque.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct StateRoot(Hash32);

impl StateRoot {
    pub const fn new(hash: Hash32) -> Self {
        Self(hash)
    }

    pub const fn hash(&self) -> Hash32 {
        self.0
    }
}

impl Display for StateRoot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first
// 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}
