/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'ballot' type: a signed opinion message from a node about block validity
//! across a range of layers.
//!
//! Ballots are immutable after ingest, with a single exception: the malicious flag, which is set
//! exactly once when the mesh observes a second ballot by the same node for the same layer. The
//! flag is persisted out-of-band (keyed by ballot id) so the ingested record itself never needs
//! to be rewritten; [`crate::store::MeshStore::ballot`] folds it back in on read.

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::Digest;

use crate::types::basic::{ActivationId, BallotId, BlockId, LayerId, NodeId};
use crate::types::block::CryptoHasher;

/// A single vote for or against a block.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct BlockVote {
    pub block: BlockId,
    pub layer: LayerId,
    pub height: u64,
}

/// The votes a ballot casts over layers, relative to a base ballot.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Votes {
    pub base: BallotId,
    pub support: Vec<BlockVote>,
    pub against: Vec<BlockVote>,
    pub abstain: Vec<LayerId>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Ballot {
    id: BallotId,
    pub signature: [u8; 64],
    pub node: NodeId,
    pub layer: LayerId,
    pub activation: ActivationId,
    pub votes: Votes,
    malicious: bool,
}

impl Ballot {
    /// Create a ballot, fixing its id from the signed bytes and the signature.
    pub fn new(
        signature: [u8; 64],
        node: NodeId,
        layer: LayerId,
        activation: ActivationId,
        votes: Votes,
    ) -> Ballot {
        let mut ballot = Ballot {
            id: BallotId::new([0u8; 32]),
            signature,
            node,
            layer,
            activation,
            votes,
            malicious: false,
        };
        let mut hasher = CryptoHasher::new();
        hasher.update(&ballot.signed_bytes());
        hasher.update(&ballot.signature);
        ballot.id = BallotId::new(hasher.finalize().into());
        ballot
    }

    /// Reconstruct a ballot whose id is already known (sync and test paths). The id is not
    /// recomputed.
    pub fn from_parts(
        id: BallotId,
        signature: [u8; 64],
        node: NodeId,
        layer: LayerId,
        activation: ActivationId,
        votes: Votes,
    ) -> Ballot {
        Ballot {
            id,
            signature,
            node,
            layer,
            activation,
            votes,
            malicious: false,
        }
    }

    pub fn id(&self) -> BallotId {
        self.id
    }

    /// The bytes covered by the ballot's signature.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.node.bytes());
        buf.extend_from_slice(&self.layer.to_le_bytes());
        buf.extend_from_slice(&self.activation.bytes());
        buf.extend_from_slice(
            &self
                .votes
                .try_to_vec()
                .expect("Programming error: votes are always borsh-serializable."),
        );
        buf
    }

    /// Checks that the signature over [`Ballot::signed_bytes`] verifies under the node identity.
    pub fn verify(&self) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.node.bytes()) else {
            return false;
        };
        let signature = Signature::from_bytes(&self.signature);
        key.verify(&self.signed_bytes(), &signature).is_ok()
    }

    pub fn is_malicious(&self) -> bool {
        self.malicious
    }

    /// Set-once: a marked ballot stays marked.
    pub(crate) fn set_malicious(&mut self) {
        self.malicious = true;
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    use super::*;

    fn signed_ballot(layer: LayerId) -> Ballot {
        let key = SigningKey::generate(&mut OsRng);
        let node = NodeId::new(key.verifying_key().to_bytes());
        let unsigned = Ballot::new([0u8; 64], node, layer, ActivationId::new([7u8; 32]), Votes::default());
        let signature = key.sign(&unsigned.signed_bytes());
        Ballot::new(
            signature.to_bytes(),
            node,
            layer,
            ActivationId::new([7u8; 32]),
            Votes::default(),
        )
    }

    #[test]
    fn verify_accepts_valid_signature() {
        assert!(signed_ballot(LayerId::new(4)).verify());
    }

    #[test]
    fn verify_rejects_tampered_ballot() {
        let mut ballot = signed_ballot(LayerId::new(4));
        ballot.layer = LayerId::new(5);
        assert!(!ballot.verify());
    }

    #[test]
    fn id_covers_signature() {
        let ballot = signed_ballot(LayerId::new(4));
        let resigned = Ballot::new(
            [9u8; 64],
            ballot.node,
            ballot.layer,
            ballot.activation,
            ballot.votes.clone(),
        );
        assert_ne!(ballot.id(), resigned.id());
    }
}
