/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each mesh state variable is stored in the user-provided
//! key-value store.
//!
//! Each variable is stored as **borsh-serialized values** under keys formed by concatenating a
//! constant one-byte prefix with, for mappings, the serialized form of the map key. "Single
//! values" (e.g. the processed layer) sit directly at their one-byte key.
//!
//! | Variable | "Type" |
//! |---|---|
//! | Ballots | `BallotId` -> `Ballot` |
//! | Ballot malicious flags | `BallotId` -> `()` (presence means malicious) |
//! | Layer ballots | `LayerId` -> `Vec<BallotId>` |
//! | Identity ballots | `(NodeId, LayerId)` -> `BallotId` (first ballot seen for the pair) |
//! | Latest ballot layer | `LayerId` |
//! | Blocks | `BlockId` -> `Block` |
//! | Layer blocks | `LayerId` -> `Vec<BlockId>` |
//! | Contextual validity | `BlockId` -> `bool` |
//! | Hare outputs | `LayerId` -> `BlockId` (write-once) |
//! | Processed layer | `LayerId` |
//! | Applied blocks | `LayerId` -> `BlockId` |
//! | Last applied layer | `LayerId` |
//! | Layer hashes | `LayerId` -> `Hash32` |
//! | Aggregated hashes | `LayerId` -> `Hash32` |
//! | Transactions | `TransactionId` -> `Transaction` |

pub const BALLOTS: [u8; 1] = [0];
pub const BALLOT_MALICIOUS: [u8; 1] = [1];
pub const LAYER_BALLOTS: [u8; 1] = [2];
pub const IDENTITY_BALLOTS: [u8; 1] = [3];
pub const LATEST_BALLOT_LAYER: [u8; 1] = [4];
pub const BLOCKS: [u8; 1] = [5];
pub const LAYER_BLOCKS: [u8; 1] = [6];
pub const CONTEXTUAL_VALIDITY: [u8; 1] = [7];
pub const HARE_OUTPUT: [u8; 1] = [8];
pub const PROCESSED_LAYER: [u8; 1] = [9];
pub const APPLIED_BLOCK: [u8; 1] = [10];
pub const LAST_APPLIED: [u8; 1] = [11];
pub const LAYER_HASH: [u8; 1] = [12];
pub const AGGREGATED_HASH: [u8; 1] = [13];
pub const TRANSACTIONS: [u8; 1] = [14];

/// Concatenate two byteslices into one vector.
pub fn combine(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
