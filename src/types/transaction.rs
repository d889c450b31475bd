/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The transaction form the mesh stores and hands to the VM.
//!
//! The mesh does not interpret transactions: it resolves a block's transaction ids to these raw
//! records and passes them to [`crate::ports::VmState::apply`] unchanged. Parsing, validation and
//! execution semantics belong to the VM.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::basic::TransactionId;

#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub raw: Vec<u8>,
}

impl Transaction {
    pub fn new(id: TransactionId, raw: Vec<u8>) -> Transaction {
        Transaction { id, raw }
    }
}
