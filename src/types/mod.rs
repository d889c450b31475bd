/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The data model of the mesh: layer numbers and content-addressed identifiers
//! ([basic](crate::types::basic)), signed opinion messages ([ballot](crate::types::ballot)),
//! transaction containers ([block](crate::types::block)), raw transactions
//! ([transaction](crate::types::transaction)), and the per-layer composite
//! ([layer](crate::types::layer)).

pub mod basic;

pub mod ballot;

pub mod block;

pub mod layer;

pub mod transaction;
