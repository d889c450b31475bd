/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A Rust implementation of the mesh: the layer-application engine of a proof-of-space-time
//! blockchain node.
//!
//! The mesh sits between two consensus components and a deterministic virtual machine. A fast,
//! probabilistic consensus (the "hare") proposes a canonical block per layer; a slow, eventual
//! consensus (the "tortoise") tallies votes and may later revise which blocks are part of the
//! canonical chain. The mesh ingests ballots and blocks from gossip, records the hare's
//! per-layer decisions, applies the selected block of each layer to the VM in layer order, and —
//! when the tortoise's settled validities contradict what was applied — reverts the VM and
//! re-executes the disputed range. Every applied decision is chained into an aggregated hash
//! that nodes compare to detect state divergence.
//!
//! The heavy dependencies are pluggable:
//!
//! - Persistence is any key-value store implementing
//!   [`KVStore`](crate::store::kv_store::KVStore).
//! - The tortoise, the VM and the tx-pool cache are ports defined in [`ports`](crate::ports),
//!   wired into the [`Mesh`](crate::mesh::Mesh) at construction.
//!
//! Entry points: [`Mesh`](crate::mesh::Mesh) for the engine,
//! [`Executor`](crate::executor::Executor) for single-layer application,
//! [`LayerClock`](crate::clock::LayerClock) for layer ticks, and
//! [`HttpPoetClient`](crate::poet::HttpPoetClient) for the proving-service client used by the
//! surrounding node's ingest side.

pub mod cancel;

pub mod clock;

pub mod config;

pub mod event_bus;

pub mod events;

pub mod executor;

pub mod hashing;

pub mod mesh;

pub mod poet;

pub mod ports;

pub mod store;

pub mod types;

pub(crate) mod logging;

// Re-exports
pub use cancel::CancelToken;
pub use config::MeshConfiguration;
pub use executor::Executor;
pub use mesh::{Mesh, MeshError};
