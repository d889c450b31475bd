/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The cancellation token threaded through every public mesh call that performs work.
//!
//! A `CancelToken` is a cloneable flag: any clone can cancel, and every clone observes the
//! cancellation. The mesh checks the token at its suspension points (before VM, cache and store
//! work) and returns [`crate::mesh::MeshError::Cancelled`] without leaving partial effects. This
//! plays the role the shutdown channels play for the long-lived threads: a way for callers to
//! abandon in-flight work without tearing the engine down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    /// Cancel the token. Irrevocable: every clone observes the cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
