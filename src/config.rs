/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Configuration as specified by the operator, passed to the mesh at construction. There is no
//! process-wide mutable configuration: components that need these values receive them explicitly.

use crate::types::basic::LayerId;

#[derive(Clone, Debug)]
pub struct MeshConfiguration {
    /// The last pre-chain layer. No layer at or below it is ever applied; watermarks start here.
    pub effective_genesis: LayerId,
    /// Whether the default logging event handlers are installed on the
    /// [event bus](crate::event_bus::start_event_bus).
    pub log_events: bool,
}

impl MeshConfiguration {
    pub fn new(effective_genesis: LayerId) -> MeshConfiguration {
        MeshConfiguration {
            effective_genesis,
            log_events: true,
        }
    }
}
