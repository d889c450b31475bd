/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Notifications that are emitted when significant things happen in the local mesh.
//!
//! ## Event enum
//!
//! Significant occurences in the mesh include ingesting a ballot or a block, recording a hare
//! output, applying a layer to the VM, and reverting state. Each corresponds to a variant of the
//! [event enum](Event), whose variant tuple contains an inner struct type summarizing the
//! occurence; the summary always includes a timestamp corresponding to the exact time the event
//! occured.
//!
//! ## Registering event handlers
//!
//! Library users can register event handler closures, which are then internally called by the
//! library's [event bus](crate::event_bus::start_event_bus) thread when the handler's particular
//! event variant happens. Default handlers that log out events are enabled through
//! [configuration](crate::config::MeshConfiguration::log_events).
//!
//! ## Timing
//!
//! Events are always emitted **after** the corresponding occurence is "completed". For example,
//! the [apply-layer event](ApplyLayerEvent) is only emitted after the layer's hashes and applied
//! record have been persisted.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::types::basic::{BallotId, BlockId, LayerId};

/// Enumerates all events defined for the mesh.
pub enum Event {
    // Ingest events.
    InsertBallot(InsertBallotEvent),
    InsertBlock(InsertBlockEvent),

    // Consensus-stream events.
    HareOutput(HareOutputEvent),

    // Events that change the applied state.
    ApplyLayer(ApplyLayerEvent),
    RevertState(RevertStateEvent),
}

impl Event {
    /// Publishes a given instance of the [Event](Event) enum on the event publisher channel (if
    /// the channel is defined).
    pub fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

pub struct InsertBallotEvent {
    pub timestamp: SystemTime,
    pub ballot: BallotId,
    pub layer: LayerId,
    pub malicious: bool,
}

pub struct InsertBlockEvent {
    pub timestamp: SystemTime,
    pub block: BlockId,
    pub layer: LayerId,
}

pub struct HareOutputEvent {
    pub timestamp: SystemTime,
    pub layer: LayerId,
    pub block: BlockId,
}

pub struct ApplyLayerEvent {
    pub timestamp: SystemTime,
    pub layer: LayerId,
    pub block: BlockId,
}

pub struct RevertStateEvent {
    pub timestamp: SystemTime,
    pub revert_to: LayerId,
}
