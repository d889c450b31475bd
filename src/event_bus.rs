/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that receives events emitted by the [mesh engine](crate::mesh::Mesh) and passes them to
//! event handlers.
//!
//! When the thread receives a message containing an [event](crate::events::Event), it triggers
//! the execution of the handlers defined for the contained event type, where the handlers for
//! each event type are stored in [`EventHandlers`].
//!
//! ## Event Handlers
//!
//! An instance of `EventHandlers` contains, per event type:
//! 1. An optional user-defined handler, and
//! 2. If logging is enabled via [configuration](crate::config::MeshConfiguration::log_events),
//!    the default logging handler defined in [logging](crate::logging).

use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

use crate::events::*;
use crate::logging::Logger;

/// Pointer to a handler closure, parametrised by the argument (for our use case, event) type.
pub type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// Stores the two optional handlers enabled for an event type: one user-defined handler, and one
/// logging handler defined in [`crate::logging`].
pub(crate) struct HandlerPair<T: Logger> {
    pub(crate) user_defined_handler: Option<HandlerPtr<T>>,
    pub(crate) logging_handler: Option<HandlerPtr<T>>,
}

impl<T: Logger> HandlerPair<T> {
    // Checks if no event handlers are defined for this event.
    pub(crate) fn is_empty(&self) -> bool {
        self.user_defined_handler.is_none() && self.logging_handler.is_none()
    }

    /// Creates a new `HandlerPair` with the user-defined handler, and the default logging handler
    /// if logging is enabled.
    pub(crate) fn new(log: bool, user_defined_handler: Option<HandlerPtr<T>>) -> HandlerPair<T> {
        HandlerPair {
            user_defined_handler,
            logging_handler: if log { Some(T::get_logger()) } else { None },
        }
    }

    fn fire(&self, event: &T) {
        self.user_defined_handler
            .iter()
            .for_each(|handler| handler(event));
        self.logging_handler
            .iter()
            .for_each(|handler| handler(event));
    }
}

/// Stores the `HandlerPair` of user-defined and optional logging handlers for each pre-defined
/// event type from [events](crate::events).
pub struct EventHandlers {
    pub(crate) insert_ballot_handlers: HandlerPair<InsertBallotEvent>,
    pub(crate) insert_block_handlers: HandlerPair<InsertBlockEvent>,
    pub(crate) hare_output_handlers: HandlerPair<HareOutputEvent>,
    pub(crate) apply_layer_handlers: HandlerPair<ApplyLayerEvent>,
    pub(crate) revert_state_handlers: HandlerPair<RevertStateEvent>,
}

impl EventHandlers {
    /// Creates the [handler pairs](HandlerPair) for all pre-defined event types given the
    /// user-defined handlers, and information on whether logging is enabled.
    pub fn new(
        log: bool,
        insert_ballot_handler: Option<HandlerPtr<InsertBallotEvent>>,
        insert_block_handler: Option<HandlerPtr<InsertBlockEvent>>,
        hare_output_handler: Option<HandlerPtr<HareOutputEvent>>,
        apply_layer_handler: Option<HandlerPtr<ApplyLayerEvent>>,
        revert_state_handler: Option<HandlerPtr<RevertStateEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            insert_ballot_handlers: HandlerPair::new(log, insert_ballot_handler),
            insert_block_handlers: HandlerPair::new(log, insert_block_handler),
            hare_output_handlers: HandlerPair::new(log, hare_output_handler),
            apply_layer_handlers: HandlerPair::new(log, apply_layer_handler),
            revert_state_handlers: HandlerPair::new(log, revert_state_handler),
        }
    }

    /// Checks if no handlers are defined, i.e., neither user-defined handlers were provided nor
    /// logging is enabled. When this is the case the event bus thread need not be started.
    pub fn is_empty(&self) -> bool {
        self.insert_ballot_handlers.is_empty()
            && self.insert_block_handlers.is_empty()
            && self.hare_output_handlers.is_empty()
            && self.apply_layer_handlers.is_empty()
            && self.revert_state_handlers.is_empty()
    }

    /// Triggers the execution of each of the two handlers - the user-defined and the logging
    /// handler, if defined - for a given event type from [events](crate::events).
    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::InsertBallot(insert_ballot_event) => {
                self.insert_ballot_handlers.fire(&insert_ballot_event)
            }
            Event::InsertBlock(insert_block_event) => {
                self.insert_block_handlers.fire(&insert_block_event)
            }
            Event::HareOutput(hare_output_event) => {
                self.hare_output_handlers.fire(&hare_output_event)
            }
            Event::ApplyLayer(apply_layer_event) => {
                self.apply_layer_handlers.fire(&apply_layer_event)
            }
            Event::RevertState(revert_state_event) => {
                self.revert_state_handlers.fire(&revert_state_event)
            }
        }
    }
}

/// Starts the event bus thread, which runs an infinite loop until a shutdown signal is received
/// from the parent thread. In each iteration of the loop, the thread checks if it received any
/// event notifications, and if so, then triggers the execution of the handlers defined for the
/// event.
pub fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        match event_subscriber.try_recv() {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(TryRecvError::Empty) => thread::yield_now(),
            // The engine (event publisher) is gone; drain nothing further and wait for shutdown.
            Err(TryRecvError::Disconnected) => (),
        }
    })
}
