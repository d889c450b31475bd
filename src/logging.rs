/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The mesh logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values
//! are always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. Identifiers are printed as the
//! first seven characters of their Base64 encoding.

use std::time::SystemTime;

use log;

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const INSERT_BALLOT: &str = "InsertBallot";
pub const INSERT_BLOCK: &str = "InsertBlock";
pub const HARE_OUTPUT: &str = "HareOutput";
pub const APPLY_LAYER: &str = "ApplyLayer";
pub const REVERT_STATE: &str = "RevertState";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for InsertBallotEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |insert_ballot_event: &InsertBallotEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                INSERT_BALLOT,
                secs_since_unix_epoch(insert_ballot_event.timestamp),
                insert_ballot_event.ballot,
                insert_ballot_event.layer,
                insert_ballot_event.malicious,
            )
        };
        Box::new(logger)
    }
}

impl Logger for InsertBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |insert_block_event: &InsertBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                INSERT_BLOCK,
                secs_since_unix_epoch(insert_block_event.timestamp),
                insert_block_event.block,
                insert_block_event.layer,
            )
        };
        Box::new(logger)
    }
}

impl Logger for HareOutputEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |hare_output_event: &HareOutputEvent| {
            log::info!(
                "{}, {}, {}, {}",
                HARE_OUTPUT,
                secs_since_unix_epoch(hare_output_event.timestamp),
                hare_output_event.layer,
                hare_output_event.block,
            )
        };
        Box::new(logger)
    }
}

impl Logger for ApplyLayerEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |apply_layer_event: &ApplyLayerEvent| {
            log::info!(
                "{}, {}, {}, {}",
                APPLY_LAYER,
                secs_since_unix_epoch(apply_layer_event.timestamp),
                apply_layer_event.layer,
                apply_layer_event.block,
            )
        };
        Box::new(logger)
    }
}

impl Logger for RevertStateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |revert_state_event: &RevertStateEvent| {
            log::info!(
                "{}, {}, {}",
                REVERT_STATE,
                secs_since_unix_epoch(revert_state_event.timestamp),
                revert_state_event.revert_to,
            )
        };
        Box::new(logger)
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Event occured before the Unix Epoch.")
        .as_secs()
}
