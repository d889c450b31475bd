/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A monotonic layer ticker: divides wall-clock time into layers of fixed duration starting at a
//! genesis instant, and notifies subscribers of each layer as it becomes current.
//!
//! Subscribers receive layer ids in non-decreasing order over a channel, and every layer that
//! becomes current after the subscription is delivered at least once: if the notifier oversleeps
//! a boundary, the missed layers are caught up in order. Before the genesis instant no ticks are
//! delivered; the first tick is layer 0, at genesis.
//!
//! The notifier is a plain worker thread with a shutdown channel; [`LayerClock::close`] is
//! idempotent and is also invoked on drop.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use log;

use crate::types::basic::LayerId;

pub struct LayerClock {
    genesis: SystemTime,
    layer_duration: Duration,
    subscribers: Arc<Mutex<Vec<Sender<LayerId>>>>,
    last_ticked: Arc<Mutex<Option<LayerId>>>,
    shutdown: Option<Sender<()>>,
    pending_shutdown: Option<Receiver<()>>,
    notifier: Option<JoinHandle<()>>,
}

impl LayerClock {
    /// Create a clock ticking every `layer_duration` from `genesis`.
    ///
    /// # Panics
    /// Panics if `layer_duration` is zero.
    pub fn new(genesis: SystemTime, layer_duration: Duration) -> LayerClock {
        assert!(
            !layer_duration.is_zero(),
            "layer duration must be non-zero"
        );
        let last_ticked = match SystemTime::now().duration_since(genesis) {
            Ok(elapsed) => Some(layer_of(elapsed, layer_duration)),
            Err(_) => None,
        };
        let (shutdown, pending_shutdown) = mpsc::channel();
        LayerClock {
            genesis,
            layer_duration,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            last_ticked: Arc::new(Mutex::new(last_ticked)),
            shutdown: Some(shutdown),
            pending_shutdown: Some(pending_shutdown),
            notifier: None,
        }
    }

    /// The layer the wall clock is currently in (layer 0 before genesis).
    pub fn current_layer(&self) -> LayerId {
        match SystemTime::now().duration_since(self.genesis) {
            Ok(elapsed) => layer_of(elapsed, self.layer_duration),
            Err(_) => LayerId::new(0),
        }
    }

    /// The last layer delivered to subscribers (layer 0 if none has been yet).
    pub fn last_ticked_layer(&self) -> LayerId {
        self.last_ticked
            .lock()
            .unwrap()
            .unwrap_or(LayerId::new(0))
    }

    /// Register a subscriber. Layers that become current from this point on are delivered on the
    /// returned channel.
    pub fn subscribe(&self) -> Receiver<LayerId> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.lock().unwrap().push(sender);
        receiver
    }

    /// Start the notifier thread. Calling it a second time has no effect.
    pub fn start_notifying(&mut self) {
        let Some(shutdown_signal) = self.pending_shutdown.take() else {
            return;
        };
        let genesis = self.genesis;
        let layer_duration = self.layer_duration;
        let subscribers = Arc::clone(&self.subscribers);
        let last_ticked = Arc::clone(&self.last_ticked);

        self.notifier = Some(thread::spawn(move || loop {
            // Deliver every layer that has become current since the last tick.
            if let Ok(elapsed) = SystemTime::now().duration_since(genesis) {
                let current = layer_of(elapsed, layer_duration);
                let mut last = last_ticked.lock().unwrap();
                let first_due = match *last {
                    None => 0,
                    Some(layer) => layer.int() + 1,
                };
                if first_due <= current.int() {
                    let mut subscribers = subscribers.lock().unwrap();
                    for due in first_due..=current.int() {
                        let layer = LayerId::new(due);
                        log::debug!("layer {} has started", layer);
                        subscribers.retain(|subscriber| subscriber.send(layer).is_ok());
                    }
                    *last = Some(current);
                }
            }

            // Sleep until the next layer boundary (or genesis), unless shut down first.
            let wait = match SystemTime::now().duration_since(genesis) {
                Ok(elapsed) => {
                    let next = layer_of(elapsed, layer_duration).add(1);
                    layer_duration * next.int() - elapsed
                }
                Err(until_genesis) => until_genesis.duration(),
            };
            match shutdown_signal.recv_timeout(wait) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => (),
            }
        }));
    }

    /// Stop the notifier. Idempotent: further calls (and drop) have no effect.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(notifier) = self.notifier.take() {
            let _ = notifier.join();
        }
    }
}

impl Drop for LayerClock {
    fn drop(&mut self) {
        self.close()
    }
}

fn layer_of(elapsed: Duration, layer_duration: Duration) -> LayerId {
    LayerId::new((elapsed.as_nanos() / layer_duration.as_nanos()) as u32)
}
