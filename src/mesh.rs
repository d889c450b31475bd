/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The mesh engine: ingests ballots and blocks, consumes the fast (hare) and slow (tortoise)
//! consensus streams, and drives the applied-layer watermark forward — or backward, when the two
//! streams disagree.
//!
//! ## Watermarks
//!
//! The engine maintains three watermarks plus a gap marker, all guarded by one mutex:
//!
//! - `latest`: the highest layer any ingested ballot or consensus input refers to.
//! - `processed`: the highest layer whose consensus inputs have been consumed.
//! - `in_state` ("latest layer in state"): the highest layer whose effects are reflected in the
//!   VM. After every public call, `latest >= processed >= in_state >= genesis`.
//! - `missing`: the lowest layer that could not be applied because of a data gap, if any.
//!
//! The mutex is held only for watermark reads and writes and for the malicious-ballot coordinate
//! step — never across VM, cache or executor work. Layer application itself is serialized by a
//! separate coarse lock, so the VM observes layers in exactly the order the watermarks advance.
//!
//! ## Selecting the block to apply
//!
//! For a layer the tortoise has verified, the applied choice comes from the contextually-valid
//! set: the block with the highest tick height, ties broken by the lexicographically smallest
//! id, or the empty choice when every settled decision is negative. For a layer beyond the
//! tortoise's reach, the hare output is authoritative. The fast stream thereby advances state
//! optimistically while the slow stream later reconciles.
//!
//! ## Revert
//!
//! When freshly settled validities contradict an applied choice, the engine rewinds the VM and
//! the tx-pool cache to the highest still-consistent layer and re-executes everything above it
//! under the new validities, producing fresh layer and aggregated hashes.

use std::cmp::max;
use std::collections::BTreeSet;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use log;

use crate::cancel::CancelToken;
use crate::config::MeshConfiguration;
use crate::events::{
    ApplyLayerEvent, Event, HareOutputEvent, InsertBallotEvent, InsertBlockEvent,
    RevertStateEvent,
};
use crate::executor::Executor;
use crate::ports::{BlockValidityUpdate, CacheError, Tortoise, TxCache, VmError, VmState};
use crate::store::kv_store::{KVGetError, KVStore, Key};
use crate::store::{MeshStore, StoreError};
use crate::types::ballot::Ballot;
use crate::types::basic::{BallotId, BlockId, LayerId, ProposalId, TransactionId};
use crate::types::block::{sort_blocks, Block};
use crate::types::layer::Layer;

/// Error returned by the public methods of [Mesh].
#[derive(Debug)]
pub enum MeshError {
    /// Error reading or writing the persistent store. Includes the distinguished not-found
    /// condition ([`MeshError::is_not_found`]) and the write-once violation for hare outputs.
    Store(StoreError),
    /// Error reported by the VM collaborator. Recoverable: retried on the next processing call.
    Vm(VmError),
    /// Error reported by the tx-pool cache collaborator. Recoverable like [`MeshError::Vm`].
    Cache(CacheError),
    /// The layer is beyond the tortoise's verified horizon and the hare has not delivered an
    /// output for it, so there is nothing to apply yet.
    MissingHareOutput(LayerId),
    /// The cancellation token was triggered. No side effects were left behind.
    Cancelled,
    /// An invariant violation. The engine is no longer trustworthy; callers should tear down.
    Fatal(String),
}

impl MeshError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MeshError::Store(err) if err.is_not_found())
    }
}

impl From<StoreError> for MeshError {
    fn from(value: StoreError) -> Self {
        MeshError::Store(value)
    }
}

impl From<KVGetError> for MeshError {
    fn from(value: KVGetError) -> Self {
        MeshError::Store(StoreError::KVGet(value))
    }
}

struct Watermarks {
    latest: LayerId,
    processed: LayerId,
    in_state: LayerId,
    missing: Option<LayerId>,
    /// A layer the hare reports as already executed upstream (optimistic execution). The engine
    /// skips VM and cache work for it and only commits the mesh records, unless a revert
    /// invalidates the note first.
    optimistic: Option<(LayerId, BlockId)>,
}

/// What the settled contextual validities of a layer say should have been applied.
enum ValidityChoice {
    /// At least one block is settled valid; this is the validity-order winner.
    Block(Block),
    /// Every settled decision is negative: the layer applies empty.
    Empty,
    /// No decision is settled at all; the fast stream's output remains authoritative.
    Undecided,
}

pub struct Mesh<K: KVStore, T: Tortoise, V: VmState, C: TxCache> {
    store: MeshStore<K>,
    tortoise: Arc<T>,
    executor: Executor<K, V, C>,
    cache: Arc<C>,
    genesis: LayerId,
    watermarks: Mutex<Watermarks>,
    // Serializes layer application: no two layers are ever applied concurrently, and the VM sees
    // them in watermark order.
    process_lock: Mutex<()>,
    event_publisher: Option<Sender<Event>>,
}

impl<K: KVStore, T: Tortoise, V: VmState, C: TxCache> Mesh<K, T, V, C> {
    /// Create the engine over the given store and collaborators.
    ///
    /// A fresh store is seeded with the genesis records. A store carrying earlier state is
    /// reconciled ("wake-up"): if the processed watermark ran ahead of the applied one, the VM
    /// and the cache are reverted to the last applied layer; re-execution happens on the next
    /// [`Mesh::process_layer`] call.
    pub fn new(
        mut store: MeshStore<K>,
        tortoise: Arc<T>,
        executor: Executor<K, V, C>,
        cache: Arc<C>,
        config: MeshConfiguration,
        event_publisher: Option<Sender<Event>>,
    ) -> Result<Self, MeshError> {
        let genesis = config.effective_genesis;
        store.initialize(genesis)?;

        let processed = max(store.processed()?, genesis);
        let in_state = max(store.last_applied()?, genesis);
        let latest = max(processed, store.latest_ballot_layer()?.unwrap_or(genesis));

        let mesh = Mesh {
            store,
            tortoise,
            executor,
            cache,
            genesis,
            watermarks: Mutex::new(Watermarks {
                latest,
                processed,
                in_state,
                missing: None,
                optimistic: None,
            }),
            process_lock: Mutex::new(()),
            event_publisher,
        };

        if processed > genesis && in_state < processed {
            log::info!(
                "wake-up: processed layer {} is ahead of applied layer {}, reverting",
                processed,
                in_state
            );
            mesh.executor.revert(&CancelToken::new(), in_state)?;
        }

        Ok(mesh)
    }

    /* ↓↓↓ Watermark getters ↓↓↓ */

    /// The highest layer any ingested ballot or consensus input refers to.
    pub fn latest_layer(&self) -> LayerId {
        self.watermarks.lock().unwrap().latest
    }

    /// The highest layer whose consensus inputs have been consumed.
    pub fn processed_layer(&self) -> LayerId {
        self.watermarks.lock().unwrap().processed
    }

    /// The highest layer whose effects are reflected in the VM.
    pub fn latest_layer_in_state(&self) -> LayerId {
        self.watermarks.lock().unwrap().in_state
    }

    /// The lowest layer that could not be applied because of a data gap, if any.
    pub fn missing_layer(&self) -> Option<LayerId> {
        self.watermarks.lock().unwrap().missing
    }

    /* ↓↓↓ Ingest ↓↓↓ */

    /// Ingest a ballot. If a different ballot by the same identity already exists for the same
    /// layer, both are marked malicious (set-once). Returns the ingested ballot's malicious flag.
    pub fn add_ballot(&self, ctx: &CancelToken, ballot: &Ballot) -> Result<bool, MeshError> {
        if ctx.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        let mut store = self.store.clone();
        let mut ballot = ballot.clone();
        {
            let mut watermarks = self.watermarks.lock().unwrap();
            if let Some(first) = store.first_ballot_by_identity(&ballot.node, ballot.layer)? {
                if first != ballot.id() {
                    log::warn!(
                        "ballot {} conflicts with ballot {} by {} in layer {}, marking malicious",
                        ballot.id(),
                        first,
                        ballot.node,
                        ballot.layer
                    );
                    store.set_malicious(&first)?;
                    ballot.set_malicious();
                }
            }
            store.add_ballot(&ballot)?;
            if ballot.layer > watermarks.latest {
                watermarks.latest = ballot.layer;
            }
        }
        Event::InsertBallot(InsertBallotEvent {
            timestamp: SystemTime::now(),
            ballot: ballot.id(),
            layer: ballot.layer,
            malicious: ballot.is_malicious(),
        })
        .publish(&self.event_publisher);
        Ok(ballot.is_malicious())
    }

    /// Ingest a block: persist it durably, link its transactions in the tx-pool cache, and
    /// notify the tortoise. The block is never linked before it is durably stored; a cache
    /// failure fails the call.
    pub fn add_block_with_txs(&self, ctx: &CancelToken, block: &Block) -> Result<(), MeshError> {
        if ctx.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        {
            let mut watermarks = self.watermarks.lock().unwrap();
            let mut store = self.store.clone();
            store.add_block(block)?;
            if block.layer > watermarks.latest {
                watermarks.latest = block.layer;
            }
        }
        self.cache
            .link_txs_with_block(block.layer, block.id(), &block.tx_ids)
            .map_err(MeshError::Cache)?;
        self.tortoise.on_block(block);
        Event::InsertBlock(InsertBlockEvent {
            timestamp: SystemTime::now(),
            block: block.id(),
            layer: block.layer,
        })
        .publish(&self.event_publisher);
        Ok(())
    }

    /// Link a proposal's transactions in the tx-pool cache.
    pub fn add_txs_from_proposal(
        &self,
        ctx: &CancelToken,
        layer: LayerId,
        proposal: ProposalId,
        tx_ids: &[TransactionId],
    ) -> Result<(), MeshError> {
        if ctx.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        self.cache
            .link_txs_with_proposal(layer, proposal, tx_ids)
            .map_err(MeshError::Cache)
    }

    /// Every ballot and block ingested for the given layer.
    pub fn get_layer(&self, layer: LayerId) -> Result<Layer, MeshError> {
        Ok(self.store.get_layer(layer)?)
    }

    /// Read a ballot with its malicious flag.
    pub fn ballot(&self, id: &BallotId) -> Result<Option<Ballot>, MeshError> {
        Ok(self.store.ballot(id)?)
    }

    /* ↓↓↓ Processing ↓↓↓ */

    /// Receive the hare's decision for a layer and process the layer.
    ///
    /// The decision is persisted (write-once) and forwarded to the tortoise before anything
    /// else. If the hare has not already executed the chosen block optimistically upstream
    /// (`already_executed == false`), the layer is executed here — before the tally step, so the
    /// (possibly empty) layer's cache update is observed by it. The call then falls through into
    /// [`Mesh::process_layer`].
    pub fn process_layer_per_hare_output(
        &self,
        ctx: &CancelToken,
        layer: LayerId,
        chosen: BlockId,
        already_executed: bool,
    ) -> Result<(), MeshError> {
        let _serial = self.process_lock.lock().unwrap();
        if ctx.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        let block = if chosen.is_empty() {
            log::info!("received empty hare output for layer {}", layer);
            None
        } else {
            Some(
                self.store
                    .block(&chosen)?
                    .ok_or_else(|| block_not_found(chosen))?,
            )
        };

        self.store.clone().set_hare_output(layer, chosen)?;
        Event::HareOutput(HareOutputEvent {
            timestamp: SystemTime::now(),
            layer,
            block: chosen,
        })
        .publish(&self.event_publisher);
        self.tortoise.on_hare_output(layer, chosen);

        let next_in_state = {
            let mut watermarks = self.watermarks.lock().unwrap();
            if layer > watermarks.latest {
                watermarks.latest = layer;
            }
            if already_executed {
                watermarks.optimistic = Some((layer, chosen));
            }
            watermarks.in_state.add(1)
        };

        // Execute here only when the layer directly extends the applied state; layers further
        // out are picked up, in order, by the state advance below.
        if !already_executed && layer == next_in_state {
            match &block {
                None => self.executor.execute_empty(ctx, layer)?,
                Some(block) => self.executor.execute_block(ctx, layer, block)?,
            }
        }

        self.process_layer_inner(ctx, layer)
    }

    /// Consume the consensus inputs for a layer: tally votes, fold the tortoise's settled
    /// validities into the store (reverting applied state if they contradict it), and advance
    /// the applied watermark as far as the available inputs allow.
    ///
    /// The advance may run past `layer` when the tortoise verified several layers at once. The
    /// processed watermark always advances to at least `layer`, even when the state advance
    /// fails — the consensus input was consumed, and only the application remains to be retried.
    pub fn process_layer(&self, ctx: &CancelToken, layer: LayerId) -> Result<(), MeshError> {
        let _serial = self.process_lock.lock().unwrap();
        self.process_layer_inner(ctx, layer)
    }

    // Requires the processing lock to be held.
    fn process_layer_inner(&self, ctx: &CancelToken, layer: LayerId) -> Result<(), MeshError> {
        if ctx.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        if layer <= self.genesis {
            return Ok(());
        }
        log::debug!("processing layer {}", layer);

        self.tortoise.tally_votes(ctx, layer);
        if ctx.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        let (verified, updates) = self.tortoise.updates();

        let mut store = self.store.clone();
        if let Some(revert_to) = self.apply_validity_updates(&mut store, &updates)? {
            self.revert_state(ctx, &mut store, revert_to)?;
        }

        let processed = {
            let mut watermarks = self.watermarks.lock().unwrap();
            if layer > watermarks.processed {
                watermarks.processed = layer;
            }
            watermarks.processed
        };
        store.set_processed(processed)?;

        self.advance_state(ctx, &mut store, verified, processed)
    }

    /* ↓↓↓ Folding tortoise updates into the store ↓↓↓ */

    /// Persist the settled validities. Returns the revert target if any update contradicts the
    /// applied decision of an already-applied layer: the highest layer below the lowest
    /// contradiction.
    fn apply_validity_updates(
        &self,
        store: &mut MeshStore<K>,
        updates: &[BlockValidityUpdate],
    ) -> Result<Option<LayerId>, MeshError> {
        if updates.is_empty() {
            return Ok(None);
        }
        let in_state = self.watermarks.lock().unwrap().in_state;

        let mut touched = BTreeSet::new();
        for update in updates {
            log::debug!(
                "block {} at layer {} settled {}",
                update.block,
                update.layer,
                if update.validity { "valid" } else { "invalid" }
            );
            store.set_validity(&update.block, update.validity)?;
            if update.layer > self.genesis && update.layer <= in_state {
                touched.insert(update.layer);
            }
        }

        for layer in touched {
            let expected = match self.validity_choice(store, layer)? {
                ValidityChoice::Block(block) => block.id(),
                ValidityChoice::Empty => BlockId::EMPTY,
                ValidityChoice::Undecided => continue,
            };
            let recorded = store.applied(layer)?.ok_or_else(|| {
                MeshError::Fatal(format!(
                    "applied record for layer {} is missing although the layer is in state",
                    layer
                ))
            })?;
            if recorded != expected {
                log::info!(
                    "settled validities contradict applied block {} at layer {} (now {})",
                    recorded,
                    layer,
                    expected
                );
                return Ok(Some(layer.sub(1)));
            }
        }
        Ok(None)
    }

    /// Rewind the VM, the cache and the applied records to `revert_to`. Re-execution of the
    /// layers above happens in the state advance of the same processing pass.
    fn revert_state(
        &self,
        ctx: &CancelToken,
        store: &mut MeshStore<K>,
        revert_to: LayerId,
    ) -> Result<(), MeshError> {
        log::info!("reverting state to layer {}", revert_to);
        self.executor.revert(ctx, revert_to)?;
        store.revert_applied_above(revert_to)?;
        {
            let mut watermarks = self.watermarks.lock().unwrap();
            watermarks.in_state = revert_to;
            watermarks.optimistic = None;
        }
        Event::RevertState(RevertStateEvent {
            timestamp: SystemTime::now(),
            revert_to,
        })
        .publish(&self.event_publisher);
        Ok(())
    }

    /* ↓↓↓ Advancing the applied state ↓↓↓ */

    fn advance_state(
        &self,
        ctx: &CancelToken,
        store: &mut MeshStore<K>,
        verified: LayerId,
        target: LayerId,
    ) -> Result<(), MeshError> {
        loop {
            let (next, optimistic) = {
                let watermarks = self.watermarks.lock().unwrap();
                (watermarks.in_state.add(1), watermarks.optimistic)
            };
            if next > target {
                return Ok(());
            }
            if ctx.is_cancelled() {
                return Err(MeshError::Cancelled);
            }

            let choice = match self.layer_choice(store, next, verified) {
                Ok(choice) => choice,
                Err(err) => {
                    self.note_gap(&err, next);
                    return Err(err);
                }
            };
            let chosen = choice.as_ref().map(Block::id).unwrap_or(BlockId::EMPTY);

            let result = if store.applied(next)? == Some(chosen) {
                // Already durably applied, e.g. directly in the per-hare-output step.
                Ok(())
            } else if optimistic.map_or(false, |(l, b)| l == next && b == chosen) {
                self.executor.persist_applied(next, choice.as_ref())
            } else {
                match &choice {
                    None => self.executor.execute_empty(ctx, next),
                    Some(block) => self.executor.execute_block(ctx, next, block),
                }
            };
            if let Err(err) = result {
                self.note_gap(&err, next);
                return Err(err);
            }

            {
                let mut watermarks = self.watermarks.lock().unwrap();
                watermarks.in_state = next;
                if watermarks.missing.map_or(false, |missing| missing <= next) {
                    watermarks.missing = None;
                }
                if watermarks.optimistic.map_or(false, |(l, _)| l <= next) {
                    watermarks.optimistic = None;
                }
            }
            log::info!("applied {} at layer {}", chosen, next);
            Event::ApplyLayer(ApplyLayerEvent {
                timestamp: SystemTime::now(),
                layer: next,
                block: chosen,
            })
            .publish(&self.event_publisher);
        }
    }

    /// The block (or empty choice) to apply at `layer`, under the validity-order rule.
    fn layer_choice(
        &self,
        store: &MeshStore<K>,
        layer: LayerId,
        verified: LayerId,
    ) -> Result<Option<Block>, MeshError> {
        if layer <= verified {
            match self.validity_choice(store, layer)? {
                ValidityChoice::Block(block) => return Ok(Some(block)),
                ValidityChoice::Empty => return Ok(None),
                ValidityChoice::Undecided => {}
            }
        }
        match store.hare_output(layer) {
            Ok(chosen) if chosen.is_empty() => Ok(None),
            Ok(chosen) => Ok(Some(
                store.block(&chosen)?.ok_or_else(|| block_not_found(chosen))?,
            )),
            Err(err) if err.is_not_found() => Err(MeshError::MissingHareOutput(layer)),
            Err(err) => Err(err.into()),
        }
    }

    fn validity_choice(
        &self,
        store: &MeshStore<K>,
        layer: LayerId,
    ) -> Result<ValidityChoice, MeshError> {
        let ids = store.layer_block_ids(layer)?;
        let mut valid = Vec::new();
        let mut any_decided = false;
        for id in &ids {
            match store.contextual_validity(id)? {
                Some(true) => {
                    any_decided = true;
                    valid.push(*id);
                }
                Some(false) => any_decided = true,
                None => {}
            }
        }
        if !valid.is_empty() {
            let mut blocks = Vec::with_capacity(valid.len());
            for id in &valid {
                blocks.push(store.block(id)?.ok_or_else(|| block_not_found(*id))?);
            }
            let mut blocks = sort_blocks(blocks);
            Ok(ValidityChoice::Block(blocks.remove(0)))
        } else if any_decided {
            Ok(ValidityChoice::Empty)
        } else {
            Ok(ValidityChoice::Undecided)
        }
    }

    // A data gap makes the layer the lowest known-unappliable one; pending consensus input
    // (a missing hare output) does not.
    fn note_gap(&self, err: &MeshError, layer: LayerId) {
        if err.is_not_found() {
            log::warn!("data gap at layer {}, state advance stopped", layer);
            let mut watermarks = self.watermarks.lock().unwrap();
            if watermarks.missing.map_or(true, |missing| layer < missing) {
                watermarks.missing = Some(layer);
            }
        }
    }
}

fn block_not_found(block: BlockId) -> MeshError {
    MeshError::Store(StoreError::KVGet(KVGetError::ValueNotFound {
        key: Key::Block { block },
    }))
}
