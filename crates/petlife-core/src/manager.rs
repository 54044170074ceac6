//! Shared simulation manager - one pet for every caller
//!
//! [`SimulationManager`] is a context object owned by the request layer. It
//! lazily builds the single [`SharedSimulation`] with double-checked
//! initialization (fast read check, then re-check under the write lock), so
//! concurrent first accesses construct exactly one store and issue exactly
//! one backend load.
//!
//! # Locking
//!
//! ```text
//!   store: Mutex<StateStore>      compute: catch-up, tick, effect, reset
//!         │  capture PendingWrite, release
//!         ▼
//!   persist_gate: Mutex<u64>      I/O: write snapshots in revision order
//! ```
//!
//! The state lock is never held across a backend write. The persist gate
//! remembers the newest revision written and drops older snapshots, so
//! out-of-order writers cannot roll storage back.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use crate::clock::SimulationClock;
use crate::config::{EngineConfig, FlushPolicy};
use crate::error::{PersistenceWarning, PetLifeError, Result};
use crate::interaction::{InteractionProcessor, InteractionRecord};
use crate::state::SimulationState;
use crate::storage::OpenBackend;
use crate::store::{PendingWrite, StateStore, StoreSettings};

/// State returned by a mutating operation, plus any persistence warning
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// In-memory state after the operation; authoritative even on warning
    pub state: SimulationState,
    /// Set when the operation's write did not reach storage
    pub persistence: Option<PersistenceWarning>,
}

impl Outcome {
    fn new(state: SimulationState, persisted: std::result::Result<(), PersistenceWarning>) -> Self {
        Self {
            state,
            persistence: persisted.err(),
        }
    }
}

/// The single shared simulation
pub struct SharedSimulation {
    store: Mutex<StateStore>,
    persist_gate: Mutex<u64>,
    history: Mutex<VecDeque<InteractionRecord>>,
    processor: InteractionProcessor,
    clock: SimulationClock,
    flush_policy: FlushPolicy,
    history_limit: usize,
    backend_name: String,
}

impl fmt::Debug for SharedSimulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSimulation")
            .field("backend", &self.backend_name)
            .field("flush_policy", &self.flush_policy)
            .field("action_policy", &self.processor.policy())
            .finish()
    }
}

impl SharedSimulation {
    fn new(store: StateStore, config: &EngineConfig, clock: SimulationClock) -> Self {
        let backend_name = store.backend().name().to_string();
        Self {
            store: Mutex::new(store),
            persist_gate: Mutex::new(0),
            history: Mutex::new(VecDeque::with_capacity(config.history_limit)),
            processor: InteractionProcessor::new(config.action_policy),
            clock,
            flush_policy: config.flush_policy,
            history_limit: config.history_limit,
            backend_name,
        }
    }

    /// Name of the backend in use (after any failover)
    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// Current state with elapsed wall-clock time applied.
    ///
    /// `device` is only used for logging.
    pub fn status(&self, device: &str) -> Result<Outcome> {
        let (state, pending) = {
            let mut store = self.store.lock();
            let ticks = store.catch_up_to(Utc::now());
            let pending = (ticks > 0).then(|| self.deferred(&store)).flatten();
            (store.snapshot(), pending)
        };

        tracing::debug!(device, energy = state.energy, hunger = state.hunger, mood = state.mood, "Status read");
        Ok(Outcome::new(state, self.persist_optional(pending)))
    }

    /// Apply elapsed time, one tick, then the action's effect
    pub fn interact(&self, device: &str, action: &str) -> Result<Outcome> {
        // Rejected actions never reach the lock
        let action = self.processor.validate(action)?;

        let (interaction, pending) = {
            let mut store = self.store.lock();
            let now = Utc::now();
            store.catch_up_to(now);
            let interaction = self.processor.apply_at(&mut store, action, now);
            // Recorded under the state lock so history follows mutation order
            self.record(InteractionRecord::new(device, &interaction, interaction.state.last_updated));
            (interaction, self.deferred(&store))
        };

        tracing::info!(device, action = %interaction.action, applied = interaction.applied, "Interaction");

        Ok(Outcome::new(interaction.state, self.persist_optional(pending)))
    }

    /// Apply elapsed time, then `ticks` extra decay steps.
    ///
    /// `ticks` must lie in `1..=max_ticks`; persisted only under the
    /// immediate policy.
    pub fn advance(&self, device: &str, ticks: u32) -> Result<Outcome> {
        let max = self.clock.max_ticks();
        if ticks == 0 || ticks > max {
            return Err(PetLifeError::OutOfRange {
                requested: i64::from(ticks),
                min: 1,
                max: i64::from(max),
            });
        }

        let (state, pending) = {
            let mut store = self.store.lock();
            let now = Utc::now();
            store.catch_up_to(now);
            let state = store.advance_at(ticks, now);
            (state, self.deferred(&store))
        };

        tracing::debug!(device, ticks, "Advance applied");
        Ok(Outcome::new(state, self.persist_optional(pending)))
    }

    /// Compensate `hours` of absence in one critical section and one write.
    ///
    /// Wall-clock time not yet applied is settled first; the requested hours
    /// are simulated on top of it. Fails with `OutOfRange` before any
    /// mutation if `hours` is outside `1..=max_hours` (720 with the default
    /// clock).
    pub fn catch_up(&self, device: &str, hours: i64) -> Result<Outcome> {
        let ticks = self.clock.ticks_for_hours(hours)?;

        let (state, pending) = {
            let mut store = self.store.lock();
            let now = Utc::now();
            store.catch_up_to(now);
            let state = store.advance_at(ticks, now);
            (state, store.pending_write())
        };

        tracing::info!(device, hours, ticks, "Catch-up applied");
        Ok(Outcome::new(state, self.persist(pending)))
    }

    /// Reinitialize the shared pet to defaults. Affects every caller.
    pub fn reset(&self, device: &str) -> Result<Outcome> {
        let (state, pending) = {
            let mut store = self.store.lock();
            let state = store.reset_at(Utc::now());
            (state, self.deferred(&store))
        };

        tracing::info!(device, "Shared simulation reset");
        Ok(Outcome::new(state, self.persist_optional(pending)))
    }

    /// Write the current state now, whether or not it changed
    pub fn flush(&self) -> std::result::Result<(), PersistenceWarning> {
        let pending = self.store.lock().pending_write();
        self.persist(pending)
    }

    /// Copy of the current state, without applying elapsed time
    pub fn snapshot(&self) -> SimulationState {
        self.store.lock().snapshot()
    }

    /// True when in-memory changes have not been written yet
    pub fn is_dirty(&self) -> bool {
        self.store.lock().is_dirty()
    }

    /// Recent interactions, oldest first
    pub fn history(&self) -> Vec<InteractionRecord> {
        self.history.lock().iter().cloned().collect()
    }

    fn deferred(&self, store: &StateStore) -> Option<PendingWrite> {
        match self.flush_policy {
            FlushPolicy::Immediate => Some(store.pending_write()),
            FlushPolicy::Deferred => None,
        }
    }

    fn persist_optional(
        &self,
        pending: Option<PendingWrite>,
    ) -> std::result::Result<(), PersistenceWarning> {
        pending.map_or(Ok(()), |p| self.persist(p))
    }

    fn persist(&self, pending: PendingWrite) -> std::result::Result<(), PersistenceWarning> {
        let mut newest = self.persist_gate.lock();
        if pending.revision() < *newest {
            tracing::debug!(
                revision = pending.revision(),
                newest = *newest,
                "Skipping superseded snapshot"
            );
            return Ok(());
        }

        let revision = pending.commit()?;
        *newest = revision;
        self.store.lock().mark_persisted(revision);
        Ok(())
    }

    fn record(&self, record: InteractionRecord) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.lock();
        while history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(record);
    }
}

impl Drop for SharedSimulation {
    fn drop(&mut self) {
        let store = self.store.get_mut();
        if store.is_dirty() {
            tracing::info!(identity = store.identity(), "Flushing unsaved state on drop");
            // Failure is already logged by the write path
            let _ = store.flush();
        }
    }
}

/// Owner of the lazily constructed [`SharedSimulation`]
pub struct SimulationManager {
    config: EngineConfig,
    primary: Box<dyn OpenBackend>,
    fallback: Option<Box<dyn OpenBackend>>,
    instance: RwLock<Option<Arc<SharedSimulation>>>,
    constructions: AtomicUsize,
}

impl fmt::Debug for SimulationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationManager")
            .field("identity", &self.config.identity)
            .field("primary", &self.primary.describe())
            .field("fallback", &self.fallback.as_ref().map(|b| b.describe()))
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl SimulationManager {
    /// Manager with a primary backend and a local fallback
    pub fn new(
        config: EngineConfig,
        primary: impl OpenBackend + 'static,
        fallback: impl OpenBackend + 'static,
    ) -> Self {
        Self {
            config,
            primary: Box::new(primary),
            fallback: Some(Box::new(fallback)),
            instance: RwLock::new(None),
            constructions: AtomicUsize::new(0),
        }
    }

    /// Manager whose only backend is `primary`
    pub fn without_fallback(config: EngineConfig, primary: impl OpenBackend + 'static) -> Self {
        Self {
            config,
            primary: Box::new(primary),
            fallback: None,
            instance: RwLock::new(None),
            constructions: AtomicUsize::new(0),
        }
    }

    /// Manager using the storage targets resolved from `config`
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let primary = config.storage.primary_target()?;
        let fallback = config.storage.fallback_target();
        Ok(Self::new(config, primary, fallback))
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared simulation, constructing it on first use
    pub fn get(&self) -> Result<Arc<SharedSimulation>> {
        if let Some(instance) = self.instance.read().as_ref() {
            return Ok(Arc::clone(instance));
        }

        let mut slot = self.instance.write();
        if let Some(instance) = slot.as_ref() {
            return Ok(Arc::clone(instance));
        }

        let instance = Arc::new(self.construct()?);
        *slot = Some(Arc::clone(&instance));
        Ok(instance)
    }

    /// True once the shared simulation exists
    pub fn is_initialized(&self) -> bool {
        self.instance.read().is_some()
    }

    /// How many times a store has been constructed
    pub fn construction_count(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    /// Flush pending changes before the process exits
    pub fn shutdown(&self) -> Option<PersistenceWarning> {
        let instance = self.instance.read().as_ref().map(Arc::clone)?;
        if !instance.is_dirty() {
            return None;
        }
        tracing::info!(identity = %self.config.identity, "Flushing shared simulation on shutdown");
        instance.flush().err()
    }

    fn construct(&self) -> Result<SharedSimulation> {
        self.config.validate()?;
        let settings = StoreSettings::from_config(&self.config)?;
        let clock = settings.clock;
        let identity = self.config.identity.as_str();

        let primary_error = match self.open_store(self.primary.as_ref(), identity, &settings) {
            Ok(store) => return Ok(self.finish(store, clock)),
            Err(e) => e,
        };

        let Some(fallback) = self.fallback.as_deref() else {
            return Err(PetLifeError::UninitializedEngine(format!(
                "{}: {}",
                self.primary.describe(),
                primary_error
            )));
        };

        tracing::warn!(
            primary = %self.primary.describe(),
            fallback = %fallback.describe(),
            error = %primary_error,
            "Primary storage unavailable, failing over"
        );

        match self.open_store(fallback, identity, &settings) {
            Ok(store) => Ok(self.finish(store, clock)),
            Err(fallback_error) => Err(PetLifeError::UninitializedEngine(format!(
                "{}: {}; fallback {}: {}",
                self.primary.describe(),
                primary_error,
                fallback.describe(),
                fallback_error
            ))),
        }
    }

    fn open_store(
        &self,
        target: &dyn OpenBackend,
        identity: &str,
        settings: &StoreSettings,
    ) -> Result<StateStore> {
        let backend = target.open()?;
        StateStore::open(identity, backend, settings.clone())
    }

    fn finish(&self, store: StateStore, clock: SimulationClock) -> SharedSimulation {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            identity = store.identity(),
            backend = store.backend().name(),
            "Shared simulation initialized"
        );
        SharedSimulation::new(store, &self.config, clock)
    }
}
