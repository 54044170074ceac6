//! State store - in-memory authoritative state with deferred writes
//!
//! [`StateStore`] owns the [`SimulationState`] and applies the decay model.
//! Nothing here writes to storage implicitly: `advance`, `apply_effect` and
//! `reset` only touch memory and bump a revision counter. Persisting is
//! either [`StateStore::flush`] (synchronous) or [`StateStore::pending_write`]
//! followed by [`PendingWrite::commit`], which lets a caller release its lock
//! before doing I/O.
//!
//! # Decay model
//!
//! One tick adds the configured per-tick delta to each vital and clamps the
//! result. `advance(n)` is literally `n` single steps, so a batch and the
//! equivalent sequence of single ticks produce bit-identical vitals.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::SimulationClock;
use crate::config::EngineConfig;
use crate::error::{PersistenceWarning, Result, ResultExt};
use crate::state::{SimulationState, Vitals};
use crate::storage::StorageBackend;

/// Decay and reset parameters of a store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    /// Signed per-tick delta
    pub decay: Vitals,
    /// Vitals of a fresh pet
    pub defaults: Vitals,
    /// Display name of a fresh pet
    pub pet_name: String,
    /// Tick accounting
    pub clock: SimulationClock,
    /// Expiry hint passed to the backend
    pub ttl: Option<Duration>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            decay: config.decay,
            defaults: config.defaults,
            pet_name: config.pet_name.clone(),
            clock: SimulationClock::default(),
            ttl: config.state_ttl(),
        }
    }
}

impl StoreSettings {
    /// Settings derived from an engine configuration
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            decay: config.decay,
            defaults: config.defaults,
            pet_name: config.pet_name.clone(),
            clock: config.clock()?,
            ttl: config.state_ttl(),
        })
    }
}

/// Authoritative in-memory state plus its backend
#[derive(Debug)]
pub struct StateStore {
    state: SimulationState,
    settings: StoreSettings,
    backend: Arc<dyn StorageBackend>,
    revision: u64,
    persisted_revision: u64,
}

impl StateStore {
    /// Load `identity` from `backend`, synthesizing defaults when absent.
    ///
    /// A backend error is returned as-is so the caller can fail over.
    pub fn open(
        identity: &str,
        backend: Arc<dyn StorageBackend>,
        settings: StoreSettings,
    ) -> Result<Self> {
        let loaded = backend
            .load(identity)
            .with_context(|| format!("Loading '{identity}' from {}", backend.name()))?;

        let (state, revision) = match loaded {
            Some(state) => {
                tracing::info!(
                    identity,
                    backend = backend.name(),
                    energy = state.energy,
                    hunger = state.hunger,
                    mood = state.mood,
                    "Restored simulation state"
                );
                (state, 0)
            }
            None => {
                tracing::info!(identity, backend = backend.name(), "No stored state, starting fresh");
                let state =
                    SimulationState::new(identity, &settings.pet_name, settings.defaults, Utc::now());
                // Fresh state has never been written
                (state, 1)
            }
        };

        Ok(Self {
            state,
            settings,
            backend,
            revision,
            persisted_revision: 0,
        })
    }

    /// Identity of the simulation
    pub fn identity(&self) -> &str {
        &self.state.identity
    }

    /// Backend in use
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Decay and clock settings
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Read-only copy of the current state; no mutation, no flush
    pub fn snapshot(&self) -> SimulationState {
        self.state.clone()
    }

    /// Monotonic mutation counter
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True when memory holds changes not yet confirmed written
    pub fn is_dirty(&self) -> bool {
        self.revision > self.persisted_revision
    }

    /// Apply `ticks` decay steps and stamp the current time
    pub fn advance(&mut self, ticks: u32) -> SimulationState {
        self.advance_at(ticks, Utc::now())
    }

    /// Apply `ticks` decay steps and stamp `now` (never moving backwards)
    pub fn advance_at(&mut self, ticks: u32, now: DateTime<Utc>) -> SimulationState {
        self.decay(ticks);
        self.state.stamp(now);
        self.touch();
        tracing::debug!(
            identity = %self.state.identity,
            ticks,
            energy = self.state.energy,
            hunger = self.state.hunger,
            mood = self.state.mood,
            "Advanced simulation"
        );
        self.snapshot()
    }

    /// Passive catch-up: apply every whole tick elapsed since `last_updated`.
    ///
    /// `last_updated` moves forward by exactly the simulated span, so the
    /// partial tick remainder carries into the next call. Beyond the clock's
    /// cap the catch-up saturates and stamps `now`. Returns the ticks applied.
    pub fn catch_up_to(&mut self, now: DateTime<Utc>) -> u32 {
        let clock = self.settings.clock;
        let elapsed = clock.elapsed_ticks(self.state.last_updated, now);
        if elapsed == 0 {
            return 0;
        }

        let cap = clock.max_ticks();
        if elapsed > u64::from(cap) {
            tracing::warn!(
                identity = %self.state.identity,
                elapsed_ticks = elapsed,
                cap,
                "Elapsed time exceeds catch-up cap, saturating"
            );
            self.decay(cap);
            self.state.stamp(now);
            self.touch();
            return cap;
        }

        let ticks = elapsed as u32;
        self.decay(ticks);
        let advanced_to = self.state.last_updated + clock.span(ticks);
        self.state.stamp(advanced_to);
        self.touch();
        tracing::debug!(identity = %self.state.identity, ticks, "Passive catch-up");
        ticks
    }

    /// Add an interaction effect on top of the current state
    pub fn apply_effect(&mut self, effect: Vitals, now: DateTime<Utc>) -> SimulationState {
        self.state.apply(effect);
        self.state.stamp(now);
        self.touch();
        self.snapshot()
    }

    /// Reinitialize to default vitals with a fresh timestamp
    pub fn reset_at(&mut self, now: DateTime<Utc>) -> SimulationState {
        let last_updated = self.state.last_updated.max(now);
        self.state = SimulationState::new(
            self.state.identity.clone(),
            self.settings.pet_name.clone(),
            self.settings.defaults,
            last_updated,
        );
        self.touch();
        self.snapshot()
    }

    /// Persist the current state now. Always writes, even when clean.
    pub fn flush(&mut self) -> std::result::Result<(), PersistenceWarning> {
        let pending = self.pending_write();
        let revision = pending.commit()?;
        self.mark_persisted(revision);
        Ok(())
    }

    /// Capture the current state for a write performed outside any lock
    pub fn pending_write(&self) -> PendingWrite {
        PendingWrite {
            state: self.snapshot(),
            revision: self.revision,
            ttl: self.settings.ttl,
            backend: Arc::clone(&self.backend),
        }
    }

    /// Record that `revision` reached storage
    pub fn mark_persisted(&mut self, revision: u64) {
        self.persisted_revision = self.persisted_revision.max(revision);
    }

    fn decay(&mut self, ticks: u32) {
        let delta = self.settings.decay;
        for _ in 0..ticks {
            self.state.apply(delta);
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

/// A state snapshot waiting to be written
#[derive(Debug, Clone)]
pub struct PendingWrite {
    state: SimulationState,
    revision: u64,
    ttl: Option<Duration>,
    backend: Arc<dyn StorageBackend>,
}

impl PendingWrite {
    /// Store revision this snapshot was taken at
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Snapshot being written
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Write the snapshot. Failure is logged and returned as a warning.
    pub fn commit(self) -> std::result::Result<u64, PersistenceWarning> {
        let identity = self.state.identity.as_str();
        match self.backend.save(identity, &self.state, self.ttl) {
            Ok(()) => {
                tracing::debug!(
                    identity,
                    backend = self.backend.name(),
                    revision = self.revision,
                    "State flushed"
                );
                Ok(self.revision)
            }
            Err(e) => {
                let warning = PersistenceWarning::new(identity, self.backend.name(), &e);
                tracing::warn!("{}", warning);
                Err(warning)
            }
        }
    }
}
