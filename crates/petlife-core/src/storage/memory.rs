//! In-memory storage backend

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use super::StorageBackend;
use crate::error::Result;
use crate::state::SimulationState;

/// Process-local backend. Counts loads and saves so callers can observe
/// how many durable round-trips an operation costs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, SimulationState>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `state` under its own identity
    pub fn with_state(state: SimulationState) -> Self {
        let storage = Self::new();
        storage
            .entries
            .write()
            .insert(super::state_key(&state.identity), state);
        storage
    }

    /// Number of `load` calls served so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of `save` calls served so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Stored copy for `identity`, without counting as a load
    pub fn peek(&self, identity: &str) -> Option<SimulationState> {
        self.entries.read().get(&super::state_key(identity)).cloned()
    }
}

impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self, identity: &str) -> Result<Option<SimulationState>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.peek(identity))
    }

    fn save(&self, identity: &str, state: &SimulationState, _expiry: Option<Duration>) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.entries
            .write()
            .insert(super::state_key(identity), state.clone());
        Ok(())
    }
}
