//! PetLife Core - one virtual pet shared by every device
//!
//! PetLife keeps a single simulated pet whose vitals (energy, hunger, mood)
//! decay over simulated time and respond to user interactions. Every caller
//! sees and mutates the same pet; writes to storage are deferred so a long
//! absence costs one write, not one per simulated hour.
//!
//! # Architecture
//!
//! 1. **Clock** (`clock`): tick accounting and catch-up bounds
//! 2. **State** (`state`): vitals, clamping, the persisted record
//! 3. **Store** (`store`): decay model, revisions, deferred writes
//! 4. **Interactions** (`interaction`): feed / greet / play as deltas
//! 5. **Manager** (`manager`): lazily built shared instance with failover
//! 6. **Storage** (`storage`): memory, JSON file and SQLite backends
//!
//! # Quick Start
//!
//! ```
//! use petlife_core::{EngineConfig, SimulationManager};
//!
//! let config = EngineConfig::default().with_storage_url("memory://");
//! let manager = SimulationManager::from_config(config).unwrap();
//! let pet = manager.get().unwrap();
//!
//! let outcome = pet.interact("iphone-123", "feed").unwrap();
//! assert_eq!(outcome.state.hunger, 9.0);
//!
//! let outcome = pet.catch_up("iphone-123", 8).unwrap();
//! assert!(outcome.persistence.is_none());
//! ```

#![deny(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod clock;
pub mod config;
pub mod error;
pub mod interaction;
pub mod manager;
pub mod state;
pub mod storage;
pub mod store;

pub use clock::SimulationClock;
pub use config::{ActionPolicy, EngineConfig, FlushPolicy, StorageSettings};
pub use error::{PersistenceWarning, PetLifeError, Result};
pub use interaction::{Action, Interaction, InteractionProcessor, InteractionRecord};
pub use manager::{Outcome, SharedSimulation, SimulationManager};
pub use state::{SimulationState, Vitals};
pub use storage::{FileStorage, MemoryStorage, OpenBackend, SqliteStorage, StorageBackend, StorageTarget};
pub use store::{PendingWrite, StateStore, StoreSettings};

/// Version of PetLife Core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
