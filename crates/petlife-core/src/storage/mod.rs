//! Persistent Storage Layer
//!
//! The core only depends on the [`StorageBackend`] capability: load a state by
//! identity, save it with an optional expiry hint. Three implementations ship
//! with the crate:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     StorageBackend                       │
//! ├──────────────────┬──────────────────┬────────────────────┤
//! │  MemoryStorage   │   FileStorage    │   SqliteStorage    │
//! │  (process-local) │ (ephemeral disk) │ (keyed, TTL-aware) │
//! └──────────────────┴──────────────────┴────────────────────┘
//! ```
//!
//! Backends are opened lazily through [`OpenBackend`], so the shared engine
//! can fail over from a primary target to a local fallback.

pub mod file;
pub mod memory;
pub mod sqlite;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::SimulationState;

/// Key under which a simulation identity is stored
pub fn state_key(identity: &str) -> String {
    format!("petlife:state:{identity}")
}

/// Durable key/value persistence for [`SimulationState`]
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Short backend name for logs and warnings
    fn name(&self) -> &str;

    /// Load the state stored for `identity`; `Ok(None)` when absent or expired
    fn load(&self, identity: &str) -> Result<Option<SimulationState>>;

    /// Store `state` under `identity`. Backends may ignore `expiry`.
    fn save(&self, identity: &str, state: &SimulationState, expiry: Option<Duration>) -> Result<()>;
}

/// Factory that constructs a backend on demand
pub trait OpenBackend: Send + Sync {
    /// Construct the backend; failures trigger failover in the manager
    fn open(&self) -> Result<Arc<dyn StorageBackend>>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

impl<F> OpenBackend for F
where
    F: Fn() -> Result<Arc<dyn StorageBackend>> + Send + Sync,
{
    fn open(&self) -> Result<Arc<dyn StorageBackend>> {
        self()
    }

    fn describe(&self) -> String {
        "custom backend".to_string()
    }
}

/// A resolved storage location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum StorageTarget {
    /// Process-local map, lost on exit
    Memory,
    /// One JSON file per identity under a directory
    File(PathBuf),
    /// SQLite database file
    Sqlite(PathBuf),
}

impl OpenBackend for StorageTarget {
    fn open(&self) -> Result<Arc<dyn StorageBackend>> {
        Ok(match self {
            StorageTarget::Memory => Arc::new(MemoryStorage::new()),
            StorageTarget::File(dir) => Arc::new(FileStorage::open(dir)?),
            StorageTarget::Sqlite(path) => Arc::new(SqliteStorage::open(path)?),
        })
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageTarget::Memory => write!(f, "memory://"),
            StorageTarget::File(dir) => write!(f, "file://{}", dir.display()),
            StorageTarget::Sqlite(path) => write!(f, "sqlite://{}", path.display()),
        }
    }
}
