//! Error types for PetLife Core
//!
//! Validation and construction failures are hard errors ([`PetLifeError`]).
//! A failed write to durable storage is not: it is reported as a
//! [`PersistenceWarning`] next to the (still correct) in-memory state.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for PetLife operations
pub type Result<T> = std::result::Result<T, PetLifeError>;

/// Main error type for PetLife operations
#[derive(Error, Debug)]
pub enum PetLifeError {
    /// Requested tick/hour count outside the permitted bound
    #[error("requested {requested} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Value the caller asked for
        requested: i64,
        /// Smallest accepted value
        min: i64,
        /// Largest accepted value
        max: i64,
    },

    /// No usable storage backend, even after failover
    #[error("simulation engine unavailable: {0}")]
    UninitializedEngine(String),

    /// Unrecognized action under the strict action policy
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        /// What was being attempted
        context: String,
        /// Underlying failure
        source: Box<PetLifeError>,
    },
}

impl PetLifeError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True when the error was raised by input validation, before any mutation
    pub fn is_validation(&self) -> bool {
        match self {
            Self::OutOfRange { .. } | Self::InvalidAction(_) => true,
            Self::WithContext { source, .. } => source.is_validation(),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for PetLifeError {
    fn from(e: rusqlite::Error) -> Self {
        PetLifeError::Storage(e.to_string())
    }
}

impl From<toml::de::Error> for PetLifeError {
    fn from(e: toml::de::Error) -> Self {
        PetLifeError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for PetLifeError {
    fn from(e: toml::ser::Error) -> Self {
        PetLifeError::Config(e.to_string())
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PetLifeError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Into::<PetLifeError>::into(e).context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Into::<PetLifeError>::into(e).context(f()))
    }
}

/// A flush that did not reach durable storage.
///
/// The in-memory state stays authoritative; ticks since the last successful
/// flush are lost if the process restarts before the next one succeeds.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("persistence warning for '{identity}' on {backend}: {reason}")]
pub struct PersistenceWarning {
    /// Simulation identity whose write failed
    pub identity: String,
    /// Name of the backend that rejected the write
    pub backend: String,
    /// Backend-reported failure
    pub reason: String,
    /// When the write was attempted
    pub at: DateTime<Utc>,
}

impl PersistenceWarning {
    /// Build a warning from a failed save
    pub fn new(identity: impl Into<String>, backend: impl Into<String>, err: &PetLifeError) -> Self {
        Self {
            identity: identity.into(),
            backend: backend.into(),
            reason: err.to_string(),
            at: Utc::now(),
        }
    }
}
