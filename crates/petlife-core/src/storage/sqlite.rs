//! SqliteStorage - keyed state store with expiry
//!
//! SQLite in WAL mode, one row per identity. Each save upserts the row and
//! records an optional `expires_at_ms`; rows past their expiry load as
//! absent, which gives the same semantics as a TTL cache.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::StorageBackend;
use crate::error::{Result, ResultExt};
use crate::state::SimulationState;

/// SQLite-backed state store
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) the database in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating database directory '{}'", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Opening SQLite '{}'", path.display()))?;

        // WAL: concurrent readers, serialized writers
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("Configuring SQLite pragmas")?;

        Self::with_connection(conn)
    }

    /// Private in-memory database, mainly for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Idempotent DDL
    fn migrate(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS pet_state (
                state_key      TEXT PRIMARY KEY,
                payload_json   TEXT NOT NULL,
                saved_at_ms    INTEGER NOT NULL,
                expires_at_ms  INTEGER
            );
            ",
            )
            .context("Migrating SQLite schema")?;
        Ok(())
    }

    /// Delete rows whose expiry has passed. Returns the number removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now_ms = Utc::now().timestamp_millis();
        let removed = self.conn.lock().execute(
            "DELETE FROM pet_state WHERE expires_at_ms IS NOT NULL AND expires_at_ms <= ?1",
            params![now_ms],
        )?;
        Ok(removed)
    }
}

impl StorageBackend for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn load(&self, identity: &str) -> Result<Option<SimulationState>> {
        let now_ms = Utc::now().timestamp_millis();
        let payload: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT payload_json FROM pet_state
                 WHERE state_key = ?1
                   AND (expires_at_ms IS NULL OR expires_at_ms > ?2)",
                params![super::state_key(identity), now_ms],
                |row| row.get(0),
            )
            .optional()
            .context("SELECT pet_state")?;

        match payload {
            Some(json) => {
                let state: SimulationState =
                    serde_json::from_str(&json).context("Decoding stored state")?;
                Ok(Some(state.normalized()))
            }
            None => Ok(None),
        }
    }

    fn save(&self, identity: &str, state: &SimulationState, expiry: Option<Duration>) -> Result<()> {
        let payload_json = serde_json::to_string(state)?;
        let saved_at_ms = Utc::now().timestamp_millis();
        let expires_at_ms = expiry.map(|ttl| {
            saved_at_ms.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
        });

        self.conn
            .lock()
            .execute(
                "INSERT INTO pet_state (state_key, payload_json, saved_at_ms, expires_at_ms)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(state_key) DO UPDATE SET
                    payload_json = excluded.payload_json,
                    saved_at_ms = excluded.saved_at_ms,
                    expires_at_ms = excluded.expires_at_ms",
                params![super::state_key(identity), payload_json, saved_at_ms, expires_at_ms],
            )
            .context("UPSERT pet_state")?;
        Ok(())
    }
}
