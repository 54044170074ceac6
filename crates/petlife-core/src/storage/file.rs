//! Local-disk storage backend
//!
//! One pretty-printed JSON document per identity. Writes go to a sibling
//! temp file first and are renamed into place, so a crash mid-write leaves
//! the previous document intact. The expiry hint is ignored: files live until
//! the directory is cleaned (typically a temp directory).

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::StorageBackend;
use crate::error::{Result, ResultExt};
use crate::state::SimulationState;

/// Directory of JSON state documents
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) the storage directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let base_path = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)
            .with_context(|| format!("Creating state directory '{}'", base_path.display()))?;
        Ok(Self { base_path })
    }

    /// Storage directory
    pub fn path(&self) -> &Path {
        &self.base_path
    }

    fn document_path(&self, identity: &str) -> PathBuf {
        let file_stem: String = super::state_key(identity)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{file_stem}.json"))
    }
}

impl StorageBackend for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    fn load(&self, identity: &str) -> Result<Option<SimulationState>> {
        let path = self.document_path(identity);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Reading '{}'", path.display()))?;
        let state: SimulationState = serde_json::from_str(&content)
            .with_context(|| format!("Parsing '{}'", path.display()))?;
        Ok(Some(state.normalized()))
    }

    fn save(&self, identity: &str, state: &SimulationState, _expiry: Option<Duration>) -> Result<()> {
        let path = self.document_path(identity);
        let tmp_path = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(state)?;
        std::fs::write(&tmp_path, content)
            .with_context(|| format!("Writing '{}'", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("Replacing '{}'", path.display()))?;

        tracing::debug!(identity, path = %path.display(), "State written to disk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Vitals;
    use chrono::Utc;
    use tempfile::TempDir;

    fn state(identity: &str) -> SimulationState {
        SimulationState::new(identity, "Xiaotang", Vitals::new(55.5, 12.0, 90.0), Utc::now())
    }

    #[test]
    fn test_absent_identity_loads_none() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        assert!(storage.load("nobody").unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        let saved = state("shared-pet");
        storage.save("shared-pet", &saved, Some(Duration::from_secs(1))).unwrap();

        let loaded = storage.load("shared-pet").unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert!(!dir.path().join("petlife_state_shared-pet.json.tmp").exists());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        FileStorage::open(dir.path())
            .unwrap()
            .save("pet", &state("pet"), None)
            .unwrap();

        let reopened = FileStorage::open(dir.path()).unwrap();
        assert!(reopened.load("pet").unwrap().is_some());
    }

    #[test]
    fn test_identity_is_sanitized() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.save("../escape", &state("../escape"), None).unwrap();

        assert!(storage.load("../escape").unwrap().is_some());
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["petlife_state____escape.json".to_string()]);
    }

    #[test]
    fn test_corrupt_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("petlife_state_pet.json"), "{ not json").unwrap();

        assert!(storage.load("pet").is_err());
    }

    fn fractional_states() -> Vec<SimulationState> {
        let now = Utc::now();
        (1..200)
            .map(|n| {
                let x = f64::from(n);
                let vitals = Vitals::new(0.1 + 0.2, 100.0 / (x + 5.0), 1.0 / 6.0 + x * 1e-9);
                SimulationState::new("shared-pet", "Xiaotang", vitals, now)
            })
            .collect()
    }

    #[test]
    fn test_fractional_vitals_round_trip_exactly() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        for saved in fractional_states() {
            storage.save("shared-pet", &saved, None).unwrap();
            assert_eq!(storage.load("shared-pet").unwrap(), Some(saved));
        }
    }
}
