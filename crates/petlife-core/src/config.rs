//! Engine configuration
//!
//! Loaded from defaults, a TOML file, and `PETLIFE_*` environment variables
//! (a `.env` file is honoured via `dotenvy`). Storage URL resolution lives
//! here so the engine itself only ever sees a resolved [`StorageTarget`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::clock::{SimulationClock, DEFAULT_MAX_CATCHUP_TICKS, DEFAULT_TICK_MINUTES};
use crate::error::{PetLifeError, Result};
use crate::state::Vitals;
use crate::storage::StorageTarget;

/// Identity of the single shared simulation
pub const DEFAULT_IDENTITY: &str = "shared-pet";

/// Default display name of the pet
pub const DEFAULT_PET_NAME: &str = "Xiaotang";

/// Default expiry hint for stored state: 30 days
pub const DEFAULT_STATE_TTL_SECS: u64 = 30 * 24 * 3600;

/// Environment variable naming the primary storage location
pub const ENV_STORAGE_URL: &str = "PETLIFE_STORAGE_URL";
/// Environment variable overriding the local data directory
pub const ENV_DATA_DIR: &str = "PETLIFE_DATA_DIR";
/// Environment variable overriding the simulation identity
pub const ENV_IDENTITY: &str = "PETLIFE_IDENTITY";
/// Environment variable selecting the flush policy
pub const ENV_FLUSH_POLICY: &str = "PETLIFE_FLUSH_POLICY";
/// Environment variable selecting the action policy
pub const ENV_ACTION_POLICY: &str = "PETLIFE_ACTION_POLICY";

/// When mutations reach durable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Only on explicit flush, catch-up, or shutdown
    #[default]
    Deferred,
    /// After every mutating operation
    Immediate,
}

impl FromStr for FlushPolicy {
    type Err = PetLifeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deferred" => Ok(Self::Deferred),
            "immediate" => Ok(Self::Immediate),
            other => Err(PetLifeError::Config(format!("unknown flush policy '{other}'"))),
        }
    }
}

/// How unrecognized interaction actions are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPolicy {
    /// Advance one tick, apply no effect
    #[default]
    Lenient,
    /// Reject with `InvalidAction` before any mutation
    Strict,
}

impl FromStr for ActionPolicy {
    type Err = PetLifeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(PetLifeError::Config(format!("unknown action policy '{other}'"))),
        }
    }
}

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Identity of the shared simulation
    pub identity: String,

    /// Display name of the pet
    pub pet_name: String,

    /// Length of one tick in minutes
    pub tick_minutes: u32,

    /// Largest number of ticks a single catch-up may compensate
    pub max_catchup_ticks: u32,

    /// Signed per-tick deltas
    pub decay: Vitals,

    /// Vitals of a fresh or reset pet
    pub defaults: Vitals,

    /// When mutations are persisted
    pub flush_policy: FlushPolicy,

    /// Treatment of unknown actions
    pub action_policy: ActionPolicy,

    /// Expiry hint passed to the backend on save (`None` = keep forever)
    pub state_ttl_secs: Option<u64>,

    /// Interaction records kept for observability
    pub history_limit: usize,

    /// Storage configuration
    pub storage: StorageSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            pet_name: DEFAULT_PET_NAME.to_string(),
            tick_minutes: DEFAULT_TICK_MINUTES,
            max_catchup_ticks: DEFAULT_MAX_CATCHUP_TICKS,
            // Per-minute rates 0.1 / 0.15 / 0.05 over a one-hour tick
            decay: Vitals::new(-6.0, 9.0, -3.0),
            defaults: Vitals::default(),
            flush_policy: FlushPolicy::Deferred,
            action_policy: ActionPolicy::Lenient,
            state_ttl_secs: Some(DEFAULT_STATE_TTL_SECS),
            history_limit: 64,
            storage: StorageSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Set the per-tick decay deltas
    pub fn with_decay(mut self, decay: Vitals) -> Self {
        self.decay = decay;
        self
    }

    /// Set the default vitals
    pub fn with_defaults(mut self, defaults: Vitals) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set the flush policy
    pub fn with_flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    /// Set the action policy
    pub fn with_action_policy(mut self, policy: ActionPolicy) -> Self {
        self.action_policy = policy;
        self
    }

    /// Set the primary storage URL
    pub fn with_storage_url(mut self, url: impl Into<String>) -> Self {
        self.storage.url = Some(url.into());
        self
    }

    /// Set the expiry hint
    pub fn with_state_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.state_ttl_secs = ttl.map(|d| d.as_secs());
        self
    }

    /// Clock derived from the tick settings
    pub fn clock(&self) -> Result<SimulationClock> {
        SimulationClock::new(self.tick_minutes, self.max_catchup_ticks)
    }

    /// Expiry hint as a duration
    pub fn state_ttl(&self) -> Option<Duration> {
        self.state_ttl_secs.map(Duration::from_secs)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.identity.trim().is_empty() {
            return Err(PetLifeError::Config("identity must not be empty".into()));
        }
        self.clock()?;
        let finite = |v: &Vitals| v.energy.is_finite() && v.hunger.is_finite() && v.mood.is_finite();
        if !finite(&self.decay) || !finite(&self.defaults) {
            return Err(PetLifeError::Config("vitals must be finite numbers".into()));
        }
        if !self.defaults.in_range() {
            return Err(PetLifeError::Config("default vitals must lie in [0, 100]".into()));
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults overlaid with the process environment (and `.env`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Overlay `PETLIFE_*` variables read through `lookup`
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = present(ENV_STORAGE_URL) {
            self.storage.url = Some(url);
        }
        if let Some(dir) = present(ENV_DATA_DIR) {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(identity) = present(ENV_IDENTITY) {
            self.identity = identity;
        }
        if let Some(policy) = present(ENV_FLUSH_POLICY) {
            self.flush_policy = policy.parse()?;
        }
        if let Some(policy) = present(ENV_ACTION_POLICY) {
            self.action_policy = policy.parse()?;
        }

        self.validate()?;
        Ok(self)
    }
}

/// Storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Primary storage URL (`sqlite://`, `file://`, `memory://`, or a bare
    /// SQLite path). Without one, state goes to `data_dir` on local disk.
    pub url: Option<String>,

    /// Local directory for file storage
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            url: None,
            data_dir: std::env::temp_dir().join("petlife"),
        }
    }
}

impl StorageSettings {
    /// Where state should live
    pub fn primary_target(&self) -> Result<StorageTarget> {
        match &self.url {
            Some(url) => parse_storage_url(url),
            None => Ok(StorageTarget::File(self.data_dir.clone())),
        }
    }

    /// Where state goes when the primary target cannot be opened
    pub fn fallback_target(&self) -> StorageTarget {
        StorageTarget::File(std::env::temp_dir().join("petlife-fallback"))
    }
}

/// Resolve a storage URL into a target
pub fn parse_storage_url(url: &str) -> Result<StorageTarget> {
    let url = url.trim();
    match url.split_once("://") {
        Some(("memory", _)) => Ok(StorageTarget::Memory),
        Some(("file", path)) if !path.is_empty() => Ok(StorageTarget::File(PathBuf::from(path))),
        Some(("sqlite", path)) if !path.is_empty() => Ok(StorageTarget::Sqlite(PathBuf::from(path))),
        Some((scheme, _)) => Err(PetLifeError::Config(format!(
            "unsupported storage URL '{scheme}://...'"
        ))),
        None if url == "memory" => Ok(StorageTarget::Memory),
        None if !url.is_empty() => Ok(StorageTarget::Sqlite(PathBuf::from(url))),
        None => Err(PetLifeError::Config("empty storage URL".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.identity, DEFAULT_IDENTITY);
        assert_eq!(config.defaults, Vitals::new(80.0, 30.0, 70.0));
        assert_eq!(config.max_catchup_ticks, 720);
        assert_eq!(config.flush_policy, FlushPolicy::Deferred);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .with_identity("lobby-pet")
            .with_flush_policy(FlushPolicy::Immediate)
            .with_action_policy(ActionPolicy::Strict)
            .with_storage_url("memory://")
            .with_state_ttl(None);

        assert_eq!(config.identity, "lobby-pet");
        assert_eq!(config.flush_policy, FlushPolicy::Immediate);
        assert_eq!(config.action_policy, ActionPolicy::Strict);
        assert_eq!(config.storage.primary_target().unwrap(), StorageTarget::Memory);
        assert!(config.state_ttl().is_none());
    }

    #[test]
    fn test_storage_urls() {
        assert_eq!(parse_storage_url("memory://").unwrap(), StorageTarget::Memory);
        assert_eq!(
            parse_storage_url("sqlite:///var/lib/petlife.db").unwrap(),
            StorageTarget::Sqlite(PathBuf::from("/var/lib/petlife.db"))
        );
        assert_eq!(
            parse_storage_url("file://./state").unwrap(),
            StorageTarget::File(PathBuf::from("./state"))
        );
        assert_eq!(
            parse_storage_url("pet.db").unwrap(),
            StorageTarget::Sqlite(PathBuf::from("pet.db"))
        );
        assert!(parse_storage_url("rediss://user:pw@cache:6379").is_err());
        assert!(parse_storage_url("  ").is_err());
    }

    #[test]
    fn test_without_url_uses_data_dir() {
        let settings = StorageSettings {
            url: None,
            data_dir: PathBuf::from("/srv/pet"),
        };
        assert_eq!(
            settings.primary_target().unwrap(),
            StorageTarget::File(PathBuf::from("/srv/pet"))
        );
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            (ENV_STORAGE_URL, "memory://"),
            (ENV_IDENTITY, "office-pet"),
            (ENV_FLUSH_POLICY, "Immediate"),
            (ENV_ACTION_POLICY, ""),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::default()
            .with_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.identity, "office-pet");
        assert_eq!(config.flush_policy, FlushPolicy::Immediate);
        assert_eq!(config.action_policy, ActionPolicy::Lenient);
        assert_eq!(config.storage.url.as_deref(), Some("memory://"));
    }

    #[test]
    fn test_env_rejects_bad_policy() {
        let result = EngineConfig::default().with_env(|key| {
            (key == ENV_FLUSH_POLICY).then(|| "sometimes".to_string())
        });
        assert!(matches!(result, Err(PetLifeError::Config(_))));
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();
        config.tick_minutes = 0;
        assert!(config.validate().is_err());

        let config = EngineConfig::default().with_defaults(Vitals::new(120.0, 0.0, 0.0));
        assert!(config.validate().is_err());

        let config = EngineConfig::default().with_decay(Vitals::new(f64::NAN, 0.0, 0.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("petlife.toml");

        let config = EngineConfig::default()
            .with_identity("file-pet")
            .with_storage_url("sqlite://pet.db");
        config.to_file(&path).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            identity = "partial"
            [decay]
            energy = -1.0
            hunger = 1.5
            mood = -0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.identity, "partial");
        assert_eq!(config.decay.hunger, 1.5);
        assert_eq!(config.tick_minutes, DEFAULT_TICK_MINUTES);
    }
}
