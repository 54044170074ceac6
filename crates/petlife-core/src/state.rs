//! Simulation state - the sole persisted entity
//!
//! All three vitals live in `[0, 100]`. Every mutation goes through
//! [`SimulationState::apply`], which clamps, and every timestamp update goes
//! through [`SimulationState::stamp`], which never moves backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lower bound of every vital
pub const VITAL_MIN: f64 = 0.0;

/// Upper bound of every vital
pub const VITAL_MAX: f64 = 100.0;

/// Clamp a vital into `[VITAL_MIN, VITAL_MAX]`
pub fn clamp_vital(value: f64) -> f64 {
    if value.is_nan() {
        return VITAL_MIN;
    }
    value.clamp(VITAL_MIN, VITAL_MAX)
}

/// Energy, hunger and mood as a triple.
///
/// Used for absolute values (defaults) as well as signed per-tick deltas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    /// Energy (decreases over time)
    pub energy: f64,
    /// Hunger (increases over time)
    pub hunger: f64,
    /// Mood (decreases over time)
    pub mood: f64,
}

impl Vitals {
    /// Build a triple
    pub const fn new(energy: f64, hunger: f64, mood: f64) -> Self {
        Self {
            energy,
            hunger,
            mood,
        }
    }

    /// The all-zero delta
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Every component clamped to the vital range
    pub fn clamped(self) -> Self {
        Self::new(
            clamp_vital(self.energy),
            clamp_vital(self.hunger),
            clamp_vital(self.mood),
        )
    }

    /// True when every component lies inside the vital range
    pub fn in_range(&self) -> bool {
        [self.energy, self.hunger, self.mood]
            .iter()
            .all(|v| (VITAL_MIN..=VITAL_MAX).contains(v))
    }
}

impl Default for Vitals {
    /// Fresh pet: energy 80, hunger 30, mood 70
    fn default() -> Self {
        Self::new(80.0, 30.0, 70.0)
    }
}

/// Authoritative state of one simulated pet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Stable label of the simulation instance
    pub identity: String,

    /// Display name
    #[serde(default = "default_pet_name")]
    pub pet_name: String,

    /// Energy in `[0, 100]`
    pub energy: f64,

    /// Hunger in `[0, 100]`
    pub hunger: f64,

    /// Mood in `[0, 100]`
    pub mood: f64,

    /// Point in time the state was last advanced to
    pub last_updated: DateTime<Utc>,
}

fn default_pet_name() -> String {
    crate::config::DEFAULT_PET_NAME.to_string()
}

impl SimulationState {
    /// Synthesize a fresh state
    pub fn new(
        identity: impl Into<String>,
        pet_name: impl Into<String>,
        vitals: Vitals,
        now: DateTime<Utc>,
    ) -> Self {
        let vitals = vitals.clamped();
        Self {
            identity: identity.into(),
            pet_name: pet_name.into(),
            energy: vitals.energy,
            hunger: vitals.hunger,
            mood: vitals.mood,
            last_updated: now,
        }
    }

    /// Current vitals
    pub fn vitals(&self) -> Vitals {
        Vitals::new(self.energy, self.hunger, self.mood)
    }

    /// Add a signed delta to every vital, clamping each one
    pub fn apply(&mut self, delta: Vitals) {
        self.energy = clamp_vital(self.energy + delta.energy);
        self.hunger = clamp_vital(self.hunger + delta.hunger);
        self.mood = clamp_vital(self.mood + delta.mood);
    }

    /// Move `last_updated` forward to `at`; earlier instants are ignored
    pub fn stamp(&mut self, at: DateTime<Utc>) {
        if at > self.last_updated {
            self.last_updated = at;
        }
    }

    /// Re-clamp after deserialization from an untrusted store
    pub(crate) fn normalized(mut self) -> Self {
        let vitals = self.vitals().clamped();
        self.energy = vitals.energy;
        self.hunger = vitals.hunger;
        self.mood = vitals.mood;
        self
    }
}
