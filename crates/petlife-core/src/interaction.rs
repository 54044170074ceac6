//! Interaction processor - user actions as state deltas
//!
//! Every interaction first advances the simulation by exactly one tick and
//! then applies its effect to the decayed state:
//!
//! | action | hunger | energy | mood |
//! |--------|--------|--------|------|
//! | feed   | −30    | −5     | +10  |
//! | greet  | 0      | −2     | +5   |
//! | play   | +10    | −20    | +15  | (only if energy > 30 and hunger < 70)
//!
//! Unknown actions advance the tick and apply nothing, unless the processor
//! runs under [`ActionPolicy::Strict`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::ActionPolicy;
use crate::error::{PetLifeError, Result};
use crate::state::{SimulationState, Vitals};
use crate::store::StateStore;

/// Energy must exceed this for `play` to have an effect
pub const PLAY_MIN_ENERGY: f64 = 30.0;

/// Hunger must stay below this for `play` to have an effect
pub const PLAY_MAX_HUNGER: f64 = 70.0;

/// A user-triggered action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Reduce hunger, lift mood
    Feed,
    /// Small mood boost
    Greet,
    /// Big mood boost at an energy cost, gated on energy and hunger
    Play,
    /// Anything else, kept verbatim
    Other(String),
}

impl Action {
    /// Map an action name; never fails
    pub fn parse(name: &str) -> Self {
        match name {
            "feed" => Self::Feed,
            "greet" => Self::Greet,
            "play" => Self::Play,
            other => Self::Other(other.to_string()),
        }
    }

    /// Action name
    pub fn as_str(&self) -> &str {
        match self {
            Self::Feed => "feed",
            Self::Greet => "greet",
            Self::Play => "play",
            Self::Other(name) => name,
        }
    }

    /// True for the built-in actions
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Delta this action applies to `state`, if any
    pub fn effect(&self, state: &SimulationState) -> Option<Vitals> {
        match self {
            Self::Feed => Some(Vitals::new(-5.0, -30.0, 10.0)),
            Self::Greet => Some(Vitals::new(-2.0, 0.0, 5.0)),
            Self::Play if state.energy > PLAY_MIN_ENERGY && state.hunger < PLAY_MAX_HUNGER => {
                Some(Vitals::new(-20.0, 10.0, 15.0))
            }
            Self::Play | Self::Other(_) => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one interaction
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    /// Interpreted action
    pub action: Action,
    /// Whether an effect was applied on top of the tick
    pub applied: bool,
    /// State after tick and effect
    pub state: SimulationState,
}

/// Who did what, when. Observability only; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// Record ID
    pub id: Uuid,
    /// Requesting device label
    pub device: String,
    /// Action name as received
    pub action: String,
    /// Whether the action changed the vitals beyond the tick
    pub applied: bool,
    /// When it happened
    pub at: DateTime<Utc>,
}

impl InteractionRecord {
    /// Record an interaction by `device`
    pub fn new(device: impl Into<String>, interaction: &Interaction, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            device: device.into(),
            action: interaction.action.to_string(),
            applied: interaction.applied,
            at,
        }
    }
}

/// Applies actions to a [`StateStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct InteractionProcessor {
    policy: ActionPolicy,
}

impl InteractionProcessor {
    /// Create a processor with the given policy
    pub fn new(policy: ActionPolicy) -> Self {
        Self { policy }
    }

    /// Active policy
    pub fn policy(&self) -> ActionPolicy {
        self.policy
    }

    /// Interpret `name`, rejecting unknown actions under the strict policy
    pub fn validate(&self, name: &str) -> Result<Action> {
        let action = Action::parse(name);
        if !action.is_known() && self.policy == ActionPolicy::Strict {
            return Err(PetLifeError::InvalidAction(name.to_string()));
        }
        Ok(action)
    }

    /// Validate, then tick and apply
    pub fn apply(&self, store: &mut StateStore, name: &str) -> Result<Interaction> {
        let action = self.validate(name)?;
        Ok(self.apply_at(store, action, Utc::now()))
    }

    /// One tick, then the action's effect on the decayed state
    pub fn apply_at(&self, store: &mut StateStore, action: Action, now: DateTime<Utc>) -> Interaction {
        let decayed = store.advance_at(1, now);

        let (state, applied) = match action.effect(&decayed) {
            Some(effect) => (store.apply_effect(effect, now), true),
            None => (decayed, false),
        };

        tracing::debug!(
            action = %action,
            applied,
            energy = state.energy,
            hunger = state.hunger,
            mood = state.mood,
            "Interaction processed"
        );

        Interaction {
            action,
            applied,
            state,
        }
    }
}
