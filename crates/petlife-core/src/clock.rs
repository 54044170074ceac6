//! Simulation clock - wall-clock time to discrete ticks
//!
//! One tick is a fixed span of simulated time (one hour by default). Explicit
//! catch-up requests are validated against a hard cap so a single request can
//! never schedule unbounded work; passive catch-up on reads saturates at the
//! same cap instead of failing.

use chrono::{DateTime, Duration, Utc};

use crate::error::{PetLifeError, Result};

/// Default tick length in minutes (one simulated hour)
pub const DEFAULT_TICK_MINUTES: u32 = 60;

/// Default catch-up cap: 720 one-hour ticks, i.e. 30 days
pub const DEFAULT_MAX_CATCHUP_TICKS: u32 = 720;

/// Converts elapsed time and hour counts into tick counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationClock {
    tick_minutes: u32,
    max_ticks: u32,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self {
            tick_minutes: DEFAULT_TICK_MINUTES,
            max_ticks: DEFAULT_MAX_CATCHUP_TICKS,
        }
    }
}

impl SimulationClock {
    /// Create a clock; both arguments must be positive
    pub fn new(tick_minutes: u32, max_ticks: u32) -> Result<Self> {
        if tick_minutes == 0 {
            return Err(PetLifeError::Config("tick_minutes must be positive".into()));
        }
        if max_ticks == 0 {
            return Err(PetLifeError::Config("max_catchup_ticks must be positive".into()));
        }
        Ok(Self {
            tick_minutes,
            max_ticks,
        })
    }

    /// Length of one tick
    pub fn tick_length(&self) -> Duration {
        Duration::minutes(i64::from(self.tick_minutes))
    }

    /// Largest tick count a single catch-up may compensate
    pub fn max_ticks(&self) -> u32 {
        self.max_ticks
    }

    /// Simulated time covered by `ticks`
    pub fn span(&self, ticks: u32) -> Duration {
        self.tick_length() * i32::try_from(ticks).unwrap_or(i32::MAX)
    }

    /// Ticks needed to cover `requested`.
    ///
    /// Fails with [`PetLifeError::OutOfRange`] for non-positive durations,
    /// for durations shorter than one tick, and for anything beyond the cap.
    /// Rounds down: a partial trailing tick is not compensated.
    pub fn ticks_for(&self, requested: Duration) -> Result<u32> {
        let ticks = requested.num_milliseconds() / self.tick_length().num_milliseconds();

        if ticks < 1 || ticks > i64::from(self.max_ticks) {
            return Err(PetLifeError::OutOfRange {
                requested: ticks,
                min: 1,
                max: i64::from(self.max_ticks),
            });
        }
        Ok(ticks as u32)
    }

    /// Ticks for an elapsed-hours catch-up request.
    ///
    /// `hours` must lie in `1..=max_hours`, where `max_hours` is the cap
    /// expressed in hours (720 with the default one-hour tick).
    pub fn ticks_for_hours(&self, hours: i64) -> Result<u32> {
        let max_hours = self.max_hours();
        if hours < 1 || hours > max_hours {
            return Err(PetLifeError::OutOfRange {
                requested: hours,
                min: 1,
                max: max_hours,
            });
        }
        self.ticks_for(Duration::hours(hours))
    }

    /// Cap expressed in whole hours
    pub fn max_hours(&self) -> i64 {
        i64::from(self.max_ticks) * i64::from(self.tick_minutes) / 60
    }

    /// Whole ticks elapsed between `since` and `now` (zero if `now` is earlier).
    ///
    /// Not capped; callers decide whether to saturate.
    pub fn elapsed_ticks(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        let elapsed_ms = (now - since).num_milliseconds();
        if elapsed_ms <= 0 {
            return 0;
        }
        (elapsed_ms / self.tick_length().num_milliseconds()) as u64
    }
}
