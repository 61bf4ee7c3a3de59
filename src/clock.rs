//! Simulation clock: wall-clock vs simulated time
//!
//! Exactly one time source is authoritative at a time. In real-time mode
//! the wall clock is reflected on every tick; in simulation mode each tick
//! advances simulated time by exactly one second, so a faster tick cadence
//! gives time compression.

use chrono::{Duration, Local, NaiveDateTime, NaiveTime, Timelike};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("invalid manual time {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },
}

/// Result of one clock tick.
#[derive(Debug, Clone, Copy)]
pub struct ClockTick {
    /// Authoritative time after the tick
    pub now: NaiveDateTime,
    /// Elapsed authoritative time since the previous tick, in hours
    pub dt_hours: f64,
    /// True exactly once per 23:xx → 00:xx crossing
    pub day_rolled: bool,
}

/// Tracks wall vs simulated time and detects day rollover.
#[derive(Debug, Clone)]
pub struct SimClock {
    /// Set ⇒ simulation mode; cleared by `reset()`
    simulated_now: Option<NaiveDateTime>,
    /// Authoritative time observed by the most recent tick or mutation
    last_effective: NaiveDateTime,
}

impl SimClock {
    pub fn new() -> Self {
        let now = Local::now().naive_local();
        Self {
            simulated_now: None,
            last_effective: now,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated_now.is_some()
    }

    /// The authoritative time: simulated if set, otherwise the wall clock.
    pub fn effective_now(&self) -> NaiveDateTime {
        self.simulated_now
            .unwrap_or_else(|| Local::now().naive_local())
    }

    /// Advance one tick (1 s cadence).
    ///
    /// Real-time mode reflects the wall clock; simulation mode advances by
    /// exactly one second. `day_rolled` fires exactly once per crossing.
    pub fn tick(&mut self) -> ClockTick {
        let prev = self.last_effective;
        let now = match self.simulated_now {
            Some(t) => {
                let next = t + Duration::seconds(1);
                self.simulated_now = Some(next);
                next
            }
            None => Local::now().naive_local(),
        };
        let dt_hours = (now - prev).num_milliseconds().max(0) as f64 / 3_600_000.0;
        let day_rolled = prev.hour() == 23 && now.hour() == 0;
        self.last_effective = now;
        ClockTick {
            now,
            dt_hours,
            day_rolled,
        }
    }

    /// Switch to simulation mode at the given local time (today's date).
    ///
    /// Dependent state reinitialization is the caller's responsibility.
    pub fn set_manual_time(&mut self, hour: u32, minute: u32) -> Result<NaiveDateTime, ClockError> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or(ClockError::InvalidTime { hour, minute })?;
        let now = self.effective_now().date().and_time(time);
        self.simulated_now = Some(now);
        self.last_effective = now;
        Ok(now)
    }

    /// Return to real-time mode. Dependent state reinitialization is the
    /// caller's responsibility.
    pub fn reset(&mut self) -> NaiveDateTime {
        self.simulated_now = None;
        let now = Local::now().naive_local();
        self.last_effective = now;
        now
    }

    /// Add one hour to the authoritative time without reinitializing other
    /// state, entering simulation mode if currently real-time. Returns the
    /// new time and whether the hour rolled past 23.
    pub fn advance_one_hour(&mut self) -> (NaiveDateTime, bool) {
        let prev = self.last_effective;
        let now = self.effective_now() + Duration::hours(1);
        self.simulated_now = Some(now);
        self.last_effective = now;
        (now, prev.hour() == 23)
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Fractional hour of day, e.g. 12:30:00 → 12.5.
pub fn hour_fraction(t: NaiveDateTime) -> f64 {
    f64::from(t.hour())
        + f64::from(t.minute()) / 60.0
        + f64::from(t.second()) / 3600.0
}
