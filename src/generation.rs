//! Generation calculator: pure mapping from (time, environment, anomalies)
//! to instantaneous output, plus cumulative integration
//!
//! The base curve is a half-sine over the daylight window [06:00, 18:00)
//! peaking at noon. Environmental derating and per-anomaly derating compose
//! multiplicatively so stacked faults can never drive output negative.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::clock::hour_fraction;
use crate::types::{Anomaly, EnvironmentalFactors};

/// Daylight generation window (fractional hours, half-open)
const SUNRISE_HOUR: f64 = 6.0;
const SUNSET_HOUR: f64 = 18.0;
/// Temperature derating: 0.4 %/°C above 25 °C
const TEMP_DERATE_PER_DEG: f64 = 0.004;
const TEMP_DERATE_THRESHOLD_C: f64 = 25.0;
/// Full dust coverage costs 30 % of output
const DUST_DERATE_WEIGHT: f64 = 0.3;
/// Full cloud cover costs 50 % of output
const CLOUD_DERATE_WEIGHT: f64 = 0.5;

/// Base half-sine curve before any derating. Zero outside the daylight
/// window; equals `capacity_mw` at exactly noon.
pub fn base_curve(now: NaiveDateTime, capacity_mw: f64) -> f64 {
    let hf = hour_fraction(now);
    if hf < SUNRISE_HOUR || hf >= SUNSET_HOUR {
        return 0.0;
    }
    capacity_mw * (std::f64::consts::PI * (hf - SUNRISE_HOUR) / 12.0).sin()
}

/// Multiplicative derating factors from the effective environment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeratingFactors {
    pub temperature: f64,
    pub dust: f64,
    pub cloud: f64,
}

impl DeratingFactors {
    pub fn from_factors(factors: &EnvironmentalFactors) -> Self {
        Self {
            temperature: 1.0
                - (factors.temperature_c - TEMP_DERATE_THRESHOLD_C).max(0.0)
                    * TEMP_DERATE_PER_DEG,
            dust: 1.0 - factors.dust_level / 100.0 * DUST_DERATE_WEIGHT,
            cloud: 1.0 - factors.cloud_cover / 100.0 * CLOUD_DERATE_WEIGHT,
        }
    }

    pub fn combined(&self) -> f64 {
        self.temperature * self.dust * self.cloud
    }
}

/// Instantaneous generation (MW) for the given time, capacity, effective
/// environment, and active anomalies.
///
/// Environmental anomaly kinds are excluded from the per-anomaly factor
/// since they already act through the dust/cloud overrides baked into
/// `factors`. Parameter ranges keep every factor non-negative; the debug
/// assertion guards against a future modeling change breaking that.
pub fn instantaneous_generation<'a>(
    now: NaiveDateTime,
    capacity_mw: f64,
    factors: &EnvironmentalFactors,
    active_anomalies: impl IntoIterator<Item = &'a Anomaly>,
) -> f64 {
    let base = base_curve(now, capacity_mw);
    if base == 0.0 {
        return 0.0;
    }

    let derating = DeratingFactors::from_factors(factors);
    let anomaly_factor: f64 = active_anomalies
        .into_iter()
        .filter(|a| a.active && !a.kind.is_environmental())
        .map(|a| 1.0 - a.impact_percent / 100.0)
        .product();

    let output = base * derating.combined() * anomaly_factor;
    debug_assert!(
        output >= 0.0,
        "generation went negative: base={base} derating={derating:?} anomaly_factor={anomaly_factor}"
    );
    output
}

/// Instantaneous output and daily cumulative energy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GenerationState {
    pub instantaneous_mw: f64,
    pub daily_cumulative_mwh: f64,
    pub last_update: Option<NaiveDateTime>,
}

impl GenerationState {
    /// Apply one clock tick. Returns true when the daily cumulative was
    /// reset (hour-23 → hour-0 transition).
    pub fn apply_tick(
        &mut self,
        now: NaiveDateTime,
        dt_hours: f64,
        instantaneous_mw: f64,
        day_rolled: bool,
    ) -> bool {
        self.instantaneous_mw = instantaneous_mw;
        self.last_update = Some(now);
        if day_rolled {
            self.daily_cumulative_mwh = 0.0;
            true
        } else {
            self.daily_cumulative_mwh += instantaneous_mw * dt_hours;
            false
        }
    }

    /// Reset both values, e.g. on reinitialization.
    pub fn reset(&mut self, now: NaiveDateTime) {
        self.instantaneous_mw = 0.0;
        self.daily_cumulative_mwh = 0.0;
        self.last_update = Some(now);
    }
}
