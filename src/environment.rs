//! Environment model: manual vs background-simulated factors and anomaly overrides
//!
//! Precedence for the effective dust/cloud values: anomaly override beats
//! manual beats simulated. The background tick perturbs only the simulated
//! set and only while manual control is off.

use chrono::NaiveDateTime;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use thiserror::Error;

use crate::clock::hour_fraction;
use crate::types::{AnomalyOverrides, EnvironmentalFactors, FactorKind};

/// Diurnal temperature swing bounds (°C)
const TEMP_MIN: f64 = 15.0;
const TEMP_MAX: f64 = 55.0;
/// Humidity resampling band (%)
const HUMIDITY_BAND: std::ops::RangeInclusive<f64> = 10.0..=60.0;
/// Random-walk step bounds per background tick (%)
const DUST_STEP: f64 = 2.0;
const CLOUD_STEP: f64 = 3.0;

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("manual control is disabled; cannot set {0}")]
    ManualControlDisabled(FactorKind),
}

/// Holds both factor sets, the control-mode flag, and anomaly overrides.
#[derive(Debug, Clone)]
pub struct EnvironmentModel {
    manual_control: bool,
    manual: EnvironmentalFactors,
    simulated: EnvironmentalFactors,
    overrides: AnomalyOverrides,
}

impl EnvironmentModel {
    pub fn new() -> Self {
        Self {
            manual_control: false,
            manual: EnvironmentalFactors::MANUAL_DEFAULTS,
            simulated: EnvironmentalFactors::MANUAL_DEFAULTS,
            overrides: AnomalyOverrides::default(),
        }
    }

    pub fn manual_control(&self) -> bool {
        self.manual_control
    }

    pub fn set_manual_control(&mut self, enabled: bool) {
        self.manual_control = enabled;
    }

    pub fn overrides(&self) -> AnomalyOverrides {
        self.overrides
    }

    /// The authoritative factor set before overrides are applied.
    pub fn source_factors(&self) -> EnvironmentalFactors {
        if self.manual_control {
            self.manual
        } else {
            self.simulated
        }
    }

    /// Effective factors: source set with non-null overrides applied on top.
    pub fn effective_factors(&self) -> EnvironmentalFactors {
        let mut factors = self.source_factors();
        if let Some(dust) = self.overrides.dust_level {
            factors.dust_level = dust;
        }
        if let Some(cloud) = self.overrides.cloud_cover {
            factors.cloud_cover = cloud;
        }
        factors.clamp_percentages();
        factors
    }

    /// Set one manual factor. Rejected unless manual control is enabled.
    pub fn set_manual_factor(
        &mut self,
        factor: FactorKind,
        value: f64,
    ) -> Result<(), EnvironmentError> {
        if !self.manual_control {
            return Err(EnvironmentError::ManualControlDisabled(factor));
        }
        match factor {
            FactorKind::Temperature => self.manual.temperature_c = value,
            FactorKind::DustLevel => self.manual.dust_level = value,
            FactorKind::CloudCover => self.manual.cloud_cover = value,
            FactorKind::Humidity => self.manual.humidity = value,
        }
        self.manual.clamp_percentages();
        Ok(())
    }

    /// Reset the manual set to the fixed defaults (used by reinitialization
    /// when manual control is active).
    pub fn reset_manual_defaults(&mut self) {
        self.manual = EnvironmentalFactors::MANUAL_DEFAULTS;
    }

    pub fn set_dust_override(&mut self, value: Option<f64>) {
        self.overrides.dust_level = value.map(|v| v.clamp(0.0, 100.0));
    }

    pub fn set_cloud_override(&mut self, value: Option<f64>) {
        self.overrides.cloud_cover = value.map(|v| v.clamp(0.0, 100.0));
    }

    pub fn clear_overrides(&mut self) {
        self.overrides = AnomalyOverrides::default();
    }

    /// Perturb the background-simulated set (10 s cadence).
    ///
    /// No-op while manual control is on. Temperature tracks a diurnal sine
    /// with Gaussian noise, dust and cloud random-walk within [0, 100], and
    /// humidity is resampled uniformly in a fixed band.
    pub fn background_tick(&mut self, now: NaiveDateTime, rng: &mut impl Rng) {
        if self.manual_control {
            return;
        }

        let hf = hour_fraction(now);
        let day_term = ((hf - 6.0) / 12.0 * std::f64::consts::PI).sin().max(0.0);
        let target = 18.0 + 16.0 * day_term;
        let noise = Normal::new(0.0, 0.6)
            .map(|d| d.sample(rng))
            .unwrap_or(0.0);
        self.simulated.temperature_c =
            (self.simulated.temperature_c * 0.9 + target * 0.1 + noise).clamp(TEMP_MIN, TEMP_MAX);

        self.simulated.dust_level += rng.gen_range(-DUST_STEP..=DUST_STEP);
        self.simulated.cloud_cover += rng.gen_range(-CLOUD_STEP..=CLOUD_STEP);
        self.simulated.humidity = rng.gen_range(HUMIDITY_BAND);
        self.simulated.clamp_percentages();

        tracing::trace!(
            temperature_c = self.simulated.temperature_c,
            dust = self.simulated.dust_level,
            cloud = self.simulated.cloud_cover,
            "Background environment tick"
        );
    }
}

impl Default for EnvironmentModel {
    fn default() -> Self {
        Self::new()
    }
}
