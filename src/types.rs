//! Shared data structures for the solar plant simulation engine
//!
//! This module defines the core types flowing through the tick pipeline:
//! - EnvironmentalFactors / AnomalyOverrides (environment model inputs)
//! - Equipment (fixed fleet: panels, inverters, batteries, transformers)
//! - Anomaly (fault/weather events with escalation and resolution state)
//! - LogEntry (append-only event sink records)

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ============================================================================
// Environmental Factors
// ============================================================================

/// One set of environmental readings.
///
/// Two parallel instances exist in the environment model: the manual set
/// (operator-controlled) and the background-simulated set. Percentages are
/// kept clamped to [0, 100] by the environment model; temperature is
/// unclamped but realistically sits in the 15-55 °C band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalFactors {
    /// Ambient temperature (°C)
    pub temperature_c: f64,
    /// Dust level on panel surfaces (%)
    pub dust_level: f64,
    /// Cloud cover (%)
    pub cloud_cover: f64,
    /// Relative humidity (%)
    pub humidity: f64,
}

impl EnvironmentalFactors {
    /// Manual-mode defaults applied on reinitialization.
    pub const MANUAL_DEFAULTS: Self = Self {
        temperature_c: 30.0,
        dust_level: 5.0,
        cloud_cover: 7.0,
        humidity: 10.0,
    };

    /// Clamp the percentage fields to [0, 100] in place.
    pub fn clamp_percentages(&mut self) {
        self.dust_level = self.dust_level.clamp(0.0, 100.0);
        self.cloud_cover = self.cloud_cover.clamp(0.0, 100.0);
        self.humidity = self.humidity.clamp(0.0, 100.0);
    }
}

impl Default for EnvironmentalFactors {
    fn default() -> Self {
        Self::MANUAL_DEFAULTS
    }
}

/// Dust/cloud values forced by active environmental anomalies.
///
/// A non-null override beats both the manual and the simulated source
/// regardless of control mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyOverrides {
    pub dust_level: Option<f64>,
    pub cloud_cover: Option<f64>,
}

impl AnomalyOverrides {
    pub fn is_empty(&self) -> bool {
        self.dust_level.is_none() && self.cloud_cover.is_none()
    }
}

/// Selector for one manual environmental input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorKind {
    Temperature,
    DustLevel,
    CloudCover,
    Humidity,
}

impl std::fmt::Display for FactorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactorKind::Temperature => write!(f, "temperature"),
            FactorKind::DustLevel => write!(f, "dust level"),
            FactorKind::CloudCover => write!(f, "cloud cover"),
            FactorKind::Humidity => write!(f, "humidity"),
        }
    }
}

// ============================================================================
// Equipment
// ============================================================================

/// Category of a plant equipment unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquipmentKind {
    Panel,
    Inverter,
    Battery,
    Transformer,
}

impl EquipmentKind {
    /// Get display name for reports
    pub fn display_name(&self) -> &'static str {
        match self {
            EquipmentKind::Panel => "Solar Panel",
            EquipmentKind::Inverter => "Inverter",
            EquipmentKind::Battery => "Battery Bank",
            EquipmentKind::Transformer => "Transformer",
        }
    }

    /// Get short code used in equipment ids
    pub fn short_code(&self) -> &'static str {
        match self {
            EquipmentKind::Panel => "panel",
            EquipmentKind::Inverter => "inverter",
            EquipmentKind::Battery => "battery",
            EquipmentKind::Transformer => "transformer",
        }
    }
}

impl std::fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Operational status of an equipment unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EquipmentStatus {
    #[default]
    Healthy,
    Degraded,
    Faulty,
}

impl std::fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EquipmentStatus::Healthy => write!(f, "healthy"),
            EquipmentStatus::Degraded => write!(f, "degraded"),
            EquipmentStatus::Faulty => write!(f, "faulty"),
        }
    }
}

/// One plant equipment unit.
///
/// Created once at initialization and never destroyed, only mutated.
/// `active_anomaly_id` records the claim of at most one active anomaly;
/// claimed units are excluded from passive degradation and from selection
/// by new anomalies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    /// Unique, stable id (e.g. "panel-07")
    pub id: String,
    /// Human-readable name (e.g. "Solar Panel 07")
    pub name: String,
    pub kind: EquipmentKind,
    /// Health percentage [0, 100]
    pub health: f64,
    pub status: EquipmentStatus,
    /// Outstanding issue descriptions
    pub issues: Vec<String>,
    /// Id of the active anomaly claiming this unit, if any
    pub active_anomaly_id: Option<u64>,
}

impl Equipment {
    pub fn is_claimed(&self) -> bool {
        self.active_anomaly_id.is_some()
    }
}

// ============================================================================
// Anomalies
// ============================================================================

/// The five anomaly kinds.
///
/// Equipment kinds (panel-fault, dust-accumulation, inverter-overload)
/// claim matching equipment units and derate output directly through their
/// impact percentage. Environmental kinds (dust-storm, cloud-cover) claim
/// nothing and instead act through the dust/cloud overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyKind {
    PanelFault,
    DustAccumulation,
    DustStorm,
    InverterOverload,
    CloudCover,
}

impl AnomalyKind {
    pub const ALL: [AnomalyKind; 5] = [
        AnomalyKind::PanelFault,
        AnomalyKind::DustAccumulation,
        AnomalyKind::DustStorm,
        AnomalyKind::InverterOverload,
        AnomalyKind::CloudCover,
    ];

    /// Environmental kinds act through the environment override instead of
    /// claiming equipment or derating output directly.
    pub fn is_environmental(&self) -> bool {
        matches!(self, AnomalyKind::DustStorm | AnomalyKind::CloudCover)
    }

    /// Escalation level cap: 1 for environmental kinds, 3 for equipment kinds.
    pub fn max_escalation(&self) -> u8 {
        if self.is_environmental() {
            1
        } else {
            3
        }
    }

    /// Equipment category this anomaly claims, if any.
    pub fn claimed_equipment_kind(&self) -> Option<EquipmentKind> {
        match self {
            AnomalyKind::PanelFault | AnomalyKind::DustAccumulation => Some(EquipmentKind::Panel),
            AnomalyKind::InverterOverload => Some(EquipmentKind::Inverter),
            AnomalyKind::DustStorm | AnomalyKind::CloudCover => None,
        }
    }

    /// Get display name for alerts and reports
    pub fn display_name(&self) -> &'static str {
        match self {
            AnomalyKind::PanelFault => "Panel Fault",
            AnomalyKind::DustAccumulation => "Dust Accumulation",
            AnomalyKind::DustStorm => "Dust Storm",
            AnomalyKind::InverterOverload => "Inverter Overload",
            AnomalyKind::CloudCover => "Cloud Cover",
        }
    }

    /// Get short code for logging
    pub fn short_code(&self) -> &'static str {
        match self {
            AnomalyKind::PanelFault => "PANEL-FAULT",
            AnomalyKind::DustAccumulation => "DUST-ACC",
            AnomalyKind::DustStorm => "DUST-STORM",
            AnomalyKind::InverterOverload => "INV-OVERLOAD",
            AnomalyKind::CloudCover => "CLOUD-COVER",
        }
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Alert severity, graduated by escalation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Who resolved an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedBy {
    User,
    AutoTimeout,
}

impl std::fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedBy::User => write!(f, "user"),
            ResolvedBy::AutoTimeout => write!(f, "auto-timeout"),
        }
    }
}

/// A fault or weather event tracked by the anomaly engine.
///
/// State machine: `Active(escalation_level 0..=max)` → `Resolved { by }`,
/// terminal. Resolved anomalies persist as history and are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// Monotonic, unique id
    pub id: u64,
    pub kind: AnomalyKind,
    pub name: String,
    pub location: String,
    /// Output derating applied while active (equipment kinds only act
    /// through this; environmental kinds act through the override)
    pub impact_percent: f64,
    pub severity: Severity,
    pub created_at: NaiveDateTime,
    pub active: bool,
    /// Bounded counter reflecting how long the anomaly stayed unresolved
    pub escalation_level: u8,
    pub last_escalation_at: Option<NaiveDateTime>,
    /// Ids of claimed equipment units (empty for environmental kinds)
    pub affected_equipment: Vec<String>,
    pub resolved_at: Option<NaiveDateTime>,
    pub resolved_by: Option<ResolvedBy>,
}

impl Anomaly {
    /// Seconds this anomaly has been active, measured against the
    /// authoritative time source.
    pub fn active_secs(&self, now: NaiveDateTime) -> i64 {
        (now - self.created_at).num_seconds()
    }
}

// ============================================================================
// Event/Log Sink Records
// ============================================================================

/// Category of a log entry, used by the export document to group sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogCategory {
    Alert,
    Anomaly,
    Equipment,
    Environment,
    Generation,
    System,
    Drone,
    Chat,
}

impl std::fmt::Display for LogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogCategory::Alert => write!(f, "ALERT"),
            LogCategory::Anomaly => write!(f, "ANOMALY"),
            LogCategory::Equipment => write!(f, "EQUIPMENT"),
            LogCategory::Environment => write!(f, "ENVIRONMENT"),
            LogCategory::Generation => write!(f, "GENERATION"),
            LogCategory::System => write!(f, "SYSTEM"),
            LogCategory::Drone => write!(f, "DRONE"),
            LogCategory::Chat => write!(f, "CHAT"),
        }
    }
}

/// One append-only log sink record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub message: String,
    pub category: LogCategory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_caps_by_kind() {
        assert_eq!(AnomalyKind::PanelFault.max_escalation(), 3);
        assert_eq!(AnomalyKind::DustAccumulation.max_escalation(), 3);
        assert_eq!(AnomalyKind::InverterOverload.max_escalation(), 3);
        assert_eq!(AnomalyKind::DustStorm.max_escalation(), 1);
        assert_eq!(AnomalyKind::CloudCover.max_escalation(), 1);
    }

    #[test]
    fn environmental_kinds_claim_no_equipment() {
        for kind in AnomalyKind::ALL {
            assert_eq!(kind.is_environmental(), kind.claimed_equipment_kind().is_none());
        }
    }

    #[test]
    fn percentages_clamp_to_valid_range() {
        let mut f = EnvironmentalFactors {
            temperature_c: 80.0,
            dust_level: 130.0,
            cloud_cover: -5.0,
            humidity: 101.0,
        };
        f.clamp_percentages();
        assert_eq!(f.dust_level, 100.0);
        assert_eq!(f.cloud_cover, 0.0);
        assert_eq!(f.humidity, 100.0);
        // temperature is deliberately unclamped
        assert_eq!(f.temperature_c, 80.0);
    }
}
