//! Equipment registry: fixed fleet with passive degradation, health-driven
//! anomaly triggers, and claim/release bookkeeping
//!
//! The fleet is created once (20 panels, 5 inverters, 3 batteries,
//! 2 transformers) and only mutated afterwards. A unit claimed by an active
//! anomaly is excluded from passive degradation and from selection by new
//! anomalies, which enforces the at-most-one-claim invariant.

use chrono::NaiveDateTime;
use rand::Rng;

use crate::events::EventLog;
use crate::types::{AnomalyKind, Equipment, EquipmentKind, EquipmentStatus, LogCategory};

pub const PANEL_COUNT: usize = 20;
pub const INVERTER_COUNT: usize = 5;
pub const BATTERY_COUNT: usize = 3;
pub const TRANSFORMER_COUNT: usize = 2;

/// Fresh units roll health in this range
const INITIAL_HEALTH: std::ops::RangeInclusive<f64> = 95.0..=100.0;
/// Released units are restored into this range
const RESTORED_HEALTH: std::ops::RangeInclusive<f64> = 96.0..=100.0;
/// Passive degradation per selected unit per pass
const DEGRADE_STEP: std::ops::RangeInclusive<f64> = 0.1..=0.5;
/// Passive degradation never takes a unit below this
const DEGRADE_FLOOR: f64 = 75.0;
/// Share of eligible units degraded per pass
const DEGRADE_PROBABILITY: f64 = 0.25;
/// Units below this health trigger automatic anomaly generation
const HEALTH_TRIGGER_THRESHOLD: f64 = 80.0;

#[derive(Debug, Clone)]
pub struct EquipmentRegistry {
    units: Vec<Equipment>,
}

impl EquipmentRegistry {
    /// Build the fixed fleet with fresh health rolls.
    pub fn new(rng: &mut impl Rng) -> Self {
        let mut units = Vec::with_capacity(
            PANEL_COUNT + INVERTER_COUNT + BATTERY_COUNT + TRANSFORMER_COUNT,
        );
        let fleet = [
            (EquipmentKind::Panel, PANEL_COUNT),
            (EquipmentKind::Inverter, INVERTER_COUNT),
            (EquipmentKind::Battery, BATTERY_COUNT),
            (EquipmentKind::Transformer, TRANSFORMER_COUNT),
        ];
        for (kind, count) in fleet {
            for i in 1..=count {
                units.push(Equipment {
                    id: format!("{}-{:02}", kind.short_code(), i),
                    name: format!("{} {:02}", kind.display_name(), i),
                    kind,
                    health: rng.gen_range(INITIAL_HEALTH),
                    status: EquipmentStatus::Healthy,
                    issues: Vec::new(),
                    active_anomaly_id: None,
                });
            }
        }
        Self { units }
    }

    /// Re-roll every unit to a fresh state (reinitialization).
    pub fn reinitialize(&mut self, rng: &mut impl Rng) {
        for unit in &mut self.units {
            unit.health = rng.gen_range(INITIAL_HEALTH);
            unit.status = EquipmentStatus::Healthy;
            unit.issues.clear();
            unit.active_anomaly_id = None;
        }
    }

    pub fn units(&self) -> &[Equipment] {
        &self.units
    }

    pub fn get(&self, id: &str) -> Option<&Equipment> {
        self.units.iter().find(|u| u.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Equipment> {
        self.units.iter_mut().find(|u| u.id == id)
    }

    /// Ids of units of the given kind not claimed by any active anomaly.
    pub fn unclaimed_of_kind(&self, kind: EquipmentKind) -> Vec<String> {
        self.units
            .iter()
            .filter(|u| u.kind == kind && !u.is_claimed())
            .map(|u| u.id.clone())
            .collect()
    }

    pub fn average_health(&self) -> f64 {
        if self.units.is_empty() {
            return 0.0;
        }
        self.units.iter().map(|u| u.health).sum::<f64>() / self.units.len() as f64
    }

    pub fn count_with_status(&self, status: EquipmentStatus) -> usize {
        self.units.iter().filter(|u| u.status == status).count()
    }

    /// Passive degradation pass (60 s cadence): each healthy, unclaimed
    /// unit above 80 % health has a 25 % chance of losing 0.1-0.5 health,
    /// floored at 75. Returns the number of units degraded.
    pub fn degrade_pass(&mut self, rng: &mut impl Rng) -> usize {
        let mut degraded = 0;
        for unit in &mut self.units {
            if unit.status != EquipmentStatus::Healthy
                || unit.health <= HEALTH_TRIGGER_THRESHOLD
                || unit.is_claimed()
            {
                continue;
            }
            if !rng.gen_bool(DEGRADE_PROBABILITY) {
                continue;
            }
            let step = rng.gen_range(DEGRADE_STEP);
            unit.health = (unit.health - step).max(DEGRADE_FLOOR);
            degraded += 1;
            tracing::debug!(id = %unit.id, health = unit.health, "Passive degradation");
        }
        degraded
    }

    /// Health check pass (10 s cadence): healthy, unclaimed units that have
    /// fallen below 80 % health trigger automatic anomaly generation.
    /// Panels roll 70 % dust-accumulation / 30 % panel-fault; inverters get
    /// inverter-overload; batteries and transformers are never auto-faulted.
    pub fn health_check_pass(&self, rng: &mut impl Rng) -> Vec<(String, AnomalyKind)> {
        let mut triggers = Vec::new();
        for unit in &self.units {
            if unit.status != EquipmentStatus::Healthy
                || unit.health >= HEALTH_TRIGGER_THRESHOLD
                || unit.is_claimed()
            {
                continue;
            }
            let kind = match unit.kind {
                EquipmentKind::Panel => {
                    if rng.gen_bool(0.7) {
                        AnomalyKind::DustAccumulation
                    } else {
                        AnomalyKind::PanelFault
                    }
                }
                EquipmentKind::Inverter => AnomalyKind::InverterOverload,
                EquipmentKind::Battery | EquipmentKind::Transformer => continue,
            };
            triggers.push((unit.id.clone(), kind));
        }
        triggers
    }

    /// Record an anomaly's claim on a unit: status transition, issue note,
    /// and a kind-specific health drop. No-op on unknown ids.
    pub fn claim(
        &mut self,
        id: &str,
        anomaly_id: u64,
        kind: AnomalyKind,
        now: NaiveDateTime,
        events: &mut EventLog,
        rng: &mut impl Rng,
    ) -> bool {
        let (status, issue, drop_range) = match kind {
            AnomalyKind::PanelFault => (
                EquipmentStatus::Faulty,
                "Electrical fault detected",
                15.0..=30.0,
            ),
            AnomalyKind::DustAccumulation => (
                EquipmentStatus::Degraded,
                "Heavy dust deposit on surface",
                8.0..=15.0,
            ),
            AnomalyKind::InverterOverload => (
                EquipmentStatus::Faulty,
                "Thermal overload",
                20.0..=35.0,
            ),
            // Environmental kinds claim nothing
            AnomalyKind::DustStorm | AnomalyKind::CloudCover => return false,
        };
        let drop = rng.gen_range(drop_range);
        let Some(unit) = self.get_mut(id) else {
            return false;
        };
        unit.status = status;
        unit.issues.push(issue.to_string());
        unit.health = (unit.health - drop).max(5.0);
        unit.active_anomaly_id = Some(anomaly_id);
        events.record(
            now,
            format!("{} claimed by anomaly #{anomaly_id}: {issue}", unit.name),
            LogCategory::Equipment,
        );
        true
    }

    /// Release a claimed unit: healthy status, cleared issues, health
    /// restored to a fresh 96-100 roll. No-op on unknown ids.
    pub fn release(
        &mut self,
        id: &str,
        now: NaiveDateTime,
        events: &mut EventLog,
        rng: &mut impl Rng,
    ) -> bool {
        let restored = rng.gen_range(RESTORED_HEALTH);
        let Some(unit) = self.get_mut(id) else {
            return false;
        };
        unit.status = EquipmentStatus::Healthy;
        unit.issues.clear();
        unit.active_anomaly_id = None;
        unit.health = restored;
        events.record(
            now,
            format!("{} restored to service ({:.1}% health)", unit.name, unit.health),
            LogCategory::Equipment,
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 6, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn fleet_has_fixed_cardinalities() {
        let mut rng = StdRng::seed_from_u64(1);
        let reg = EquipmentRegistry::new(&mut rng);
        assert_eq!(reg.units().len(), 30);
        let count = |k| reg.units().iter().filter(|u| u.kind == k).count();
        assert_eq!(count(EquipmentKind::Panel), PANEL_COUNT);
        assert_eq!(count(EquipmentKind::Inverter), INVERTER_COUNT);
        assert_eq!(count(EquipmentKind::Battery), BATTERY_COUNT);
        assert_eq!(count(EquipmentKind::Transformer), TRANSFORMER_COUNT);
        for unit in reg.units() {
            assert!((95.0..=100.0).contains(&unit.health));
            assert_eq!(unit.status, EquipmentStatus::Healthy);
        }
    }

    #[test]
    fn claim_and_release_round_trip() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut reg = EquipmentRegistry::new(&mut rng);
        let mut events = EventLog::new();

        assert!(reg.claim("panel-01", 7, AnomalyKind::PanelFault, ts(), &mut events, &mut rng));
        let unit = reg.get("panel-01").unwrap();
        assert_eq!(unit.status, EquipmentStatus::Faulty);
        assert_eq!(unit.active_anomaly_id, Some(7));
        assert!(!unit.issues.is_empty());
        assert!(unit.health < 90.0);

        assert!(reg.release("panel-01", ts(), &mut events, &mut rng));
        let unit = reg.get("panel-01").unwrap();
        assert_eq!(unit.status, EquipmentStatus::Healthy);
        assert!(unit.active_anomaly_id.is_none());
        assert!(unit.issues.is_empty());
        assert!((96.0..=100.0).contains(&unit.health));
    }

    #[test]
    fn environmental_kinds_cannot_claim() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut reg = EquipmentRegistry::new(&mut rng);
        let mut events = EventLog::new();
        assert!(!reg.claim("panel-01", 1, AnomalyKind::DustStorm, ts(), &mut events, &mut rng));
        assert!(!reg.get("panel-01").unwrap().is_claimed());
    }

    #[test]
    fn degradation_skips_claimed_units_and_floors_at_75() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut reg = EquipmentRegistry::new(&mut rng);
        let mut events = EventLog::new();
        reg.claim("panel-01", 1, AnomalyKind::PanelFault, ts(), &mut events, &mut rng);
        let claimed_health = reg.get("panel-01").unwrap().health;

        for _ in 0..500 {
            reg.degrade_pass(&mut rng);
        }
        assert_eq!(reg.get("panel-01").unwrap().health, claimed_health);
        for unit in reg.units() {
            if !unit.is_claimed() {
                assert!(unit.health >= DEGRADE_FLOOR);
            }
        }
    }

    #[test]
    fn health_trigger_maps_kinds_correctly() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut reg = EquipmentRegistry::new(&mut rng);
        // Push one panel and one inverter under the threshold
        reg.get_mut("panel-03").unwrap().health = 78.0;
        reg.get_mut("inverter-02").unwrap().health = 79.0;
        reg.get_mut("battery-01").unwrap().health = 60.0;

        let triggers = reg.health_check_pass(&mut rng);
        assert_eq!(triggers.len(), 2, "batteries are never auto-faulted");
        for (id, kind) in &triggers {
            match id.as_str() {
                "panel-03" => assert!(matches!(
                    kind,
                    AnomalyKind::DustAccumulation | AnomalyKind::PanelFault
                )),
                "inverter-02" => assert_eq!(*kind, AnomalyKind::InverterOverload),
                other => panic!("unexpected trigger for {other}"),
            }
        }
    }

    #[test]
    fn claimed_units_do_not_retrigger() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut reg = EquipmentRegistry::new(&mut rng);
        let mut events = EventLog::new();
        reg.get_mut("panel-03").unwrap().health = 78.0;
        reg.claim("panel-03", 9, AnomalyKind::DustAccumulation, ts(), &mut events, &mut rng);
        assert!(reg.health_check_pass(&mut rng).is_empty());
    }
}
