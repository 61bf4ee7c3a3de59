//! Anomaly engine: spawn, escalate, auto-resolve, and manual resolution
//!
//! State machine per anomaly: `Active(escalation_level 0..=max)` →
//! `Resolved { by: user | auto-timeout }`, terminal. Equipment kinds claim
//! 2-4 random matching units; environmental kinds set a dust/cloud override
//! instead. A dust-storm resolution cascades into a dust-accumulation
//! anomaly claiming 4-8 panels.
//!
//! The sweep evaluates the 200 s auto-resolve check before the 60 s
//! escalation check so an anomaly exactly at the timeout resolves rather
//! than escalates.

use chrono::NaiveDateTime;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::environment::EnvironmentModel;
use crate::equipment::EquipmentRegistry;
use crate::events::EventLog;
use crate::types::{Anomaly, AnomalyKind, LogCategory, ResolvedBy, Severity};

/// Active anomalies resolve on their own after this many seconds of
/// elapsed active time, measured against the authoritative time source.
pub const AUTO_RESOLVE_SECS: i64 = 200;
/// Escalation interval: one level per 60 s of active time, up to the cap.
pub const ESCALATION_INTERVAL_SECS: i64 = 60;
/// Dust-storm forces effective dust to min(100, base + 50).
const DUST_STORM_SURGE: f64 = 50.0;
/// Cloud-cover forces effective cloud to min(100, base + 70).
const CLOUD_COVER_SURGE: f64 = 70.0;
/// Equipment units claimed by a normal spawn
const SPAWN_CLAIMS: std::ops::RangeInclusive<usize> = 2..=4;
/// Panels claimed by the dust-storm cascade
const CASCADE_CLAIMS: std::ops::RangeInclusive<usize> = 4..=8;

fn impact_range(kind: AnomalyKind) -> std::ops::RangeInclusive<f64> {
    match kind {
        AnomalyKind::PanelFault => 10.0..=25.0,
        AnomalyKind::DustAccumulation => 5.0..=15.0,
        AnomalyKind::InverterOverload => 15.0..=30.0,
        AnomalyKind::DustStorm => 30.0..=50.0,
        AnomalyKind::CloudCover => 20.0..=40.0,
    }
}

fn initial_severity(kind: AnomalyKind) -> Severity {
    match kind {
        AnomalyKind::InverterOverload | AnomalyKind::DustStorm => Severity::Critical,
        AnomalyKind::PanelFault | AnomalyKind::DustAccumulation | AnomalyKind::CloudCover => {
            Severity::Warning
        }
    }
}

fn spawn_location(kind: AnomalyKind, rng: &mut impl Rng) -> String {
    match kind {
        AnomalyKind::DustStorm => "Entire plant area".to_string(),
        AnomalyKind::CloudCover => "Overhead cloud bank".to_string(),
        _ => {
            let array = char::from(b'A' + rng.gen_range(0..5u8));
            let row = rng.gen_range(1..=4u32);
            format!("Array {array}, Row {row}")
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyEngine {
    anomalies: Vec<Anomaly>,
    next_id: u64,
    total_spawned: u64,
}

impl AnomalyEngine {
    pub fn new() -> Self {
        Self {
            anomalies: Vec::new(),
            next_id: 1,
            total_spawned: 0,
        }
    }

    pub fn all(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn active(&self) -> impl Iterator<Item = &Anomaly> {
        self.anomalies.iter().filter(|a| a.active)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn get(&self, id: u64) -> Option<&Anomaly> {
        self.anomalies.iter().find(|a| a.id == id)
    }

    /// Count of anomalies ever spawned this session (survives resolution).
    pub fn total_spawned(&self) -> u64 {
        self.total_spawned
    }

    /// Erase all anomalies (reinitialization; these are not resolved).
    /// Ids stay monotonic across clears.
    pub fn clear(&mut self) {
        self.anomalies.clear();
        self.total_spawned = 0;
    }

    /// Spawn an anomaly of the given kind.
    ///
    /// `seed_unit` pins the claim set to include a specific unit (used by
    /// the equipment health trigger). Returns the new anomaly id, or `None`
    /// when the spawn is skipped: environmental kinds with one already
    /// active, or equipment kinds with no unclaimed matching units.
    pub fn spawn(
        &mut self,
        kind: AnomalyKind,
        seed_unit: Option<&str>,
        now: NaiveDateTime,
        equipment: &mut EquipmentRegistry,
        environment: &mut EnvironmentModel,
        events: &mut EventLog,
        rng: &mut impl Rng,
    ) -> Option<u64> {
        self.spawn_with_claims(kind, seed_unit, SPAWN_CLAIMS, now, equipment, environment, events, rng)
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_with_claims(
        &mut self,
        kind: AnomalyKind,
        seed_unit: Option<&str>,
        claim_range: std::ops::RangeInclusive<usize>,
        now: NaiveDateTime,
        equipment: &mut EquipmentRegistry,
        environment: &mut EnvironmentModel,
        events: &mut EventLog,
        rng: &mut impl Rng,
    ) -> Option<u64> {
        // One active environmental anomaly per kind; a second storm over the
        // first would clobber the saved pre-override source on resolution.
        if kind.is_environmental() && self.active().any(|a| a.kind == kind) {
            tracing::debug!(kind = kind.short_code(), "Spawn skipped: already active");
            return None;
        }

        let mut claimed: Vec<String> = Vec::new();
        if let Some(equipment_kind) = kind.claimed_equipment_kind() {
            // A health trigger can go stale within one pass: an earlier spawn
            // in the same sweep may already have claimed the trigger unit.
            if let Some(seed) = seed_unit {
                let seed_is_free = equipment.get(seed).is_some_and(|u| !u.is_claimed());
                if !seed_is_free {
                    tracing::debug!(unit = seed, "Spawn skipped: trigger unit already claimed");
                    return None;
                }
                claimed.push(seed.to_string());
            }

            let mut candidates = equipment.unclaimed_of_kind(equipment_kind);
            if let Some(seed) = seed_unit {
                candidates.retain(|id| id != seed);
            }
            candidates.shuffle(rng);

            let target = rng.gen_range(claim_range);
            claimed.extend(
                candidates
                    .into_iter()
                    .take(target.saturating_sub(claimed.len())),
            );
            if claimed.is_empty() {
                tracing::debug!(kind = kind.short_code(), "Spawn skipped: no unclaimed units");
                return None;
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.total_spawned += 1;

        let anomaly = Anomaly {
            id,
            kind,
            name: kind.display_name().to_string(),
            location: spawn_location(kind, rng),
            impact_percent: rng.gen_range(impact_range(kind)),
            severity: initial_severity(kind),
            created_at: now,
            active: true,
            escalation_level: 0,
            last_escalation_at: None,
            affected_equipment: claimed.clone(),
            resolved_at: None,
            resolved_by: None,
        };

        for unit_id in &claimed {
            equipment.claim(unit_id, id, kind, now, events, rng);
        }
        match kind {
            AnomalyKind::DustStorm => {
                let base = environment.source_factors().dust_level;
                environment.set_dust_override(Some((base + DUST_STORM_SURGE).min(100.0)));
                events.record(
                    now,
                    format!("Dust level forced to {:.1}% by dust storm", (base + DUST_STORM_SURGE).min(100.0)),
                    LogCategory::Environment,
                );
            }
            AnomalyKind::CloudCover => {
                let base = environment.source_factors().cloud_cover;
                environment.set_cloud_override(Some((base + CLOUD_COVER_SURGE).min(100.0)));
                events.record(
                    now,
                    format!("Cloud cover forced to {:.1}% by cloud bank", (base + CLOUD_COVER_SURGE).min(100.0)),
                    LogCategory::Environment,
                );
            }
            _ => {}
        }

        events.record(
            now,
            format!(
                "{} anomaly #{id} at {} ({:.0}% impact, {} unit(s) affected)",
                anomaly.name,
                anomaly.location,
                anomaly.impact_percent,
                anomaly.affected_equipment.len()
            ),
            LogCategory::Anomaly,
        );
        tracing::info!(
            id,
            kind = kind.short_code(),
            impact = anomaly.impact_percent,
            affected = anomaly.affected_equipment.len(),
            "Anomaly spawned"
        );

        self.anomalies.push(anomaly);
        debug_assert!(self.claims_are_exclusive());
        Some(id)
    }

    /// One sweep (10 s cadence): auto-resolve timed-out anomalies, then
    /// escalate the rest. Cascades spawned by resolutions happen after the
    /// sweep so a fresh anomaly is never escalated in the same pass.
    #[allow(clippy::too_many_arguments)]
    pub fn sweep(
        &mut self,
        now: NaiveDateTime,
        equipment: &mut EquipmentRegistry,
        environment: &mut EnvironmentModel,
        events: &mut EventLog,
        rng: &mut impl Rng,
    ) {
        let mut cascades = Vec::new();

        for idx in 0..self.anomalies.len() {
            if !self.anomalies[idx].active {
                continue;
            }
            let elapsed = self.anomalies[idx].active_secs(now);

            // Auto-resolve precedes escalation: an anomaly exactly at the
            // timeout resolves rather than escalates.
            if elapsed >= AUTO_RESOLVE_SECS {
                if let Some(kind) =
                    self.resolve_idx(idx, ResolvedBy::AutoTimeout, now, equipment, environment, events, rng)
                {
                    cascades.push(kind);
                }
                continue;
            }

            let anomaly = &mut self.anomalies[idx];
            let cap = anomaly.kind.max_escalation();
            if anomaly.escalation_level < cap
                && elapsed >= i64::from(anomaly.escalation_level + 1) * ESCALATION_INTERVAL_SECS
            {
                anomaly.escalation_level += 1;
                anomaly.last_escalation_at = Some(now);

                let (severity, alert) = match anomaly.escalation_level {
                    1 => (
                        Severity::Warning,
                        format!("{} #{} unresolved for 60s", anomaly.name, anomaly.id),
                    ),
                    2 => (
                        Severity::Critical,
                        format!("{} #{} escalated to critical", anomaly.name, anomaly.id),
                    ),
                    _ => (
                        Severity::Critical,
                        format!(
                            "{} #{} final warning: auto-resolution in {}s",
                            anomaly.name,
                            anomaly.id,
                            AUTO_RESOLVE_SECS - elapsed
                        ),
                    ),
                };
                anomaly.severity = anomaly.severity.max(severity);
                events.record(now, alert, LogCategory::Alert);
                tracing::warn!(
                    id = anomaly.id,
                    level = anomaly.escalation_level,
                    severity = %anomaly.severity,
                    "Anomaly escalated"
                );
            }
        }

        for kind in cascades {
            self.spawn_with_claims(kind, None, CASCADE_CLAIMS, now, equipment, environment, events, rng);
        }
    }

    /// Manual resolution. No-op (returns false) for unknown ids or
    /// anomalies that are no longer active.
    pub fn correct(
        &mut self,
        id: u64,
        now: NaiveDateTime,
        equipment: &mut EquipmentRegistry,
        environment: &mut EnvironmentModel,
        events: &mut EventLog,
        rng: &mut impl Rng,
    ) -> bool {
        let Some(idx) = self.anomalies.iter().position(|a| a.id == id && a.active) else {
            return false;
        };
        let cascade =
            self.resolve_idx(idx, ResolvedBy::User, now, equipment, environment, events, rng);
        if let Some(kind) = cascade {
            self.spawn_with_claims(kind, None, CASCADE_CLAIMS, now, equipment, environment, events, rng);
        }
        true
    }

    /// Transition one anomaly to `Resolved`: release claimed equipment or
    /// clear the corresponding override. Returns the cascade kind to spawn
    /// (dust-storm → dust-accumulation), if any.
    #[allow(clippy::too_many_arguments)]
    fn resolve_idx(
        &mut self,
        idx: usize,
        by: ResolvedBy,
        now: NaiveDateTime,
        equipment: &mut EquipmentRegistry,
        environment: &mut EnvironmentModel,
        events: &mut EventLog,
        rng: &mut impl Rng,
    ) -> Option<AnomalyKind> {
        let (id, kind, name, affected) = {
            let anomaly = &mut self.anomalies[idx];
            anomaly.active = false;
            anomaly.resolved_at = Some(now);
            anomaly.resolved_by = Some(by);
            (
                anomaly.id,
                anomaly.kind,
                anomaly.name.clone(),
                anomaly.affected_equipment.clone(),
            )
        };

        match kind {
            AnomalyKind::DustStorm => environment.set_dust_override(None),
            AnomalyKind::CloudCover => environment.set_cloud_override(None),
            _ => {
                for unit_id in &affected {
                    equipment.release(unit_id, now, events, rng);
                }
            }
        }

        events.record(
            now,
            format!("{name} anomaly #{id} resolved ({by})"),
            LogCategory::Anomaly,
        );
        tracing::info!(id, kind = kind.short_code(), resolved_by = %by, "Anomaly resolved");

        (kind == AnomalyKind::DustStorm).then_some(AnomalyKind::DustAccumulation)
    }

    /// Invariant: no equipment id is referenced by more than one active
    /// anomaly.
    pub fn claims_are_exclusive(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        for anomaly in self.active() {
            for id in &anomaly.affected_equipment {
                if !seen.insert(id) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EquipmentStatus;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Fixture {
        engine: AnomalyEngine,
        equipment: EquipmentRegistry,
        environment: EnvironmentModel,
        events: EventLog,
        rng: StdRng,
        t0: NaiveDateTime,
    }

    impl Fixture {
        fn new(seed: u64) -> Self {
            let mut rng = StdRng::seed_from_u64(seed);
            Self {
                engine: AnomalyEngine::new(),
                equipment: EquipmentRegistry::new(&mut rng),
                environment: EnvironmentModel::new(),
                events: EventLog::new(),
                rng,
                t0: NaiveDate::from_ymd_opt(2026, 6, 1)
                    .unwrap()
                    .and_hms_opt(10, 0, 0)
                    .unwrap(),
            }
        }

        fn spawn(&mut self, kind: AnomalyKind) -> Option<u64> {
            self.spawn_seeded(kind, None)
        }

        fn spawn_seeded(&mut self, kind: AnomalyKind, seed_unit: Option<&str>) -> Option<u64> {
            self.engine.spawn(
                kind,
                seed_unit,
                self.t0,
                &mut self.equipment,
                &mut self.environment,
                &mut self.events,
                &mut self.rng,
            )
        }

        fn sweep_at(&mut self, offset_secs: i64) {
            let now = self.t0 + Duration::seconds(offset_secs);
            self.engine.sweep(
                now,
                &mut self.equipment,
                &mut self.environment,
                &mut self.events,
                &mut self.rng,
            );
        }
    }

    #[test]
    fn equipment_spawn_claims_two_to_four_units() {
        let mut fx = Fixture::new(1);
        let id = fx.spawn(AnomalyKind::PanelFault).unwrap();
        let anomaly = fx.engine.get(id).unwrap();
        assert!((2..=4).contains(&anomaly.affected_equipment.len()));
        for unit_id in &anomaly.affected_equipment {
            let unit = fx.equipment.get(unit_id).unwrap();
            assert_eq!(unit.active_anomaly_id, Some(id));
            assert_eq!(unit.status, EquipmentStatus::Faulty);
        }
    }

    #[test]
    fn dust_storm_sets_override_and_reverts_on_resolution() {
        let mut fx = Fixture::new(2);
        let base_dust = fx.environment.source_factors().dust_level;
        let id = fx.spawn(AnomalyKind::DustStorm).unwrap();

        let forced = fx.environment.effective_factors().dust_level;
        assert!((forced - (base_dust + 50.0).min(100.0)).abs() < 1e-9);

        fx.engine.correct(
            id,
            fx.t0 + Duration::seconds(5),
            &mut fx.equipment,
            &mut fx.environment,
            &mut fx.events,
            &mut fx.rng,
        );
        // Reverts exactly to the pre-override source
        assert_eq!(fx.environment.effective_factors().dust_level, base_dust);
    }

    #[test]
    fn dust_storm_resolution_cascades_dust_accumulation() {
        let mut fx = Fixture::new(3);
        fx.spawn(AnomalyKind::DustStorm).unwrap();
        fx.sweep_at(AUTO_RESOLVE_SECS);

        let cascade: Vec<_> = fx
            .engine
            .active()
            .filter(|a| a.kind == AnomalyKind::DustAccumulation)
            .collect();
        assert_eq!(cascade.len(), 1);
        assert!((4..=8).contains(&cascade[0].affected_equipment.len()));
    }

    #[test]
    fn escalation_stops_at_kind_cap() {
        let mut fx = Fixture::new(4);
        let eq_id = fx.spawn(AnomalyKind::PanelFault).unwrap();
        let env_id = fx.spawn(AnomalyKind::CloudCover).unwrap();

        for s in (10..AUTO_RESOLVE_SECS).step_by(10) {
            fx.sweep_at(s);
        }
        assert_eq!(fx.engine.get(eq_id).unwrap().escalation_level, 3);
        assert_eq!(fx.engine.get(env_id).unwrap().escalation_level, 1);
    }

    #[test]
    fn auto_resolve_precedes_escalation_at_timeout() {
        let mut fx = Fixture::new(5);
        let id = fx.spawn(AnomalyKind::InverterOverload).unwrap();

        // Single sweep exactly at the timeout: must resolve, not escalate
        fx.sweep_at(AUTO_RESOLVE_SECS);
        let anomaly = fx.engine.get(id).unwrap();
        assert!(!anomaly.active);
        assert_eq!(anomaly.resolved_by, Some(ResolvedBy::AutoTimeout));
        assert_eq!(anomaly.escalation_level, 0);
    }

    #[test]
    fn resolution_releases_claimed_equipment() {
        let mut fx = Fixture::new(6);
        let id = fx.spawn(AnomalyKind::PanelFault).unwrap();
        let affected = fx.engine.get(id).unwrap().affected_equipment.clone();

        fx.sweep_at(AUTO_RESOLVE_SECS + 3);
        for unit_id in &affected {
            let unit = fx.equipment.get(unit_id).unwrap();
            assert_eq!(unit.status, EquipmentStatus::Healthy);
            assert!((96.0..=100.0).contains(&unit.health));
            assert!(unit.active_anomaly_id.is_none());
        }
    }

    #[test]
    fn correcting_inactive_or_unknown_anomaly_is_noop() {
        let mut fx = Fixture::new(7);
        let id = fx.spawn(AnomalyKind::PanelFault).unwrap();
        fx.sweep_at(AUTO_RESOLVE_SECS);

        let now = fx.t0 + Duration::seconds(300);
        assert!(!fx.engine.correct(id, now, &mut fx.equipment, &mut fx.environment, &mut fx.events, &mut fx.rng));
        assert!(!fx.engine.correct(9999, now, &mut fx.equipment, &mut fx.environment, &mut fx.events, &mut fx.rng));
    }

    #[test]
    fn claims_stay_exclusive_across_many_spawns() {
        let mut fx = Fixture::new(8);
        for _ in 0..12 {
            fx.spawn(AnomalyKind::PanelFault);
            fx.spawn(AnomalyKind::DustAccumulation);
            fx.spawn(AnomalyKind::InverterOverload);
            assert!(fx.engine.claims_are_exclusive());
        }
    }

    #[test]
    fn trigger_unit_is_always_in_the_claim_set() {
        let mut fx = Fixture::new(10);
        let id = fx
            .spawn_seeded(AnomalyKind::InverterOverload, Some("inverter-03"))
            .unwrap();
        let anomaly = fx.engine.get(id).unwrap();
        assert!(anomaly.affected_equipment.iter().any(|u| u == "inverter-03"));
        assert!(fx.engine.claims_are_exclusive());
    }

    #[test]
    fn stale_trigger_on_claimed_unit_skips_the_spawn() {
        // Two units dip below the health threshold in the same pass and the
        // first spawn's random claim set swallows the second trigger's unit.
        let mut fx = Fixture::new(11);
        let first = fx
            .spawn_seeded(AnomalyKind::PanelFault, Some("panel-01"))
            .unwrap();
        let swallowed = fx
            .engine
            .get(first)
            .unwrap()
            .affected_equipment
            .last()
            .unwrap()
            .clone();

        let second = fx.spawn_seeded(AnomalyKind::DustAccumulation, Some(&swallowed));
        assert!(second.is_none());
        assert!(fx.engine.claims_are_exclusive());
        // The swallowed unit still belongs to the first anomaly only
        let unit = fx.equipment.get(&swallowed).unwrap();
        assert_eq!(unit.active_anomaly_id, Some(first));
    }

    #[test]
    fn duplicate_environmental_anomaly_skipped() {
        let mut fx = Fixture::new(9);
        assert!(fx.spawn(AnomalyKind::DustStorm).is_some());
        assert!(fx.spawn(AnomalyKind::DustStorm).is_none());
    }
}
