//! Simulation state aggregate: a single owned object through which all
//! mutation flows
//!
//! Components never mutate each other directly; the tick methods here
//! enforce the per-tick ordering (clock advance → generation recalculation;
//! anomaly sweeps against the already-advanced authoritative time) and push
//! every state change to the event sink. There is no interleaving: each
//! tick or action runs to completion before the next is invoked.

use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::anomaly::AnomalyEngine;
use crate::clock::{ClockError, SimClock};
use crate::drone::{self, DroneScanReport};
use crate::environment::{EnvironmentError, EnvironmentModel};
use crate::equipment::EquipmentRegistry;
use crate::events::EventLog;
use crate::generation::{self, GenerationState};
use crate::types::{
    Anomaly, AnomalyKind, Equipment, EnvironmentalFactors, FactorKind, LogCategory,
};

/// Probability of a random anomaly per 15 s random-event tick.
const RANDOM_EVENT_PROBABILITY: f64 = 0.12;
/// A session this old with no anomaly yet gets one forced on the next
/// random-event tick, so short demo sessions always exercise the engine.
const FORCED_EVENT_AFTER_SECS: i64 = 30;

/// Immutable view published to render/report collaborators after each tick
/// or action.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub now: NaiveDateTime,
    pub simulation_mode: bool,
    pub capacity_mw: f64,
    pub instantaneous_mw: f64,
    pub daily_cumulative_mwh: f64,
    pub factors: EnvironmentalFactors,
    pub manual_control: bool,
    pub active_anomalies: Vec<Anomaly>,
    pub equipment: Vec<Equipment>,
    pub average_equipment_health: f64,
    pub event_count: usize,
}

/// The single mutable simulation-state aggregate.
///
/// All mutation happens through the tick/action methods below, executed to
/// completion before the next is invoked (the scheduler serializes them).
pub struct SimulationState {
    pub clock: SimClock,
    pub environment: EnvironmentModel,
    pub equipment: EquipmentRegistry,
    pub anomalies: AnomalyEngine,
    pub generation: GenerationState,
    pub events: EventLog,
    pub last_drone_scan: Option<DroneScanReport>,
    pub capacity_mw: f64,
    session_started: NaiveDateTime,
    rng: StdRng,
}

impl SimulationState {
    pub fn new(capacity_mw: f64, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let clock = SimClock::new();
        let now = clock.effective_now();
        let mut state = Self {
            equipment: EquipmentRegistry::new(&mut rng),
            clock,
            environment: EnvironmentModel::new(),
            anomalies: AnomalyEngine::new(),
            generation: GenerationState::default(),
            events: EventLog::new(),
            last_drone_scan: None,
            capacity_mw,
            session_started: now,
            rng,
        };
        state.generation.reset(now);
        state
            .events
            .record(now, "Plant simulation started", LogCategory::System);
        state
    }

    pub fn session_started(&self) -> NaiveDateTime {
        self.session_started
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.effective_now()
    }

    // ------------------------------------------------------------------
    // Periodic ticks
    // ------------------------------------------------------------------

    /// 1 s cadence: advance the clock, then recalculate generation from the
    /// just-advanced time. Clock advance strictly precedes generation.
    pub fn clock_tick(&mut self) {
        let tick = self.clock.tick();
        let factors = self.environment.effective_factors();
        let instantaneous = generation::instantaneous_generation(
            tick.now,
            self.capacity_mw,
            &factors,
            self.anomalies.active(),
        );
        let reset = self
            .generation
            .apply_tick(tick.now, tick.dt_hours, instantaneous, tick.day_rolled);
        if reset {
            self.events.record(
                tick.now,
                "Daily cumulative generation reset at midnight",
                LogCategory::Generation,
            );
        }
    }

    /// 10 s cadence: perturb the background-simulated environment.
    pub fn environment_tick(&mut self) {
        let now = self.clock.effective_now();
        self.environment.background_tick(now, &mut self.rng);
    }

    /// 10 s cadence: anomaly sweep (auto-resolve, then escalation), using
    /// the authoritative time already advanced by the clock tick.
    pub fn anomaly_tick(&mut self) {
        let now = self.clock.effective_now();
        self.anomalies.sweep(
            now,
            &mut self.equipment,
            &mut self.environment,
            &mut self.events,
            &mut self.rng,
        );
    }

    /// 10 s cadence: trigger anomalies for unhealthy, unclaimed equipment.
    pub fn health_check_tick(&mut self) {
        let now = self.clock.effective_now();
        let triggers = self.equipment.health_check_pass(&mut self.rng);
        for (unit_id, kind) in triggers {
            self.events.record(
                now,
                format!("Health check: {unit_id} below threshold, generating {kind}"),
                LogCategory::Equipment,
            );
            self.anomalies.spawn(
                kind,
                Some(&unit_id),
                now,
                &mut self.equipment,
                &mut self.environment,
                &mut self.events,
                &mut self.rng,
            );
        }
    }

    /// 60 s cadence: passive equipment degradation.
    pub fn degradation_tick(&mut self) {
        let degraded = self.equipment.degrade_pass(&mut self.rng);
        if degraded > 0 {
            tracing::debug!(count = degraded, "Degradation pass");
        }
    }

    /// 15 s cadence: occasionally spawn a random anomaly. A session that
    /// has run 30 s without any anomaly gets one forced.
    pub fn random_event_tick(&mut self) {
        let now = self.clock.effective_now();
        let session_age = (now - self.session_started).num_seconds();
        let force = self.anomalies.total_spawned() == 0 && session_age >= FORCED_EVENT_AFTER_SECS;
        if !force && !self.rng.gen_bool(RANDOM_EVENT_PROBABILITY) {
            return;
        }
        let kind = AnomalyKind::ALL[self.rng.gen_range(0..AnomalyKind::ALL.len())];
        self.anomalies.spawn(
            kind,
            None,
            now,
            &mut self.equipment,
            &mut self.environment,
            &mut self.events,
            &mut self.rng,
        );
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    /// Switch to simulation mode at the given local time and reinitialize
    /// dependent state.
    pub fn set_manual_time(&mut self, hour: u32, minute: u32) -> Result<(), ClockError> {
        let now = self.clock.set_manual_time(hour, minute)?;
        self.reinitialize(true);
        self.events.record(
            now,
            format!("Simulated time set to {hour:02}:{minute:02}"),
            LogCategory::System,
        );
        Ok(())
    }

    /// Return to real-time mode and reinitialize dependent state.
    pub fn reset_clock(&mut self) {
        let now = self.clock.reset();
        self.reinitialize(true);
        self.events
            .record(now, "Clock reset to real time", LogCategory::System);
    }

    /// Advance one hour without reinitializing. The jump itself is not
    /// integrated into the cumulative; rolling past 23 resets it.
    pub fn advance_one_hour(&mut self) {
        let (now, day_rolled) = self.clock.advance_one_hour();
        if day_rolled {
            self.generation.daily_cumulative_mwh = 0.0;
            self.events.record(
                now,
                "Daily cumulative generation reset at midnight",
                LogCategory::Generation,
            );
        }
        let factors = self.environment.effective_factors();
        self.generation.instantaneous_mw = generation::instantaneous_generation(
            now,
            self.capacity_mw,
            &factors,
            self.anomalies.active(),
        );
        self.generation.last_update = Some(now);
        self.events.record(
            now,
            format!("Time advanced one hour to {}", now.format("%H:%M")),
            LogCategory::System,
        );
    }

    /// Manually spawn an anomaly of the given kind.
    pub fn trigger_anomaly(&mut self, kind: AnomalyKind) -> Option<u64> {
        let now = self.clock.effective_now();
        self.anomalies.spawn(
            kind,
            None,
            now,
            &mut self.equipment,
            &mut self.environment,
            &mut self.events,
            &mut self.rng,
        )
    }

    /// Manually resolve an active anomaly. Silent no-op on unknown or
    /// already-resolved ids.
    pub fn correct_anomaly(&mut self, id: u64) -> bool {
        let now = self.clock.effective_now();
        self.anomalies.correct(
            id,
            now,
            &mut self.equipment,
            &mut self.environment,
            &mut self.events,
            &mut self.rng,
        )
    }

    pub fn set_manual_control(&mut self, enabled: bool) {
        self.environment.set_manual_control(enabled);
        let now = self.clock.effective_now();
        self.events.record(
            now,
            format!(
                "Environmental control switched to {}",
                if enabled { "manual" } else { "simulated" }
            ),
            LogCategory::Environment,
        );
    }

    pub fn set_manual_factor(
        &mut self,
        factor: FactorKind,
        value: f64,
    ) -> Result<(), EnvironmentError> {
        self.environment.set_manual_factor(factor, value)?;
        let now = self.clock.effective_now();
        self.events.record(
            now,
            format!("Manual {factor} set to {value:.1}"),
            LogCategory::Environment,
        );
        Ok(())
    }

    /// Run a drone scan and keep the report as the last-scan state.
    pub fn run_drone_scan(&mut self) -> &DroneScanReport {
        let now = self.clock.effective_now();
        let report = drone::run_scan(&self.equipment, now, &mut self.rng);
        self.events.record(
            now,
            format!(
                "Drone scan finished: {} unit(s), {} finding(s)",
                report.units_scanned,
                report.findings.len()
            ),
            LogCategory::Drone,
        );
        self.last_drone_scan = Some(report);
        // run_drone_scan always stores Some immediately above
        #[allow(clippy::unwrap_used)]
        self.last_drone_scan.as_ref().unwrap()
    }

    /// Full state reset keyed to "the plant just started operating at time
    /// T": generation zeroed, anomalies erased (not resolved), equipment
    /// re-rolled, manual factors defaulted when in manual mode, overrides
    /// and drone state cleared, and the log sink optionally cleared.
    pub fn reinitialize(&mut self, preserve_logs: bool) {
        let now = self.clock.effective_now();
        self.session_started = now;
        self.generation.reset(now);
        self.anomalies.clear();
        self.equipment.reinitialize(&mut self.rng);
        if self.environment.manual_control() {
            self.environment.reset_manual_defaults();
        }
        self.environment.clear_overrides();
        self.last_drone_scan = None;
        if !preserve_logs {
            self.events.clear();
        }
        self.events
            .record(now, "System state reinitialized", LogCategory::System);
        tracing::info!(preserve_logs, "Simulation state reinitialized");
    }

    /// Immutable snapshot for render/report collaborators.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            now: self.clock.effective_now(),
            simulation_mode: self.clock.is_simulated(),
            capacity_mw: self.capacity_mw,
            instantaneous_mw: self.generation.instantaneous_mw,
            daily_cumulative_mwh: self.generation.daily_cumulative_mwh,
            factors: self.environment.effective_factors(),
            manual_control: self.environment.manual_control(),
            active_anomalies: self.anomalies.active().cloned().collect(),
            equipment: self.equipment.units().to_vec(),
            average_equipment_health: self.equipment.average_health(),
            event_count: self.events.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResolvedBy;

    #[test]
    fn clock_tick_recomputes_generation_from_advanced_time() {
        let mut state = SimulationState::new(100.0, Some(1));
        state.set_manual_time(11, 59).unwrap();
        state.set_manual_control(true);
        state.set_manual_factor(FactorKind::Temperature, 25.0).unwrap();
        state.set_manual_factor(FactorKind::DustLevel, 0.0).unwrap();
        state.set_manual_factor(FactorKind::CloudCover, 0.0).unwrap();

        state.clock_tick();
        assert!(state.generation.instantaneous_mw > 99.0);
        assert!(state.generation.daily_cumulative_mwh > 0.0);
    }

    #[test]
    fn reinitialize_erases_anomalies_and_rerolls_equipment() {
        let mut state = SimulationState::new(100.0, Some(2));
        state.set_manual_time(10, 0).unwrap();
        state.trigger_anomaly(AnomalyKind::PanelFault).unwrap();
        state.trigger_anomaly(AnomalyKind::DustStorm).unwrap();
        assert!(state.anomalies.active_count() > 0);

        state.reinitialize(true);
        assert_eq!(state.anomalies.all().len(), 0);
        assert!(state.environment.overrides().is_empty());
        assert!(state.last_drone_scan.is_none());
        assert_eq!(state.generation.daily_cumulative_mwh, 0.0);
        for unit in state.equipment.units() {
            assert!((95.0..=100.0).contains(&unit.health));
            assert!(!unit.is_claimed());
        }
    }

    #[test]
    fn reinitialize_can_clear_logs() {
        let mut state = SimulationState::new(100.0, Some(3));
        state.set_manual_time(10, 0).unwrap();
        assert!(state.events.len() > 1);
        state.reinitialize(false);
        // Only the reinitialization record remains
        assert_eq!(state.events.len(), 1);
    }

    #[test]
    fn forced_random_event_after_quiet_start() {
        let mut state = SimulationState::new(100.0, Some(4));
        state.set_manual_time(10, 0).unwrap();
        for _ in 0..FORCED_EVENT_AFTER_SECS {
            state.clock_tick();
        }
        state.random_event_tick();
        assert!(state.anomalies.total_spawned() >= 1);
    }

    #[test]
    fn full_panel_fault_lifecycle_through_ticks() {
        let mut state = SimulationState::new(100.0, Some(5));
        state.set_manual_time(10, 0).unwrap();
        let id = state.trigger_anomaly(AnomalyKind::PanelFault).unwrap();

        // 199 simulated seconds: still active, fully escalated
        for s in 1..=199 {
            state.clock_tick();
            if s % 10 == 0 {
                state.anomaly_tick();
            }
        }
        let anomaly = state.anomalies.get(id).unwrap();
        assert!(anomaly.active);
        assert_eq!(anomaly.escalation_level, 3);

        // One more second crosses the 200 s timeout
        state.clock_tick();
        state.anomaly_tick();
        let anomaly = state.anomalies.get(id).unwrap();
        assert!(!anomaly.active);
        assert_eq!(anomaly.resolved_by, Some(ResolvedBy::AutoTimeout));
        for unit_id in &anomaly.affected_equipment {
            let unit = state.equipment.get(unit_id).unwrap();
            assert!((96.0..=100.0).contains(&unit.health));
        }
    }

    #[test]
    fn snapshot_reflects_current_state() {
        let mut state = SimulationState::new(50.0, Some(6));
        state.set_manual_time(12, 0).unwrap();
        state.clock_tick();
        let snap = state.snapshot();
        assert!(snap.simulation_mode);
        assert_eq!(snap.capacity_mw, 50.0);
        assert_eq!(snap.equipment.len(), 30);
        assert_eq!(snap.event_count, state.events.len());
    }
}
