//! Log export document and report bundle
//!
//! The export document is a plain-text operations log with sections in a
//! fixed order; the state-snapshot section is machine-parseable so exported
//! documents can be verified against the state they were generated from.
//! The report bundle is the serde-serializable aggregate handed to external
//! reporting collaborators.

use std::fmt::Write as _;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::drone::DroneScanReport;
use crate::events::EventLog;
use crate::generation::DeratingFactors;
use crate::llm::{ChatMessage, Role};
use crate::state::{SimulationState, Snapshot};
use crate::types::{Anomaly, Equipment, EnvironmentalFactors, EquipmentStatus, LogCategory};

const STATE_SECTION: &str = "--- CURRENT SYSTEM STATE ---";

// ============================================================================
// Plain-text export document
// ============================================================================

/// Render the full operations log document. Section order is fixed; empty
/// sections still print their header with a placeholder line.
pub fn export_log_document(state: &SimulationState, chat_history: &[ChatMessage]) -> String {
    let snapshot = state.snapshot();
    let now = snapshot.now;
    let session_secs = (now - state.session_started()).num_seconds().max(0);

    let mut doc = String::new();
    let _ = writeln!(doc, "=== SOLAR PLANT OPERATIONS LOG ===");
    let _ = writeln!(doc, "Generated at: {}", now.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(
        doc,
        "Session duration: {}m {}s",
        session_secs / 60,
        session_secs % 60
    );
    let _ = writeln!(doc, "Log entries: {}", state.events.len());
    doc.push('\n');

    write_state_section(&mut doc, &snapshot);
    write_category_section(&mut doc, "--- ALERTS ---", &state.events, LogCategory::Alert);
    write_anomaly_history(&mut doc, state.anomalies.all());
    write_category_section(
        &mut doc,
        "--- SYSTEM OPERATIONS ---",
        &state.events,
        LogCategory::System,
    );
    write_active_anomaly_details(&mut doc, &snapshot.active_anomalies, now);
    write_drone_section(&mut doc, state.last_drone_scan.as_ref());
    write_chat_section(&mut doc, chat_history);

    tracing::info!(chars = doc.len(), entries = state.events.len(), "Log document exported");
    doc
}

fn write_state_section(doc: &mut String, snapshot: &Snapshot) {
    let f = &snapshot.factors;
    let _ = writeln!(doc, "{STATE_SECTION}");
    let _ = writeln!(doc, "Time: {}", snapshot.now.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(
        doc,
        "Mode: {}",
        if snapshot.simulation_mode {
            "simulated time"
        } else {
            "real time"
        }
    );
    let _ = writeln!(doc, "Plant capacity: {:.1} MW", snapshot.capacity_mw);
    let _ = writeln!(
        doc,
        "Instantaneous output: {:.3} MW",
        snapshot.instantaneous_mw
    );
    let _ = writeln!(
        doc,
        "Daily cumulative: {:.3} MWh",
        snapshot.daily_cumulative_mwh
    );
    let _ = writeln!(
        doc,
        "Environment: {:.1} C, dust {:.0}%, cloud {:.0}%, humidity {:.0}% ({})",
        f.temperature_c,
        f.dust_level,
        f.cloud_cover,
        f.humidity,
        if snapshot.manual_control {
            "manual"
        } else {
            "simulated"
        }
    );
    let _ = writeln!(
        doc,
        "Active anomalies: {}",
        snapshot.active_anomalies.len()
    );
    let _ = writeln!(
        doc,
        "Average equipment health: {:.1}%",
        snapshot.average_equipment_health
    );
    doc.push('\n');
}

fn write_category_section(
    doc: &mut String,
    header: &str,
    events: &EventLog,
    category: LogCategory,
) {
    let _ = writeln!(doc, "{header}");
    let mut any = false;
    for entry in events.iter_category(category) {
        any = true;
        let _ = writeln!(
            doc,
            "[{}] {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.message
        );
    }
    if !any {
        let _ = writeln!(doc, "(none)");
    }
    doc.push('\n');
}

fn write_anomaly_history(doc: &mut String, anomalies: &[Anomaly]) {
    let _ = writeln!(doc, "--- ANOMALY HISTORY ---");
    if anomalies.is_empty() {
        let _ = writeln!(doc, "(none)");
    }
    for a in anomalies {
        let outcome = match (&a.resolved_by, a.active) {
            (_, true) => "ACTIVE".to_string(),
            (Some(by), false) => format!("resolved ({by})"),
            (None, false) => "resolved".to_string(),
        };
        let _ = writeln!(
            doc,
            "#{} {} at {} | severity {} | peak level {} | {}",
            a.id,
            a.kind.display_name(),
            a.location,
            a.severity,
            a.escalation_level,
            outcome
        );
    }
    doc.push('\n');
}

fn write_active_anomaly_details(doc: &mut String, active: &[Anomaly], now: NaiveDateTime) {
    let _ = writeln!(doc, "--- ACTIVE ANOMALY DETAILS ---");
    if active.is_empty() {
        let _ = writeln!(doc, "(none)");
    }
    for a in active {
        let _ = writeln!(
            doc,
            "#{} {} at {} | impact {:.0}% | level {} | active for {} s | affects: {}",
            a.id,
            a.kind.display_name(),
            a.location,
            a.impact_percent,
            a.escalation_level,
            a.active_secs(now),
            if a.affected_equipment.is_empty() {
                "-".to_string()
            } else {
                a.affected_equipment.join(", ")
            }
        );
    }
    doc.push('\n');
}

fn write_drone_section(doc: &mut String, scan: Option<&DroneScanReport>) {
    let _ = writeln!(doc, "--- LAST DRONE SCAN ---");
    match scan {
        None => {
            let _ = writeln!(doc, "(no scan this session)");
        }
        Some(report) => {
            let _ = writeln!(
                doc,
                "Started {} | {:.0} s | {} unit(s) | {} finding(s)",
                report.started_at.format("%H:%M:%S"),
                report.duration_secs,
                report.units_scanned,
                report.findings.len()
            );
            for finding in &report.findings {
                let _ = writeln!(doc, "  [{:.1}%] {}", finding.health, finding.note);
            }
        }
    }
    doc.push('\n');
}

fn write_chat_section(doc: &mut String, history: &[ChatMessage]) {
    let _ = writeln!(doc, "--- AI CONVERSATION ---");
    if history.is_empty() {
        let _ = writeln!(doc, "(none)");
    }
    for msg in history {
        let speaker = match msg.role {
            Role::User => "Operator",
            Role::Assistant => "Assistant",
            Role::System => continue,
        };
        let _ = writeln!(doc, "{speaker}: {}", msg.content);
    }
}

// ============================================================================
// State-snapshot parser (round-trip verification)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStateSnapshot {
    pub instantaneous_mw: f64,
    pub daily_cumulative_mwh: f64,
    pub active_anomaly_count: usize,
}

/// Re-derive the key state values from an exported document. Returns None
/// when the state section is missing or malformed.
pub fn parse_state_snapshot(document: &str) -> Option<ParsedStateSnapshot> {
    let section_start = document.find(STATE_SECTION)?;
    let section = &document[section_start..];
    let section = section.split("\n\n").next()?;

    let mut instantaneous = None;
    let mut cumulative = None;
    let mut anomalies = None;
    for line in section.lines() {
        if let Some(rest) = line.strip_prefix("Instantaneous output: ") {
            instantaneous = rest.strip_suffix(" MW")?.parse().ok();
        } else if let Some(rest) = line.strip_prefix("Daily cumulative: ") {
            cumulative = rest.strip_suffix(" MWh")?.parse().ok();
        } else if let Some(rest) = line.strip_prefix("Active anomalies: ") {
            anomalies = rest.parse().ok();
        }
    }
    Some(ParsedStateSnapshot {
        instantaneous_mw: instantaneous?,
        daily_cumulative_mwh: cumulative?,
        active_anomaly_count: anomalies?,
    })
}

// ============================================================================
// Report bundle
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PlantInfo {
    pub capacity_mw: f64,
    pub generated_at: NaiveDateTime,
    pub session_started: NaiveDateTime,
    pub simulation_mode: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentalSection {
    pub factors: EnvironmentalFactors,
    pub manual_control: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalySection {
    pub active: Vec<Anomaly>,
    pub history: Vec<Anomaly>,
    pub total_spawned: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EquipmentSection {
    pub units: Vec<Equipment>,
    pub average_health: f64,
    pub degraded_count: usize,
    pub faulty_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogSection {
    pub entry_count: usize,
    pub alerts: Vec<String>,
    pub recent: Vec<String>,
}

/// Per-category entry counts.
#[derive(Debug, Clone, Serialize)]
pub struct LogAnalysis {
    pub alerts: usize,
    pub anomalies: usize,
    pub equipment: usize,
    pub environment: usize,
    pub generation: usize,
    pub system: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentalImpact {
    pub temperature_derate: f64,
    pub dust_derate: f64,
    pub cloud_derate: f64,
    pub combined_derate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportBundle {
    pub plant_info: PlantInfo,
    pub environmental: EnvironmentalSection,
    pub anomalies: AnomalySection,
    pub equipment: EquipmentSection,
    pub logs: LogSection,
    pub log_analysis: LogAnalysis,
    pub operational_insights: Vec<String>,
    pub environmental_impact: EnvironmentalImpact,
}

pub fn build_report_bundle(state: &SimulationState) -> ReportBundle {
    let snapshot = state.snapshot();
    let derating = DeratingFactors::from_factors(&snapshot.factors);

    let degraded_count = snapshot
        .equipment
        .iter()
        .filter(|u| u.status == EquipmentStatus::Degraded)
        .count();
    let faulty_count = snapshot
        .equipment
        .iter()
        .filter(|u| u.status == EquipmentStatus::Faulty)
        .count();

    let fmt_entry = |e: &crate::types::LogEntry| {
        format!("[{}] {}", e.timestamp.format("%H:%M:%S"), e.message)
    };

    ReportBundle {
        plant_info: PlantInfo {
            capacity_mw: snapshot.capacity_mw,
            generated_at: snapshot.now,
            session_started: state.session_started(),
            simulation_mode: snapshot.simulation_mode,
        },
        environmental: EnvironmentalSection {
            factors: snapshot.factors,
            manual_control: snapshot.manual_control,
        },
        anomalies: AnomalySection {
            active: snapshot.active_anomalies.clone(),
            history: state.anomalies.all().to_vec(),
            total_spawned: state.anomalies.total_spawned(),
        },
        equipment: EquipmentSection {
            average_health: snapshot.average_equipment_health,
            degraded_count,
            faulty_count,
            units: snapshot.equipment.clone(),
        },
        logs: LogSection {
            entry_count: state.events.len(),
            alerts: state
                .events
                .iter_category(LogCategory::Alert)
                .map(fmt_entry)
                .collect(),
            recent: state.events.tail(50).iter().map(fmt_entry).collect(),
        },
        log_analysis: LogAnalysis {
            alerts: state.events.iter_category(LogCategory::Alert).count(),
            anomalies: state.events.iter_category(LogCategory::Anomaly).count(),
            equipment: state.events.iter_category(LogCategory::Equipment).count(),
            environment: state.events.iter_category(LogCategory::Environment).count(),
            generation: state.events.iter_category(LogCategory::Generation).count(),
            system: state.events.iter_category(LogCategory::System).count(),
        },
        operational_insights: operational_insights(&snapshot, faulty_count, degraded_count),
        environmental_impact: EnvironmentalImpact {
            temperature_derate: derating.temperature,
            dust_derate: derating.dust,
            cloud_derate: derating.cloud,
            combined_derate: derating.combined(),
        },
    }
}

fn operational_insights(snapshot: &Snapshot, faulty: usize, degraded: usize) -> Vec<String> {
    let mut insights = Vec::new();
    if snapshot.instantaneous_mw == 0.0 {
        insights.push("Plant is outside generation hours (06:00-18:00).".to_string());
    }
    if !snapshot.active_anomalies.is_empty() {
        insights.push(format!(
            "{} active anomaly(ies) reducing output; corrective action available.",
            snapshot.active_anomalies.len()
        ));
    }
    if faulty + degraded > 0 {
        insights.push(format!(
            "{faulty} faulty and {degraded} degraded unit(s) in the fleet."
        ));
    }
    if snapshot.factors.dust_level > 40.0 {
        insights.push("High dust level; consider panel cleaning.".to_string());
    }
    if insights.is_empty() {
        insights.push("Plant operating normally.".to_string());
    }
    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnomalyKind;

    fn sample_state() -> SimulationState {
        let mut state = SimulationState::new(100.0, Some(21));
        state.set_manual_time(12, 0).unwrap();
        state.clock_tick();
        state.trigger_anomaly(AnomalyKind::PanelFault).unwrap();
        state.clock_tick();
        state
    }

    #[test]
    fn document_sections_appear_in_fixed_order() {
        let state = sample_state();
        let chat = vec![
            ChatMessage::user("status?"),
            ChatMessage::assistant("one active anomaly"),
        ];
        let doc = export_log_document(&state, &chat);

        let order = [
            "=== SOLAR PLANT OPERATIONS LOG ===",
            STATE_SECTION,
            "--- ALERTS ---",
            "--- ANOMALY HISTORY ---",
            "--- SYSTEM OPERATIONS ---",
            "--- ACTIVE ANOMALY DETAILS ---",
            "--- LAST DRONE SCAN ---",
            "--- AI CONVERSATION ---",
        ];
        let mut last = 0;
        for header in order {
            let pos = doc.find(header).unwrap_or_else(|| panic!("missing {header}"));
            assert!(pos >= last, "{header} out of order");
            last = pos;
        }
        assert!(doc.contains("Operator: status?"));
        assert!(doc.contains("Panel Fault"));
    }

    #[test]
    fn state_snapshot_round_trips_through_document() {
        let state = sample_state();
        let snapshot = state.snapshot();
        let doc = export_log_document(&state, &[]);
        let parsed = parse_state_snapshot(&doc).unwrap();

        assert!((parsed.instantaneous_mw - snapshot.instantaneous_mw).abs() < 0.001);
        assert!((parsed.daily_cumulative_mwh - snapshot.daily_cumulative_mwh).abs() < 0.001);
        assert_eq!(parsed.active_anomaly_count, snapshot.active_anomalies.len());
    }

    #[test]
    fn parser_rejects_documents_without_state_section() {
        assert!(parse_state_snapshot("not a log document").is_none());
    }

    #[test]
    fn bundle_serializes_and_counts_match() {
        let mut state = sample_state();
        state.run_drone_scan();
        let bundle = build_report_bundle(&state);

        assert_eq!(bundle.anomalies.active.len(), 1);
        assert_eq!(bundle.equipment.units.len(), 30);
        assert_eq!(bundle.logs.entry_count, state.events.len());
        assert!(bundle.environmental_impact.combined_derate <= 1.0);
        assert!(!bundle.operational_insights.is_empty());

        let json = serde_json::to_string(&bundle).unwrap();
        assert!(json.contains("plant_info"));
        assert!(json.contains("environmental_impact"));
    }
}
