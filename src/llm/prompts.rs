//! Prompt construction for the chat collaborator and the analysis task.
//!
//! Both prompts ground the model in the live plant snapshot so replies talk
//! about the plant in front of the operator, not a generic one.

use crate::state::Snapshot;

const CHAT_SYSTEM_PROMPT: &str = r#"You are the operations assistant for a solar power plant.
Answer the operator's questions using the plant state below. Be concise and
concrete; cite the numbers you are given. If asked about anomalies, name them
by id and say what corrective action is available.

### PLANT STATE
Time: {time} | Mode: {mode}
Capacity: {capacity} MW | Output: {output} MW | Today: {cumulative} MWh
Temperature: {temperature} C | Dust: {dust}% | Cloud: {cloud}% | Humidity: {humidity}%
Active anomalies: {anomalies}
Fleet average health: {avg_health}%"#;

const ANALYSIS_PROMPT: &str = r#"Review the solar plant state below and report in at most four sentences:
the current generation situation, any active anomalies with their escalation
level, and the single most useful operator action right now. No preamble.

### PLANT STATE
Time: {time} | Mode: {mode}
Capacity: {capacity} MW | Output: {output} MW | Today: {cumulative} MWh
Temperature: {temperature} C | Dust: {dust}% | Cloud: {cloud}% | Humidity: {humidity}%
Active anomalies: {anomalies}
Fleet average health: {avg_health}%"#;

fn anomaly_summary(snapshot: &Snapshot) -> String {
    if snapshot.active_anomalies.is_empty() {
        return "none".to_string();
    }
    snapshot
        .active_anomalies
        .iter()
        .map(|a| {
            format!(
                "#{} {} at {} (level {}, {:.0}% impact)",
                a.id,
                a.kind.display_name(),
                a.location,
                a.escalation_level,
                a.impact_percent
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn fill(template: &str, snapshot: &Snapshot) -> String {
    let f = &snapshot.factors;
    template
        .replace("{time}", &snapshot.now.format("%Y-%m-%d %H:%M:%S").to_string())
        .replace(
            "{mode}",
            if snapshot.simulation_mode {
                "simulated time"
            } else {
                "real time"
            },
        )
        .replace("{capacity}", &format!("{:.0}", snapshot.capacity_mw))
        .replace("{output}", &format!("{:.3}", snapshot.instantaneous_mw))
        .replace(
            "{cumulative}",
            &format!("{:.3}", snapshot.daily_cumulative_mwh),
        )
        .replace("{temperature}", &format!("{:.1}", f.temperature_c))
        .replace("{dust}", &format!("{:.0}", f.dust_level))
        .replace("{cloud}", &format!("{:.0}", f.cloud_cover))
        .replace("{humidity}", &format!("{:.0}", f.humidity))
        .replace("{anomalies}", &anomaly_summary(snapshot))
        .replace(
            "{avg_health}",
            &format!("{:.1}", snapshot.average_equipment_health),
        )
}

/// System prompt for interactive operator chat.
pub fn chat_system_prompt(snapshot: &Snapshot) -> String {
    fill(CHAT_SYSTEM_PROMPT, snapshot)
}

/// User prompt for the periodic automatic analysis.
pub fn analysis_prompt(snapshot: &Snapshot) -> String {
    fill(ANALYSIS_PROMPT, snapshot)
}
