//! SolarOps: Solar Power Plant Simulation Engine
//!
//! Deterministic-capable simulation of a utility-scale solar plant.
//!
//! ## Architecture
//!
//! - **Clock**: real-time or operator-pinned simulated time, 1 s ticks
//! - **Environment**: manual or background-simulated factors plus anomaly
//!   overrides, with override > manual > simulated precedence
//! - **Generation**: half-sine daylight curve derated multiplicatively by
//!   environment and active equipment anomalies
//! - **Anomaly Engine**: spawn, escalation, 200 s auto-resolve, cascades
//! - **Scheduler**: tokio tick loop serializing all state mutation
//! - **LLM Module**: OpenAI-compatible chat collaborator and auto-analysis

pub mod anomaly;
pub mod clock;
pub mod config;
pub mod drone;
pub mod environment;
pub mod equipment;
pub mod events;
pub mod generation;
pub mod llm;
pub mod report;
pub mod scheduler;
pub mod state;
pub mod types;

// Re-export persisted settings
pub use config::{Settings, SettingsError};

// Re-export commonly used types
pub use types::{
    Anomaly, AnomalyKind, AnomalyOverrides, EnvironmentalFactors, Equipment, EquipmentKind,
    EquipmentStatus, FactorKind, LogCategory, LogEntry, ResolvedBy, Severity,
};

// Re-export the state aggregate and scheduler surface
pub use scheduler::{Command, PeriodicTask, Scheduler, SchedulerHandle};
pub use state::{SimulationState, Snapshot};

// Re-export LLM components
pub use llm::{ChatBackend, ChatError, ChatMessage, HttpChatBackend, Role};

// Re-export reporting
pub use report::{build_report_bundle, export_log_document, parse_state_snapshot, ReportBundle};
