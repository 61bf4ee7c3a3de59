//! Tick scheduler: drives the simulation on fixed cadences
//!
//! A single task owns the `SimulationState` and multiplexes the periodic
//! intervals (1 s clock, 10 s environment/anomaly/health sweep, 15 s random
//! events, 60 s degradation) with a command channel for user actions, so
//! every mutation runs to completion before the next. Snapshots are
//! published over a watch channel after each tick or action; render
//! collaborators subscribe instead of holding state references.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::llm::ChatMessage;
use crate::report;
use crate::state::{SimulationState, Snapshot};
use crate::types::{AnomalyKind, FactorKind};

pub const CLOCK_CADENCE: Duration = Duration::from_secs(1);
pub const SWEEP_CADENCE: Duration = Duration::from_secs(10);
pub const RANDOM_EVENT_CADENCE: Duration = Duration::from_secs(15);
pub const DEGRADATION_CADENCE: Duration = Duration::from_secs(60);

/// User actions, serialized through the scheduler's command channel.
#[derive(Debug)]
pub enum Command {
    SetManualTime { hour: u32, minute: u32 },
    ResetClock,
    AdvanceOneHour,
    TriggerAnomaly(AnomalyKind),
    CorrectAnomaly(u64),
    SetManualControl(bool),
    SetManualFactor { factor: FactorKind, value: f64 },
    RunDroneScan,
    Reinitialize { preserve_logs: bool },
    /// Render the full export document against the live state.
    ExportDocument {
        chat_history: Vec<ChatMessage>,
        reply: oneshot::Sender<String>,
    },
    Shutdown,
}

/// Handle to submit commands and observe snapshots.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl SchedulerHandle {
    /// Submit a command. Returns false once the scheduler has shut down.
    pub async fn send(&self, command: Command) -> bool {
        self.tx.send(command).await.is_ok()
    }

    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Render the export document against the live state. Returns None once
    /// the scheduler has shut down.
    pub async fn export_document(&self, chat_history: Vec<ChatMessage>) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        if !self
            .send(Command::ExportDocument {
                chat_history,
                reply,
            })
            .await
        {
            return None;
        }
        rx.await.ok()
    }
}

/// Owns the simulation state and runs the tick loop.
pub struct Scheduler {
    state: SimulationState,
    speed: u32,
    rx: mpsc::Receiver<Command>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl Scheduler {
    /// `speed` compresses every cadence by the given factor (1 = real time).
    /// In simulation mode each clock tick still advances exactly one
    /// simulated second, so compression speeds up simulated time.
    pub fn new(state: SimulationState, speed: u32) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::channel(64);
        let (snapshot_tx, snapshots) = watch::channel(state.snapshot());
        (
            Self {
                state,
                speed: speed.max(1),
                rx,
                snapshot_tx,
            },
            SchedulerHandle { tx, snapshots },
        )
    }

    fn scaled(&self, base: Duration) -> Duration {
        Duration::from_secs_f64((base.as_secs_f64() / f64::from(self.speed)).max(0.001))
    }

    fn make_interval(&self, base: Duration) -> tokio::time::Interval {
        let mut ticker = interval(self.scaled(base));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    /// Run until `Command::Shutdown` or all handles are dropped, returning
    /// the final state for export.
    pub async fn run(mut self) -> SimulationState {
        let mut clock = self.make_interval(CLOCK_CADENCE);
        let mut sweep = self.make_interval(SWEEP_CADENCE);
        let mut random_events = self.make_interval(RANDOM_EVENT_CADENCE);
        let mut degradation = self.make_interval(DEGRADATION_CADENCE);

        tracing::info!(speed = self.speed, "Scheduler started");
        loop {
            tokio::select! {
                _ = clock.tick() => {
                    self.state.clock_tick();
                }
                _ = sweep.tick() => {
                    // Within one sweep: environment first, then anomaly
                    // evaluation against the already-advanced time, then
                    // health-triggered spawns.
                    self.state.environment_tick();
                    self.state.anomaly_tick();
                    self.state.health_check_tick();
                }
                _ = random_events.tick() => {
                    self.state.random_event_tick();
                }
                _ = degradation.tick() => {
                    self.state.degradation_tick();
                }
                command = self.rx.recv() => {
                    match command {
                        None | Some(Command::Shutdown) => break,
                        Some(command) => self.apply(command),
                    }
                }
            }
            let _ = self.snapshot_tx.send(self.state.snapshot());
        }
        tracing::info!("Scheduler stopped");
        self.state
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::SetManualTime { hour, minute } => {
                if let Err(e) = self.state.set_manual_time(hour, minute) {
                    tracing::warn!(error = %e, "Rejected manual time");
                }
            }
            Command::ResetClock => self.state.reset_clock(),
            Command::AdvanceOneHour => self.state.advance_one_hour(),
            Command::TriggerAnomaly(kind) => {
                self.state.trigger_anomaly(kind);
            }
            Command::CorrectAnomaly(id) => {
                self.state.correct_anomaly(id);
            }
            Command::SetManualControl(enabled) => self.state.set_manual_control(enabled),
            Command::SetManualFactor { factor, value } => {
                if let Err(e) = self.state.set_manual_factor(factor, value) {
                    tracing::warn!(error = %e, "Rejected manual factor");
                }
            }
            Command::RunDroneScan => {
                self.state.run_drone_scan();
            }
            Command::Reinitialize { preserve_logs } => self.state.reinitialize(preserve_logs),
            Command::ExportDocument {
                chat_history,
                reply,
            } => {
                let document = report::export_log_document(&self.state, &chat_history);
                let _ = reply.send(document);
            }
            Command::Shutdown => {}
        }
    }
}

// ============================================================================
// Periodic background tasks (auto-analysis, auto-download)
// ============================================================================

/// A restartable background task on a fixed period.
///
/// `restart` idempotently aborts the previous run before spawning the new
/// one, so toggling auto-analysis or auto-download never leaves two timers
/// for the same purpose.
pub struct PeriodicTask {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn new(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn restart<F, Fut>(&mut self, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        self.stop();
        let name = self.name;
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Consume the immediate first tick; run on the period boundary.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                task().await;
            }
        }));
        tracing::info!(task = name, ?period, "Periodic task started");
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::info!(task = self.name, "Periodic task stopped");
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}
