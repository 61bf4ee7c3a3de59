//! plantsim - headless demo driver for the solar plant simulation
//!
//! Runs the scheduler for a bounded duration, prints periodic status lines,
//! optionally wires up the chat collaborator's automatic analysis task, and
//! writes the exported operations log on exit.
//!
//! # Usage
//!
//! ```bash
//! # Real-time pacing, 100 MW plant
//! cargo run --bin plantsim
//!
//! # Deterministic fast run pinned to noon
//! cargo run --bin plantsim -- --seed 42 --speed 60 --hour 12 --duration 120
//! ```
//!
//! # Environment Variables
//!
//! - `SOLAROPS_LLM_URL`: Override the chat endpoint from settings
//! - `SOLAROPS_CONFIG`: Path to a settings TOML file
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use solarops::config::Settings;
use solarops::llm::{analysis_prompt, ChatBackend, HttpChatBackend};
use solarops::scheduler::{Command, PeriodicTask, Scheduler};
use solarops::state::SimulationState;
use solarops::{export_log_document, SchedulerHandle};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "plantsim")]
#[command(about = "Solar plant simulation demo driver")]
#[command(version)]
struct CliArgs {
    /// Plant capacity in MW
    #[arg(long, default_value = "100.0")]
    capacity: f64,

    /// RNG seed for a deterministic run (omit for entropy)
    #[arg(long)]
    seed: Option<u64>,

    /// Speed multiplier (1 = realtime, 60 = 60x faster)
    #[arg(long, default_value = "1")]
    speed: u32,

    /// Wall-clock run duration in seconds
    #[arg(long, default_value = "60")]
    duration: u64,

    /// Pin the simulated clock to this hour (0-23) at startup
    #[arg(long)]
    hour: Option<u32>,

    /// Chat endpoint override (else taken from settings)
    #[arg(long, env = "SOLAROPS_LLM_URL")]
    llm_url: Option<String>,

    /// Model name for the chat endpoint
    #[arg(long, default_value = "llama3")]
    llm_model: String,

    /// Enable the periodic AI analysis task (needs a reachable endpoint)
    #[arg(long)]
    auto_analysis: bool,

    /// Directory for periodic operations-log downloads
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Write the exported operations log here on exit
    #[arg(long)]
    export: Option<PathBuf>,
}

fn start_auto_download(
    dir: PathBuf,
    settings: &Settings,
    handle: &SchedulerHandle,
    task: &mut PeriodicTask,
) {
    let handle = handle.clone();
    let period = Duration::from_secs(settings.log_download_interval_secs);
    task.restart(period, move || {
        let handle = handle.clone();
        let dir = dir.clone();
        async move {
            let Some(document) = handle.export_document(Vec::new()).await else {
                return;
            };
            let name = format!(
                "plant-log-{}.txt",
                chrono::Local::now().format("%Y%m%d-%H%M%S")
            );
            let path = dir.join(name);
            match std::fs::write(&path, document) {
                Ok(()) => info!(path = %path.display(), "Operations log downloaded"),
                Err(e) => warn!(error = %e, "Log download failed"),
            }
        }
    });
}

async fn start_auto_analysis(
    args: &CliArgs,
    settings: &Settings,
    handle: &SchedulerHandle,
    task: &mut PeriodicTask,
) {
    let base_url = args
        .llm_url
        .clone()
        .unwrap_or_else(|| settings.llm_base_url.clone());
    let backend = match HttpChatBackend::new(&base_url, &args.llm_model) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            warn!(error = %e, "Chat backend setup failed, auto-analysis disabled");
            return;
        }
    };
    if !backend.check_availability().await {
        warn!(url = %base_url, "Chat endpoint unreachable, auto-analysis disabled");
        return;
    }

    let handle = handle.clone();
    let period = Duration::from_secs(settings.ai_analysis_interval_secs);
    task.restart(period, move || {
        let backend = Arc::clone(&backend);
        let handle = handle.clone();
        async move {
            let prompt = analysis_prompt(&handle.latest());
            match backend.send_prompt(&[], &prompt, None).await {
                Ok(analysis) => info!(%analysis, "AI analysis"),
                Err(e) => warn!(error = %e, "AI analysis failed"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let settings = Settings::load();

    let mut state = SimulationState::new(args.capacity, args.seed);
    if let Some(hour) = args.hour {
        state
            .set_manual_time(hour, 0)
            .with_context(|| format!("invalid --hour {hour}"))?;
    }
    info!(
        capacity = args.capacity,
        speed = args.speed,
        duration = args.duration,
        "Starting plant simulation"
    );

    let (scheduler, handle) = Scheduler::new(state, args.speed);
    let runner = tokio::spawn(scheduler.run());

    let mut analysis_task = PeriodicTask::new("auto-analysis");
    if args.auto_analysis {
        start_auto_analysis(&args, &settings, &handle, &mut analysis_task).await;
    }
    let mut download_task = PeriodicTask::new("auto-download");
    if let Some(dir) = &args.download_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        start_auto_download(dir.clone(), &settings, &handle, &mut download_task);
    }

    // Status line every few seconds until the run duration elapses
    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.duration);
    let mut status = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = status.tick() => {
                let snap = handle.latest();
                info!(
                    time = %snap.now.format("%H:%M:%S"),
                    output_mw = format!("{:.3}", snap.instantaneous_mw),
                    cumulative_mwh = format!("{:.3}", snap.daily_cumulative_mwh),
                    anomalies = snap.active_anomalies.len(),
                    avg_health = format!("{:.1}", snap.average_equipment_health),
                    "Status"
                );
            }
            _ = tokio::time::sleep_until(deadline) => break,
        }
    }
    analysis_task.stop();
    download_task.stop();

    handle.send(Command::Shutdown).await;
    let state = runner.await.context("scheduler task panicked")?;
    let snap = state.snapshot();
    info!(
        output_mw = format!("{:.3}", snap.instantaneous_mw),
        cumulative_mwh = format!("{:.3}", snap.daily_cumulative_mwh),
        anomalies = snap.active_anomalies.len(),
        "Final state"
    );

    if let Some(path) = &args.export {
        let document = export_log_document(&state, &[]);
        std::fs::write(path, document).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "Operations log exported");
    }

    info!("Simulation finished");
    Ok(())
}
