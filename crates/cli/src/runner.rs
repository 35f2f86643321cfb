use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jobs::{ControllerError, EngineError, JobController, JobId, JobStatus, Phase, StitchEngine};
use media_sdk::{ProcessEngine, SimulatedEngine};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use stitch_config::{
    ConfigBuilder, ConfigurationError, JobConfiguration, ProcessingMode, RawOptions,
};
use tracing::{error, info, warn};

use crate::options::RunArgs;
use crate::settings::{EngineKind, Settings};

/// Exit status for a configuration that could not be built.
pub const CONFIG_ERROR_EXIT: u8 = 255;

const CANCEL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Completed => 0,
            Outcome::Failed => 1,
            Outcome::TimedOut => 2,
            Outcome::Cancelled => 130,
        }
    }

    fn from_phase(phase: Phase, cancel_requested: bool) -> Self {
        match phase {
            Phase::Completed => Outcome::Completed,
            Phase::Failed => Outcome::Failed,
            Phase::Cancelled => Outcome::Cancelled,
            _ if cancel_requested => Outcome::Cancelled,
            _ => Outcome::TimedOut,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub id: JobId,
    pub engine: String,
    pub mode: ProcessingMode,
    pub inputs: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub outcome: Outcome,
    pub progress: u8,
    pub error: Option<EngineError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cost_secs: f64,
}

pub fn make_engine(settings: &Settings, kind: EngineKind) -> Result<Arc<dyn StitchEngine>> {
    match kind {
        EngineKind::Process => {
            let binary = media_sdk::locate_binary(settings.sdk_binary.as_deref())
                .context("locating the SDK stitcher (set sdk_binary or use --engine simulated)")?;
            info!("Using stitcher: {:?}", binary);
            Ok(Arc::new(
                ProcessEngine::new(binary).with_library_dirs(settings.sdk_library_dirs.clone()),
            ))
        }
        EngineKind::Simulated => Ok(Arc::new(SimulatedEngine::default())),
    }
}

/// Build a configuration, logging every lenient fallback the builder took.
pub fn build_config(raw: RawOptions) -> Result<JobConfiguration, ConfigurationError> {
    let (config, notes) = ConfigBuilder::new(raw).build_with_notes()?;
    for note in &notes {
        warn!("{note}");
    }
    Ok(config)
}

pub fn read_manifest(path: &Path) -> Result<Vec<RawOptions>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing manifest {}", path.display()))
}

pub fn write_report<T: Serialize + ?Sized>(path: &Path, report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
    info!("Report written to: {:?}", path);
    Ok(())
}

/// Run one job to a terminal state, printing progress as it changes.
/// Ctrl-C cancels the job; a timeout cancels it as well.
pub async fn run_job(
    engine: Arc<dyn StitchEngine>,
    config: JobConfiguration,
    timeout: Option<Duration>,
) -> Result<JobReport> {
    let engine_name = engine.name().to_string();
    let controller = JobController::new(engine);
    let events = controller.events();
    let printer = thread::Builder::new()
        .name("job-progress".into())
        .spawn(move || {
            for event in events.iter() {
                match event.status {
                    JobStatus::Progress(percent) => println!("process = {percent}%"),
                    JobStatus::Completed | JobStatus::Failed { .. } | JobStatus::Cancelled => break,
                    JobStatus::Submitted | JobStatus::Running => {}
                }
            }
        })
        .context("spawning progress printer")?;

    let mode = config.mode;
    let inputs = config.inputs.clone();
    let output = config.output_path().map(Path::to_path_buf);
    let started_at = Utc::now();
    let clock = Instant::now();

    // Still images stitch inside `submit`.
    let submitted = {
        let controller = controller.clone();
        tokio::task::spawn_blocking(move || controller.submit(config))
            .await
            .context("submitting job")?
    };
    match submitted {
        Ok(id) => info!(job = %id, engine = %engine_name, ?mode, "job running"),
        Err(ControllerError::Engine(err)) => {
            error!(code = err.code, "engine refused the job: {}", err.message)
        }
        Err(other) => return Err(other.into()),
    }

    let (done_tx, mut done_rx) = tokio::sync::oneshot::channel();
    {
        let controller = controller.clone();
        thread::Builder::new()
            .name("job-wait".into())
            .spawn(move || {
                let _ = done_tx.send(controller.wait_until_terminal(timeout));
            })
            .context("spawning job waiter")?;
    }

    let state = tokio::select! {
        state = &mut done_rx => state.context("job waiter stopped")?,
        _ = tokio::signal::ctrl_c() => {
            warn!(job = %controller.id(), "interrupted, cancelling job");
            controller.cancel()?;
            match tokio::time::timeout(CANCEL_GRACE, &mut done_rx).await {
                Ok(state) => state.context("job waiter stopped")?,
                Err(_) => {
                    warn!("engine did not acknowledge the cancel request");
                    controller.state()
                }
            }
        }
    };

    let phase = controller.phase();
    let outcome = Outcome::from_phase(phase, controller.cancel_requested());
    if phase.is_terminal() {
        let _ = printer.join();
    } else if outcome == Outcome::TimedOut {
        warn!(?timeout, "job did not finish in time, cancelling");
        controller.cancel()?;
    }

    let cost = clock.elapsed().as_secs_f64();
    println!("cost = {cost}");
    match (&outcome, &state.last_error) {
        (Outcome::Completed, _) => info!(job = %controller.id(), "stitch completed"),
        (Outcome::Failed, Some(err)) => error!(code = err.code, "stitch failed: {}", err.message),
        (Outcome::Failed, None) => error!("stitch failed"),
        (Outcome::Cancelled, _) => warn!("stitch cancelled at {}%", state.progress),
        (Outcome::TimedOut, _) => warn!("stitch timed out at {}%", state.progress),
    }

    Ok(JobReport {
        id: controller.id(),
        engine: engine_name,
        mode,
        inputs,
        output,
        outcome,
        progress: state.progress,
        error: state.last_error,
        started_at,
        finished_at: Utc::now(),
        cost_secs: cost,
    })
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub exit: u8,
    pub reports: Vec<JobReport>,
}

/// Run manifest jobs one after another. Jobs whose configuration does not
/// build are skipped, the first non-zero exit code is kept and a cancelled
/// job stops the batch.
pub async fn run_batch<F>(
    settings: &Settings,
    jobs: Vec<RawOptions>,
    run: &RunArgs,
    mut engine_for_job: F,
) -> Result<BatchSummary>
where
    F: FnMut() -> Result<Arc<dyn StitchEngine>>,
{
    let mut summary = BatchSummary::default();
    for (index, mut raw) in jobs.into_iter().enumerate() {
        if raw.model_dir.is_none() {
            raw.model_dir = settings.model_dir.clone();
        }
        let config = match build_config(raw) {
            Ok(config) => config,
            Err(err) => {
                error!(job = index, "Skipping job: {}", err);
                if summary.exit == 0 {
                    summary.exit = CONFIG_ERROR_EXIT;
                }
                continue;
            }
        };
        let report = run_job(engine_for_job()?, config, run.timeout(settings)).await?;
        let outcome = report.outcome;
        info!(job = index, ?outcome, cost = report.cost_secs, "Batch job finished");
        summary.reports.push(report);
        if summary.exit == 0 {
            summary.exit = outcome.exit_code();
        }
        if outcome == Outcome::Cancelled {
            warn!("Batch interrupted, skipping remaining jobs");
            break;
        }
    }
    Ok(summary)
}
