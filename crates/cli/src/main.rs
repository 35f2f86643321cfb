use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod legacy;
mod options;
mod preview;
mod runner;
mod settings;

use options::{JobArgs, RunArgs};
use runner::CONFIG_ERROR_EXIT;
use settings::Settings;

#[derive(Parser)]
#[command(name = "panostitch")]
#[command(about = "Panoramic stitching CLI - run stitch jobs through the media SDK")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Trace-level logging
    #[arg(long, global = true)]
    debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Settings file (defaults to the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stitch one job
    Stitch {
        #[command(flatten)]
        job: JobArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Run the jobs of a JSON manifest one after another
    Batch {
        /// JSON array of job options
        manifest: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Stream a simulated camera through the realtime stitcher
    Preview {
        /// Stop after this many frames (0 runs until Ctrl-C)
        #[arg(long, default_value = "0")]
        frames: u64,

        #[arg(long, default_value = "30")]
        fps: u32,

        #[arg(long, default_value = "1920x960")]
        output_size: String,

        /// Camera serial number
        #[arg(long, default_value = "sim-0001")]
        serial: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let normalized = legacy::normalize(&Cli::command(), std::env::args());
    let cli = Cli::parse_from(normalized.args);
    let settings = Settings::load(cli.settings.as_deref())?;
    init_logging(&cli, &settings)?;
    for option in &normalized.dropped {
        warn!("Ignoring unknown option: {}", option);
    }

    match cli.command {
        Commands::Stitch { job, run } => stitch_command(&settings, job, run).await,
        Commands::Batch { manifest, run } => batch_command(&settings, manifest, run).await,
        Commands::Preview {
            frames,
            fps,
            output_size,
            serial,
        } => preview_command(frames, fps, output_size, serial).await,
    }
}

fn init_logging(cli: &Cli, settings: &Settings) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else if cli.debug {
        EnvFilter::new("trace")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else if let Some(directives) = &settings.log_filter {
        EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log filter '{directives}'"))?
    } else {
        EnvFilter::new("info")
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match &cli.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

async fn stitch_command(settings: &Settings, job: JobArgs, run: RunArgs) -> Result<ExitCode> {
    let config = match runner::build_config(job.into_raw(settings.model_dir.clone())) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return Ok(ExitCode::from(CONFIG_ERROR_EXIT));
        }
    };
    let engine = runner::make_engine(settings, run.engine(settings))?;
    let report = runner::run_job(engine, config, run.timeout(settings)).await?;
    if let Some(path) = &run.report {
        runner::write_report(path, &report)?;
    }
    Ok(ExitCode::from(report.outcome.exit_code()))
}

async fn batch_command(settings: &Settings, manifest: PathBuf, run: RunArgs) -> Result<ExitCode> {
    let jobs = runner::read_manifest(&manifest)?;
    info!("Running {} jobs from {:?}", jobs.len(), manifest);

    let summary = runner::run_batch(settings, jobs, &run, || {
        runner::make_engine(settings, run.engine(settings))
    })
    .await?;
    if let Some(path) = &run.report {
        runner::write_report(path, &summary.reports)?;
    }
    Ok(ExitCode::from(summary.exit))
}

async fn preview_command(
    frames: u64,
    fps: u32,
    output_size: String,
    serial: String,
) -> Result<ExitCode> {
    let summary = preview::run_preview(&serial, fps, &output_size, frames).await?;
    println!("frames = {}", summary.shown);
    info!(
        sent = summary.sent,
        replaced = summary.replaced,
        "Preview finished"
    );
    Ok(ExitCode::from(summary.outcome(frames).exit_code()))
}
