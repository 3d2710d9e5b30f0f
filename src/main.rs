//! CLI entry point for sweep_daq
//!
//! Provides command-line interface for:
//! - Running a voltage sweep against the bench (or a simulated bench)
//! - Estimating how long a sweep will take
//! - Printing the effective configuration
//!
//! # Usage
//!
//! ```bash
//! sweep_daq run --start 0 --stop 5 --step 0.5 --output iv_curve
//! sweep_daq estimate --step 0.1 --settle 1.0
//! sweep_daq --config bench.toml config
//! ```
//!
//! Ctrl-C during a run stops at the next point boundary; the supply output is
//! switched off before the process exits.

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use sweep_daq::config::{Settings, DEFAULT_CONFIG_PATH};
use sweep_daq::hardware::MockBench;
use sweep_daq::instrument::Channel;
use sweep_daq::sequencer::{BenchAddresses, RunOutcome, SequencerEvent, SweepSequencer};
use sweep_daq::storage::with_csv_extension;
use sweep_daq::sweep::{estimate_duration, format_mmss, SweepConfig};
use tokio::signal;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "sweep_daq")]
#[command(about = "Voltage sweep logger for a bench supply and multimeter", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sweep and record it to CSV
    Run {
        #[command(flatten)]
        sweep: SweepArgs,

        /// Power supply resource (overrides instruments.psu_resource)
        #[arg(long)]
        psu: Option<String>,

        /// Multimeter resource (overrides instruments.dmm_resource)
        #[arg(long)]
        dmm: Option<String>,

        /// Output file; `.csv` is appended when missing
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Replace the output file if it already exists
        #[arg(long)]
        overwrite: bool,

        /// Use a simulated supply and meter
        #[arg(long)]
        mock: bool,
    },

    /// Print the step count and estimated duration without touching hardware
    Estimate {
        #[command(flatten)]
        sweep: SweepArgs,
    },

    /// Print the effective settings as TOML
    Config,
}

/// Per-run overrides of the `[sweep]` settings.
#[derive(Args)]
struct SweepArgs {
    /// Start voltage (V)
    #[arg(long, allow_negative_numbers = true)]
    start: Option<f64>,

    /// Stop voltage (V)
    #[arg(long, allow_negative_numbers = true)]
    stop: Option<f64>,

    /// Step size (V), must be > 0
    #[arg(long)]
    step: Option<f64>,

    /// Current limit (A)
    #[arg(long)]
    current: Option<f64>,

    /// Settle time before each reading (s)
    #[arg(long)]
    settle: Option<f64>,

    /// Supply channel: 1, 2 or 3
    #[arg(long)]
    channel: Option<Channel>,

    /// Auto high-impedance meter input (true/false)
    #[arg(long)]
    high_z: Option<bool>,
}

impl SweepArgs {
    fn apply(&self, mut config: SweepConfig) -> SweepConfig {
        if let Some(v) = self.start {
            config.start_voltage = v;
        }
        if let Some(v) = self.stop {
            config.stop_voltage = v;
        }
        if let Some(v) = self.step {
            config.step_voltage = v;
        }
        if let Some(v) = self.current {
            config.current_limit = v;
        }
        if let Some(v) = self.settle {
            config.settle_time_secs = v;
        }
        if let Some(v) = self.channel {
            config.channel = v;
        }
        if let Some(v) = self.high_z {
            config.high_impedance = v;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load settings from '{}'", cli.config.display()))?;
    sweep_daq::logging::init(&settings.application.log_level);
    debug!("Settings loaded from '{}'", cli.config.display());

    match cli.command {
        Commands::Run {
            sweep,
            psu,
            dmm,
            output,
            overwrite,
            mock,
        } => {
            let config = sweep.apply(settings.sweep.sweep_config());
            let output = output.unwrap_or_else(|| settings.sweep.output.clone());
            let mut bench = BenchAddresses::from_settings(&settings);
            if let Some(psu) = psu {
                bench.psu = psu;
            }
            if let Some(dmm) = dmm {
                bench.dmm = dmm;
            }
            run_sweep(&settings, config, bench, output, overwrite, mock).await
        }
        Commands::Estimate { sweep } => {
            let config = sweep.apply(settings.sweep.sweep_config());
            print_estimate(&settings, &config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            print!("{}", settings.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_estimate(settings: &Settings, config: &SweepConfig) -> Result<()> {
    config.validate()?;
    let plan = config.plan()?;
    let total = estimate_duration(
        plan.len(),
        config.settle_time_secs,
        settings.timing.overhead_per_step_secs,
    );
    println!("Total Steps: {}", plan.len());
    println!("Estimated Total Time: {}", format_mmss(total));
    Ok(())
}

async fn run_sweep(
    settings: &Settings,
    config: SweepConfig,
    mut bench: BenchAddresses,
    output: PathBuf,
    overwrite: bool,
    mock: bool,
) -> Result<ExitCode> {
    config.validate()?;

    let output = with_csv_extension(&output);
    if output.exists() && !overwrite {
        bail!(
            "'{}' already exists; pass --overwrite to replace it",
            output.display()
        );
    }

    if mock {
        bench.psu = MockBench::PSU_RESOURCE.to_string();
        bench.dmm = MockBench::DMM_RESOURCE.to_string();
    } else if bench.psu.is_empty() || bench.dmm.is_empty() {
        bail!("Both instrument addresses are required (--psu/--dmm or [instruments] in the settings file)");
    }

    let mut sequencer = SweepSequencer::new(config, bench, &output)
        .with_overhead_per_step(settings.timing.overhead_per_step_secs);
    if mock {
        sequencer = sequencer.with_opener(Arc::new(MockBench::new()));
    }

    let (handle, mut events) = sequencer.spawn();

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current point");
            cancel.cancel();
        }
    });

    let mut outcome = RunOutcome::Failed;
    while let Some(event) = events.recv().await {
        match event {
            // Status lines reach the terminal through the tracing subscriber.
            SequencerEvent::Log(_) => {}
            SequencerEvent::State(state) => debug!("State: {}", state),
            SequencerEvent::Progress(p) => println!(
                "[{:>3}/{}] {:5.1}% | elapsed {} | remaining {}",
                p.completed,
                p.total,
                p.percent_complete,
                format_mmss(p.elapsed),
                format_mmss(p.remaining)
            ),
            SequencerEvent::Finished(report) => {
                outcome = report.outcome;
                println!(
                    "{}: {} records in '{}' ({})",
                    report.outcome,
                    report.records_written,
                    output.display(),
                    format_mmss(report.elapsed)
                );
                if let Some(fault) = &report.error {
                    eprintln!("{}", fault);
                }
            }
        }
    }

    // The event stream ends once the worker has finished teardown.
    handle.join().await.context("Sweep worker panicked")?;

    Ok(match outcome {
        RunOutcome::Failed => ExitCode::FAILURE,
        RunOutcome::Completed | RunOutcome::Aborted => ExitCode::SUCCESS,
    })
}
