use super::CliError;
use anyhow::Context;
use cbct_core::domain::ParallelIdentity;
use cbct_core::geometry::Geometry;
use cbct_core::run_control::{SimulationHost, StartOutcome};
use cbct_core::{CbctApplication, SimulationConfig, run_scan};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// JSON simulation configuration
    config: PathBuf,

    /// Directory for checkpoints, scans and the job control file
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Number of parallel jobs in the set (0 runs serially)
    #[arg(short = 'P', long, default_value_t = 0)]
    n_parallel: u32,

    /// Index of this job within the parallel set
    #[arg(short = 'j', long, default_value_t = 0)]
    i_parallel: u32,

    /// Index of the first job of the parallel set
    #[arg(short = 'f', long, default_value_t = 1)]
    first_parallel: u32,

    #[command(flatten)]
    logging: LoggingFlags,
}

#[derive(clap::Args)]
pub(super) struct CheckArgs {
    /// JSON simulation configuration
    config: PathBuf,

    #[command(flatten)]
    logging: LoggingFlags,
}

#[derive(clap::Args, Default)]
pub(super) struct LoggingFlags {
    /// Log debug output, including per-batch transport counters
    #[arg(short, long)]
    verbose: bool,
}

impl LoggingFlags {
    /// `RUST_LOG` takes precedence over the verbosity flag.
    fn init(&self) {
        let default = if self.verbose { "debug" } else { "info" };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        // A second initialisation in the same process keeps the first subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

pub(super) fn run_scan_command(args: RunArgs) -> Result<i32, CliError> {
    args.logging.init();
    let identity = ParallelIdentity::new(args.n_parallel, args.i_parallel, args.first_parallel)?;
    let config = SimulationConfig::from_path(&args.config)?;
    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "failed to create output directory '{}'",
            args.output_dir.display()
        )
    })?;
    info!(
        config = %args.config.display(),
        output_dir = %args.output_dir.display(),
        "loaded configuration"
    );

    let summary = run_scan(&config, identity, &args.output_dir)?;
    let verb = match summary.outcome {
        StartOutcome::Simulate => "Simulated",
        StartOutcome::Analyzed => "Analyzed",
        StartOutcome::Combined => "Combined",
    };
    println!("{verb} {} histories", summary.ndone);
    if summary.combined {
        println!(
            "Combined results written to '{}'",
            args.output_dir.join(&config.output_file).display()
        );
    }
    Ok(0)
}

pub(super) fn run_check_command(args: CheckArgs) -> Result<i32, CliError> {
    args.logging.init();
    let config = SimulationConfig::from_path(&args.config)?;
    let application = CbctApplication::from_config(&config, &ParallelIdentity::serial())?;
    application.describe();
    let engine = application.engine();
    println!(
        "Configuration OK: {} media, {} regions, {} pixels, {} histories",
        config.media.len(),
        engine.geometry().regions(),
        engine.plane().pixels(),
        config.run_control.histories()
    );
    Ok(0)
}
