//! CLI command definitions for geobatch.
//!
//! Each subcommand enumerates its units, picks a processor and a sink, and
//! hands them to a [`BatchRun`]. Commands return the process exit code.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{info, warn};

use crate::collect::ErrorRecord;
use crate::enumerate::{
    load_towns, road_pairs, scan_data_dirs, MwmUnit, TownPair, DEFAULT_ROAD_DELTA,
};
use crate::error::{BatchError, EXIT_INVALID_INPUT, EXIT_SUCCESS};
use crate::output::{CategoryFileSink, CategoryLabels, NullSink};
use crate::pipeline::{timeout_from_secs, BatchConfig, BatchReport, BatchRun};
use crate::processor::{DesignerLaunch, GeneratorTool, WayIdClient, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::scheduler::WorkUnit;

/// Default worker count for `geom-index`.
const GEOM_INDEX_WORKERS: usize = 8;

/// Default worker count for `road-runner`.
const ROAD_RUNNER_WORKERS: usize = 16;

/// Towns file read by `road-runner`, relative to the intermediate directory.
const TOWNS_FILE: &str = "towns.csv";

/// Default output of `road-runner`, relative to the intermediate directory.
const WAYS_FILE: &str = "ways.csv";

/// Bounded concurrent batch runner for map data tools.
#[derive(Parser)]
#[command(name = "geobatch")]
#[command(about = "Run map data tools over many inputs with a fixed-size worker pool")]
#[command(version)]
#[command(
    long_about = "geobatch runs an external tool or routing server over every enumerated input on a fixed-size worker pool.\n\nFailed inputs are reported at the end without stopping the batch.\n\nExample usage:\n  geobatch road-runner ./intermediate localhost:5000 --workers 16"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Regenerate geometry indexes of every .mwm file with the generator tool.
    #[command(name = "geom-index")]
    GeomIndex(GeomIndexArgs),

    /// Ask a routing server for the ways linking nearby towns and capitals.
    #[command(name = "road-runner")]
    RoadRunner(RoadRunnerArgs),
}

/// Options shared by every batch command.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Number of concurrent workers (command default if unset).
    #[arg(short = 'j', long, env = "GEOBATCH_WORKERS")]
    pub workers: Option<usize>,

    /// Upper bound on one unit's processing, in seconds (0 disables).
    #[arg(long, value_name = "SECS", conflicts_with = "no_unit_timeout")]
    pub unit_timeout: Option<u64>,

    /// Let a unit run for as long as it takes.
    #[arg(long)]
    pub no_unit_timeout: bool,

    /// Interval between progress log lines, in seconds.
    #[arg(long, value_name = "SECS")]
    pub progress_interval: Option<u64>,
}

impl RunArgs {
    /// Builds the batch configuration: command default, then environment,
    /// then flags.
    pub fn config(&self, default_workers: usize) -> Result<BatchConfig, BatchError> {
        let mut config = BatchConfig::new(default_workers).apply_env()?;

        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(secs) = self.unit_timeout {
            config.unit_timeout = timeout_from_secs(secs);
        }
        if self.no_unit_timeout {
            config.unit_timeout = None;
        }
        if let Some(secs) = self.progress_interval {
            config.progress_interval = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Arguments for `geobatch geom-index`.
#[derive(Parser, Debug)]
pub struct GeomIndexArgs {
    /// Directory with the bundled map files.
    pub resources_dir: PathBuf,

    /// Writable directory with downloaded map files; scanned too when it
    /// differs from the resources directory.
    pub writable_dir: PathBuf,

    /// Path to the generator tool binary.
    pub generator_tool: PathBuf,

    /// Designer tool and its arguments, started without waiting once every
    /// file is processed.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "DESIGNER")]
    pub designer: Vec<String>,

    /// Scratch directory passed to the generator tool.
    #[arg(long, value_name = "DIR")]
    pub intermediate_data_path: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for `geobatch road-runner`.
#[derive(Parser, Debug)]
pub struct RoadRunnerArgs {
    /// Directory holding towns.csv; ways.csv is written there by default.
    pub intermediate_dir: PathBuf,

    /// Routing server address, as host:port or a full URL.
    pub server_addr: String,

    /// Squared distance under which two non-capital towns are linked.
    #[arg(long, default_value_t = DEFAULT_ROAD_DELTA)]
    pub road_delta: f64,

    /// Output file (default: <intermediate_dir>/ways.csv).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Timeout of one routing request, in seconds.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Parse CLI arguments and return the Cli struct.
///
/// On a usage error, or after printing help or version, returns the exit
/// code the process should end with instead.
pub fn parse_cli() -> Result<Cli, u8> {
    Cli::try_parse().map_err(|e| {
        let _ = e.print();
        usage_exit_code(&e)
    })
}

/// Exit code for a command line that did not parse into a [`Cli`].
pub fn usage_exit_code(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_SUCCESS,
        _ => EXIT_INVALID_INPUT,
    }
}

/// Run the CLI with pre-parsed arguments, returning the exit code.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Commands::GeomIndex(args) => run_geom_index(args).await,
        Commands::RoadRunner(args) => run_road_runner(args).await,
    }
}

/// Exit code for an error that escaped a command.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<BatchError>()
        .map(BatchError::exit_code)
        .unwrap_or(EXIT_INVALID_INPUT)
}

async fn run_geom_index(args: GeomIndexArgs) -> anyhow::Result<u8> {
    let config = args.run.config(GEOM_INDEX_WORKERS)?;
    let units =
        scan_data_dirs(&args.resources_dir, &args.writable_dir).map_err(BatchError::from)?;

    let mut tool = GeneratorTool::new(&args.generator_tool);
    if let Some(path) = &args.intermediate_data_path {
        tool = tool.with_intermediate_data_path(path);
    }

    let mut run: BatchRun<MwmUnit> =
        BatchRun::new("geom-index", config, Arc::new(tool), Arc::new(NullSink));
    let report = run_batch(&mut run, units).await?;

    if let Some(designer) = DesignerLaunch::from_command_line(&args.designer) {
        match designer.launch() {
            Ok(pid) => info!(pid = ?pid, "Designer tool started"),
            Err(e) => warn!(
                program = %designer.program().display(),
                error = %e,
                "Failed to start designer tool"
            ),
        }
    }

    print_errors(&report.errors);
    Ok(report.exit_code())
}

async fn run_road_runner(args: RoadRunnerArgs) -> anyhow::Result<u8> {
    if !args.intermediate_dir.is_dir() {
        return Err(BatchError::InvalidInput(format!(
            "'{}' is not a directory",
            args.intermediate_dir.display()
        ))
        .into());
    }
    if !args.road_delta.is_finite() || args.road_delta < 0.0 {
        return Err(BatchError::InvalidInput(format!(
            "road delta must be a non-negative number, got {}",
            args.road_delta
        ))
        .into());
    }

    let config = args.run.config(ROAD_RUNNER_WORKERS)?;
    let towns = load_towns(&args.intermediate_dir.join(TOWNS_FILE)).map_err(BatchError::from)?;
    let pairs = road_pairs(&towns, args.road_delta);
    info!(towns = towns.len(), pairs = pairs.len(), "Prepared town pairs");

    let client =
        WayIdClient::with_timeout(&args.server_addr, Duration::from_secs(args.request_timeout))
            .context("Failed to build HTTP client")?;

    let output = args
        .output
        .unwrap_or_else(|| args.intermediate_dir.join(WAYS_FILE));
    let sink = CategoryFileSink::new(output).with_labels(CategoryLabels::world_roads());

    let mut run: BatchRun<TownPair> =
        BatchRun::new("road-runner", config, Arc::new(client), Arc::new(sink));
    let report = run_batch(&mut run, pairs).await?;

    print_errors(&report.errors);
    Ok(report.exit_code())
}

/// Runs the batch. If it aborts after the workers finished, the unit
/// failures are printed before the error is returned.
async fn run_batch<U: WorkUnit>(
    run: &mut BatchRun<U>,
    units: Vec<U>,
) -> Result<BatchReport<U>, BatchError> {
    match run.run(units).await {
        Ok(report) => Ok(report),
        Err(e) => {
            print_errors(&run.take_unreported());
            Err(e)
        }
    }
}

/// Prints every failed unit, one per line.
fn print_errors<U: std::fmt::Display>(errors: &[ErrorRecord<U>]) {
    if errors.is_empty() {
        return;
    }
    println!("\n=== {} unit(s) failed ===", errors.len());
    for record in errors {
        println!("{record}");
    }
}
