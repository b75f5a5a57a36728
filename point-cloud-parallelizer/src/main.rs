/// Tiled parallel PDAL pipeline runner entry point
use clap::{Parser, ValueEnum};
use point_cloud_parallelizer::constants::{
    DEFAULT_THREADS_PER_WORKER, DEFAULT_TILE_SIZE, DEFAULT_WORKERS, PDAL_PROGRAM,
};
use point_cloud_parallelizer::{
    Bounds, Config, Error, ExecutionSettings, InputType, PdalCli, RunOptions, SplitOptions,
    process_pipelines,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Clone, Copy, ValueEnum)]
enum Input {
    /// Split one cloud into tiles.
    Single,
    /// Process every cloud of a directory whole.
    Dir,
}

/// Split point clouds into tiles and run a PDAL pipeline over them in parallel.
///
/// If the temp directory holds records from an interrupted run, those are
/// processed instead of the configured input.
#[derive(Parser)]
#[command(name = "point-cloud-parallelizer", version)]
struct Cli {
    /// JSON config with `input`, `output`, `temp` and `pipeline`.
    #[arg(short, long)]
    config: PathBuf,

    /// Whether `input` is a single cloud or a directory of clouds.
    #[arg(long, value_enum, default_value = "single")]
    input_type: Input,

    /// Kill a pipeline after this many seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Number of workers.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Threads per worker.
    #[arg(long, default_value_t = DEFAULT_THREADS_PER_WORKER)]
    threads_per_worker: usize,

    /// Test run over the first N tiles or files, without recovery records.
    #[arg(long, value_name = "N")]
    dry_run: Option<usize>,

    /// Sample memory usage during execution.
    #[arg(long)]
    diagnostic: bool,

    /// Tile width and height.
    #[arg(long, num_args = 2, value_names = ["W", "H"])]
    tile_size: Option<Vec<f64>>,

    /// Buffer added around each tile on x and y.
    #[arg(long, num_args = 2, value_names = ["DX", "DY"])]
    buffer: Option<Vec<f64>>,

    /// Mark the buffer for removal after processing.
    #[arg(long)]
    remove_buffer: bool,

    /// Only tile this region of the cloud.
    #[arg(long, num_args = 4, value_names = ["MINX", "MINY", "MAXX", "MAXY"])]
    bounding_box: Option<Vec<f64>>,

    /// PDAL executable.
    #[arg(long, default_value = PDAL_PROGRAM)]
    pdal: PathBuf,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn pair(values: Option<Vec<f64>>) -> Option<(f64, f64)> {
    values.map(|v| (v[0], v[1]))
}

fn run(cli: Cli) -> Result<bool, Error> {
    let config = Config::from_file(&cli.config)?;

    let bounding_box = match cli.bounding_box {
        Some(v) => Some(Bounds::new(v[0], v[1], v[2], v[3]).map_err(|e| {
            Error::Config(format!("invalid bounding box: {}", e))
        })?),
        None => None,
    };

    let options = RunOptions {
        input_type: match cli.input_type {
            Input::Single => InputType::Single,
            Input::Dir => InputType::Dir,
        },
        dry_run: cli.dry_run,
        diagnostic: cli.diagnostic,
        split: SplitOptions {
            tile_size: pair(cli.tile_size).unwrap_or(DEFAULT_TILE_SIZE),
            buffer: pair(cli.buffer),
            remove_buffer: cli.remove_buffer,
            bounding_box,
            limit: None,
        },
        execution: ExecutionSettings {
            workers: cli.workers,
            threads_per_worker: cli.threads_per_worker,
        },
    };

    let engine = PdalCli::new(&cli.pdal).with_timeout(cli.timeout.map(Duration::from_secs));
    let version = engine.probe()?;
    log::info!("Using {}", version);

    let summary = process_pipelines(&config, &options, &engine)?;
    summary.print();
    Ok(summary.is_success())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let env = env_logger::Env::default().default_filter_or(cli.log_level.as_str());
    env_logger::Builder::from_env(env)
        .format_target(false)
        .init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(2)
        }
    }
}
