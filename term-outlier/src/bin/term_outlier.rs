//! term-outlier command line
//!
//! Analyzes a CSV file and prints the anomalous rows.

use std::path::PathBuf;
use std::process;

use arrow::util::pretty::pretty_format_batches;
use clap::{Parser, ValueEnum};
use term_outlier::config::{DetectorConfig, DEFAULT_CHUNK_SIZE, DEFAULT_SAMPLE_ROWS};
use term_outlier::detector::{analyze_csv, analyze_csv_as, AnalysisMode, DEFAULT_PREVIEW_ROWS};
use term_outlier::logging::setup::{init_logging, LoggingConfig};
use term_outlier::logging::LogConfig;
use term_outlier::sources::{write_csv, CsvOptions};
use tracing::Level;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Pick by file size
    Auto,
    InMemory,
    Streaming,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CSV file to analyze
    path: PathBuf,

    /// Expected fraction of anomalous rows, in (0, 0.5)
    #[arg(long, default_value_t = 0.05)]
    contamination: f64,

    /// Rows per chunk when streaming
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Training sample cap when streaming
    #[arg(long, default_value_t = DEFAULT_SAMPLE_ROWS)]
    sample_rows: usize,

    /// Per-tree sample cap
    #[arg(long)]
    max_training_sample: Option<usize>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads (defaults to the number of CPUs)
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, value_enum, default_value_t = Mode::Auto)]
    mode: Mode,

    /// Field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Write the anomalous rows to this CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Save the fitted model as JSON
    #[arg(long)]
    model: Option<PathBuf>,

    /// Print a JSON summary instead of a table
    #[arg(long)]
    json: bool,

    /// Rows of the anomaly table to print
    #[arg(long, default_value_t = DEFAULT_PREVIEW_ROWS)]
    preview: usize,

    /// Log per-chunk progress
    #[arg(short, long)]
    verbose: bool,
}

fn config_from(args: &Args) -> term_outlier::error::Result<DetectorConfig> {
    let mut builder = DetectorConfig::builder()
        .contamination(args.contamination)
        .chunk_size(args.chunk_size)
        .sample_rows(args.sample_rows);
    if let Some(rows) = args.max_training_sample {
        builder = builder.max_training_sample(rows);
    }
    if let Some(seed) = args.seed {
        builder = builder.random_seed(seed);
    }
    if let Some(threads) = args.threads {
        builder = builder.parallelism(threads);
    }
    if let Some(path) = &args.model {
        builder = builder.model_path(path);
    }
    let logging = if args.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::production()
    };
    builder.logging(logging).build()
}

fn run(args: Args, config: DetectorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let delimiter = u8::try_from(args.delimiter)
        .map_err(|_| format!("delimiter must be a single-byte character, got {:?}", args.delimiter))?;
    let options = CsvOptions {
        delimiter,
        ..CsvOptions::default()
    };

    let report = match args.mode {
        Mode::Auto => analyze_csv(&args.path, &config, &options)?,
        Mode::InMemory => analyze_csv_as(&args.path, AnalysisMode::InMemory, &config, &options)?,
        Mode::Streaming => {
            analyze_csv_as(&args.path, AnalysisMode::Streaming, &config, &options)?
        }
    };

    if let Some(output) = &args.output {
        write_csv(&report.anomalies, output)?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.summary())?);
        return Ok(());
    }

    let percent = report
        .anomaly_percent()
        .map_or_else(|| "N/A".to_string(), |p| format!("{p:.2}%"));
    println!(
        "{}: {} anomalies in {} rows ({percent}, {} mode)",
        args.path.display(),
        report.anomaly_count(),
        report.total_rows,
        report.mode
    );
    if report.anomaly_count() > 0 && args.preview > 0 {
        println!("{}", pretty_format_batches(&[report.preview(args.preview)])?);
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    let config = match config_from(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };

    let logging = LoggingConfig::default()
        .with_level(Level::WARN)
        .with_crate_level(config.logging.base_level);
    if let Err(e) = init_logging(logging) {
        eprintln!("failed to initialize logging: {e}");
    }

    if let Err(e) = run(args, config) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
