//! Command-line interface for the sensing pipelines.

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::JobConfig;
use crate::core::loaders::{load_column, ColumnRef};
use crate::core::writers::write_selected_rows;
use crate::processors::outlier::{retained_indices, robust_band};
use crate::processors::{batch, PipelineKind, Report};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "sensing-pipeline")]
#[command(about = "Mobile environmental and vibration sensor map pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Per-run overrides shared by the pipeline commands.
#[derive(Args, Debug, Clone, Default)]
struct Overrides {
    /// MAD threshold (band width in estimated standard deviations)
    #[arg(short, long)]
    threshold: Option<f64>,
    /// Initial zoom level of web maps
    #[arg(short, long)]
    zoom: Option<u8>,
    /// Color scheme for panels and heat layers (viridis, plasma, ...)
    #[arg(long)]
    color_scheme: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct JobArgs {
    /// Input CSV log
    input: PathBuf,
    /// Output file (PNG for station, HTML otherwise)
    output: PathBuf,
    #[command(flatten)]
    overrides: Overrides,
}

impl Overrides {
    fn job(&self, input: &Path, output: &Path) -> JobConfig {
        JobConfig {
            input_path: input.to_path_buf(),
            output_path: output.to_path_buf(),
            threshold: self.threshold,
            zoom_level: self.zoom,
            color_scheme: self.color_scheme.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Static multi-panel map of a mobile air station run (PNG)
    Station(JobArgs),

    /// Interactive PM2.5 / VOC heatmap (HTML)
    Heatmap(JobArgs),

    /// Road terrain map from the barometric logger (HTML)
    Terrain(JobArgs),

    /// Road vibration map from the accelerometer logger (HTML)
    Vibration(JobArgs),

    /// MAD-filter one column of a CSV file
    Filter {
        /// Input CSV file
        input: PathBuf,
        /// Column to filter: header name, or #N for field N
        #[arg(long)]
        column: String,
        /// Band width in estimated standard deviations
        #[arg(short, long, default_value_t = 3.0)]
        threshold: f64,
        /// The file has no header row
        #[arg(long)]
        no_header: bool,
        /// Write the surviving rows to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a pipeline over every CSV log in a directory
    Batch {
        /// Pipeline to run
        #[arg(value_enum)]
        kind: PipelineKind,
        /// Directory containing CSV logs
        input_dir: PathBuf,
        /// Output directory
        output_dir: PathBuf,
        /// Limit number of files to process
        #[arg(long)]
        limit: Option<usize>,
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination file
        #[arg(default_value = "pipeline.yaml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Create a bar for a known number of files
fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

/// Shorten a value to `width` characters for the summary box
fn fit(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let head: String = value.chars().take(width - 3).collect();
        format!("{}...", head)
    } else {
        value.to_string()
    }
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", fit(title, 60));
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        println!("║ {:<18}: {:<40} ║", key, fit(value, 40));
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

fn load_config(path: Option<&PathBuf>) -> PipelineConfig {
    match path {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("{}, using defaults", e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    }
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = load_config(cli.config.as_ref());

    match cli.command {
        Commands::Station(args) => cmd_pipeline(PipelineKind::Station, &args, &config),
        Commands::Heatmap(args) => cmd_pipeline(PipelineKind::Heatmap, &args, &config),
        Commands::Terrain(args) => cmd_pipeline(PipelineKind::Terrain, &args, &config),
        Commands::Vibration(args) => cmd_pipeline(PipelineKind::Vibration, &args, &config),
        Commands::Filter {
            input,
            column,
            threshold,
            no_header,
            output,
        } => cmd_filter(&input, &column, threshold, !no_header, output.as_deref()),
        Commands::Batch {
            kind,
            input_dir,
            output_dir,
            limit,
            overrides,
        } => cmd_batch(kind, &input_dir, &output_dir, limit, &overrides, &config),
        Commands::InitConfig { path, force } => cmd_init_config(&path, force),
    }
}

fn report_items(report: &Report, elapsed: std::time::Duration) -> Vec<(&'static str, String)> {
    let mut items = vec![
        ("Output", report.output_path.display().to_string()),
        ("Samples loaded", report.input_rows.to_string()),
        ("Samples retained", report.retained_rows.to_string()),
    ];
    for extra in &report.extra_outputs {
        items.push(("Also wrote", extra.display().to_string()));
    }
    items.push(("Duration", format!("{:.2?}", elapsed)));
    items
}

fn cmd_pipeline(kind: PipelineKind, args: &JobArgs, config: &PipelineConfig) {
    let start = Instant::now();
    let job = args.overrides.job(&args.input, &args.output);

    println!("Running {} pipeline...", kind);
    println!("Input: {}", job.input_path.display());
    println!("Output: {}", job.output_path.display());

    let spinner = create_spinner("Loading, cleaning and rendering...");

    match kind.run(&job, config) {
        Ok(report) => {
            spinner.finish_and_clear();
            let mut items = vec![("Input file", job.input_path.display().to_string())];
            items.extend(report_items(&report, start.elapsed()));
            print_summary(&format!("{} Complete", capitalize(kind.name())), &items);
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("{} pipeline failed: {:#}", kind, e);
            std::process::exit(1);
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn cmd_filter(input: &Path, column: &str, threshold: f64, has_headers: bool, output: Option<&Path>) {
    let start = Instant::now();
    let column_ref = column
        .parse::<ColumnRef>()
        .unwrap_or_else(|never| match never {});

    let values = match load_column(input, &column_ref, has_headers) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to load column {}: {}", column, e);
            std::process::exit(1);
        }
    };

    let (band, keep) = match robust_band(&values, threshold)
        .and_then(|band| retained_indices(&values, threshold).map(|keep| (band, keep)))
    {
        Ok(result) => result,
        Err(e) => {
            error!("Outlier filter failed: {}", e);
            std::process::exit(1);
        }
    };

    let mut items = vec![
        ("Input file", input.display().to_string()),
        ("Column", column.to_string()),
        ("Threshold", threshold.to_string()),
        ("Values", values.len().to_string()),
        ("Retained", keep.len().to_string()),
        ("Removed", (values.len() - keep.len()).to_string()),
    ];
    match band {
        Some(band) => {
            items.push(("Median", format!("{:.6}", band.median)));
            items.push(("MAD", format!("{:.6}", band.mad)));
            items.push(("Band", format!("[{:.6}, {:.6}]", band.lower(), band.upper())));
        }
        None => items.push(("MAD", "0 (filter skipped)".to_string())),
    }

    if let Some(output) = output {
        match write_selected_rows(input, output, has_headers, &keep) {
            Ok(n) => items.push(("Rows written", format!("{} -> {}", n, output.display()))),
            Err(e) => {
                error!("Failed to write surviving rows: {}", e);
                std::process::exit(1);
            }
        }
    }

    items.push(("Duration", format!("{:.2?}", start.elapsed())));
    print_summary("Outlier Filter Complete", &items);
}

fn cmd_batch(
    kind: PipelineKind,
    input_dir: &Path,
    output_dir: &Path,
    limit: Option<usize>,
    overrides: &Overrides,
    config: &PipelineConfig,
) {
    let start = Instant::now();

    println!("Running {} pipeline in batch mode...", kind);
    println!("Input directory: {}", input_dir.display());
    println!("Output directory: {}", output_dir.display());
    if let Some(lim) = limit {
        println!("Processing limit: {} files", lim);
    }

    let total = match batch::find_input_files(input_dir) {
        Ok(files) => files.len().min(limit.unwrap_or(usize::MAX)),
        Err(e) => {
            error!("Batch run failed: {}", e);
            std::process::exit(1);
        }
    };
    let progress = create_progress_bar(total as u64);
    let template = overrides.job(Path::new(""), Path::new(""));

    match batch::run_batch(kind, input_dir, output_dir, limit, &template, config, || progress.inc(1)) {
        Ok(outcome) => {
            progress.finish_and_clear();

            for (path, reason) in &outcome.failed {
                warn!("{}: {}", path.display(), reason);
            }

            print_summary(
                "Batch Run Complete",
                &[
                    ("Pipeline", kind.to_string()),
                    ("Input directory", input_dir.display().to_string()),
                    ("Output directory", output_dir.display().to_string()),
                    ("Succeeded", outcome.succeeded.len().to_string()),
                    ("Failed", outcome.failed.len().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );

            if outcome.succeeded.is_empty() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            progress.finish_and_clear();
            error!("Batch run failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_init_config(path: &Path, force: bool) {
    if path.exists() && !force {
        error!("{} already exists (use --force to overwrite)", path.display());
        std::process::exit(1);
    }

    match PipelineConfig::default().to_yaml(path) {
        Ok(()) => println!("Wrote default configuration to {}", path.display()),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
