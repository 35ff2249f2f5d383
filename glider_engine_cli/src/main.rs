mod dem;
mod sink;

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use glider_engine::{
    analyze_reader, Channel, ElevationService, EngineConfig, FlightRecord, NoElevation,
    TraceSummary,
};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::dem::ElevationGrid;
use crate::sink::YearlyCsvSink;

#[derive(Parser, Debug)]
#[command(author, version, about = "Glider flight and engine-run log CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect flights in IGC traces and write the per-year flight-time reports
    Analyze(AnalyzeArgs),
    /// Summarize headers, sensor declarations and record counts of IGC traces
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// IGC files or directories containing them
    #[arg(required = true, value_hint = ValueHint::AnyPath)]
    inputs: Vec<PathBuf>,

    /// Comma-separated MOP thresholds, one report column each
    #[arg(long)]
    thresholds: Option<String>,

    /// ESRI ASCII elevation grid used for ground height
    #[arg(long, value_hint = ValueHint::FilePath)]
    dem: Option<PathBuf>,

    /// Directory receiving Flt-times_<year>.csv
    #[arg(short, long, default_value = ".", value_hint = ValueHint::DirPath)]
    output_dir: PathBuf,

    /// Worker threads (defaults to min(files, cores))
    #[arg(long)]
    jobs: Option<usize>,

    /// Also write every flight record as JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    json: Option<PathBuf>,

    /// Verbose logging (per-flight diagnostics)
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// IGC files or directories containing them
    #[arg(required = true, value_hint = ValueHint::AnyPath)]
    inputs: Vec<PathBuf>,

    /// Output text report path
    #[arg(short, long, default_value = "igc_diagnostics.txt", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// ESRI ASCII elevation grid used for ground height
    #[arg(long, value_hint = ValueHint::FilePath)]
    dem: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Serialize)]
struct FlightEntry<'a> {
    file: &'a str,
    #[serde(flatten)]
    flight: &'a FlightRecord,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Analyze(args) => args.verbose,
        Command::Inspect(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<()> {
    let config = match args.thresholds.as_deref() {
        Some(list) => {
            let thresholds = parse_threshold_list(list)?;
            if thresholds.is_empty() {
                return Err(anyhow!("--thresholds list was empty"));
            }
            EngineConfig::with_thresholds(thresholds)?
        }
        None => EngineConfig::default(),
    };

    let files = discover_traces(&args.inputs);
    if files.is_empty() {
        info!("No IGC files found in the given paths");
        return Ok(());
    }

    let grid = args.dem.as_deref().map(ElevationGrid::load).transpose()?;
    let elevation: &(dyn ElevationService + Sync) = match &grid {
        Some(grid) => grid,
        None => &NoElevation,
    };

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;
    let sink = YearlyCsvSink::new(&args.output_dir, &config.mop_thresholds);

    let jobs = args.jobs.unwrap_or_else(|| {
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        files.len().min(cores)
    });
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("failed to build worker pool")?;
    info!(
        "Analyzing {} IGC files with {} workers, MOP thresholds {:?}",
        files.len(),
        jobs.max(1),
        config.mop_thresholds
    );

    let t_analyze = Instant::now();
    let results: Vec<Option<(String, Vec<FlightRecord>)>> = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                let name = display_name(path);
                let flights = run_isolated(path, elevation, &config)?.flights;
                for flight in &flights {
                    if let Err(err) = sink.append(&name, flight) {
                        warn!("Failed to record flight from {}: {:#}", path.display(), err);
                    }
                }
                Some((name, flights))
            })
            .collect()
    });

    let failed = results.iter().filter(|r| r.is_none()).count();
    let analyzed: Vec<(String, Vec<FlightRecord>)> = results.into_iter().flatten().collect();
    let flight_count: usize = analyzed.iter().map(|(_, f)| f.len()).sum();
    info!(
        "Analyzed {} files in {:.1} ms: {} flights, {} failed",
        files.len(),
        t_analyze.elapsed().as_secs_f64() * 1000.0,
        flight_count,
        failed
    );

    sink.finish()?;

    if let Some(path) = args.json.as_ref() {
        let entries: Vec<FlightEntry<'_>> = analyzed
            .iter()
            .flat_map(|(file, flights)| {
                flights.iter().map(move |flight| FlightEntry {
                    file: file.as_str(),
                    flight,
                })
            })
            .collect();
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &entries)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote flight records JSON: {}", path.display());
    }
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let files = discover_traces(&args.inputs);
    if files.is_empty() {
        info!("No IGC files found in the given paths");
        return Ok(());
    }
    let grid = args.dem.as_deref().map(ElevationGrid::load).transpose()?;
    let elevation: &(dyn ElevationService + Sync) = match &grid {
        Some(grid) => grid,
        None => &NoElevation,
    };

    let report = inspect_files(&files, elevation, &EngineConfig::default());
    fs::write(&args.output, report)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!("Diagnostic report written: {}", args.output.display());
    Ok(())
}

/// Text report for every file; files that fail are listed as skipped.
fn inspect_files(
    files: &[PathBuf],
    elevation: &(dyn ElevationService + Sync),
    config: &EngineConfig,
) -> String {
    let mut report = String::new();
    for path in files {
        match run_isolated(path, elevation, config) {
            Some(summary) => report.push_str(&inspect_report(path, &summary)),
            None => report.push_str(&format!(
                "FILE: {}\n  skipped: analysis failed\n",
                path.display()
            )),
        }
        report.push('\n');
    }
    report
}

fn inspect_report(path: &Path, summary: &TraceSummary) -> String {
    let header = &summary.header;
    let stats = &summary.stats;
    let mut out = String::new();
    out.push_str(&format!("FILE: {}\n", path.display()));
    out.push_str(&format!(
        "  date: {}\n",
        header
            .date
            .map_or("n/a".into(), |d| d.format("%m/%d/%Y").to_string())
    ));
    out.push_str(&format!(
        "  glider: {} ({})\n",
        header.glider_type.as_deref().unwrap_or("n/a"),
        header.glider_id.as_deref().unwrap_or("n/a")
    ));
    out.push_str(&format!(
        "  pilot: {}\n",
        header.pilot.as_deref().unwrap_or("n/a")
    ));

    let declared: Vec<String> = Channel::ALL
        .iter()
        .filter_map(|&c| {
            summary
                .sensors
                .offset(c)
                .map(|offset| format!("{}@{}", c.tag(), offset))
        })
        .collect();
    out.push_str(&format!(
        "  sensors: [{}] primary={}\n",
        declared.join(", "),
        summary.sensors.primary()
    ));
    out.push_str(&format!(
        "  lines: {}, fixes: {} (accepted={}, rejected={}, discarded={}), malformed={}, length_mismatch={}\n",
        stats.lines,
        stats.positions,
        stats.accepted,
        stats.rejected,
        stats.discarded,
        stats.malformed,
        stats.length_mismatch
    ));
    out.push_str(&format!("  flights: {}\n", summary.flights.len()));
    for flight in &summary.flights {
        out.push_str(&format!(
            "    - {}-{} {} {} ({:.0} m){}\n",
            flight.takeoff.format("%H%M%S"),
            flight.landing.format("%H%M%S"),
            flight.duration_text(),
            flight.landing_kind,
            flight.landing_distance_m,
            if flight.closed_at_end_of_trace {
                " [end of trace]"
            } else {
                ""
            }
        ));
    }
    out
}

fn analyze_file(
    path: &Path,
    elevation: &(dyn ElevationService + Sync),
    config: &EngineConfig,
) -> Result<TraceSummary> {
    let file = File::open(path).with_context(|| format!("failed to read {}", path.display()))?;
    let summary = analyze_reader(BufReader::new(file), elevation, config)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    debug!(
        "{}: {} fixes accepted, {} flights",
        path.display(),
        summary.stats.accepted,
        summary.flights.len()
    );
    Ok(summary)
}

/// Analyze one file; errors and panics are logged and yield `None`.
fn run_isolated(
    path: &Path,
    elevation: &(dyn ElevationService + Sync),
    config: &EngineConfig,
) -> Option<TraceSummary> {
    match panic::catch_unwind(panic::AssertUnwindSafe(|| {
        analyze_file(path, elevation, config)
    })) {
        Ok(Ok(summary)) => Some(summary),
        Ok(Err(err)) => {
            warn!("Skipping {}: {:#}", path.display(), err);
            None
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!("Skipping {}: analyzer panicked: {}", path.display(), message);
            None
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_trace(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("igc") | Some("IGC")
    )
}

/// Expand directories (non-recursively) and return canonical, de-duplicated trace paths.
/// Paths that cannot be read or resolved are logged and skipped.
fn discover_traces(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();
    for input in inputs {
        let meta = match fs::metadata(input) {
            Ok(meta) => meta,
            Err(err) => {
                warn!("Skipping {}: {}", input.display(), err);
                continue;
            }
        };
        if !meta.is_dir() {
            found.extend(canonical(input));
            continue;
        }
        let entries = match fs::read_dir(input) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Skipping {}: {}", input.display(), err);
                continue;
            }
        };
        for entry in entries {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if path.is_file() && is_trace(&path) {
                        found.extend(canonical(&path));
                    }
                }
                Err(err) => warn!("Skipping entry in {}: {}", input.display(), err),
            }
        }
    }
    found.into_iter().collect()
}

fn canonical(path: &Path) -> Option<PathBuf> {
    match fs::canonicalize(path) {
        Ok(path) => Some(path),
        Err(err) => {
            warn!("Skipping {}: failed to resolve: {}", path.display(), err);
            None
        }
    }
}

fn parse_threshold_list(input: &str) -> Result<Vec<u32>> {
    let mut out = Vec::new();
    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: u32 = trimmed
            .parse()
            .with_context(|| format!("invalid threshold '{}': expected an integer", trimmed))?;
        if value == 0 {
            return Err(anyhow!("thresholds must be > 0"));
        }
        if !out.contains(&value) {
            out.push(value);
        }
    }
    Ok(out)
}
