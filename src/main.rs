//! pageprep CLI - binarize scanned pages through the artifact cache.
//!
//! Every source is submitted to the pipeline in order. By default all of them
//! share one target, the way page navigation in a viewer does, so the final
//! visible result is the last page given.

use anyhow::{bail, Context, Result};
use clap::Parser;
use pageprep::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Binarize scanned pages for OCR, reusing cached artifacts when possible.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Source images, processed in the order given.
    #[arg(required_unless_present = "list_steps")]
    sources: Vec<PathBuf>,

    /// TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory artifacts are written to.
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Transform step, e.g. "grayscale", "blur:1.2" or "threshold:140".
    /// Repeat to build a chain; replaces the configured steps.
    #[arg(short, long = "step", value_name = "STEP")]
    steps: Vec<StepConfig>,

    /// Binarize at a fixed level instead of Otsu's.
    #[arg(long, value_name = "LEVEL", conflicts_with_all = ["otsu", "steps"])]
    threshold: Option<u8>,

    /// Binarize at the level chosen by Otsu's method.
    #[arg(long, conflicts_with = "steps")]
    otsu: bool,

    /// Stretch contrast before binarizing.
    #[arg(long, conflicts_with = "steps")]
    stretch: bool,

    /// Artifact format: png, tiff or bmp.
    #[arg(long, value_name = "FORMAT", value_parser = parse_format)]
    format: Option<ArtifactFormat>,

    /// Number of worker threads (0 = one per core).
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Target every source is submitted to.
    #[arg(long, default_value = "page")]
    target: String,

    /// Give every source its own target instead of sharing one.
    #[arg(long)]
    separate: bool,

    /// Recompute every page even if its artifact is up to date.
    #[arg(long)]
    force: bool,

    /// Print a JSON report instead of text.
    #[arg(long)]
    json: bool,

    /// List the available steps and exit.
    #[arg(long)]
    list_steps: bool,
}

fn parse_format(name: &str) -> Result<ArtifactFormat, String> {
    ArtifactFormat::from_name(name).ok_or_else(|| format!("unsupported artifact format '{name}'"))
}

/// Change tracker that reports every source as changed.
struct Recompute;

impl ChangeTracker for Recompute {
    fn has_changed(&self, _source: &Path) -> bool {
        true
    }
}

#[derive(Serialize)]
struct JobReport {
    target: String,
    sequence: Sequence,
    source: PathBuf,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ResultSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct RunReport {
    jobs: Vec<JobReport>,
    current: Vec<(String, ResultSummary)>,
    cache_hits: u64,
    cache_misses: u64,
}

fn load_config(args: &Args) -> Result<PrepConfig> {
    let mut config = match &args.config {
        Some(path) => PrepConfig::from_toml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => PrepConfig::default(),
    };

    if let Some(out) = &args.out {
        config.output_dir = out.clone();
    }
    if let Some(format) = args.format {
        config.pipeline.artifact_format = format;
    }
    if let Some(workers) = args.workers {
        config.pipeline.worker_threads = workers;
    }

    if !args.steps.is_empty() {
        config.steps = args.steps.clone();
    } else if args.threshold.is_some() || args.otsu || args.stretch {
        let mut steps = vec![StepConfig::Grayscale];
        if args.stretch {
            steps.push(StepConfig::ContrastStretch);
        }
        steps.push(match args.threshold {
            Some(level) => StepConfig::Threshold { level },
            None => StepConfig::Otsu,
        });
        config.steps = steps;
    }
    Ok(config)
}

fn list_steps() {
    println!("Available steps:");
    for (name, param) in StepConfig::catalog() {
        if param.is_empty() {
            println!("  {name}");
        } else {
            println!("  {name}:<{param}>");
        }
    }
}

fn job_report(handle: JobHandle) -> (JobReport, JobOutcome) {
    let target = handle.target().to_string();
    let sequence = handle.sequence();
    let source = handle.source().to_path_buf();
    let outcome = handle.wait();

    let (warnings, error) = match &outcome {
        JobOutcome::Published { warnings, .. } => {
            (warnings.iter().map(|w| w.to_string()).collect(), None)
        }
        JobOutcome::Failed { error, .. } => (Vec::new(), Some(error.to_string())),
        _ => (Vec::new(), None),
    };
    let report = JobReport {
        target,
        sequence,
        source,
        outcome: outcome.label(),
        result: outcome.result().map(|r| r.summary()),
        warnings,
        error,
    };
    (report, outcome)
}

fn print_job(report: &JobReport) {
    match (&report.result, &report.error) {
        (Some(result), _) => println!(
            "[{}#{}] {} -> {} ({}, {}x{}, {} ms, {})",
            report.target,
            report.sequence,
            report.source.display(),
            result.cache_path.display(),
            result.origin,
            result.width,
            result.height,
            result.duration_ms,
            report.outcome
        ),
        (None, Some(error)) => println!(
            "[{}#{}] {} failed: {}",
            report.target,
            report.sequence,
            report.source.display(),
            error
        ),
        (None, None) => println!(
            "[{}#{}] {} {}",
            report.target,
            report.sequence,
            report.source.display(),
            report.outcome
        ),
    }
    for warning in &report.warnings {
        println!("    warning: {}", warning);
    }
}

fn run(args: Args) -> Result<()> {
    if args.list_steps {
        list_steps();
        return Ok(());
    }

    let config = load_config(&args)?;
    let registry = Arc::new(config.build_registry());
    let tracker: Arc<dyn ChangeTracker> = if args.force {
        Arc::new(Recompute)
    } else {
        registry.clone()
    };
    let pipeline = PreprocessingPipeline::new(config.pipeline.clone(), registry.clone(), tracker)
        .context("failed to start pipeline")?;

    log::info!(
        "pageprep v{}: {} sources -> {} ({} workers)",
        pageprep::VERSION,
        args.sources.len(),
        config.output_dir.display(),
        pipeline.worker_count()
    );

    let handles: Vec<JobHandle> = args
        .sources
        .iter()
        .map(|source| {
            let target = if args.separate {
                source
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| source.display().to_string())
            } else {
                args.target.clone()
            };
            pipeline.submit(target, source, &config.output_dir)
        })
        .collect();

    let total = handles.len();
    let mut jobs = Vec::with_capacity(total);
    let mut failures = 0;
    for handle in handles {
        let (report, outcome) = job_report(handle);
        match &outcome {
            JobOutcome::Published { result, .. } | JobOutcome::Superseded { result } => {
                registry.record(result);
            }
            JobOutcome::Failed { .. } => failures += 1,
            JobOutcome::Cancelled => {}
        }
        if !args.json {
            print_job(&report);
        }
        jobs.push(report);
    }

    let current: Vec<(String, ResultSummary)> = pipeline
        .slot()
        .targets()
        .into_iter()
        .filter_map(|target| {
            pipeline
                .current(&target)
                .map(|result| (target.to_string(), result.summary()))
        })
        .collect();
    let stats = pipeline.cache_stats();

    if args.json {
        let report = RunReport {
            jobs,
            current,
            cache_hits: stats.hits,
            cache_misses: stats.misses,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (target, result) in &current {
            println!("{}: {}", target, result.cache_path.display());
        }
        println!(
            "cache: {} hits, {} misses ({:.0}% hit ratio)",
            stats.hits,
            stats.misses,
            stats.hit_ratio() * 100.0
        );
    }

    if failures > 0 {
        bail!("{} of {} pages failed", failures, total);
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    run(Args::parse())
}
