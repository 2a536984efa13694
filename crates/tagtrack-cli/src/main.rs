//! `tagtrack` binary: runs the telemetry pipeline over daily CSV exports.
//!
//! # Usage
//!
//! ```bash
//! tagtrack FA_20191115T000000UTC.csv FA_20191116T000000UTC.csv --pretty
//! tagtrack --config tagtrack.toml --tag 2417246 \
//!     --start 2019-11-15T02:05:00Z --end 2019-11-15T02:20:00Z
//! ```

mod config;

use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::{error, info, warn};

use tagtrack_signal::{CsvFileSource, ObservationSource, PipelineOutput, TrackPipeline};

use crate::config::{AppConfig, OutputConfig, Overrides};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "tagtrack",
    version,
    about = "Spike correction and kinematics for ear-tag position telemetry",
    long_about = None
)]
struct Args {
    /// Daily CSV exports; replaces `input.files` from the configuration
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only process this tag (repeatable)
    #[arg(long = "tag", value_name = "ID")]
    tags: Vec<u64>,

    /// Interval start, RFC 3339
    #[arg(long, value_name = "TIME")]
    start: Option<DateTime<Utc>>,

    /// Interval end, RFC 3339
    #[arg(long, value_name = "TIME")]
    end: Option<DateTime<Utc>>,

    /// Absolute deviation from the median reference that marks a spike
    #[arg(long)]
    spike_threshold: Option<f64>,

    /// Median window width (odd)
    #[arg(long)]
    kernel_width: Option<usize>,

    /// Take the heading cosine of the angle in radians
    #[arg(long, default_value_t = false)]
    strict_radians: bool,

    /// Write the JSON report here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Pretty-print the JSON report
    #[arg(long, default_value_t = false)]
    pretty: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            files: self.files.clone(),
            tags: self.tags.clone(),
            start: self.start,
            end: self.end,
            spike_threshold: self.spike_threshold,
            kernel_width: self.kernel_width,
            strict_radians: self.strict_radians,
            output: self.output.clone(),
            pretty: self.pretty,
        }
    }
}

fn main() {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    // Logs go to stderr so the JSON report can be piped
    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let loaded = match args.config.as_deref() {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            AppConfig::from_file(path)
        }
        None => AppConfig::from_env(),
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = config.apply(args.overrides()) {
        error!("Invalid command-line option: {e}");
        process::exit(1);
    }

    let pipeline = match TrackPipeline::new(config.pipeline.clone()) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Configuration validation failed: {e}");
            process::exit(1);
        }
    };

    if config.input.files.is_empty() {
        error!("No input files given");
        process::exit(1);
    }

    info!("Input files  : {}", config.input.files.len());
    info!("Kernel width : {}", config.pipeline.kernel_width);
    info!("Spike thresh : {}", config.pipeline.spike_threshold);
    if let Some(interval) = &config.pipeline.interval {
        info!("Interval     : {} .. {}", interval.start, interval.end);
    }

    let sources: Vec<Box<dyn ObservationSource>> = config
        .input
        .files
        .iter()
        .map(|path| Box::new(CsvFileSource::new(path)) as Box<dyn ObservationSource>)
        .collect();

    let started = Instant::now();
    let output = match pipeline.run_sources(&sources) {
        Ok(output) => output,
        Err(e) => {
            error!("Pipeline failed: {e}");
            process::exit(1);
        }
    };
    let elapsed = started.elapsed();

    report(&output);
    info!("Time taken: {:.3}s", elapsed.as_secs_f64());

    if let Err(e) = write_output(&output, &config.output) {
        error!("Failed to write report: {e}");
        process::exit(1);
    }
}

fn report(output: &PipelineOutput) {
    for track in &output.tracks {
        info!(
            "Tag {}: {} samples, {} spikes, velocity threshold {:.3}, acceleration threshold {:.3}",
            track.tag_id,
            track.annotated.len(),
            track.spike_count,
            track.thresholds.velocity,
            track.thresholds.acceleration
        );
    }
    for skipped in &output.skipped {
        warn!("Tag {} skipped: {}", skipped.tag_id, skipped.reason);
    }
    if !output.failed_sources.is_empty() {
        warn!("{} input files provided no data", output.failed_sources.len());
    }
}

fn write_output(output: &PipelineOutput, config: &OutputConfig) -> tagtrack_core::Result<()> {
    let json = if config.pretty {
        serde_json::to_string_pretty(output)?
    } else {
        serde_json::to_string(output)?
    };

    match &config.path {
        Some(path) => {
            fs::write(path, json)?;
            info!("Report written to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
