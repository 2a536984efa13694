//! Application configuration.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tagtrack_core::{Result, TagId, TimeInterval};
use tagtrack_signal::PipelineConfig;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Pipeline options
    pub pipeline: PipelineConfig,

    /// Input files
    pub input: InputConfig,

    /// Report destination
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Daily CSV exports, processed as one merged batch
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// JSON report path; stdout when unset
    pub path: Option<PathBuf>,

    /// Pretty-print the JSON report
    pub pretty: bool,
}

/// Values given on the command line. Anything set here wins over the
/// configuration file and the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub files: Vec<PathBuf>,
    pub tags: Vec<u64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub spike_threshold: Option<f64>,
    pub kernel_width: Option<usize>,
    pub strict_radians: bool,
    pub output: Option<PathBuf>,
    pub pretty: bool,
}

impl AppConfig {
    /// Load configuration from file, layered with `TAGTRACK_*` variables
    /// (e.g. `TAGTRACK_PIPELINE__SPIKE_THRESHOLD=150`)
    pub fn from_file(path: &Path) -> std::result::Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(Self::environment())
            .build()?;

        settings.try_deserialize()
    }

    /// Load from environment variables
    pub fn from_env() -> std::result::Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(Self::environment())
            .build()?;

        settings.try_deserialize()
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("TAGTRACK")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Merge command-line values. A lone `start` or `end` leaves the other
    /// bound open, unless the configuration already sets it.
    pub fn apply(&mut self, overrides: Overrides) -> Result<()> {
        if !overrides.files.is_empty() {
            self.input.files = overrides.files;
        }
        if !overrides.tags.is_empty() {
            let tags: BTreeSet<TagId> = overrides.tags.into_iter().map(TagId).collect();
            self.pipeline.tags = Some(tags);
        }

        if overrides.start.is_some() || overrides.end.is_some() {
            let current = self.pipeline.interval;
            let start = overrides
                .start
                .or(current.map(|i| i.start))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            let end = overrides
                .end
                .or(current.map(|i| i.end))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.pipeline.interval = Some(TimeInterval::new(start, end)?);
        }

        if let Some(threshold) = overrides.spike_threshold {
            self.pipeline.spike_threshold = threshold;
        }
        if let Some(width) = overrides.kernel_width {
            self.pipeline.kernel_width = width;
        }
        if overrides.strict_radians {
            self.pipeline.strict_radians = true;
        }
        if let Some(path) = overrides.output {
            self.output.path = Some(path);
        }
        if overrides.pretty {
            self.output.pretty = true;
        }

        Ok(())
    }
}
