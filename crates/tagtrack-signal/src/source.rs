//! Observation sources feeding the pipeline.
//!
//! The tracking system exports one headerless CSV file per day. Each row is
//! `[record, tag_id, unit, timestamp_ms, x, y, z]`; only the tag, the
//! millisecond timestamp and the planar position are used. A file that is
//! missing or contains a malformed row yields no data at all.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tagtrack_core::{Error, Observation, Result, TagId, Timestamp};

/// Trait for observation providers
pub trait ObservationSource: Send + Sync {
    /// Human-readable name used in logs and errors
    fn name(&self) -> &str;

    /// Load every observation of this source
    fn load(&self) -> Result<Vec<Observation>>;
}

/// Zero-based column positions of the fields used from each CSV row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub tag_id: usize,
    pub timestamp_ms: usize,
    pub x: usize,
    pub y: usize,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            tag_id: 1,
            timestamp_ms: 3,
            x: 4,
            y: 5,
        }
    }
}

impl ColumnLayout {
    fn min_columns(&self) -> usize {
        [self.tag_id, self.timestamp_ms, self.x, self.y]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Headerless CSV export on disk
pub struct CsvFileSource {
    path: PathBuf,
    name: String,
    layout: ColumnLayout,
}

impl CsvFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path.display().to_string();
        Self {
            path,
            name,
            layout: ColumnLayout::default(),
        }
    }

    pub fn with_layout(mut self, layout: ColumnLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse CSV text laid out as `layout`. Fields may be quoted and rows
    /// may carry trailing columns.
    pub fn parse(source_name: &str, text: &str, layout: &ColumnLayout) -> Result<Vec<Observation>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut observations = Vec::new();

        for result in reader.records() {
            let record = result.map_err(|e| Error::Parse {
                source_name: source_name.to_string(),
                line: e.position().map_or(0, |p| p.line() as usize),
                reason: e.to_string(),
            })?;

            let parse_error = |reason: String| Error::Parse {
                source_name: source_name.to_string(),
                line: record.position().map_or(0, |p| p.line() as usize),
                reason,
            };

            if record.len() < layout.min_columns() {
                return Err(parse_error(format!(
                    "expected at least {} columns, found {}",
                    layout.min_columns(),
                    record.len()
                )));
            }

            let tag_id: u64 = record[layout.tag_id]
                .parse()
                .map_err(|e| parse_error(format!("tag id {:?}: {}", &record[layout.tag_id], e)))?;
            let timestamp_ms: i64 = record[layout.timestamp_ms].parse().map_err(|e| {
                parse_error(format!(
                    "timestamp {:?}: {}",
                    &record[layout.timestamp_ms], e
                ))
            })?;
            let x: f64 = record[layout.x]
                .parse()
                .map_err(|e| parse_error(format!("x {:?}: {}", &record[layout.x], e)))?;
            let y: f64 = record[layout.y]
                .parse()
                .map_err(|e| parse_error(format!("y {:?}: {}", &record[layout.y], e)))?;

            observations.push(Observation::new(
                TagId(tag_id),
                Timestamp::from_millis(timestamp_ms),
                x,
                y,
            ));
        }

        Ok(observations)
    }
}

impl ObservationSource for CsvFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<Observation>> {
        let text = fs::read_to_string(&self.path)?;
        Self::parse(&self.name, &text, &self.layout)
    }
}

/// Observations already held in memory
pub struct MemorySource {
    name: String,
    observations: Vec<Observation>,
}

impl MemorySource {
    pub fn new(name: &str, observations: Vec<Observation>) -> Self {
        Self {
            name: name.to_string(),
            observations,
        }
    }
}

impl ObservationSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<Observation>> {
        Ok(self.observations.clone())
    }
}

/// A source that could not be loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedSource {
    pub name: String,
    pub reason: String,
}

/// Batches loaded from several sources
#[derive(Debug, Clone, Default)]
pub struct BatchLoad {
    pub batches: Vec<Vec<Observation>>,
    pub failed: Vec<FailedSource>,
}

impl BatchLoad {
    pub fn observation_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

/// Load every source. A failing source is logged and recorded as providing
/// no data; the remaining sources still load.
pub fn load_batches(sources: &[Box<dyn ObservationSource>]) -> BatchLoad {
    let mut load = BatchLoad::default();

    for source in sources {
        match source.load() {
            Ok(batch) => {
                tracing::debug!("Loaded {} observations from {}", batch.len(), source.name());
                load.batches.push(batch);
            }
            Err(e) => {
                tracing::warn!("No data available from {}: {}", source.name(), e);
                load.failed.push(FailedSource {
                    name: source.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    load
}
