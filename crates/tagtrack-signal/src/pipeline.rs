//! Complete batch processing pipeline.
//!
//! Merges input batches, partitions them by tag, drops stationary tags over
//! the full batch, then for every remaining tag slices the optional time
//! interval, computes kinematics, detects Y-channel spikes and estimates
//! motion thresholds. Tags are independent, so the per-tag stage runs as a
//! parallel map; results are collected in ascending tag order.

use std::borrow::Cow;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use tagtrack_core::{
    AnnotatedSeries, Error, KinematicSummary, Kinematics, KinematicsEngine, Observation,
    ObservationSeries, Result, TagId, TimeInterval,
};

use crate::filtering::{
    CorrectedSignal, EdgePolicy, MedianFilter, SpikeDetector, SpikeMask, DEFAULT_KERNEL_WIDTH,
    DEFAULT_SPIKE_THRESHOLD,
};
use crate::partition::{distinct_tags, partition};
use crate::source::{load_batches, FailedSource, ObservationSource};
use crate::stationary::{InactiveTag, StationaryTagFilter, DEFAULT_STATIONARY_RANGE};
use crate::threshold::{MotionThresholds, ThresholdEstimator, DEFAULT_PERCENTILE};

/// Which Y channel the kinematics are computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KinematicsInput {
    /// Positions as recorded
    #[default]
    Raw,
    /// Y channel after spike correction
    Corrected,
}

/// Configuration for the telemetry pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Median window width (odd)
    pub kernel_width: usize,
    pub spike_threshold: f64,
    /// Tags whose Y range is at or below this are dropped
    pub stationary_range_threshold: f64,
    /// Percentile for the velocity and acceleration thresholds
    pub velocity_percentile: f64,
    pub compute_angular: bool,
    pub strict_radians: bool,
    pub edge_policy: EdgePolicy,
    pub kinematics_input: KinematicsInput,

    /// Inclusive time slice applied after stationary filtering
    pub interval: Option<TimeInterval>,
    /// Restrict processing to these tags
    pub tags: Option<BTreeSet<TagId>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            kernel_width: DEFAULT_KERNEL_WIDTH,
            spike_threshold: DEFAULT_SPIKE_THRESHOLD,
            stationary_range_threshold: DEFAULT_STATIONARY_RANGE,
            velocity_percentile: DEFAULT_PERCENTILE,
            compute_angular: true,
            strict_radians: false,
            edge_policy: EdgePolicy::default(),
            kinematics_input: KinematicsInput::default(),
            interval: None,
            tags: None,
        }
    }
}

impl PipelineConfig {
    /// Check every option without building a pipeline
    pub fn validate(&self) -> Result<()> {
        TrackPipeline::new(self.clone()).map(|_| ())
    }
}

/// One row of a track, flattened for tabular export
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRow {
    pub tag_id: TagId,
    pub timestamp: DateTime<Utc>,
    pub x: f64,
    pub y: f64,
    pub y_corrected: f64,
    pub is_spike: bool,
    #[serde(flatten)]
    pub kinematics: Kinematics,
    pub abnormal_speed: bool,
    pub abnormal_acceleration: bool,
}

/// Everything derived for one tag
#[derive(Debug, Clone, Serialize)]
pub struct TrackReport {
    pub tag_id: TagId,
    pub annotated: AnnotatedSeries,
    /// Median reference of the Y channel
    pub reference: Vec<f64>,
    pub spikes: SpikeMask,
    pub corrected: CorrectedSignal,
    pub spike_count: usize,
    pub thresholds: MotionThresholds,
    pub summary: KinematicSummary,
}

impl TrackReport {
    pub fn rows(&self) -> Vec<AnnotatedRow> {
        self.annotated
            .samples()
            .iter()
            .enumerate()
            .map(|(i, sample)| AnnotatedRow {
                tag_id: self.tag_id,
                timestamp: sample.observation.timestamp.to_datetime(),
                x: sample.observation.x,
                y: sample.observation.y,
                y_corrected: self.corrected[i],
                is_spike: self.spikes[i],
                kinematics: sample.kinematics,
                abnormal_speed: self.thresholds.is_abnormal_speed(sample.kinematics.velocity),
                abnormal_acceleration: self
                    .thresholds
                    .is_abnormal_acceleration(sample.kinematics.acceleration),
            })
            .collect()
    }
}

/// A moving tag that could not be processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTag {
    pub tag_id: TagId,
    pub available_samples: usize,
    pub reason: String,
}

/// Pipeline result handed to reporting and visualization
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineOutput {
    pub observation_count: usize,
    pub tracks: Vec<TrackReport>,
    pub inactive_tags: Vec<InactiveTag>,
    pub skipped: Vec<SkippedTag>,
    pub failed_sources: Vec<FailedSource>,
}

impl PipelineOutput {
    pub fn track(&self, tag_id: TagId) -> Option<&TrackReport> {
        self.tracks.iter().find(|t| t.tag_id == tag_id)
    }
}

enum TagOutcome {
    Track(Box<TrackReport>),
    Skipped(SkippedTag),
}

/// The batch telemetry pipeline
#[derive(Debug, Clone)]
pub struct TrackPipeline {
    config: PipelineConfig,
    stationary: StationaryTagFilter,
    detector: SpikeDetector,
    kinematics: KinematicsEngine,
    thresholds: ThresholdEstimator,
}

impl TrackPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        if let Some(interval) = &config.interval {
            if interval.end < interval.start {
                return Err(Error::Config(format!(
                    "interval end {} precedes start {}",
                    interval.end, interval.start
                )));
            }
        }

        let filter = MedianFilter::new(config.kernel_width)?.with_edge_policy(config.edge_policy);
        let detector = SpikeDetector::new(filter, config.spike_threshold)?;
        let stationary = StationaryTagFilter::new(config.stationary_range_threshold)?;
        let thresholds = ThresholdEstimator::new(config.velocity_percentile)?;
        let kinematics = KinematicsEngine::new()
            .with_angular(config.compute_angular)
            .with_strict_radians(config.strict_radians);

        Ok(Self {
            config,
            stationary,
            detector,
            kinematics,
            thresholds,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load all sources and run the pipeline over whatever loaded
    pub fn run_sources(&self, sources: &[Box<dyn ObservationSource>]) -> Result<PipelineOutput> {
        let load = load_batches(sources);
        let mut output = self.run(load.batches)?;
        output.failed_sources = load.failed;
        Ok(output)
    }

    /// Run over one or more batches (e.g. one per day). Batches are merged
    /// before partitioning, so per-tag series span batch boundaries in time
    /// order.
    pub fn run(&self, batches: Vec<Vec<Observation>>) -> Result<PipelineOutput> {
        let observations: Vec<Observation> = batches.concat();
        if observations.is_empty() {
            return Err(Error::NoData("no observations in any input batch".into()));
        }

        let present = distinct_tags(&observations);
        let selected = match &self.config.tags {
            Some(requested) => {
                for missing in requested.difference(&present) {
                    tracing::warn!("Requested tag {} has no observations", missing);
                }
                requested.intersection(&present).copied().collect()
            }
            None => present,
        };

        tracing::info!(
            "Processing {} observations across {} tags",
            observations.len(),
            selected.len()
        );

        let series = partition(&observations, &selected)?;
        let filtered = self.stationary.split(series);

        let outcomes: Vec<TagOutcome> = filtered
            .active
            .par_iter()
            .map(|series| self.process_tag(series))
            .collect();

        let mut output = PipelineOutput {
            observation_count: observations.len(),
            inactive_tags: filtered.inactive,
            ..PipelineOutput::default()
        };

        for outcome in outcomes {
            match outcome {
                TagOutcome::Track(report) => output.tracks.push(*report),
                TagOutcome::Skipped(skipped) => output.skipped.push(skipped),
            }
        }

        tracing::info!(
            "Pipeline finished: {} tracks, {} inactive, {} skipped",
            output.tracks.len(),
            output.inactive_tags.len(),
            output.skipped.len()
        );

        Ok(output)
    }

    fn process_tag(&self, series: &ObservationSeries) -> TagOutcome {
        let sliced = match &self.config.interval {
            Some(interval) => Cow::Owned(series.slice(interval)),
            None => Cow::Borrowed(series),
        };

        match self.process_series(&sliced) {
            Ok(report) => TagOutcome::Track(Box::new(report)),
            Err(e) => {
                tracing::warn!("Skipping tag {}: {}", series.tag_id(), e);
                TagOutcome::Skipped(SkippedTag {
                    tag_id: series.tag_id(),
                    available_samples: sliced.len(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Kinematics, spike detection and thresholds for one tag's series.
    /// No stationary filtering or slicing is applied here.
    pub fn process_series(&self, series: &ObservationSeries) -> Result<TrackReport> {
        let detection = self.detector.detect(&series.ys());

        let kinematics_series = match self.config.kinematics_input {
            KinematicsInput::Raw => Cow::Borrowed(series),
            KinematicsInput::Corrected => Cow::Owned(series.with_ys(&detection.corrected)?),
        };
        let annotated = self.kinematics.try_annotate(&kinematics_series)?;
        let thresholds = self.thresholds.estimate(&annotated)?;
        let summary = KinematicSummary::from_series(&annotated);
        let spike_count = detection.spike_count();

        tracing::debug!(
            "Tag {}: {} samples, {} spikes, velocity threshold {:.3}, acceleration threshold {:.3}",
            series.tag_id(),
            series.len(),
            spike_count,
            thresholds.velocity,
            thresholds.acceleration
        );

        Ok(TrackReport {
            tag_id: series.tag_id(),
            annotated,
            reference: detection.reference,
            spikes: detection.spikes,
            corrected: detection.corrected,
            spike_count,
            thresholds,
            summary,
        })
    }
}
