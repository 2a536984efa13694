//! Fundamental types for tag telemetry.

use std::fmt;

use chrono::{DateTime, Utc};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of a tracked individual (one tag per animal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TagId(pub u64);

impl TagId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper with nanosecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Tracking exports carry millisecond epoch timestamps
    pub fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Saturates outside the nanosecond range (roughly 1677 to 2262)
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        match datetime.timestamp_nanos_opt() {
            Some(nanos) => Self(nanos),
            None if datetime.timestamp() < 0 => Self(i64::MIN),
            None => Self(i64::MAX),
        }
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }

    /// Signed seconds elapsed since `earlier`. Widened so any two
    /// timestamps can be subtracted.
    pub fn seconds_since(&self, earlier: &Timestamp) -> f64 {
        (self.0 as i128 - earlier.0 as i128) as f64 / 1_000_000_000.0
    }
}

/// Planar position in the barn coordinate system (tracking units)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position2D {
    pub x: f64,
    pub y: f64,
}

impl Position2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_nalgebra(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    /// Displacement vector from `origin` to this position
    pub fn displacement_from(&self, origin: &Self) -> Vector2<f64> {
        self.to_nalgebra() - origin.to_nalgebra()
    }

    pub fn distance_to(&self, other: &Self) -> f64 {
        other.displacement_from(self).norm()
    }
}

/// A single position reading emitted by one tag
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub tag_id: TagId,
    pub timestamp: Timestamp,
    pub x: f64,
    pub y: f64,
}

impl Observation {
    pub fn new(tag_id: TagId, timestamp: Timestamp, x: f64, y: f64) -> Self {
        Self {
            tag_id,
            timestamp,
            x,
            y,
        }
    }

    pub fn position(&self) -> Position2D {
        Position2D::new(self.x, self.y)
    }
}

/// Inclusive UTC time window used to slice a tag's series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidInput(format!(
                "interval end {} precedes start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, timestamp: Timestamp) -> bool {
        timestamp >= Timestamp::from_datetime(self.start)
            && timestamp <= Timestamp::from_datetime(self.end)
    }
}

/// Time-ordered observations of a single tag.
///
/// Timestamps never decrease along the series. Equal timestamps are allowed
/// (duplicate readings) and are resolved by the kinematics boundary policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationSeries {
    tag_id: TagId,
    observations: Vec<Observation>,
}

impl ObservationSeries {
    pub fn new(tag_id: TagId) -> Self {
        Self {
            tag_id,
            observations: Vec::new(),
        }
    }

    /// Build from observations that are already time-ordered
    pub fn from_observations(tag_id: TagId, observations: Vec<Observation>) -> Result<Self> {
        check_tags(tag_id, &observations)?;
        if let Some(index) = observations
            .windows(2)
            .position(|w| w[1].timestamp < w[0].timestamp)
        {
            return Err(Error::UnorderedSeries { index: index + 1 });
        }
        Ok(Self {
            tag_id,
            observations,
        })
    }

    /// Build from observations in arbitrary order. The sort is stable, so
    /// duplicate timestamps keep their input order.
    pub fn from_unsorted(tag_id: TagId, mut observations: Vec<Observation>) -> Result<Self> {
        check_tags(tag_id, &observations)?;
        observations.sort_by_key(|o| o.timestamp);
        Ok(Self {
            tag_id,
            observations,
        })
    }

    /// Append an observation at the end of the series
    pub fn push(&mut self, observation: Observation) -> Result<()> {
        if observation.tag_id != self.tag_id {
            return Err(Error::TagMismatch {
                expected: self.tag_id,
                actual: observation.tag_id,
            });
        }
        if let Some(last) = self.observations.last() {
            if observation.timestamp < last.timestamp {
                return Err(Error::UnorderedSeries {
                    index: self.observations.len(),
                });
            }
        }
        self.observations.push(observation);
        Ok(())
    }

    pub fn tag_id(&self) -> TagId {
        self.tag_id
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn into_observations(self) -> Vec<Observation> {
        self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    pub fn xs(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.y).collect()
    }

    /// `max(y) - min(y)` over the series, `None` when empty
    pub fn y_range(&self) -> Option<f64> {
        let first = self.observations.first()?.y;
        let (min, max) = self
            .observations
            .iter()
            .fold((first, first), |(lo, hi), o| (lo.min(o.y), hi.max(o.y)));
        Some(max - min)
    }

    pub fn start_time(&self) -> Option<Timestamp> {
        self.observations.first().map(|o| o.timestamp)
    }

    pub fn end_time(&self) -> Option<Timestamp> {
        self.observations.last().map(|o| o.timestamp)
    }

    pub fn duration_secs(&self) -> f64 {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => end.seconds_since(&start),
            _ => 0.0,
        }
    }

    /// Total distance travelled along consecutive samples
    pub fn path_length(&self) -> f64 {
        self.observations
            .windows(2)
            .map(|w| w[0].position().distance_to(&w[1].position()))
            .sum()
    }

    /// Observations falling inside `interval` (both ends inclusive)
    pub fn slice(&self, interval: &TimeInterval) -> Self {
        Self {
            tag_id: self.tag_id,
            observations: self
                .observations
                .iter()
                .filter(|o| interval.contains(o.timestamp))
                .copied()
                .collect(),
        }
    }

    /// Copy of the series with its Y channel replaced by `ys`
    pub fn with_ys(&self, ys: &[f64]) -> Result<Self> {
        if ys.len() != self.observations.len() {
            return Err(Error::InvalidInput(format!(
                "Y channel length {} does not match series length {}",
                ys.len(),
                self.observations.len()
            )));
        }
        Ok(Self {
            tag_id: self.tag_id,
            observations: self
                .observations
                .iter()
                .zip(ys)
                .map(|(o, &y)| Observation { y, ..*o })
                .collect(),
        })
    }
}

fn check_tags(tag_id: TagId, observations: &[Observation]) -> Result<()> {
    match observations.iter().find(|o| o.tag_id != tag_id) {
        Some(stray) => Err(Error::TagMismatch {
            expected: tag_id,
            actual: stray.tag_id,
        }),
        None => Ok(()),
    }
}
