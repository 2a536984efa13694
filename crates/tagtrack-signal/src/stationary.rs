//! Detection and removal of stationary tags.
//!
//! A tag whose Y position never spans more than the motion range over the
//! whole batch is assumed to be lost, broken or fixed to the barn. It is
//! removed before any slicing, kinematics or spike detection so it cannot
//! pull the velocity statistics toward zero.

use serde::{Deserialize, Serialize};
use tagtrack_core::{Error, ObservationSeries, Result, TagId};

/// Default minimum Y range (tracking units) of a moving tag
pub const DEFAULT_STATIONARY_RANGE: f64 = 2600.0;

/// Motion classification of a tag over the full batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TagActivity {
    Active { range_y: f64 },
    Inactive { range_y: f64 },
}

impl TagActivity {
    pub fn is_active(&self) -> bool {
        matches!(self, TagActivity::Active { .. })
    }

    pub fn range_y(&self) -> f64 {
        match *self {
            TagActivity::Active { range_y } | TagActivity::Inactive { range_y } => range_y,
        }
    }
}

/// A tag dropped by the stationary filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InactiveTag {
    pub tag_id: TagId,
    pub range_y: f64,
    pub sample_count: usize,
}

/// Series that survived the filter, plus the tags that were dropped
#[derive(Debug, Clone, Default)]
pub struct StationaryFilterOutcome {
    pub active: Vec<ObservationSeries>,
    pub inactive: Vec<InactiveTag>,
}

/// Classifies tags by the span of their Y channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationaryTagFilter {
    range_threshold: f64,
}

impl StationaryTagFilter {
    pub fn new(range_threshold: f64) -> Result<Self> {
        if !range_threshold.is_finite() || range_threshold < 0.0 {
            return Err(Error::Config(format!(
                "stationary range threshold must be finite and non-negative, got {}",
                range_threshold
            )));
        }
        Ok(Self { range_threshold })
    }

    pub fn range_threshold(&self) -> f64 {
        self.range_threshold
    }

    /// Inactive when `max(y) - min(y) <= threshold`. Fewer than two
    /// observations is always inactive.
    pub fn classify(&self, series: &ObservationSeries) -> TagActivity {
        if series.len() < 2 {
            return TagActivity::Inactive { range_y: 0.0 };
        }
        let range_y = series.y_range().unwrap_or(0.0);
        if range_y <= self.range_threshold {
            TagActivity::Inactive { range_y }
        } else {
            TagActivity::Active { range_y }
        }
    }

    /// Keep moving tags and report the rest
    pub fn split(&self, series: Vec<ObservationSeries>) -> StationaryFilterOutcome {
        let mut outcome = StationaryFilterOutcome::default();

        for s in series {
            match self.classify(&s) {
                TagActivity::Active { .. } => outcome.active.push(s),
                TagActivity::Inactive { range_y } => {
                    tracing::debug!(
                        "Dropping stationary tag {} (y range {:.1}, {} samples)",
                        s.tag_id(),
                        range_y,
                        s.len()
                    );
                    outcome.inactive.push(InactiveTag {
                        tag_id: s.tag_id(),
                        range_y,
                        sample_count: s.len(),
                    });
                }
            }
        }

        tracing::info!(
            "Stationary tags removed: {} ({} active)",
            outcome.inactive.len(),
            outcome.active.len()
        );

        outcome
    }
}

impl Default for StationaryTagFilter {
    fn default() -> Self {
        Self {
            range_threshold: DEFAULT_STATIONARY_RANGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagtrack_core::{Observation, Timestamp};

    fn series_with_ys(tag: u64, ys: &[f64]) -> ObservationSeries {
        ObservationSeries::from_observations(
            TagId(tag),
            ys.iter()
                .enumerate()
                .map(|(i, &y)| {
                    Observation::new(TagId(tag), Timestamp::from_millis(i as i64 * 1000), 0.0, y)
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_boundary_is_inactive() {
        let filter = StationaryTagFilter::default();
        let at_boundary = series_with_ys(1, &[100.0, 2700.0, 1500.0]);
        assert_eq!(
            filter.classify(&at_boundary),
            TagActivity::Inactive { range_y: 2600.0 }
        );

        let above = series_with_ys(2, &[100.0, 2700.5]);
        assert!(filter.classify(&above).is_active());
    }

    #[test]
    fn test_short_series_inactive() {
        let filter = StationaryTagFilter::new(0.0).unwrap();
        assert!(!filter.classify(&series_with_ys(1, &[5000.0])).is_active());
        assert!(!filter.classify(&ObservationSeries::new(TagId(2))).is_active());
    }

    #[test]
    fn test_split() {
        let filter = StationaryTagFilter::default();
        let outcome = filter.split(vec![
            series_with_ys(1, &[0.0, 10.0, 20.0]),
            series_with_ys(2, &[0.0, 5000.0, 20.0]),
            series_with_ys(3, &[0.0]),
        ]);

        assert_eq!(outcome.active.len(), 1);
        assert_eq!(outcome.active[0].tag_id(), TagId(2));

        let dropped: Vec<TagId> = outcome.inactive.iter().map(|t| t.tag_id).collect();
        assert_eq!(dropped, vec![TagId(1), TagId(3)]);
        assert_eq!(outcome.inactive[0].range_y, 20.0);
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(StationaryTagFilter::new(-1.0).is_err());
        assert!(StationaryTagFilter::new(f64::INFINITY).is_err());
    }
}
