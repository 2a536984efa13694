//! Percentile thresholds separating normal from abnormal motion.
//!
//! Thresholds are descriptive: they label samples for reporting and plots
//! and never influence spike detection or stationary-tag filtering.

use serde::{Deserialize, Serialize};
use tagtrack_core::{AnnotatedSeries, Error, Result};

/// Default percentile for velocity and acceleration thresholds
pub const DEFAULT_PERCENTILE: f64 = 95.0;

/// `q`-th percentile (0-100) with linear interpolation between closest
/// ranks: rank `q / 100 * (n - 1)` over the ascending values
pub fn percentile(values: &[f64], q: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&q) {
        return Err(Error::InvalidInput(format!(
            "percentile must lie in [0, 100], got {}",
            q
        )));
    }
    if values.is_empty() {
        return Err(Error::InsufficientData {
            required: 1,
            available: 0,
        });
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    Ok(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Velocity and acceleration thresholds of one series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionThresholds {
    pub percentile: f64,
    pub velocity: f64,
    pub acceleration: f64,
}

impl MotionThresholds {
    pub fn is_abnormal_speed(&self, velocity: f64) -> bool {
        velocity > self.velocity
    }

    pub fn is_abnormal_acceleration(&self, acceleration: f64) -> bool {
        acceleration > self.acceleration
    }

    pub fn abnormal_speed_mask(&self, series: &AnnotatedSeries) -> Vec<bool> {
        series
            .velocities()
            .into_iter()
            .map(|v| self.is_abnormal_speed(v))
            .collect()
    }

    pub fn abnormal_acceleration_mask(&self, series: &AnnotatedSeries) -> Vec<bool> {
        series
            .accelerations()
            .into_iter()
            .map(|a| self.is_abnormal_acceleration(a))
            .collect()
    }
}

/// Derives [`MotionThresholds`] from an annotated series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdEstimator {
    percentile: f64,
}

impl ThresholdEstimator {
    pub fn new(percentile: f64) -> Result<Self> {
        if !(0.0..=100.0).contains(&percentile) {
            return Err(Error::Config(format!(
                "percentile must lie in [0, 100], got {}",
                percentile
            )));
        }
        Ok(Self { percentile })
    }

    pub fn percentile(&self) -> f64 {
        self.percentile
    }

    pub fn estimate(&self, series: &AnnotatedSeries) -> Result<MotionThresholds> {
        Ok(MotionThresholds {
            percentile: self.percentile,
            velocity: percentile(&series.velocities(), self.percentile)?,
            acceleration: percentile(&series.accelerations(), self.percentile)?,
        })
    }
}

impl Default for ThresholdEstimator {
    fn default() -> Self {
        Self {
            percentile: DEFAULT_PERCENTILE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagtrack_core::{KinematicsEngine, Observation, ObservationSeries, TagId, Timestamp};

    #[test]
    fn test_percentile_reference_value() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let p95 = percentile(&values, 95.0).unwrap();
        assert!((p95 - 95.05).abs() < 1e-9, "got {}", p95);
    }

    #[test]
    fn test_percentile_order_independent() {
        let values = vec![5.0, 1.0, 4.0, 2.0, 3.0];
        assert_eq!(percentile(&values, 50.0).unwrap(), 3.0);
        assert_eq!(percentile(&values, 0.0).unwrap(), 1.0);
        assert_eq!(percentile(&values, 100.0).unwrap(), 5.0);
        assert!((percentile(&values, 10.0).unwrap() - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_single_value() {
        assert_eq!(percentile(&[7.5], 95.0).unwrap(), 7.5);
    }

    #[test]
    fn test_percentile_errors() {
        assert!(matches!(
            percentile(&[], 95.0),
            Err(Error::InsufficientData { .. })
        ));
        assert!(percentile(&[1.0], 101.0).is_err());
        assert!(ThresholdEstimator::new(-5.0).is_err());
    }

    #[test]
    fn test_estimate_and_classify() {
        let series = ObservationSeries::from_observations(
            TagId(1),
            (0..21)
                .map(|i| {
                    let x = (i * i) as f64;
                    Observation::new(TagId(1), Timestamp::from_millis(i * 1000), x, 0.0)
                })
                .collect(),
        )
        .unwrap();
        let annotated = KinematicsEngine::new().annotate(&series);
        let thresholds = ThresholdEstimator::default().estimate(&annotated).unwrap();

        // velocities 0, 1, 3, 5, ..., 39
        assert!((thresholds.velocity - 37.0).abs() < 1e-9);
        assert!((thresholds.acceleration - 2.0).abs() < 1e-9);

        let mask = thresholds.abnormal_speed_mask(&annotated);
        assert_eq!(mask.len(), annotated.len());
        assert_eq!(mask.iter().filter(|&&m| m).count(), 1);
    }
}
