//! Kinematic analysis types and computations.
//!
//! Every derived column is computed from consecutive samples of a single
//! tag's time-ordered series. The first sample of a series has no
//! predecessor, so all of its derived fields are 0. Degenerate arithmetic
//! (zero time delta, vertical displacement) is resolved by guarded division
//! to 0 before the value is stored, so no column ever holds NaN or infinity.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Observation, ObservationSeries, TagId};

/// Derived motion quantities of one sample relative to its predecessor
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Kinematics {
    /// Seconds since the previous sample
    pub time_delta_s: f64,
    /// Planar speed (units/s)
    pub velocity: f64,
    /// Change in speed over the time delta (units/s²)
    pub acceleration: f64,
    /// dy/dx of the step, 0 for vertical steps
    pub heading_slope: f64,
    /// atan(slope) in degrees
    pub heading_theta_deg: f64,
    /// cos of the heading angle taken in degrees, or in radians when
    /// `strict_radians` is set
    pub heading_cosine: f64,
    /// Change in heading angle since the previous sample (degrees)
    pub heading_theta_delta: f64,
}

impl Kinematics {
    /// Heading change per second (degrees/s)
    pub fn turning_rate(&self) -> f64 {
        if self.time_delta_s <= 0.0 {
            return 0.0;
        }
        ratio_or_zero(self.heading_theta_delta, self.time_delta_s)
    }
}

/// An observation together with its derived kinematics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSample {
    pub observation: Observation,
    pub kinematics: Kinematics,
}

/// A tag's series augmented with per-sample kinematics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedSeries {
    tag_id: TagId,
    samples: Vec<AnnotatedSample>,
}

impl AnnotatedSeries {
    pub fn tag_id(&self) -> TagId {
        self.tag_id
    }

    pub fn samples(&self) -> &[AnnotatedSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Extract one derived column
    pub fn column<F>(&self, field: F) -> Vec<f64>
    where
        F: Fn(&Kinematics) -> f64,
    {
        self.samples.iter().map(|s| field(&s.kinematics)).collect()
    }

    pub fn velocities(&self) -> Vec<f64> {
        self.column(|k| k.velocity)
    }

    pub fn accelerations(&self) -> Vec<f64> {
        self.column(|k| k.acceleration)
    }

    pub fn headings_deg(&self) -> Vec<f64> {
        self.column(|k| k.heading_theta_deg)
    }
}

/// Computes [`AnnotatedSeries`] from time-ordered observation series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicsEngine {
    /// Compute slope, angle, cosine and angle delta columns
    pub compute_angular: bool,

    /// Take the cosine of the heading in radians. When false the heading in
    /// degrees is passed to `cos` unchanged, matching the historical output.
    pub strict_radians: bool,
}

impl Default for KinematicsEngine {
    fn default() -> Self {
        Self {
            compute_angular: true,
            strict_radians: false,
        }
    }
}

impl KinematicsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_angular(mut self, compute_angular: bool) -> Self {
        self.compute_angular = compute_angular;
        self
    }

    pub fn with_strict_radians(mut self, strict_radians: bool) -> Self {
        self.strict_radians = strict_radians;
        self
    }

    /// Annotate a series. Series shorter than two samples come back with
    /// every derived field at 0.
    pub fn annotate(&self, series: &ObservationSeries) -> AnnotatedSeries {
        let observations = series.observations();
        let mut samples: Vec<AnnotatedSample> = Vec::with_capacity(observations.len());

        for (i, &observation) in observations.iter().enumerate() {
            let kinematics = match i {
                0 => Kinematics::default(),
                _ => self.step(&observations[i - 1], &observation, &samples[i - 1].kinematics),
            };
            samples.push(AnnotatedSample {
                observation,
                kinematics,
            });
        }

        AnnotatedSeries {
            tag_id: series.tag_id(),
            samples,
        }
    }

    /// Annotate a series, reporting series with fewer than two samples as
    /// insufficient instead of returning all-zero kinematics
    pub fn try_annotate(&self, series: &ObservationSeries) -> Result<AnnotatedSeries> {
        if series.len() < 2 {
            return Err(Error::InsufficientData {
                required: 2,
                available: series.len(),
            });
        }
        Ok(self.annotate(series))
    }

    fn step(&self, prev: &Observation, curr: &Observation, prev_kin: &Kinematics) -> Kinematics {
        let time_delta_s = curr.timestamp.seconds_since(&prev.timestamp);
        let distance = prev.position().distance_to(&curr.position());

        let (velocity, acceleration) = if time_delta_s > 0.0 {
            let velocity = ratio_or_zero(distance, time_delta_s);
            let acceleration = ratio_or_zero(velocity - prev_kin.velocity, time_delta_s);
            (velocity, acceleration)
        } else {
            (0.0, 0.0)
        };

        let mut kinematics = Kinematics {
            time_delta_s,
            velocity,
            acceleration,
            ..Kinematics::default()
        };

        if self.compute_angular {
            let heading_slope = ratio_or_zero(curr.y - prev.y, curr.x - prev.x);
            let heading_theta_deg = heading_slope.atan().to_degrees();
            kinematics.heading_slope = heading_slope;
            kinematics.heading_theta_deg = heading_theta_deg;
            kinematics.heading_cosine = self.heading_cosine(heading_theta_deg);
            kinematics.heading_theta_delta = heading_theta_deg - prev_kin.heading_theta_deg;
        }

        kinematics
    }

    fn heading_cosine(&self, theta_deg: f64) -> f64 {
        if self.strict_radians {
            theta_deg.to_radians().cos()
        } else {
            theta_deg.cos()
        }
    }
}

/// `numerator / denominator`, or 0 when the divisor is zero or the quotient
/// is not finite
pub fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// Aggregate motion statistics of an annotated series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicSummary {
    pub tag_id: TagId,
    pub sample_count: usize,
    pub duration_secs: f64,
    pub path_length: f64,
    pub mean_velocity: f64,
    pub max_velocity: f64,
    pub velocity_variance: f64,
    pub mean_acceleration: f64,
    /// Largest absolute acceleration
    pub peak_acceleration: f64,
    pub mean_abs_heading_change_deg: f64,
}

impl KinematicSummary {
    pub fn from_series(series: &AnnotatedSeries) -> Self {
        let samples = series.samples();

        let duration_secs = match (samples.first(), samples.last()) {
            (Some(first), Some(last)) => last
                .observation
                .timestamp
                .seconds_since(&first.observation.timestamp),
            _ => 0.0,
        };

        let path_length = samples
            .windows(2)
            .map(|w| w[0].observation.position().distance_to(&w[1].observation.position()))
            .sum();

        let velocities = series.velocities();
        let mean_velocity = mean(&velocities);
        let max_velocity = velocities.iter().cloned().fold(0.0, f64::max);
        let velocity_variance = variance(&velocities, mean_velocity);

        let accelerations = series.accelerations();
        let mean_acceleration = mean(&accelerations);
        let peak_acceleration = accelerations.iter().map(|a| a.abs()).fold(0.0, f64::max);

        let heading_changes: Vec<f64> = series
            .column(|k| k.heading_theta_delta)
            .into_iter()
            .map(f64::abs)
            .collect();

        Self {
            tag_id: series.tag_id(),
            sample_count: samples.len(),
            duration_secs,
            path_length,
            mean_velocity,
            max_velocity,
            velocity_variance,
            mean_acceleration,
            peak_acceleration,
            mean_abs_heading_change_deg: mean(&heading_changes),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;

    fn series(points: &[(i64, f64, f64)]) -> ObservationSeries {
        ObservationSeries::from_observations(
            TagId(42),
            points
                .iter()
                .map(|&(ms, x, y)| Observation::new(TagId(42), Timestamp::from_millis(ms), x, y))
                .collect(),
        )
        .unwrap()
    }

    fn assert_all_finite(annotated: &AnnotatedSeries) {
        for s in annotated.samples() {
            let k = s.kinematics;
            for v in [
                k.time_delta_s,
                k.velocity,
                k.acceleration,
                k.heading_slope,
                k.heading_theta_deg,
                k.heading_cosine,
                k.heading_theta_delta,
            ] {
                assert!(v.is_finite(), "derived field must be finite: {:?}", k);
            }
        }
    }

    #[test]
    fn test_head_sample_is_zero() {
        let annotated = KinematicsEngine::new().annotate(&series(&[
            (0, 5.0, 5.0),
            (1000, 8.0, 9.0),
        ]));
        assert_eq!(annotated.samples()[0].kinematics, Kinematics::default());
        assert_eq!(annotated.velocities()[0], 0.0);
        assert_eq!(annotated.accelerations()[0], 0.0);
    }

    #[test]
    fn test_velocity_and_acceleration() {
        let annotated = KinematicsEngine::new().annotate(&series(&[
            (0, 0.0, 0.0),
            (1000, 3.0, 4.0),
            (3000, 3.0, 24.0),
        ]));
        let k1 = annotated.samples()[1].kinematics;
        let k2 = annotated.samples()[2].kinematics;

        assert!((k1.time_delta_s - 1.0).abs() < 1e-12);
        assert!((k1.velocity - 5.0).abs() < 1e-12);
        assert!((k1.acceleration - 5.0).abs() < 1e-12);

        assert!((k2.time_delta_s - 2.0).abs() < 1e-12);
        assert!((k2.velocity - 10.0).abs() < 1e-12);
        assert!((k2.acceleration - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_duplicate_timestamps_yield_zero_velocity() {
        let annotated = KinematicsEngine::new().annotate(&series(&[
            (1000, 0.0, 0.0),
            (1000, 10.0, 10.0),
        ]));
        let k = annotated.samples()[1].kinematics;
        assert_eq!(k.time_delta_s, 0.0);
        assert_eq!(k.velocity, 0.0);
        assert_eq!(k.acceleration, 0.0);
        assert_eq!(k.turning_rate(), 0.0);
        assert_all_finite(&annotated);
    }

    #[test]
    fn test_vertical_step_has_zero_slope() {
        let annotated = KinematicsEngine::new().annotate(&series(&[
            (0, 2.0, 0.0),
            (1000, 2.0, 50.0),
        ]));
        let k = annotated.samples()[1].kinematics;
        assert_eq!(k.heading_slope, 0.0);
        assert_eq!(k.heading_theta_deg, 0.0);
        assert!((k.velocity - 50.0).abs() < 1e-12);
        assert_all_finite(&annotated);
    }

    #[test]
    fn test_heading_angle_and_delta() {
        let annotated = KinematicsEngine::new().annotate(&series(&[
            (0, 0.0, 0.0),
            (1000, 1.0, 1.0),
            (2000, 2.0, 1.0),
        ]));
        let k1 = annotated.samples()[1].kinematics;
        let k2 = annotated.samples()[2].kinematics;

        assert!((k1.heading_slope - 1.0).abs() < 1e-12);
        assert!((k1.heading_theta_deg - 45.0).abs() < 1e-9);
        assert!((k1.heading_theta_delta - 45.0).abs() < 1e-9);

        assert_eq!(k2.heading_slope, 0.0);
        assert!((k2.heading_theta_delta + 45.0).abs() < 1e-9);
        assert!((k2.turning_rate() + 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_units() {
        let points = [(0, 0.0, 0.0), (1000, 1.0, 1.0)];

        let as_built = KinematicsEngine::new().annotate(&series(&points));
        let cos_as_built = as_built.samples()[1].kinematics.heading_cosine;
        assert!((cos_as_built - 45.0_f64.cos()).abs() < 1e-9);

        let strict = KinematicsEngine::new()
            .with_strict_radians(true)
            .annotate(&series(&points));
        let cos_strict = strict.samples()[1].kinematics.heading_cosine;
        assert!((cos_strict - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn test_angular_disabled() {
        let annotated = KinematicsEngine::new()
            .with_angular(false)
            .annotate(&series(&[(0, 0.0, 0.0), (1000, 1.0, 1.0)]));
        let k = annotated.samples()[1].kinematics;
        assert_eq!(k.heading_slope, 0.0);
        assert_eq!(k.heading_cosine, 0.0);
        assert!(k.velocity > 0.0);
    }

    #[test]
    fn test_insufficient_data() {
        let engine = KinematicsEngine::new();
        let single = series(&[(0, 1.0, 1.0)]);

        assert!(matches!(
            engine.try_annotate(&single),
            Err(Error::InsufficientData {
                required: 2,
                available: 1
            })
        ));

        let annotated = engine.annotate(&single);
        assert_eq!(annotated.len(), 1);
        assert_eq!(annotated.samples()[0].kinematics, Kinematics::default());
    }

    #[test]
    fn test_ratio_or_zero() {
        assert_eq!(ratio_or_zero(1.0, 0.0), 0.0);
        assert_eq!(ratio_or_zero(0.0, 0.0), 0.0);
        assert_eq!(ratio_or_zero(f64::MAX, 1e-300), 0.0);
        assert_eq!(ratio_or_zero(6.0, 3.0), 2.0);
    }

    #[test]
    fn test_far_apart_timestamps_stay_finite() {
        let annotated = KinematicsEngine::new().annotate(&series(&[
            (-9_000_000_000_000_000, 0.0, 0.0),
            (1_573_783_500_000, 300.0, 400.0),
        ]));
        let k = annotated.samples()[1].kinematics;
        assert!(k.time_delta_s > 0.0);
        assert!(k.velocity > 0.0);
        assert_all_finite(&annotated);
    }

    #[test]
    fn test_summary() {
        let annotated = KinematicsEngine::new().annotate(&series(&[
            (0, 0.0, 0.0),
            (1000, 3.0, 4.0),
            (2000, 6.0, 8.0),
        ]));
        let summary = KinematicSummary::from_series(&annotated);

        assert_eq!(summary.sample_count, 3);
        assert!((summary.duration_secs - 2.0).abs() < 1e-12);
        assert!((summary.path_length - 10.0).abs() < 1e-12);
        assert!((summary.max_velocity - 5.0).abs() < 1e-12);
        assert!((summary.peak_acceleration - 5.0).abs() < 1e-12);
    }
}
