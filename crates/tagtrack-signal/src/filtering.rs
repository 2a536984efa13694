//! Median filtering and spike correction for a single position channel.
//!
//! A spike is a sample whose absolute deviation from the sliding-window
//! median exceeds a fixed threshold. Spikes are replaced with the median at
//! the same position; every other sample passes through unchanged.

use std::cmp::Ordering;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use tagtrack_core::{Error, Result};

/// Default median window width (samples)
pub const DEFAULT_KERNEL_WIDTH: usize = 41;

/// Default absolute deviation above which a sample is a spike
pub const DEFAULT_SPIKE_THRESHOLD: f64 = 200.0;

/// How the median window behaves near the ends of the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolicy {
    /// Clip the window to the signal. A clipped window of even length uses
    /// the mean of its two middle values.
    #[default]
    Truncate,
    /// Shrink the window symmetrically so it stays centred and odd: sample
    /// `i` uses half-width `min(half, i, n - 1 - i)`. Endpoint samples are
    /// their own reference and can never be flagged.
    Shrink,
    /// Positions outside the signal count as 0.0 and the window always spans
    /// the full kernel width (scipy `medfilt` behaviour)
    ZeroPad,
}

/// Sliding-window median filter with a fixed odd width
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MedianFilter {
    kernel_width: usize,
    edge_policy: EdgePolicy,
}

impl MedianFilter {
    /// Create a filter. Even or zero widths are rejected.
    pub fn new(kernel_width: usize) -> Result<Self> {
        if kernel_width == 0 || kernel_width % 2 == 0 {
            return Err(Error::InvalidKernelWidth {
                width: kernel_width,
            });
        }
        Ok(Self {
            kernel_width,
            edge_policy: EdgePolicy::default(),
        })
    }

    pub fn with_edge_policy(mut self, edge_policy: EdgePolicy) -> Self {
        self.edge_policy = edge_policy;
        self
    }

    pub fn kernel_width(&self) -> usize {
        self.kernel_width
    }

    pub fn edge_policy(&self) -> EdgePolicy {
        self.edge_policy
    }

    /// Median-filter a signal. Output has the same length as the input.
    ///
    /// The window bounds never move backwards, so the sorted window is
    /// updated incrementally: values entering or leaving are placed by
    /// binary search.
    pub fn apply(&self, signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        let mut window: Vec<f64> = Vec::with_capacity(self.kernel_width);
        let mut output = Vec::with_capacity(n);
        let (mut lo, mut hi) = (0usize, 0usize);

        for i in 0..n {
            let (next_lo, next_hi) = self.bounds(i, n);
            while hi < next_hi {
                insert_sorted(&mut window, signal[hi]);
                hi += 1;
            }
            while lo < next_lo {
                remove_sorted(&mut window, signal[lo]);
                lo += 1;
            }

            let median = match self.edge_policy {
                EdgePolicy::ZeroPad => {
                    median_with_zeros(&window, self.kernel_width - window.len())
                }
                EdgePolicy::Shrink | EdgePolicy::Truncate => median_of_sorted(&window),
            };
            output.push(median);
        }

        output
    }

    /// Half-open range of signal indices inside the window of sample `i`
    fn bounds(&self, i: usize, n: usize) -> (usize, usize) {
        let half = self.kernel_width / 2;
        match self.edge_policy {
            EdgePolicy::Shrink => {
                let h = half.min(i).min(n - 1 - i);
                (i - h, i + h + 1)
            }
            EdgePolicy::Truncate | EdgePolicy::ZeroPad => {
                (i.saturating_sub(half), (i + half + 1).min(n))
            }
        }
    }
}

impl Default for MedianFilter {
    fn default() -> Self {
        Self {
            kernel_width: DEFAULT_KERNEL_WIDTH,
            edge_policy: EdgePolicy::default(),
        }
    }
}

fn insert_sorted(window: &mut Vec<f64>, value: f64) {
    let idx = window.partition_point(|probe| probe.total_cmp(&value) == Ordering::Less);
    window.insert(idx, value);
}

fn remove_sorted(window: &mut Vec<f64>, value: f64) {
    if let Ok(idx) = window.binary_search_by(|probe| probe.total_cmp(&value)) {
        window.remove(idx);
    }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Middle value of `sorted` merged with `zeros` padding zeros. The merged
/// length is the odd kernel width.
fn median_with_zeros(sorted: &[f64], zeros: usize) -> f64 {
    let k = (sorted.len() + zeros) / 2;
    let z = sorted.partition_point(|probe| probe.total_cmp(&0.0) == Ordering::Less);
    if k < z {
        sorted[k]
    } else if k < z + zeros {
        0.0
    } else {
        sorted[k - zeros]
    }
}

/// Per-sample spike flags, aligned 1:1 with the filtered channel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpikeMask(Vec<bool>);

impl SpikeMask {
    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&spike| spike).count()
    }

    /// Positions flagged as spikes
    pub fn indices(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, &spike)| spike.then_some(i))
            .collect()
    }

    pub fn into_inner(self) -> Vec<bool> {
        self.0
    }
}

impl Deref for SpikeMask {
    type Target = [bool];

    fn deref(&self) -> &[bool] {
        &self.0
    }
}

/// The input channel with every spike replaced by its reference value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrectedSignal(Vec<f64>);

impl CorrectedSignal {
    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl Deref for CorrectedSignal {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

/// Result of running the spike detector over one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeDetection {
    /// Sliding-window median of the input
    pub reference: Vec<f64>,
    pub spikes: SpikeMask,
    pub corrected: CorrectedSignal,
}

impl SpikeDetection {
    pub fn len(&self) -> usize {
        self.reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    pub fn spike_count(&self) -> usize {
        self.spikes.count()
    }
}

/// Threshold-based spike detector over a median reference signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeDetector {
    filter: MedianFilter,
    threshold: f64,
}

impl SpikeDetector {
    pub fn new(filter: MedianFilter, threshold: f64) -> Result<Self> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(Error::Config(format!(
                "spike threshold must be finite and non-negative, got {}",
                threshold
            )));
        }
        Ok(Self { filter, threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn filter(&self) -> &MedianFilter {
        &self.filter
    }

    /// Flag and correct spikes. Pure function of the input and threshold.
    pub fn detect(&self, signal: &[f64]) -> SpikeDetection {
        let reference = self.filter.apply(signal);

        let spikes: Vec<bool> = signal
            .iter()
            .zip(&reference)
            .map(|(&value, &median)| (value - median).abs() > self.threshold)
            .collect();

        let corrected = signal
            .iter()
            .zip(&reference)
            .zip(&spikes)
            .map(|((&value, &median), &spike)| if spike { median } else { value })
            .collect();

        SpikeDetection {
            reference,
            spikes: SpikeMask(spikes),
            corrected: CorrectedSignal(corrected),
        }
    }
}

impl Default for SpikeDetector {
    fn default() -> Self {
        Self {
            filter: MedianFilter::default(),
            threshold: DEFAULT_SPIKE_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Brute-force reference: sort every window from scratch
    fn naive_median(signal: &[f64], width: usize, policy: EdgePolicy) -> Vec<f64> {
        let n = signal.len() as isize;
        (0..n)
            .map(|i| {
                let half = match policy {
                    EdgePolicy::Shrink => (width as isize / 2).min(i).min(n - 1 - i),
                    _ => width as isize / 2,
                };
                let mut window: Vec<f64> = (i - half..=i + half)
                    .filter_map(|j| {
                        if j >= 0 && j < n {
                            Some(signal[j as usize])
                        } else if policy == EdgePolicy::ZeroPad {
                            Some(0.0)
                        } else {
                            None
                        }
                    })
                    .collect();
                window.sort_by(|a, b| a.total_cmp(b));
                median_of_sorted(&window)
            })
            .collect()
    }

    fn noisy_signal(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let base = 1000.0 + 50.0 * (i as f64 * 0.1).sin();
                if i % 17 == 3 {
                    base + 900.0
                } else {
                    base + ((i * 7919) % 13) as f64
                }
            })
            .collect()
    }

    #[test]
    fn test_even_kernel_rejected() {
        assert!(matches!(
            MedianFilter::new(40),
            Err(Error::InvalidKernelWidth { width: 40 })
        ));
        assert!(MedianFilter::new(0).is_err());
        assert!(MedianFilter::new(41).is_ok());
    }

    #[test]
    fn test_sliding_window_matches_naive_median() {
        let signal = noisy_signal(300);
        for policy in [EdgePolicy::Shrink, EdgePolicy::Truncate, EdgePolicy::ZeroPad] {
            for width in [1, 3, 5, 41] {
                let filter = MedianFilter::new(width).unwrap().with_edge_policy(policy);
                assert_eq!(
                    filter.apply(&signal),
                    naive_median(&signal, width, policy),
                    "width {} policy {:?}",
                    width,
                    policy
                );
            }
        }
    }

    #[test]
    fn test_edge_policies() {
        let signal = [4.0, 8.0, 6.0];

        let zero_pad = MedianFilter::new(5)
            .unwrap()
            .with_edge_policy(EdgePolicy::ZeroPad);
        // head window is [0, 0, 4, 8, 6]
        assert_eq!(zero_pad.apply(&signal), vec![4.0, 4.0, 4.0]);

        let truncate = MedianFilter::new(5)
            .unwrap()
            .with_edge_policy(EdgePolicy::Truncate);
        assert_eq!(truncate.apply(&signal), vec![6.0, 6.0, 6.0]);

        let shrink = MedianFilter::new(5)
            .unwrap()
            .with_edge_policy(EdgePolicy::Shrink);
        assert_eq!(shrink.apply(&signal), vec![4.0, 6.0, 6.0]);

        assert_eq!(MedianFilter::default().edge_policy(), EdgePolicy::Truncate);
    }

    #[test]
    fn test_endpoint_spikes_flagged() {
        let detector = SpikeDetector::new(MedianFilter::default(), 50.0).unwrap();

        let tail = detector.detect(&[10.0, 10.0, 10.0, 10.0, 500.0]);
        assert_eq!(tail.spikes.indices(), vec![4]);
        assert_eq!(tail.corrected[4], 10.0);

        let head = detector.detect(&[500.0, 10.0, 10.0, 10.0, 10.0]);
        assert_eq!(head.spikes.indices(), vec![0]);
        assert_eq!(head.corrected[0], 10.0);
    }

    #[test]
    fn test_output_length_matches_input() {
        let detector = SpikeDetector::default();
        for n in [0, 1, 2, 40, 41, 42, 500] {
            let detection = detector.detect(&noisy_signal(n));
            assert_eq!(detection.len(), n);
            assert_eq!(detection.spikes.len(), n);
            assert_eq!(detection.corrected.len(), n);
        }
    }

    #[test]
    fn test_single_spike_corrected() {
        let detector = SpikeDetector::new(MedianFilter::default(), 50.0).unwrap();
        let detection = detector.detect(&[10.0, 10.0, 10.0, 500.0, 10.0]);

        assert_eq!(detection.spikes.indices(), vec![3]);
        assert!((detection.corrected[3] - 10.0).abs() < 1e-12);
        assert_eq!(&detection.corrected[..3], &[10.0, 10.0, 10.0]);
        assert_eq!(detection.corrected[4], 10.0);
    }

    #[test]
    fn test_corrected_signal_properties() {
        let signal = noisy_signal(400);
        let detection = SpikeDetector::default().detect(&signal);
        assert!(detection.spike_count() > 0);

        for i in 0..signal.len() {
            if detection.spikes[i] {
                assert_eq!(detection.corrected[i], detection.reference[i]);
            } else {
                assert_eq!(detection.corrected[i], signal[i]);
            }
        }
    }

    #[test]
    fn test_redetection_never_flags_more() {
        let detector = SpikeDetector::new(MedianFilter::new(11).unwrap(), 100.0).unwrap();
        let signal = noisy_signal(400);

        let first = detector.detect(&signal);
        let second = detector.detect(&first.corrected);

        assert!(second.spike_count() <= first.spike_count());
    }

    #[test]
    fn test_threshold_is_strict() {
        let detector = SpikeDetector::new(MedianFilter::new(3).unwrap(), 100.0).unwrap();
        let detection = detector.detect(&[0.0, 100.0, 0.0]);
        assert_eq!(detection.spike_count(), 0);

        let detection = detector.detect(&[0.0, 100.5, 0.0]);
        assert_eq!(detection.spikes.indices(), vec![1]);
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(SpikeDetector::new(MedianFilter::default(), -1.0).is_err());
        assert!(SpikeDetector::new(MedianFilter::default(), f64::NAN).is_err());
    }
}
