//! # TagTrack Signal
//!
//! Batch processing of positional telemetry from ear-tag tracking systems.
//!
//! A tracking system records, for every tag, a timestamped planar position
//! several times per second. Raw Y traces contain isolated jumps where the
//! radio fix is lost, and some tags never move at all because they fell off
//! or were fixed to a wall. This crate turns daily exports into clean,
//! annotated per-tag tracks.
//!
//! ## Pipeline Stages
//!
//! 1. **Sources**: Load daily CSV exports, absorbing missing or malformed files
//! 2. **Partition**: Group observations by tag into time-ordered series
//! 3. **Stationary filter**: Drop tags whose Y span never exceeds the motion range
//! 4. **Kinematics**: Velocity, acceleration and heading per sample
//! 5. **Filtering**: Median reference and spike correction of the Y channel
//! 6. **Thresholds**: Percentile limits for abnormal speed and acceleration

pub mod filtering;
pub mod partition;
pub mod pipeline;
pub mod source;
pub mod stationary;
pub mod threshold;

pub use filtering::*;
pub use partition::*;
pub use pipeline::*;
pub use source::*;
pub use stationary::*;
pub use threshold::*;
