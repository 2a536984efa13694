//! # Tagtrack-Core
//!
//! Core types and kinematics for the tagtrack animal-tracking telemetry
//! system: tag observations, time-ordered per-tag series, the shared error
//! taxonomy, and the derived motion columns (velocity, acceleration,
//! heading) computed from consecutive position readings.

pub mod error;
pub mod kinematics;
pub mod types;

pub use error::{Error, Result};
pub use kinematics::*;
pub use types::*;
