//! Error types for the tagtrack telemetry system.

use thiserror::Error;

use crate::types::TagId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Insufficient data: need {required} samples, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Median kernel width must be odd and non-zero, got {width}")]
    InvalidKernelWidth { width: usize },

    #[error("Series is not time-ordered: timestamp decreases at index {index}")]
    UnorderedSeries { index: usize },

    #[error("Observation belongs to tag {actual}, series holds tag {expected}")]
    TagMismatch { expected: TagId, actual: TagId },

    #[error("Parse error in {source_name} at line {line}: {reason}")]
    Parse {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No data available: {0}")]
    NoData(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
