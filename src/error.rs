//! Unified error handling for stayprint.
//!
//! Every stage of the pipeline is all-or-nothing: the first error aborts the
//! run and is surfaced to the caller unchanged.

use thiserror::Error;

/// Unified error type for stayprint operations.
#[derive(Debug, Error)]
pub enum StayError {
    /// A sample carries a non-finite or out-of-range coordinate
    #[error("Sample {index} has invalid coordinates: {message}")]
    InvalidCoordinates { index: usize, message: String },

    /// Timestamps within one trace went backwards
    #[error("Sample {index} goes back in time ({current} < {previous})")]
    NonMonotonicTime {
        index: usize,
        previous: i64,
        current: i64,
    },

    /// Parameter set is unusable (negative radius, zero time grid, ...)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Density clustering broke its contract
    #[error("Clustering failed: {message}")]
    Clustering { message: String },

    /// k-gap is undefined for a fingerprint without stay records
    #[error("Fingerprint '{subject_id}' has no stay records")]
    EmptyFingerprint { subject_id: String },

    /// Malformed input rows
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias for stayprint operations.
pub type Result<T> = std::result::Result<T, StayError>;

/// Extension trait for converting Option to StayError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a configuration error.
    fn ok_or_config(self, message: &str) -> Result<T>;

    /// Convert Option to Result with a clustering contract error.
    fn ok_or_clustering(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_config(self, message: &str) -> Result<T> {
        self.ok_or_else(|| StayError::Config {
            message: message.to_string(),
        })
    }

    fn ok_or_clustering(self, message: &str) -> Result<T> {
        self.ok_or_else(|| StayError::Clustering {
            message: message.to_string(),
        })
    }
}
