//! Unified error handling for the tracking core.
//!
//! Only contract violations and persistence failures are errors. A fix that
//! fails the point filter is a silent drop and never produces a value here.

use thiserror::Error;

/// Unified error type for tracking operations.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
pub enum TrackerError {
    /// Coordinates outside the valid geographic range (or not finite)
    #[error("Invalid coordinates: lat={latitude}, lng={longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    /// Fix carries an impossible accuracy, speed or timestamp
    #[error("Invalid fix: {message}")]
    InvalidFix { message: String },

    /// Malformed configuration
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// A store rejected a read or write
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// The tracking worker has exited and no longer accepts commands
    #[error("Tracking worker is not running")]
    WorkerGone,

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TrackerError {
    pub(crate) fn persistence(message: impl Into<String>) -> Self {
        TrackerError::Persistence {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        TrackerError::ConfigError {
            message: message.into(),
        }
    }

    /// True for failures that leave in-memory state intact and can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackerError::Persistence { .. })
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for TrackerError {
    fn from(err: rusqlite::Error) -> Self {
        TrackerError::Persistence {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::ConfigError {
            message: err.to_string(),
        }
    }
}

/// Result type alias for tracking operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Extension trait for converting Option to TrackerError.
pub trait OptionExt<T> {
    /// Convert Option to Result with generic internal error.
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| TrackerError::Internal {
            message: message.to_string(),
        })
    }
}
