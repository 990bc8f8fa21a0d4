//! Error taxonomy for the vibration core
//!
//! Every store, fitter and predictor operation returns `VibrationError`.
//! Callers turn variants into user-facing messages; the core never prints.

use thiserror::Error;

/// Errors surfaced by the measurement store, fitter and predictor.
#[derive(Debug, Error)]
pub enum VibrationError {
    /// Out-of-range or malformed input at the store or predictor boundary.
    #[error("validation error: {0}")]
    Validation(String),

    /// Underlying persistence failure (I/O, corruption, serialization).
    #[error("storage error: {0}")]
    Storage(String),

    /// Lithology has no rows or has never been fitted.
    #[error("no fitted model for lithology '{0}'")]
    NotFound(String),

    /// Too few usable points for a determinate regression.
    #[error("insufficient data for lithology '{lithology}': {usable} usable measurement(s), {reason}")]
    InsufficientData {
        lithology: String,
        usable: usize,
        reason: String,
    },

    /// Prediction requested before any successful fit for the lithology.
    #[error("no attenuation model for lithology '{0}' yet, add more data first")]
    ModelUnavailable(String),

    /// Numeric failure while evaluating the attenuation law.
    #[error("prediction failed: {0}")]
    Prediction(String),
}

impl From<sled::Error> for VibrationError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for VibrationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("serialization: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, VibrationError>;
