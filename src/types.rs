//! Shared data structures for blast vibration records and models
//!
//! - `NewMeasurement`: validated input tuple for the store
//! - `MeasurementRecord`: persisted row (no coefficients)
//! - `Measurement`: row as read back, with its lithology's model joined in
//! - `AttenuationModel`: per-lithology (K, alpha)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VibrationError};

// ============================================================================
// Input
// ============================================================================

/// A measurement before it has been assigned an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeasurement {
    /// Distance from blast to geophone (m)
    pub distance: f64,
    /// Explosive charge per delay (kg)
    pub charge: f64,
    /// Observed peak particle velocity (mm/s)
    pub vibration: f64,
    /// Rock type label
    pub lithology: String,
}

impl NewMeasurement {
    pub fn new(distance: f64, charge: f64, vibration: f64, lithology: impl Into<String>) -> Self {
        Self {
            distance,
            charge,
            vibration,
            lithology: lithology.into(),
        }
    }

    /// Range checks applied by every store backend before a write.
    pub fn validate(&self) -> Result<()> {
        if !self.distance.is_finite() || self.distance <= 0.0 {
            return Err(VibrationError::Validation(format!(
                "distance must be a positive number of meters (got {})",
                self.distance
            )));
        }
        if !self.charge.is_finite() || self.charge <= 0.0 {
            return Err(VibrationError::Validation(format!(
                "charge must be a positive number of kilograms (got {})",
                self.charge
            )));
        }
        if !self.vibration.is_finite() || self.vibration < 0.0 {
            return Err(VibrationError::Validation(format!(
                "vibration must be a non-negative number of mm/s (got {})",
                self.vibration
            )));
        }
        validate_lithology(&self.lithology)
    }
}

/// Lithology labels must be non-blank and free of NUL (used as index separator).
pub fn validate_lithology(lithology: &str) -> Result<()> {
    if lithology.trim().is_empty() {
        return Err(VibrationError::Validation(
            "lithology must not be empty".to_string(),
        ));
    }
    if lithology.contains('\0') {
        return Err(VibrationError::Validation(
            "lithology must not contain NUL characters".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// Stored rows
// ============================================================================

/// Persisted measurement row. Coefficients live in the per-lithology model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub id: u64,
    pub distance: f64,
    pub charge: f64,
    pub vibration: f64,
    pub lithology: String,
    pub created_at: DateTime<Utc>,
}

impl MeasurementRecord {
    pub fn from_new(id: u64, new: &NewMeasurement) -> Self {
        Self {
            id,
            distance: new.distance,
            charge: new.charge,
            vibration: new.vibration,
            lithology: new.lithology.clone(),
            created_at: Utc::now(),
        }
    }

    /// Attach the lithology's model (if any) to produce the public view.
    pub fn with_model(self, model: Option<&AttenuationModel>) -> Measurement {
        Measurement {
            id: self.id,
            distance: self.distance,
            charge: self.charge,
            vibration: self.vibration,
            lithology: self.lithology,
            k: model.map(|m| m.k),
            alpha: model.map(|m| m.alpha),
            created_at: self.created_at,
        }
    }
}

/// One observed blast event as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: u64,
    pub distance: f64,
    pub charge: f64,
    pub vibration: f64,
    pub lithology: String,
    /// Site constant K, shared by all rows of the lithology
    pub k: Option<f64>,
    /// Decay exponent, shared by all rows of the lithology
    pub alpha: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Measurement {
    /// (k, alpha) when the lithology has been fitted.
    pub fn coefficients(&self) -> Option<(f64, f64)> {
        self.k.zip(self.alpha)
    }
}

// ============================================================================
// Model
// ============================================================================

/// Fitted attenuation law `V = K * SD^-alpha` for one lithology.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttenuationModel {
    pub k: f64,
    pub alpha: f64,
    pub fitted_at: DateTime<Utc>,
}

impl AttenuationModel {
    pub fn new(k: f64, alpha: f64) -> Self {
        Self {
            k,
            alpha,
            fitted_at: Utc::now(),
        }
    }
}
