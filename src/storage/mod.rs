//! Measurement Storage
//!
//! `MeasurementStore` abstracts where blast measurements and fitted models
//! live so the fitter and predictor never touch a backend directly:
//! - `SledStore`: durable store on an embedded sled database
//! - `MemoryStore`: in-memory store for tests and throwaway sessions
//!
//! Rows hold only the observed values. Each lithology's (K, alpha) is kept
//! once and joined onto its rows when they are read, so every row of a
//! lithology always reports the same pair.

mod memory;
mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use crate::error::Result;
use crate::types::{AttenuationModel, Measurement, NewMeasurement};

/// Storage backend for measurements and per-lithology models.
///
/// Implementations must be thread-safe (Send + Sync) so one handle can be
/// shared by the engine and any caller that wants direct read access.
pub trait MeasurementStore: Send + Sync {
    /// Validate and append one measurement, returning its new id.
    ///
    /// Ids strictly increase over the lifetime of the store.
    fn append(&self, new: &NewMeasurement) -> Result<u64>;

    /// All measurements, newest (highest id) first.
    fn list_all(&self) -> Result<Vec<Measurement>>;

    /// Distinct lithology labels in lexicographic order.
    fn distinct_lithologies(&self) -> Result<Vec<String>>;

    /// Measurements whose lithology matches exactly.
    fn measurements_for(&self, lithology: &str) -> Result<Vec<Measurement>>;

    /// Replace the lithology's model; returns how many rows now report it.
    ///
    /// Unknown lithology is a no-op returning 0.
    fn update_model(&self, lithology: &str, k: f64, alpha: f64) -> Result<usize>;

    /// Current model for a lithology, or `NotFound` if never fitted.
    fn latest_model(&self, lithology: &str) -> Result<AttenuationModel>;

    /// Total number of stored measurements.
    fn count(&self) -> Result<usize>;

    /// Make pending writes durable.
    fn flush(&self) -> Result<()>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Shared coefficient checks for `update_model` implementations.
fn validate_coefficients(k: f64, alpha: f64) -> Result<()> {
    if !k.is_finite() || k <= 0.0 {
        return Err(crate::VibrationError::Validation(format!(
            "K must be a positive finite number (got {k})"
        )));
    }
    if !alpha.is_finite() {
        return Err(crate::VibrationError::Validation(format!(
            "alpha must be finite (got {alpha})"
        )));
    }
    Ok(())
}
