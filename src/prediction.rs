//! Vibration Predictor
//!
//! Evaluates a lithology's fitted attenuation law for a planned blast.

use serde::Serialize;
use tracing::debug;

use crate::attenuation::{peak_particle_velocity, scaled_distance};
use crate::config::{self, defaults, PredictionConfig};
use crate::error::{Result, VibrationError};
use crate::storage::MeasurementStore;
use crate::types::AttenuationModel;

/// Predicted peak particle velocity for one (distance, charge, lithology).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub distance: f64,
    pub charge: f64,
    pub scaled_distance: f64,
    /// Predicted PPV (mm/s)
    pub vibration: f64,
    pub k: f64,
    pub alpha: f64,
}

impl Prediction {
    /// Render as e.g. `"0.32 mm/s"`.
    pub fn format_with(&self, decimals: usize, unit: &str) -> String {
        format!("{:.*} {}", decimals, self.vibration, unit)
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.format_with(defaults::PREDICTION_DECIMALS, defaults::VIBRATION_UNIT)
        )
    }
}

/// Looks up models and evaluates `K / SD^alpha`.
#[derive(Debug, Clone)]
pub struct Predictor {
    decimals: usize,
    unit_suffix: String,
}

impl Default for Predictor {
    fn default() -> Self {
        if config::is_initialized() {
            Self::from_config(&config::get().prediction)
        } else {
            Self::from_config(&PredictionConfig::default())
        }
    }
}

impl Predictor {
    pub fn from_config(config: &PredictionConfig) -> Self {
        Self {
            decimals: config.decimals,
            unit_suffix: config.unit_suffix.clone(),
        }
    }

    /// Predict vibration from the lithology's current model in `store`.
    pub fn predict(
        &self,
        store: &dyn MeasurementStore,
        distance: f64,
        charge: f64,
        lithology: &str,
    ) -> Result<Prediction> {
        validate_inputs(distance, charge)?;

        let model = match store.latest_model(lithology) {
            Ok(model) => model,
            Err(VibrationError::NotFound(_)) => {
                return Err(VibrationError::ModelUnavailable(lithology.to_string()))
            }
            Err(e) => return Err(e),
        };

        let prediction = evaluate(&model, distance, charge)?;
        debug!(
            lithology,
            distance,
            charge,
            scaled_distance = prediction.scaled_distance,
            vibration = prediction.vibration,
            "Predicted vibration"
        );
        Ok(prediction)
    }

    /// Predict and render with the configured decimals and unit.
    pub fn predict_text(
        &self,
        store: &dyn MeasurementStore,
        distance: f64,
        charge: f64,
        lithology: &str,
    ) -> Result<String> {
        let prediction = self.predict(store, distance, charge, lithology)?;
        Ok(self.format(&prediction))
    }

    pub fn format(&self, prediction: &Prediction) -> String {
        prediction.format_with(self.decimals, &self.unit_suffix)
    }
}

fn validate_inputs(distance: f64, charge: f64) -> Result<()> {
    if !distance.is_finite() || distance <= 0.0 {
        return Err(VibrationError::Validation(format!(
            "distance must be a positive number of meters (got {distance})"
        )));
    }
    if !charge.is_finite() || charge <= 0.0 {
        return Err(VibrationError::Validation(format!(
            "charge must be a positive number of kilograms (got {charge})"
        )));
    }
    Ok(())
}

/// Evaluate a model at one blast geometry.
pub fn evaluate(model: &AttenuationModel, distance: f64, charge: f64) -> Result<Prediction> {
    validate_inputs(distance, charge)?;

    let sd = scaled_distance(distance, charge);
    if !sd.is_finite() || sd <= 0.0 {
        return Err(VibrationError::Prediction(format!(
            "scaled distance is not a positive finite number ({sd})"
        )));
    }
    if !model.k.is_finite() || !model.alpha.is_finite() {
        return Err(VibrationError::Prediction(format!(
            "model coefficients are not finite (K={}, alpha={})",
            model.k, model.alpha
        )));
    }

    let vibration = peak_particle_velocity(model.k, model.alpha, sd);
    if !vibration.is_finite() || vibration < 0.0 {
        return Err(VibrationError::Prediction(format!(
            "attenuation law gave {vibration} at scaled distance {sd:.3} (K={}, alpha={})",
            model.k, model.alpha
        )));
    }

    Ok(Prediction {
        distance,
        charge,
        scaled_distance: sd,
        vibration,
        k: model.k,
        alpha: model.alpha,
    })
}
