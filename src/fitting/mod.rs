//! Attenuation Model Fitter
//!
//! Recomputes each lithology's (K, alpha) from its complete measurement set:
//!
//! 1. Keep rows with strictly positive vibration (log10 needs V > 0)
//! 2. Map each row to `X = log10(D / sqrt(Q))`, `Y = log10(V)`
//! 3. Least-squares line `Y = m X + b`
//! 4. `alpha = -m`, `K = 10^b`
//! 5. Overwrite the lithology's model in the store
//!
//! A lithology that cannot be fitted keeps its previous model untouched.

pub mod regression;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::attenuation::{coefficients_from_line, log_coordinates};
use crate::config::{self, defaults, FittingConfig};
use crate::error::{Result, VibrationError};
use crate::storage::MeasurementStore;
use crate::types::Measurement;
use regression::least_squares;

fn cfg_min_usable_points() -> usize {
    if config::is_initialized() {
        config::get().fitting.min_usable_points
    } else {
        defaults::MIN_USABLE_POINTS
    }
}

fn cfg_significance_threshold() -> f64 {
    if config::is_initialized() {
        config::get().fitting.significance_threshold
    } else {
        defaults::SIGNIFICANCE_THRESHOLD
    }
}

/// Outcome of one successful lithology fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitReport {
    pub lithology: String,
    pub k: f64,
    pub alpha: f64,
    /// Rows with V > 0 that entered the regression
    pub points_used: usize,
    /// Rows with V <= 0 left out of the regression
    pub points_excluded: usize,
    /// Rows now reporting the new model (0 until written to a store)
    pub rows_updated: usize,
    pub r_squared: f64,
    /// Slope p-value; None with fewer than 3 points
    pub p_value: Option<f64>,
}

impl FitReport {
    /// Whether the slope is significant at `threshold`; None without a p-value.
    pub fn is_significant(&self, threshold: f64) -> Option<bool> {
        self.p_value.map(|p| p <= threshold)
    }
}

/// Result of refitting every lithology in the store.
#[derive(Debug, Default)]
pub struct RefitSummary {
    pub fitted: BTreeMap<String, FitReport>,
    /// Lithologies left unchanged, with the reason
    pub skipped: BTreeMap<String, VibrationError>,
}

impl RefitSummary {
    /// lithology -> (K, alpha) for every lithology fitted in this pass.
    pub fn models(&self) -> BTreeMap<&str, (f64, f64)> {
        self.fitted
            .iter()
            .map(|(lith, report)| (lith.as_str(), (report.k, report.alpha)))
            .collect()
    }
}

/// Per-lithology log-linear regression of the scaled-distance law.
#[derive(Debug, Clone)]
pub struct AttenuationFitter {
    min_usable_points: usize,
    significance_threshold: f64,
}

impl Default for AttenuationFitter {
    fn default() -> Self {
        Self::new(cfg_min_usable_points(), cfg_significance_threshold())
    }
}

impl AttenuationFitter {
    /// `min_usable_points` is raised to 2 if lower; a line needs two points.
    pub fn new(min_usable_points: usize, significance_threshold: f64) -> Self {
        Self {
            min_usable_points: min_usable_points.max(defaults::MIN_USABLE_POINTS),
            significance_threshold,
        }
    }

    pub fn from_config(config: &FittingConfig) -> Self {
        Self::new(config.min_usable_points, config.significance_threshold)
    }

    /// Fit coefficients from a lithology's measurements without touching a store.
    pub fn fit(&self, lithology: &str, measurements: &[Measurement]) -> Result<FitReport> {
        let (xs, ys): (Vec<f64>, Vec<f64>) = measurements
            .iter()
            .filter_map(|m| log_coordinates(m.distance, m.charge, m.vibration))
            .unzip();

        let usable = xs.len();
        let excluded = measurements.len() - usable;

        if usable < self.min_usable_points {
            return Err(VibrationError::InsufficientData {
                lithology: lithology.to_string(),
                usable,
                reason: format!(
                    "at least {} measurements with vibration > 0 are required",
                    self.min_usable_points
                ),
            });
        }

        let line = least_squares(&xs, &ys).ok_or_else(|| VibrationError::InsufficientData {
            lithology: lithology.to_string(),
            usable,
            reason: "all measurements share the same scaled distance".to_string(),
        })?;

        let (k, alpha) = coefficients_from_line(line.slope, line.intercept);
        if !k.is_finite() || !alpha.is_finite() || k <= 0.0 {
            return Err(VibrationError::InsufficientData {
                lithology: lithology.to_string(),
                usable,
                reason: format!("regression produced unusable coefficients (K={k}, alpha={alpha})"),
            });
        }

        Ok(FitReport {
            lithology: lithology.to_string(),
            k,
            alpha,
            points_used: usable,
            points_excluded: excluded,
            rows_updated: 0,
            r_squared: line.r_squared,
            p_value: line.p_value,
        })
    }

    /// Recompute one lithology from its full current data set and store the model.
    pub fn refit(&self, store: &dyn MeasurementStore, lithology: &str) -> Result<FitReport> {
        let measurements = store.measurements_for(lithology)?;
        let mut report = match self.fit(lithology, &measurements) {
            Ok(report) => report,
            Err(e) => {
                debug!(lithology, error = %e, "Fit skipped, previous model kept");
                return Err(e);
            }
        };

        report.rows_updated = store.update_model(lithology, report.k, report.alpha)?;

        info!(
            lithology,
            k = report.k,
            alpha = report.alpha,
            points = report.points_used,
            excluded = report.points_excluded,
            r_squared = report.r_squared,
            "Attenuation model updated"
        );

        if report.is_significant(self.significance_threshold) == Some(false) {
            warn!(
                lithology,
                p_value = report.p_value,
                threshold = self.significance_threshold,
                "Attenuation fit is not statistically significant"
            );
        }

        Ok(report)
    }

    /// Refit every lithology in the store.
    ///
    /// Lithologies with too little data are reported as skipped; a storage
    /// failure aborts the pass.
    pub fn refit_all(&self, store: &dyn MeasurementStore) -> Result<RefitSummary> {
        let mut summary = RefitSummary::default();

        for lithology in store.distinct_lithologies()? {
            match self.refit(store, &lithology) {
                Ok(report) => {
                    summary.fitted.insert(lithology, report);
                }
                Err(e @ VibrationError::InsufficientData { .. }) => {
                    summary.skipped.insert(lithology, e);
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            fitted = summary.fitted.len(),
            skipped = summary.skipped.len(),
            "Refit pass complete"
        );

        Ok(summary)
    }
}
