//! Vibration Engine - the entry point used by the CLI and embedding code
//!
//! Owns the measurement store together with the fitter and predictor, and
//! keeps models current with a full recompute after every ingestion:
//!
//! ```text
//! record_measurement -> append -> refit(lithology)
//! import_file        -> append xN -> refit_all()
//! predict            -> latest_model(lithology) -> K / SD^alpha
//! ```
//!
//! Every entry point taking a lithology strips surrounding whitespace from
//! it first, so `" granite "` and `"granite"` name the same data set.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::SiteConfig;
use crate::error::{Result, VibrationError};
use crate::fitting::{AttenuationFitter, FitReport, RefitSummary};
use crate::import::{self, ImportError, ImportReport};
use crate::prediction::{Prediction, Predictor};
use crate::storage::{MeasurementStore, MemoryStore, SledStore};
use crate::types::{AttenuationModel, Measurement, NewMeasurement};

/// Import report plus the refit that followed it.
///
/// `refit` is None when no row was imported, since models are left alone.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub report: ImportReport,
    pub refit: Option<RefitSummary>,
}

impl ImportOutcome {
    /// Lithologies the post-import refit could not fit, with the reason.
    pub fn skipped_lithologies(&self) -> Vec<(&str, &VibrationError)> {
        self.refit
            .iter()
            .flat_map(|summary| summary.skipped.iter())
            .map(|(lithology, err)| (lithology.as_str(), err))
            .collect()
    }
}

fn normalize_lithology(lithology: &str) -> &str {
    lithology.trim()
}

pub struct VibrationEngine {
    /// Trait-based, swappable backend
    store: Arc<dyn MeasurementStore>,
    fitter: AttenuationFitter,
    predictor: Predictor,
}

impl VibrationEngine {
    /// Open the sled database named in `config` and apply its fitting and
    /// prediction settings.
    pub fn open(config: &SiteConfig) -> Result<Self> {
        let store = SledStore::open_with(&config.storage.path, config.storage.flush_on_write)?;
        info!(
            path = %config.storage.path.display(),
            site = %config.site.name,
            records = store.count()?,
            size_bytes = store.size_bytes(),
            "Measurement database opened"
        );
        Ok(Self::with_components(
            Arc::new(store),
            AttenuationFitter::from_config(&config.fitting),
            Predictor::from_config(&config.prediction),
        ))
    }

    /// Engine over any backend, with fitter and predictor from the global
    /// config (or built-in defaults).
    pub fn with_store(store: Arc<dyn MeasurementStore>) -> Self {
        Self::with_components(store, AttenuationFitter::default(), Predictor::default())
    }

    pub fn with_components(
        store: Arc<dyn MeasurementStore>,
        fitter: AttenuationFitter,
        predictor: Predictor,
    ) -> Self {
        debug!(backend = store.backend_name(), "Vibration engine ready");
        Self {
            store,
            fitter,
            predictor,
        }
    }

    /// Non-durable engine for tests and scratch sessions.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<dyn MeasurementStore> {
        Arc::clone(&self.store)
    }

    /// Validate and persist one measurement without refitting.
    ///
    /// Surrounding whitespace is stripped from the lithology label; matching
    /// is otherwise exact and case-sensitive.
    pub fn append_measurement(
        &self,
        distance: f64,
        charge: f64,
        vibration: f64,
        lithology: &str,
    ) -> Result<u64> {
        self.store.append(&NewMeasurement::new(
            distance,
            charge,
            vibration,
            normalize_lithology(lithology),
        ))
    }

    /// Append, then refit the measurement's lithology over all its rows.
    ///
    /// Returns the new id and the fit, or None when the lithology does not
    /// have enough usable data yet. The row stays stored either way.
    pub fn record_measurement(
        &self,
        distance: f64,
        charge: f64,
        vibration: f64,
        lithology: &str,
    ) -> Result<(u64, Option<FitReport>)> {
        let lithology = normalize_lithology(lithology);
        let id = self.append_measurement(distance, charge, vibration, lithology)?;

        match self.fitter.refit(self.store.as_ref(), lithology) {
            Ok(report) => Ok((id, Some(report))),
            Err(VibrationError::InsufficientData { usable, .. }) => {
                info!(id, lithology, usable, "Measurement stored, not enough data to fit yet");
                Ok((id, None))
            }
            Err(e) => Err(e),
        }
    }

    pub fn refit(&self, lithology: &str) -> Result<FitReport> {
        self.fitter
            .refit(self.store.as_ref(), normalize_lithology(lithology))
    }

    pub fn refit_all(&self) -> Result<RefitSummary> {
        self.fitter.refit_all(self.store.as_ref())
    }

    pub fn predict(&self, distance: f64, charge: f64, lithology: &str) -> Result<Prediction> {
        self.predictor.predict(
            self.store.as_ref(),
            distance,
            charge,
            normalize_lithology(lithology),
        )
    }

    /// Prediction rendered as text, e.g. `"0.32 mm/s"`.
    pub fn predict_text(&self, distance: f64, charge: f64, lithology: &str) -> Result<String> {
        self.predictor.predict_text(
            self.store.as_ref(),
            distance,
            charge,
            normalize_lithology(lithology),
        )
    }

    /// All measurements, newest first.
    pub fn list_measurements(&self) -> Result<Vec<Measurement>> {
        self.store.list_all()
    }

    pub fn list_lithologies(&self) -> Result<Vec<String>> {
        self.store.distinct_lithologies()
    }

    /// Current model for a lithology, or None if it was never fitted.
    pub fn model_for(&self, lithology: &str) -> Result<Option<AttenuationModel>> {
        match self.store.latest_model(normalize_lithology(lithology)) {
            Ok(model) => Ok(Some(model)),
            Err(VibrationError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Rows of one lithology.
    pub fn measurements_for(&self, lithology: &str) -> Result<Vec<Measurement>> {
        self.store.measurements_for(normalize_lithology(lithology))
    }

    /// Bulk-import a CSV or workbook file, then refit every lithology if
    /// anything landed.
    pub fn import_file(
        &self,
        path: impl AsRef<Path>,
    ) -> std::result::Result<ImportOutcome, ImportError> {
        let report = import::import_file(self.store.as_ref(), path)?;
        if report.imported() == 0 {
            return Ok(ImportOutcome { report, refit: None });
        }

        let refit = self.refit_all()?;
        for (lithology, err) in &refit.skipped {
            warn!(lithology = %lithology, error = %err, "Lithology not fitted after import");
        }
        Ok(ImportOutcome {
            report,
            refit: Some(refit),
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_reports_no_model_until_fit() {
        let engine = VibrationEngine::in_memory();
        let id = engine.append_measurement(100.0, 25.0, 4.2, "granite").unwrap();

        let rows = engine.list_measurements().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert!(rows[0].k.is_none());
        assert!(rows[0].alpha.is_none());
    }

    #[test]
    fn test_record_measurement_fits_once_enough_data() {
        let engine = VibrationEngine::in_memory();

        let (_, first) = engine.record_measurement(20.0, 4.0, 3.0, "granite").unwrap();
        assert!(first.is_none());

        let (_, second) = engine.record_measurement(80.0, 4.0, 0.5, "granite").unwrap();
        let report = second.unwrap();
        assert_eq!(report.points_used, 2);
        assert_eq!(report.rows_updated, 2);

        for row in engine.list_measurements().unwrap() {
            assert_eq!(row.coefficients(), Some((report.k, report.alpha)));
        }
    }

    #[test]
    fn test_record_measurement_uses_trimmed_lithology() {
        let engine = VibrationEngine::in_memory();
        engine.record_measurement(20.0, 4.0, 3.0, " granite ").unwrap();
        let (_, report) = engine.record_measurement(80.0, 4.0, 0.5, "granite").unwrap();
        assert_eq!(report.unwrap().points_used, 2);
        assert_eq!(engine.list_lithologies().unwrap(), vec!["granite"]);
    }

    #[test]
    fn test_invalid_measurement_not_stored() {
        let engine = VibrationEngine::in_memory();
        let err = engine.record_measurement(-1.0, 4.0, 3.0, "granite").unwrap_err();
        assert!(matches!(err, VibrationError::Validation(_)));
        assert!(engine.list_measurements().unwrap().is_empty());
    }

    #[test]
    fn test_predict_text_after_fit() {
        let engine = VibrationEngine::in_memory();
        engine.append_measurement(100.0, 25.0, 3.0, "granite").unwrap();
        engine.store().update_model("granite", 10.0, 1.5).unwrap();

        assert_eq!(engine.predict_text(20.0, 4.0, "granite").unwrap(), "0.32 mm/s");
        assert!(engine.model_for("granite").unwrap().is_some());
        assert!(engine.model_for("basalt").unwrap().is_none());
    }

    #[test]
    fn test_import_refits_all() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.csv");
        std::fs::write(
            &path,
            "distancia,carga_espera,vibracao,litologia\n\
             20,4,3.0,granite\n\
             80,4,0.5,granite\n\
             100,25,4.0,basalt\n",
        )
        .unwrap();

        let engine = VibrationEngine::in_memory();
        let outcome = engine.import_file(&path).unwrap();

        assert_eq!(outcome.report.imported(), 3);
        assert!(engine.model_for("granite").unwrap().is_some());
        assert!(engine.model_for("basalt").unwrap().is_none());

        let refit = outcome.refit.as_ref().unwrap();
        assert!(refit.fitted.contains_key("granite"));
        let skipped = outcome.skipped_lithologies();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].0, "basalt");
        assert!(matches!(skipped[0].1, VibrationError::InsufficientData { usable: 1, .. }));
    }

    #[test]
    fn test_import_without_rows_skips_refit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "distancia,carga_espera,vibracao,litologia\n-1,4,3,granite\n").unwrap();

        let outcome = VibrationEngine::in_memory().import_file(&path).unwrap();
        assert_eq!(outcome.report.imported(), 0);
        assert!(outcome.refit.is_none());
        assert!(outcome.skipped_lithologies().is_empty());
    }

    #[test]
    fn test_padded_lithology_accepted_everywhere() {
        let engine = VibrationEngine::in_memory();
        engine.record_measurement(20.0, 4.0, 3.0, " granite ").unwrap();
        engine.record_measurement(80.0, 4.0, 0.5, " granite ").unwrap();

        let padded = engine.refit(" granite ").unwrap();
        let plain = engine.refit("granite").unwrap();
        assert_eq!((padded.k, padded.alpha), (plain.k, plain.alpha));

        assert_eq!(
            engine.predict_text(40.0, 4.0, "\tgranite ").unwrap(),
            engine.predict_text(40.0, 4.0, "granite").unwrap()
        );
        assert_eq!(
            engine.predict(40.0, 4.0, " granite").unwrap().vibration,
            engine.predict(40.0, 4.0, "granite").unwrap().vibration
        );
        assert!(engine.model_for(" granite ").unwrap().is_some());
        assert_eq!(engine.measurements_for("granite ").unwrap().len(), 2);
    }
}
