//! Engine Integration Tests
//!
//! End-to-end checks against a real sled database in a temp directory:
//! append -> refit -> predict, model persistence across reopen, and
//! coefficient recovery from a noisy synthetic survey.

use std::sync::Arc;

use blast_ppv::config::SiteConfig;
use blast_ppv::{MeasurementStore, SledStore, VibrationEngine, VibrationError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

fn site_config(dir: &tempfile::TempDir) -> SiteConfig {
    let mut config = SiteConfig::default();
    config.storage.path = dir.path().join("vibration.db");
    config
}

/// V = 5 * (D / sqrt(Q))^-1.2
fn exact_ppv(distance: f64, charge: f64) -> f64 {
    5.0 * (distance / charge.sqrt()).powf(-1.2)
}

#[test]
fn exact_power_law_is_recovered_on_sled() {
    let dir = tempfile::tempdir().unwrap();
    let engine = VibrationEngine::open(&site_config(&dir)).unwrap();

    for (d, q) in [(15.0, 2.0), (40.0, 8.0), (90.0, 12.5), (250.0, 30.0), (600.0, 50.0)] {
        engine.append_measurement(d, q, exact_ppv(d, q), "granite").unwrap();
    }
    let report = engine.refit("granite").unwrap();

    assert!((report.k - 5.0).abs() < 1e-6, "K = {}", report.k);
    assert!((report.alpha - 1.2).abs() < 1e-6, "alpha = {}", report.alpha);
    assert_eq!(report.rows_updated, 5);
}

#[test]
fn refit_touches_only_its_lithology() {
    let dir = tempfile::tempdir().unwrap();
    let engine = VibrationEngine::open(&site_config(&dir)).unwrap();

    engine.append_measurement(20.0, 4.0, 3.0, "granite").unwrap();
    engine.append_measurement(80.0, 4.0, 0.6, "granite").unwrap();
    engine.append_measurement(30.0, 9.0, 2.5, "basalt").unwrap();
    engine.append_measurement(120.0, 9.0, 0.4, "basalt").unwrap();
    engine.append_measurement(50.0, 9.0, 1.0, "Granite").unwrap();

    let granite = engine.refit("granite").unwrap();

    for row in engine.list_measurements().unwrap() {
        if row.lithology == "granite" {
            assert_eq!(row.coefficients(), Some((granite.k, granite.alpha)));
        } else {
            // Case-sensitive labels: "Granite" is its own lithology
            assert!(row.coefficients().is_none(), "{} was touched", row.lithology);
        }
    }
}

#[test]
fn ids_strictly_increase_and_list_is_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let engine = VibrationEngine::open(&site_config(&dir)).unwrap();

    let ids: Vec<u64> = (1..=5)
        .map(|i| {
            engine
                .append_measurement(10.0 * f64::from(i), 5.0, 1.0, "schist")
                .unwrap()
        })
        .collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    let listed: Vec<u64> = engine
        .list_measurements()
        .unwrap()
        .iter()
        .map(|m| m.id)
        .collect();
    let mut expected = ids.clone();
    expected.reverse();
    assert_eq!(listed, expected);
}

#[test]
fn models_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = site_config(&dir);

    let fitted = {
        let engine = VibrationEngine::open(&config).unwrap();
        engine.record_measurement(20.0, 4.0, 3.0, "granite").unwrap();
        let (_, report) = engine.record_measurement(80.0, 4.0, 0.5, "granite").unwrap();
        engine.flush().unwrap();
        report.unwrap()
    };

    let engine = VibrationEngine::open(&config).unwrap();
    let model = engine.model_for("granite").unwrap().unwrap();
    assert_eq!((model.k, model.alpha), (fitted.k, fitted.alpha));
    assert_eq!(engine.list_measurements().unwrap().len(), 2);
}

#[test]
fn reference_prediction_text() {
    let store = Arc::new(SledStore::open_temporary().unwrap());
    let engine = VibrationEngine::with_store(store.clone());

    engine.append_measurement(100.0, 25.0, 3.0, "granite").unwrap();
    store.update_model("granite", 10.0, 1.5).unwrap();

    let prediction = engine.predict(20.0, 4.0, "granite").unwrap();
    assert!((prediction.vibration - 0.3162).abs() < 1e-4);
    assert_eq!(engine.predict_text(20.0, 4.0, "granite").unwrap(), "0.32 mm/s");
}

#[test]
fn single_point_keeps_prior_model_and_unfitted_prediction_fails() {
    let dir = tempfile::tempdir().unwrap();
    let engine = VibrationEngine::open(&site_config(&dir)).unwrap();

    engine.append_measurement(100.0, 25.0, 4.0, "basalt").unwrap();
    let err = engine.refit("basalt").unwrap_err();
    assert!(matches!(err, VibrationError::InsufficientData { usable: 1, .. }));

    let err = engine.predict(50.0, 10.0, "basalt").unwrap_err();
    assert!(matches!(err, VibrationError::ModelUnavailable(_)));
}

#[test]
fn noisy_survey_recovers_coefficients_approximately() {
    let dir = tempfile::tempdir().unwrap();
    let engine = VibrationEngine::open(&site_config(&dir)).unwrap();

    // Log-normal scatter (sigma 0.05 in log10), typical of field geophone data
    let mut rng = StdRng::seed_from_u64(42);
    let noise = Normal::new(0.0, 0.05).unwrap();
    let (k_true, alpha_true) = (800.0_f64, 1.6_f64);

    for _ in 0..200 {
        let distance = rng.gen_range(20.0..800.0);
        let charge = rng.gen_range(5.0..120.0);
        let sd: f64 = distance / f64::sqrt(charge);
        let ppv = k_true * sd.powf(-alpha_true) * 10f64.powf(noise.sample(&mut rng));
        engine.append_measurement(distance, charge, ppv, "limestone").unwrap();
    }

    let report = engine.refit("limestone").unwrap();
    assert!((report.alpha - alpha_true).abs() < 0.05, "alpha = {}", report.alpha);
    assert!((report.k / k_true - 1.0).abs() < 0.15, "K = {}", report.k);
    assert!(report.r_squared > 0.9);
    assert!(report.is_significant(0.05).unwrap());
}
