//! blast-ppv: Blast Vibration Prediction
//!
//! Predicts peak particle velocity (PPV) at a monitoring point from the
//! scaled-distance attenuation law `V = K * (D / sqrt(Q))^-alpha`, with
//! (K, alpha) fitted per lithology from recorded blasts.
//!
//! ## Architecture
//!
//! - **Storage**: measurements and per-lithology models on sled (or memory)
//! - **Fitting**: log-log least squares per lithology, full recompute
//! - **Prediction**: evaluate the lithology's current model
//! - **Import**: bulk CSV and workbook ingestion with forgiving header matching
//! - **Engine**: the facade the CLI drives

pub mod attenuation;
pub mod config;
pub mod engine;
pub mod error;
pub mod fitting;
pub mod import;
pub mod prediction;
pub mod storage;
pub mod types;

// Re-export site configuration
pub use config::SiteConfig;

// Re-export the core API
pub use engine::{ImportOutcome, VibrationEngine};
pub use error::{Result, VibrationError};
pub use fitting::{AttenuationFitter, FitReport, RefitSummary};
pub use import::{ImportError, ImportReport};
pub use prediction::{Prediction, Predictor};
pub use storage::{MeasurementStore, MemoryStore, SledStore};
pub use types::{AttenuationModel, Measurement, NewMeasurement};
