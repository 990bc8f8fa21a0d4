//! System-wide default constants.
//!
//! Used for built-in config values and as fallbacks when library code runs
//! without `config::init()` (tests, embedding callers).

// ============================================================================
// Storage
// ============================================================================

/// Default sled database directory.
pub const DB_PATH: &str = "./data/vibration.db";

// ============================================================================
// Fitting
// ============================================================================

/// Fewest positive-vibration points a regression can be determined from.
pub const MIN_USABLE_POINTS: usize = 2;

/// Slope p-value above which a fit is logged as not significant.
pub const SIGNIFICANCE_THRESHOLD: f64 = 0.05;

// ============================================================================
// Prediction
// ============================================================================

/// Decimal places in text predictions.
pub const PREDICTION_DECIMALS: usize = 2;

/// Unit appended to text predictions.
pub const VIBRATION_UNIT: &str = "mm/s";

// ============================================================================
// Import
// ============================================================================

/// Row errors listed in an import summary before truncating.
pub const MAX_REPORTED_IMPORT_ERRORS: usize = 10;

/// Config file searched in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "blast_ppv.toml";

/// Environment variable pointing at a config file.
pub const CONFIG_ENV_VAR: &str = "BLAST_PPV_CONFIG";
