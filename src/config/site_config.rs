//! Site Configuration - operator-tunable TOML values
//!
//! Each struct implements `Default` with the values in `defaults.rs`, so a
//! missing config file behaves exactly like the built-in constants.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a blasting site.
///
/// Load with `SiteConfig::load()` which searches:
/// 1. `$BLAST_PPV_CONFIG` env var
/// 2. `./blast_ppv.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site identification
    #[serde(default)]
    pub site: SiteInfo,

    /// Measurement database
    #[serde(default)]
    pub storage: StorageConfig,

    /// Attenuation model fitting
    #[serde(default)]
    pub fitting: FittingConfig,

    /// Prediction output formatting
    #[serde(default)]
    pub prediction: PredictionConfig,

    /// Bulk CSV import
    #[serde(default)]
    pub import: ImportConfig,
}

impl SiteConfig {
    /// Load configuration using the standard search order:
    /// 1. `$BLAST_PPV_CONFIG` environment variable
    /// 2. `./blast_ppv.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), site = %config.site.name, "Loaded site config from BLAST_PPV_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from BLAST_PPV_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "BLAST_PPV_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./blast_ppv.toml
        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(site = %config.site.name, "Loaded site config from ./blast_ppv.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./blast_ppv.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No blast_ppv.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are logged as warnings and never fail the load.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Site config saved");
        Ok(())
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - At least 2 usable points per fit
    /// - Significance threshold strictly between 0 and 1
    /// - Unit suffix non-empty, decimals at most 6
    /// - Storage path non-empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = super::validation::validate_ranges(self);

        if self.storage.path.as_os_str().is_empty() {
            errors.push("storage.path must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Site Info
// ============================================================================

/// Identification metadata, not used for logic, but appears in logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteInfo {
    #[serde(default = "default_site_name")]
    pub name: String,
    #[serde(default)]
    pub operator: String,
}

fn default_site_name() -> String {
    "Unnamed Site".to_string()
}

impl Default for SiteInfo {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            operator: String::new(),
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled database directory
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Flush to disk after every write
    #[serde(default = "default_true")]
    pub flush_on_write: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(defaults::DB_PATH)
}

const fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            flush_on_write: true,
        }
    }
}

// ============================================================================
// Fitting
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittingConfig {
    /// Minimum positive-vibration measurements before a lithology is fitted
    #[serde(default = "default_min_usable_points")]
    pub min_usable_points: usize,

    /// Slope p-value above which a fit is flagged as not significant
    #[serde(default = "default_significance_threshold")]
    pub significance_threshold: f64,
}

const fn default_min_usable_points() -> usize {
    defaults::MIN_USABLE_POINTS
}

const fn default_significance_threshold() -> f64 {
    defaults::SIGNIFICANCE_THRESHOLD
}

impl Default for FittingConfig {
    fn default() -> Self {
        Self {
            min_usable_points: defaults::MIN_USABLE_POINTS,
            significance_threshold: defaults::SIGNIFICANCE_THRESHOLD,
        }
    }
}

// ============================================================================
// Prediction
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Decimal places in text output
    #[serde(default = "default_decimals")]
    pub decimals: usize,

    /// Unit suffix in text output
    #[serde(default = "default_unit_suffix")]
    pub unit_suffix: String,
}

const fn default_decimals() -> usize {
    defaults::PREDICTION_DECIMALS
}

fn default_unit_suffix() -> String {
    defaults::VIBRATION_UNIT.to_string()
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            decimals: defaults::PREDICTION_DECIMALS,
            unit_suffix: default_unit_suffix(),
        }
    }
}

// ============================================================================
// Import
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Row errors listed in the import summary
    #[serde(default = "default_max_reported_errors")]
    pub max_reported_errors: usize,
}

const fn default_max_reported_errors() -> usize {
    defaults::MAX_REPORTED_IMPORT_ERRORS
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_reported_errors: defaults::MAX_REPORTED_IMPORT_ERRORS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SiteConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fitting.min_usable_points, 2);
        assert_eq!(config.prediction.unit_suffix, "mm/s");
        assert_eq!(config.prediction.decimals, 2);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = SiteConfig::from_toml_str(
            r#"
[site]
name = "Pedreira Norte"

[fitting]
min_usable_points = 5
"#,
        )
        .unwrap();
        assert_eq!(config.site.name, "Pedreira Norte");
        assert_eq!(config.fitting.min_usable_points, 5);
        assert_eq!(config.fitting.significance_threshold, 0.05);
        assert_eq!(config.storage.path, PathBuf::from(defaults::DB_PATH));
        assert!(config.storage.flush_on_write);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SiteConfig::from_toml_str(
            r#"
[fitting]
min_usable_points = 1
significance_threshold = 1.5
"#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blast_ppv.toml");

        let mut config = SiteConfig::default();
        config.site.name = "Quarry 7".to_string();
        config.prediction.decimals = 3;
        config.save_to_file(&path).unwrap();

        let loaded = SiteConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.site.name, "Quarry 7");
        assert_eq!(loaded.prediction.decimals, 3);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SiteConfig::load_from_file(Path::new("/nonexistent/blast_ppv.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
    }
}
