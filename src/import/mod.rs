//! Bulk Measurement Import
//!
//! Reads a measurement spreadsheet (CSV, or an Excel/ODS workbook), maps its
//! columns onto (distance, charge, vibration, lithology) and appends every
//! valid row through the store. Invalid rows are collected with their line
//! or sheet row number instead of aborting the import.
//!
//! # Usage
//!
//! ```ignore
//! use blast_ppv::import;
//!
//! let report = import::import_file(&store, "survey_2024.xlsx")?;
//! println!("{}", report.summary(10));
//! ```

mod columns;
mod sheet;

pub use columns::{ColumnMapping, Field};
pub use sheet::read_sheet_file;

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::VibrationError;
use crate::storage::MeasurementStore;
use crate::types::NewMeasurement;

/// Lithology cells treated as empty (spreadsheet placeholders).
const NULL_LITHOLOGY_TOKENS: [&str; 3] = ["", "nan", "null"];

/// UTF-8 byte order mark written by spreadsheet exports.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read workbook {}: {message}", .path.display())]
    Workbook { path: PathBuf, message: String },

    #[error("unsupported file format '{0}', expected .csv, .xlsx, .xls or .ods")]
    UnsupportedFormat(String),

    #[error("file is empty")]
    Empty,

    #[error(
        "required columns not found: {}. Available columns: {}",
        .missing.join(", "),
        .available.join(", ")
    )]
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error(transparent)]
    Core(#[from] VibrationError),
}

/// A data row that could not be imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based line number (CSV) or row number (workbook)
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// File content parsed into candidate measurements.
#[derive(Debug, Clone)]
pub struct ParsedRows {
    pub mapping: ColumnMapping,
    /// Valid rows with their line numbers
    pub rows: Vec<(usize, NewMeasurement)>,
    pub errors: Vec<RowError>,
}

/// Outcome of importing one file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub source: String,
    /// Ids assigned to imported rows, in file order
    pub imported_ids: Vec<u64>,
    pub errors: Vec<RowError>,
}

impl ImportReport {
    pub fn imported(&self) -> usize {
        self.imported_ids.len()
    }

    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    /// Human-readable summary listing at most `max_errors` row errors.
    pub fn summary(&self, max_errors: usize) -> String {
        let mut out = format!(
            "Imported {} record(s) from {}, {} failed",
            self.imported(),
            self.source,
            self.failed()
        );
        for err in self.errors.iter().take(max_errors) {
            out.push_str("\n  ");
            out.push_str(&err.to_string());
        }
        if self.errors.len() > max_errors {
            out.push_str(&format!("\n  ... and {} more", self.errors.len() - max_errors));
        }
        out
    }
}

// ============================================================================
// CSV Quote-Aware Parsing
// ============================================================================

/// Split a CSV line respecting quoted fields (handles commas inside quotes).
fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    // Check for escaped quote ("")
                    if chars.peek() == Some(&'"') {
                        current.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// Decode file bytes as UTF-8, falling back to Latin-1.
fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            warn!("File is not valid UTF-8, decoding as Latin-1");
            bytes.iter().map(|&b| char::from(b)).collect()
        }
    }
}

fn parse_number(fields: &[String], idx: usize, field: Field) -> Result<f64, String> {
    let raw = fields.get(idx).map_or("", |s| s.trim());
    if raw.is_empty() {
        return Err(format!("missing {field}"));
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("{field} '{raw}' is not a number")),
    }
}

fn parse_row(fields: &[String], mapping: &ColumnMapping) -> Result<NewMeasurement, String> {
    let distance = parse_number(fields, mapping.distance, Field::Distance)?;
    let charge = parse_number(fields, mapping.charge, Field::Charge)?;
    let vibration = parse_number(fields, mapping.vibration, Field::Vibration)?;

    if distance <= 0.0 || charge <= 0.0 || vibration < 0.0 {
        return Err(format!(
            "invalid values (distance={distance}, charge={charge}, vibration={vibration}): \
             distance and charge must be > 0, vibration >= 0"
        ));
    }

    let lithology = fields.get(mapping.lithology).map_or("", |s| s.trim());
    if NULL_LITHOLOGY_TOKENS.contains(&lithology.to_lowercase().as_str()) {
        return Err("empty lithology".to_string());
    }

    Ok(NewMeasurement::new(distance, charge, vibration, lithology))
}

fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

/// Map the first non-blank record as header, then validate every following
/// non-blank record. Records carry their 1-based line or row number.
fn parse_records<I>(records: I) -> Result<ParsedRows, ImportError>
where
    I: IntoIterator<Item = (usize, Vec<String>)>,
{
    let mut records = records.into_iter().filter(|(_, cells)| !is_blank(cells));

    let (_, header) = records.next().ok_or(ImportError::Empty)?;
    let mapping = ColumnMapping::from_header(&header)?;

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    for (line, cells) in records {
        match parse_row(&cells, &mapping) {
            Ok(row) => rows.push((line, row)),
            Err(message) => errors.push(RowError { line, message }),
        }
    }

    Ok(ParsedRows { mapping, rows, errors })
}

/// Parse CSV text: header mapping plus per-row validation.
pub fn parse_csv(text: &str) -> Result<ParsedRows, ImportError> {
    parse_records(
        text.lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, csv_split(line))),
    )
}

/// Read and parse a CSV file (UTF-8 or Latin-1).
pub fn read_csv_file(path: &Path) -> Result<ParsedRows, ImportError> {
    let bytes = std::fs::read(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_csv(&decode(&bytes))
}

/// Read and parse a measurement file, choosing the reader by extension.
pub fn read_measurement_file(path: &Path) -> Result<ParsedRows, ImportError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => read_csv_file(path),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_sheet_file(path),
        _ => Err(ImportError::UnsupportedFormat(extension)),
    }
}

/// Append every valid row of `path` to `store`.
///
/// Rows the store rejects are reported like parse failures. A storage
/// failure stops the import; rows appended before it stay committed.
pub fn import_file(
    store: &dyn MeasurementStore,
    path: impl AsRef<Path>,
) -> Result<ImportReport, ImportError> {
    let path = path.as_ref();
    let parsed = read_measurement_file(path)?;

    info!(file = %path.display(), columns = %parsed.mapping.summary(), "Importing measurements");

    let mut report = ImportReport {
        source: path.display().to_string(),
        imported_ids: Vec::with_capacity(parsed.rows.len()),
        errors: parsed.errors,
    };

    for (line, row) in &parsed.rows {
        match store.append(row) {
            Ok(id) => report.imported_ids.push(id),
            Err(VibrationError::Validation(message)) => report.errors.push(RowError {
                line: *line,
                message,
            }),
            Err(e) => return Err(e.into()),
        }
    }
    report.errors.sort_by_key(|e| e.line);

    info!(
        file = %report.source,
        imported = report.imported(),
        failed = report.failed(),
        "Import finished"
    );

    Ok(report)
}
