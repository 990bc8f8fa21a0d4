//! Workbook reader for .xlsx, .xls and .ods surveys.
//!
//! Only the first worksheet is read. Row numbers in errors are the sheet's
//! own 1-based row numbers, matching what the user sees in the spreadsheet.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::debug;

use super::{parse_records, ImportError, ParsedRows};

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Read the first worksheet of a workbook and parse it like a CSV export.
pub fn read_sheet_file(path: &Path) -> Result<ParsedRows, ImportError> {
    std::fs::metadata(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let workbook_error = |message: String| ImportError::Workbook {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| workbook_error(e.to_string()))?;
    let sheet_name = workbook.sheet_names().first().cloned().unwrap_or_default();
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::Empty)?
        .map_err(|e| workbook_error(e.to_string()))?;

    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    debug!(
        file = %path.display(),
        sheet = %sheet_name,
        rows = range.height(),
        "Reading worksheet"
    );

    parse_records(
        range
            .rows()
            .enumerate()
            .map(|(idx, cells)| (first_row + idx + 1, cells.iter().map(cell_text).collect())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/survey.xlsx")
    }

    #[test]
    fn test_reads_first_sheet_with_row_numbers() {
        let parsed = read_sheet_file(&fixture()).unwrap();

        assert_eq!(parsed.rows.len(), 4);
        assert_eq!(parsed.rows[0].0, 2);
        assert_eq!(parsed.rows[0].1.distance, 20.0);
        assert_eq!(parsed.rows[3].1.lithology, "basalt");

        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].line, 5);
        assert!(parsed.errors[0].message.contains("not a number"));
    }

    #[test]
    fn test_corrupt_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"PK\x03\x04 not a zip").unwrap();

        let err = read_sheet_file(&path).unwrap_err();
        assert!(matches!(err, ImportError::Workbook { .. }));
    }

    #[test]
    fn test_missing_workbook() {
        let err = read_sheet_file(Path::new("/nonexistent/survey.xlsx")).unwrap_err();
        assert!(matches!(err, ImportError::Io { .. }));
    }
}
