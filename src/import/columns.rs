//! Header-to-field mapping for measurement spreadsheets
//!
//! Survey exports name their columns inconsistently ("Distância (m)",
//! "dist_m", "Charge kg", "PPV vibration", "Rock type", ...). Each required
//! field is matched by case-insensitive substring against its canonical name
//! and a short alias list; the first matching column wins.

use super::ImportError;

/// One of the four columns every import needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Distance,
    Charge,
    Vibration,
    Lithology,
}

impl Field {
    pub const ALL: [Self; 4] = [Self::Distance, Self::Charge, Self::Vibration, Self::Lithology];

    /// Canonical column name of the persisted schema.
    pub const fn canonical(self) -> &'static str {
        match self {
            Self::Distance => "distancia",
            Self::Charge => "carga_espera",
            Self::Vibration => "vibracao",
            Self::Lithology => "litologia",
        }
    }

    /// Substrings that identify the field in free-form headers.
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Distance => &["dist", "distance"],
            Self::Charge => &["carga", "charge", "peso"],
            Self::Vibration => &["vibr", "vibration"],
            Self::Lithology => &["lito", "lithology", "rock"],
        }
    }

    /// Whether a lower-cased, trimmed header names this field.
    fn matches(self, column: &str) -> bool {
        if column.is_empty() {
            return false;
        }
        let canonical = self.canonical();
        canonical.contains(column)
            || column.contains(canonical)
            || self.aliases().iter().any(|alias| column.contains(alias))
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical())
    }
}

/// Column index of each required field within a CSV header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub distance: usize,
    pub charge: usize,
    pub vibration: usize,
    pub lithology: usize,
    headers: Vec<String>,
}

impl ColumnMapping {
    /// Map header cells to fields, failing with every missing field at once.
    pub fn from_header(headers: &[String]) -> Result<Self, ImportError> {
        let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

        let find = |field: Field| normalized.iter().position(|col| field.matches(col));

        let found: Vec<(Field, Option<usize>)> = Field::ALL.iter().map(|&f| (f, find(f))).collect();
        let missing: Vec<String> = found
            .iter()
            .filter(|(_, idx)| idx.is_none())
            .map(|(field, _)| field.to_string())
            .collect();

        match found.as_slice() {
            [(_, Some(distance)), (_, Some(charge)), (_, Some(vibration)), (_, Some(lithology))] => {
                Ok(Self {
                    distance: *distance,
                    charge: *charge,
                    vibration: *vibration,
                    lithology: *lithology,
                    headers: headers.to_vec(),
                })
            }
            _ => Err(ImportError::MissingColumns {
                missing,
                available: headers.iter().map(|h| h.trim().to_string()).collect(),
            }),
        }
    }

    pub const fn index(&self, field: Field) -> usize {
        match field {
            Field::Distance => self.distance,
            Field::Charge => self.charge,
            Field::Vibration => self.vibration,
            Field::Lithology => self.lithology,
        }
    }

    /// Original header text of the column mapped to `field`.
    pub fn column_name(&self, field: Field) -> &str {
        self.headers
            .get(self.index(field))
            .map_or("", |h| h.trim())
    }

    /// One-line description for logs, e.g. `distancia <- "Distance (m)"`.
    pub fn summary(&self) -> String {
        Field::ALL
            .iter()
            .map(|&f| format!("{f} <- \"{}\"", self.column_name(f)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
