//! Sled-backed measurement store
//!
//! Three trees in one database:
//! - `measurements`: `{id as u64 BE}` -> JSON `MeasurementRecord`
//! - `lithology_index`: `{lithology}\0{id as u64 BE}` -> `{id as u64 BE}`
//! - `models`: `{lithology}` -> JSON `AttenuationModel`
//!
//! Big-endian ids sort numerically, so reverse iteration over
//! `measurements` yields newest-first without an extra sort.

use std::collections::{BTreeSet, HashMap};
use std::convert::Infallible;
use std::path::Path;

use sled::transaction::TransactionResult;
use sled::{Db, Transactional, Tree};
use tracing::{debug, info};

use super::{validate_coefficients, MeasurementStore};
use crate::error::{Result, VibrationError};
use crate::types::{validate_lithology, AttenuationModel, Measurement, MeasurementRecord, NewMeasurement};

const MEASUREMENTS_TREE: &str = "measurements";
const LITHOLOGY_INDEX_TREE: &str = "lithology_index";
const MODELS_TREE: &str = "models";

/// Separator between lithology and id in index keys
const INDEX_SEPARATOR: u8 = 0;

/// Persistent measurement store
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    measurements: Tree,
    lithology_index: Tree,
    models: Tree,
    flush_on_write: bool,
}

impl SledStore {
    /// Open or create the measurement database, flushing after every write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, true)
    }

    /// Open or create the measurement database.
    ///
    /// With `flush_on_write = false` sled flushes in the background; a crash
    /// may then lose the last few writes.
    pub fn open_with<P: AsRef<Path>>(path: P, flush_on_write: bool) -> Result<Self> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        let store = Self::from_db(db, flush_on_write)?;

        info!(
            path = %path_ref.display(),
            measurements = store.measurements.len(),
            models = store.models.len(),
            "Measurement store opened"
        );

        Ok(store)
    }

    /// Open a database that is deleted when dropped.
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, false)
    }

    fn from_db(db: Db, flush_on_write: bool) -> Result<Self> {
        Ok(Self {
            measurements: db.open_tree(MEASUREMENTS_TREE)?,
            lithology_index: db.open_tree(LITHOLOGY_INDEX_TREE)?,
            models: db.open_tree(MODELS_TREE)?,
            db,
            flush_on_write,
        })
    }

    /// Size of the database on disk in bytes
    pub fn size_bytes(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }

    fn index_prefix(lithology: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(lithology.len() + 1);
        prefix.extend_from_slice(lithology.as_bytes());
        prefix.push(INDEX_SEPARATOR);
        prefix
    }

    fn index_key(lithology: &str, id: u64) -> Vec<u8> {
        let mut key = Self::index_prefix(lithology);
        key.extend_from_slice(&id.to_be_bytes());
        key
    }

    /// Lithology part of an index key (everything before the separator).
    fn lithology_from_index_key(key: &[u8]) -> Result<String> {
        let split = key.len().checked_sub(9).filter(|&pos| key[pos] == INDEX_SEPARATOR);
        let Some(pos) = split else {
            return Err(VibrationError::Storage(format!(
                "malformed lithology index key ({} bytes)",
                key.len()
            )));
        };
        String::from_utf8(key[..pos].to_vec())
            .map_err(|e| VibrationError::Storage(format!("lithology index key is not UTF-8: {e}")))
    }

    fn decode_record(value: &[u8]) -> Result<MeasurementRecord> {
        serde_json::from_slice(value).map_err(VibrationError::from)
    }

    fn load_model(&self, lithology: &str) -> Result<Option<AttenuationModel>> {
        match self.models.get(lithology.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn load_all_models(&self) -> Result<HashMap<String, AttenuationModel>> {
        let mut models = HashMap::new();
        for item in self.models.iter() {
            let (key, value) = item?;
            let lithology = String::from_utf8(key.to_vec())
                .map_err(|e| VibrationError::Storage(format!("model key is not UTF-8: {e}")))?;
            models.insert(lithology, serde_json::from_slice(&value)?);
        }
        Ok(models)
    }

    fn lithology_row_count(&self, lithology: &str) -> Result<usize> {
        let mut count = 0;
        for item in self.lithology_index.scan_prefix(Self::index_prefix(lithology)) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn maybe_flush(&self) -> Result<()> {
        if self.flush_on_write {
            self.db.flush()?;
        }
        Ok(())
    }
}

impl MeasurementStore for SledStore {
    fn append(&self, new: &NewMeasurement) -> Result<u64> {
        new.validate()?;

        // generate_id starts at 0; keep ids 1-based like an autoincrement key
        let id = self.db.generate_id()? + 1;
        let record = MeasurementRecord::from_new(id, new);
        let key = id.to_be_bytes();
        let value = serde_json::to_vec(&record)?;
        let index_key = Self::index_key(&record.lithology, id);

        let result: TransactionResult<(), Infallible> = (&self.measurements, &self.lithology_index)
            .transaction(|(rows, index)| {
                rows.insert(&key[..], value.as_slice())?;
                index.insert(index_key.as_slice(), &key[..])?;
                Ok(())
            });
        result.map_err(|e| VibrationError::Storage(format!("append transaction failed: {e}")))?;

        self.maybe_flush()?;

        debug!(
            id,
            distance = record.distance,
            charge = record.charge,
            vibration = record.vibration,
            lithology = %record.lithology,
            "Stored measurement"
        );

        Ok(id)
    }

    fn list_all(&self) -> Result<Vec<Measurement>> {
        let models = self.load_all_models()?;
        let mut measurements = Vec::with_capacity(self.measurements.len());

        for item in self.measurements.iter().rev() {
            let (_key, value) = item?;
            let record = Self::decode_record(&value)?;
            let model = models.get(&record.lithology);
            measurements.push(record.with_model(model));
        }

        Ok(measurements)
    }

    fn distinct_lithologies(&self) -> Result<Vec<String>> {
        let mut lithologies = BTreeSet::new();
        for item in self.lithology_index.iter() {
            let (key, _) = item?;
            lithologies.insert(Self::lithology_from_index_key(&key)?);
        }
        Ok(lithologies.into_iter().collect())
    }

    fn measurements_for(&self, lithology: &str) -> Result<Vec<Measurement>> {
        let model = self.load_model(lithology)?;
        let mut measurements = Vec::new();

        for item in self.lithology_index.scan_prefix(Self::index_prefix(lithology)) {
            let (_, id_key) = item?;
            let value = self.measurements.get(&id_key)?.ok_or_else(|| {
                VibrationError::Storage(format!(
                    "lithology index for '{lithology}' points at a missing measurement"
                ))
            })?;
            let record = Self::decode_record(&value)?;
            measurements.push(record.with_model(model.as_ref()));
        }

        Ok(measurements)
    }

    fn update_model(&self, lithology: &str, k: f64, alpha: f64) -> Result<usize> {
        // No stored row can carry a blank or NUL label
        if validate_lithology(lithology).is_err() {
            return Ok(0);
        }
        validate_coefficients(k, alpha)?;

        let rows = self.lithology_row_count(lithology)?;
        if rows == 0 {
            debug!(lithology, "No rows for lithology, model not stored");
            return Ok(0);
        }

        // Single-key insert: all rows switch to the new pair at once
        let model = AttenuationModel::new(k, alpha);
        self.models
            .insert(lithology.as_bytes(), serde_json::to_vec(&model)?)?;
        self.maybe_flush()?;

        debug!(lithology, k, alpha, rows, "Updated attenuation model");

        Ok(rows)
    }

    fn latest_model(&self, lithology: &str) -> Result<AttenuationModel> {
        self.load_model(lithology)?
            .ok_or_else(|| VibrationError::NotFound(lithology.to_string()))
    }

    fn count(&self) -> Result<usize> {
        Ok(self.measurements.len())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(lithology: &str, distance: f64) -> NewMeasurement {
        NewMeasurement::new(distance, 25.0, 12.5, lithology)
    }

    #[test]
    fn test_store_open() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.list_all().unwrap().is_empty());
        assert!(store.distinct_lithologies().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_list() {
        let store = SledStore::open_temporary().unwrap();

        let id = store.append(&sample("granite", 120.0)).unwrap();
        let all = store.list_all().unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].distance, 120.0);
        assert_eq!(all[0].charge, 25.0);
        assert_eq!(all[0].vibration, 12.5);
        assert_eq!(all[0].lithology, "granite");
        assert_eq!(all[0].k, None);
        assert_eq!(all[0].alpha, None);
    }

    #[test]
    fn test_ids_increase_and_list_is_newest_first() {
        let store = SledStore::open_temporary().unwrap();

        let ids: Vec<u64> = (0..5)
            .map(|i| store.append(&sample("basalt", 100.0 + f64::from(i))).unwrap())
            .collect();
        assert!(ids.windows(2).all(|w| w[1] > w[0]));

        let listed: Vec<u64> = store.list_all().unwrap().iter().map(|m| m.id).collect();
        let mut expected = ids.clone();
        expected.reverse();
        assert_eq!(listed, expected);
    }

    #[test]
    fn test_append_rejects_invalid() {
        let store = SledStore::open_temporary().unwrap();
        let err = store
            .append(&NewMeasurement::new(-1.0, 25.0, 1.0, "granite"))
            .unwrap_err();
        assert!(matches!(err, VibrationError::Validation(_)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_distinct_lithologies_sorted() {
        let store = SledStore::open_temporary().unwrap();
        for lith in ["schist", "Granite", "basalt", "granite", "basalt"] {
            store.append(&sample(lith, 100.0)).unwrap();
        }
        // Byte order: uppercase sorts before lowercase, labels are case-sensitive
        assert_eq!(
            store.distinct_lithologies().unwrap(),
            vec!["Granite", "basalt", "granite", "schist"]
        );
    }

    #[test]
    fn test_measurements_for_exact_match_only() {
        let store = SledStore::open_temporary().unwrap();
        store.append(&sample("granite", 100.0)).unwrap();
        store.append(&sample("granite", 200.0)).unwrap();
        store.append(&sample("granite gneiss", 300.0)).unwrap();
        store.append(&sample("Granite", 400.0)).unwrap();

        let rows = store.measurements_for("granite").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|m| m.lithology == "granite"));
        assert!(store.measurements_for("marble").unwrap().is_empty());
    }

    #[test]
    fn test_update_model_counts_rows() {
        let store = SledStore::open_temporary().unwrap();
        store.append(&sample("granite", 100.0)).unwrap();
        store.append(&sample("granite", 200.0)).unwrap();
        store.append(&sample("basalt", 300.0)).unwrap();

        assert_eq!(store.update_model("granite", 850.0, 1.4).unwrap(), 2);

        for m in store.list_all().unwrap() {
            if m.lithology == "granite" {
                assert_eq!(m.coefficients(), Some((850.0, 1.4)));
            } else {
                assert_eq!(m.coefficients(), None);
            }
        }
    }

    #[test]
    fn test_update_model_unknown_lithology_is_noop() {
        let store = SledStore::open_temporary().unwrap();
        store.append(&sample("granite", 100.0)).unwrap();

        assert_eq!(store.update_model("limestone", 500.0, 1.5).unwrap(), 0);
        assert!(matches!(
            store.latest_model("limestone"),
            Err(VibrationError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_model_invalid_label_updates_nothing() {
        let store = SledStore::open_temporary().unwrap();
        store.append(&sample("granite", 100.0)).unwrap();

        assert_eq!(store.update_model("", 10.0, 1.5).unwrap(), 0);
        assert_eq!(store.update_model("   ", 10.0, 1.5).unwrap(), 0);
        assert_eq!(store.update_model("gran\0ite", 10.0, 1.5).unwrap(), 0);
        assert!(store.latest_model("granite").is_err());
    }

    #[test]
    fn test_update_model_rejects_non_finite() {
        let store = SledStore::open_temporary().unwrap();
        store.append(&sample("granite", 100.0)).unwrap();
        assert!(store.update_model("granite", f64::NAN, 1.0).is_err());
        assert!(store.update_model("granite", 100.0, f64::INFINITY).is_err());
        assert!(store.latest_model("granite").is_err());
    }

    #[test]
    fn test_latest_model_not_found_before_fit() {
        let store = SledStore::open_temporary().unwrap();
        store.append(&sample("granite", 100.0)).unwrap();
        assert!(matches!(
            store.latest_model("granite"),
            Err(VibrationError::NotFound(_))
        ));

        store.update_model("granite", 300.0, 1.1).unwrap();
        let model = store.latest_model("granite").unwrap();
        assert_eq!((model.k, model.alpha), (300.0, 1.1));
    }

    #[test]
    fn test_data_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let first_id = {
            let store = SledStore::open(temp_dir.path()).unwrap();
            let id = store.append(&sample("granite", 100.0)).unwrap();
            store.update_model("granite", 640.0, 1.3).unwrap();
            id
        };

        let store = SledStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        let model = store.latest_model("granite").unwrap();
        assert_eq!((model.k, model.alpha), (640.0, 1.3));

        let next_id = store.append(&sample("granite", 150.0)).unwrap();
        assert!(next_id > first_id);
    }

    #[test]
    fn test_index_key_round_trip() {
        let key = SledStore::index_key("granite gneiss", 42);
        assert_eq!(
            SledStore::lithology_from_index_key(&key).unwrap(),
            "granite gneiss"
        );
        assert!(SledStore::lithology_from_index_key(b"short").is_err());
    }
}
