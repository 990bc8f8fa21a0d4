//! In-memory measurement store
//!
//! Thread-safe via `RwLock`. Not durable, data is lost when dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use super::{validate_coefficients, MeasurementStore};
use crate::error::{Result, VibrationError};
use crate::types::{validate_lithology, AttenuationModel, Measurement, MeasurementRecord, NewMeasurement};

#[derive(Default)]
struct MemoryState {
    rows: BTreeMap<u64, MeasurementRecord>,
    models: HashMap<String, AttenuationModel>,
    last_id: u64,
}

/// In-memory store for tests and throwaway sessions
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|e| VibrationError::Storage(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|e| VibrationError::Storage(e.to_string()))
    }
}

impl MeasurementStore for MemoryStore {
    fn append(&self, new: &NewMeasurement) -> Result<u64> {
        new.validate()?;
        let mut state = self.write()?;
        state.last_id += 1;
        let id = state.last_id;
        state.rows.insert(id, MeasurementRecord::from_new(id, new));
        Ok(id)
    }

    fn list_all(&self) -> Result<Vec<Measurement>> {
        let state = self.read()?;
        Ok(state
            .rows
            .values()
            .rev()
            .map(|r| r.clone().with_model(state.models.get(&r.lithology)))
            .collect())
    }

    fn distinct_lithologies(&self) -> Result<Vec<String>> {
        let state = self.read()?;
        let set: BTreeSet<&str> = state.rows.values().map(|r| r.lithology.as_str()).collect();
        Ok(set.into_iter().map(str::to_string).collect())
    }

    fn measurements_for(&self, lithology: &str) -> Result<Vec<Measurement>> {
        let state = self.read()?;
        let model = state.models.get(lithology);
        Ok(state
            .rows
            .values()
            .filter(|r| r.lithology == lithology)
            .map(|r| r.clone().with_model(model))
            .collect())
    }

    fn update_model(&self, lithology: &str, k: f64, alpha: f64) -> Result<usize> {
        // No stored row can carry a blank or NUL label
        if validate_lithology(lithology).is_err() {
            return Ok(0);
        }
        validate_coefficients(k, alpha)?;

        let mut state = self.write()?;
        let rows = state.rows.values().filter(|r| r.lithology == lithology).count();
        if rows > 0 {
            state
                .models
                .insert(lithology.to_string(), AttenuationModel::new(k, alpha));
        }
        Ok(rows)
    }

    fn latest_model(&self, lithology: &str) -> Result<AttenuationModel> {
        self.read()?
            .models
            .get(lithology)
            .copied()
            .ok_or_else(|| VibrationError::NotFound(lithology.to_string()))
    }

    fn count(&self) -> Result<usize> {
        Ok(self.read()?.rows.len())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_list_newest_first() {
        let store = MemoryStore::new();
        let a = store.append(&NewMeasurement::new(100.0, 10.0, 5.0, "granite")).unwrap();
        let b = store.append(&NewMeasurement::new(200.0, 10.0, 2.0, "granite")).unwrap();
        assert!(b > a);

        let all = store.list_all().unwrap();
        assert_eq!(all.iter().map(|m| m.id).collect::<Vec<_>>(), vec![b, a]);
    }

    #[test]
    fn test_update_model_scoped_to_lithology() {
        let store = MemoryStore::new();
        store.append(&NewMeasurement::new(100.0, 10.0, 5.0, "granite")).unwrap();
        store.append(&NewMeasurement::new(100.0, 10.0, 5.0, "basalt")).unwrap();

        assert_eq!(store.update_model("granite", 200.0, 1.2).unwrap(), 1);
        assert_eq!(store.update_model("marble", 200.0, 1.2).unwrap(), 0);

        let basalt = store.measurements_for("basalt").unwrap();
        assert_eq!(basalt[0].coefficients(), None);
        assert!(matches!(
            store.latest_model("marble"),
            Err(VibrationError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_model_blank_label_is_noop() {
        let store = MemoryStore::new();
        store.append(&NewMeasurement::new(100.0, 10.0, 5.0, "granite")).unwrap();
        assert_eq!(store.update_model("", 10.0, 1.5).unwrap(), 0);
        assert_eq!(store.update_model("a\0b", 10.0, 1.5).unwrap(), 0);
    }

    #[test]
    fn test_rejects_invalid_append() {
        let store = MemoryStore::new();
        assert!(store.append(&NewMeasurement::new(100.0, -1.0, 5.0, "granite")).is_err());
        assert_eq!(store.count().unwrap(), 0);
    }
}
