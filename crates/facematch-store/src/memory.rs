//! In-process identity store.

use crate::{IdentityStore, StoreError};
use facematch_core::{normalize_name, IdentityRecord};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<IdentityRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<IdentityRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl IdentityStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Lock)?;
        let mut all = records.clone();
        all.sort_by_key(|r| r.created_at);
        Ok(all)
    }

    fn insert(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Lock)?;
        let key = normalize_name(&record.name);
        if records.iter().any(|r| normalize_name(&r.name) == key) {
            return Err(StoreError::DuplicateName(record.name.clone()));
        }
        records.push(record.clone());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Lock)?;
        let key = normalize_name(name);
        let before = records.len();
        records.retain(|r| normalize_name(&r.name) != key);
        Ok(records.len() < before)
    }
}
