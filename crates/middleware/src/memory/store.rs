use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use cdrflow_model::CallRecord;

use crate::error::StoreError;
use crate::store::RecordStore;

/// In-memory record store enforcing the `(src_number, dest_number)`
/// uniqueness constraint. First write wins, as at the real store.
pub struct InMemoryStore {
    records: DashMap<(String, String), CallRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, src_number: &str, dest_number: &str) -> Option<CallRecord> {
        self.records
            .get(&(src_number.to_string(), dest_number.to_string()))
            .map(|r| r.clone())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert(&self, record: &CallRecord) -> Result<(), StoreError> {
        let key = (record.src_number.clone(), record.dest_number.clone());
        match self.records.entry(key) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!(
                "{} -> {}",
                record.src_number, record.dest_number
            ))),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }
}
