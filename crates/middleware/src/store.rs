use async_trait::async_trait;

use cdrflow_model::CallRecord;

use crate::error::StoreError;

/// Persistence collaborator for canonical records.
///
/// The store enforces uniqueness of `(src_number, dest_number)`: the first
/// write wins and later writes report [`StoreError::Duplicate`]. That
/// constraint is the pipeline's only deduplication under at-least-once
/// delivery.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &CallRecord) -> Result<(), StoreError>;
}
