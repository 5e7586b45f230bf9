//! Customer record store with conditional insert.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DatabaseError;
use crate::identity::{CompositeKey, CustomerRecord};

/// Result of a conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The row did not exist and was written.
    Created,
    /// A row already existed for the key; nothing was written.
    Conflict,
}

/// Key-value store for registered customers.
///
/// Implementations must make `put_if_absent` an atomic compare-and-insert:
/// concurrent calls for one key yield exactly one `Created`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the profile row for `key`.
    async fn get_by_key(&self, key: &CompositeKey)
    -> Result<Option<CustomerRecord>, DatabaseError>;

    /// Insert `record` under `key` only if no row exists for `key`.
    async fn put_if_absent(
        &self,
        key: &CompositeKey,
        record: &CustomerRecord,
    ) -> Result<PutOutcome, DatabaseError>;

    /// Number of stored customers.
    async fn count(&self) -> Result<usize, DatabaseError>;
}

/// In-memory record store. The write lock makes check-and-insert atomic.
#[derive(Default)]
pub struct MemoryRecordStore {
    rows: RwLock<HashMap<CompositeKey, CustomerRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_by_key(
        &self,
        key: &CompositeKey,
    ) -> Result<Option<CustomerRecord>, DatabaseError> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn put_if_absent(
        &self,
        key: &CompositeKey,
        record: &CustomerRecord,
    ) -> Result<PutOutcome, DatabaseError> {
        use std::collections::hash_map::Entry;

        let mut rows = self.rows.write().await;
        match rows.entry(key.clone()) {
            Entry::Occupied(_) => Ok(PutOutcome::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(PutOutcome::Created)
            }
        }
    }

    async fn count(&self) -> Result<usize, DatabaseError> {
        Ok(self.rows.read().await.len())
    }
}
