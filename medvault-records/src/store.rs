//! Persistence seam for sealed records.
//!
//! The core never sees plaintext at this boundary: only records sealed for
//! storage go in and come out.

use crate::error::{RecordError, RecordResult};
use crate::record::{RecordId, SealedRecord, Storage};
use async_trait::async_trait;
use medvault_policy::UserId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where sealed records are kept.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: SealedRecord<Storage>) -> RecordResult<()>;

    async fn get(&self, id: RecordId) -> RecordResult<Option<SealedRecord<Storage>>>;

    /// All records, oldest first.
    async fn list(&self) -> RecordResult<Vec<SealedRecord<Storage>>>;

    async fn list_by_patient(&self, patient: &UserId) -> RecordResult<Vec<SealedRecord<Storage>>>;
}

/// In-memory record store.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<BTreeMap<RecordId, SealedRecord<Storage>>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: SealedRecord<Storage>) -> RecordResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id()) {
            return Err(RecordError::Store(format!(
                "record {} already exists",
                record.id()
            )));
        }
        records.insert(record.id(), record);
        Ok(())
    }

    async fn get(&self, id: RecordId) -> RecordResult<Option<SealedRecord<Storage>>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list(&self) -> RecordResult<Vec<SealedRecord<Storage>>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn list_by_patient(&self, patient: &UserId) -> RecordResult<Vec<SealedRecord<Storage>>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.metadata().patient == *patient)
            .cloned()
            .collect())
    }
}
