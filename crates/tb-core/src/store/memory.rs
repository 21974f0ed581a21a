//! In-memory store implementations.

use super::{FailureLogStore, OutcomeStore, StoreError};
use crate::model::{FailureLogEntry, OutcomeRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory outcome store keyed by business key.
#[derive(Default)]
pub struct InMemoryOutcomeStore {
    records: Arc<RwLock<HashMap<String, OutcomeRecord>>>,
}

impl InMemoryOutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutcomeStore for InMemoryOutcomeStore {
    async fn upsert(&self, record: &OutcomeRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.business_key.clone(), record.clone());
        Ok(())
    }

    async fn find_by_business_key(
        &self,
        business_key: &str,
    ) -> Result<Option<OutcomeRecord>, StoreError> {
        Ok(self.records.read().await.get(business_key).cloned())
    }

    async fn find_by_process(&self, process_id: &str) -> Result<Vec<OutcomeRecord>, StoreError> {
        let mut records: Vec<OutcomeRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.process_id == process_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.row_number);
        Ok(records)
    }

    async fn mark_deleted(&self, business_key: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(business_key)
            .ok_or_else(|| StoreError::NotFound(business_key.to_string()))?;
        record.deleted = true;
        Ok(())
    }
}

/// In-memory append-only failure log.
#[derive(Default)]
pub struct InMemoryFailureLog {
    entries: Arc<RwLock<Vec<FailureLogEntry>>>,
}

impl InMemoryFailureLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FailureLogStore for InMemoryFailureLog {
    async fn append(&self, entry: &FailureLogEntry) -> Result<(), StoreError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn find_by_process(&self, process_id: &str) -> Result<Vec<FailureLogEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.process_id == process_id)
            .cloned()
            .collect())
    }
}
