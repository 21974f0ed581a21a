//! Outcome and failure-log persistence.
//!
//! The pipeline talks to storage through the [`OutcomeStore`] and
//! [`FailureLogStore`] traits. In-memory implementations back tests and
//! embedded use; SQLite implementations live behind the `database` feature.

mod memory;
#[cfg(feature = "database")]
mod sqlite;

pub use memory::{InMemoryFailureLog, InMemoryOutcomeStore};
#[cfg(feature = "database")]
pub use sqlite::{SqliteFailureLog, SqliteOutcomeStore};

use crate::model::{FailureLogEntry, OutcomeRecord};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur in stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(String),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Durable storage of provisioned-row outcomes, keyed by business key.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Inserts or replaces the record for its business key.
    async fn upsert(&self, record: &OutcomeRecord) -> Result<(), StoreError>;

    /// Looks up the record for a business key, deleted or not.
    async fn find_by_business_key(
        &self,
        business_key: &str,
    ) -> Result<Option<OutcomeRecord>, StoreError>;

    /// All records created under a process, ordered by row number.
    async fn find_by_process(&self, process_id: &str) -> Result<Vec<OutcomeRecord>, StoreError>;

    /// Marks a record deleted without removing it.
    async fn mark_deleted(&self, business_key: &str) -> Result<(), StoreError>;
}

/// Append-only per-process failure log.
#[async_trait]
pub trait FailureLogStore: Send + Sync {
    async fn append(&self, entry: &FailureLogEntry) -> Result<(), StoreError>;

    /// All entries logged under a process, in append order.
    async fn find_by_process(&self, process_id: &str) -> Result<Vec<FailureLogEntry>, StoreError>;
}
