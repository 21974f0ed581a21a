//! SQLite store implementations.
//!
//! Schema is applied on connect, so a fresh database file is usable
//! without a separate migration step. Timestamps are stored as RFC 3339
//! text.

use super::{FailureLogStore, OutcomeStore, StoreError};
use crate::model::{FailureLogEntry, OutcomeRecord, SubmodelKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row as _;

const OUTCOME_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS outcome_records (
    business_key TEXT PRIMARY KEY,
    process_id TEXT NOT NULL,
    row_number INTEGER NOT NULL,
    kind TEXT NOT NULL,
    shell_id TEXT NOT NULL,
    submodel_id TEXT NOT NULL,
    asset_id TEXT NOT NULL,
    access_policy_id TEXT NOT NULL,
    usage_policy_id TEXT NOT NULL,
    contract_definition_id TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    created_on TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_outcome_process ON outcome_records(process_id);
"#;

const FAILURE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS failure_log (
    id TEXT PRIMARY KEY,
    process_id TEXT NOT NULL,
    row_number INTEGER,
    stage TEXT NOT NULL,
    message TEXT NOT NULL,
    created_on TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_failure_process ON failure_log(process_id);
"#;

async fn connect_pool(url: &str) -> Result<SqlitePool, StoreError> {
    Ok(SqlitePoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await?)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Database(format!("bad timestamp {}: {}", raw, e)))
}

fn record_from_row(row: &SqliteRow) -> Result<OutcomeRecord, StoreError> {
    let kind_raw: String = row.try_get("kind")?;
    let kind = SubmodelKind::parse(&kind_raw).map_err(|e| StoreError::Database(e.to_string()))?;
    let row_number: i64 = row.try_get("row_number")?;
    let created_raw: String = row.try_get("created_on")?;
    Ok(OutcomeRecord {
        process_id: row.try_get("process_id")?,
        row_number: row_number as u32,
        business_key: row.try_get("business_key")?,
        kind,
        shell_id: row.try_get("shell_id")?,
        submodel_id: row.try_get("submodel_id")?,
        asset_id: row.try_get("asset_id")?,
        access_policy_id: row.try_get("access_policy_id")?,
        usage_policy_id: row.try_get("usage_policy_id")?,
        contract_definition_id: row.try_get("contract_definition_id")?,
        deleted: row.try_get::<i64, _>("deleted")? != 0,
        created_on: parse_timestamp(&created_raw)?,
    })
}

/// SQLite-backed outcome store.
pub struct SqliteOutcomeStore {
    pool: SqlitePool,
}

impl SqliteOutcomeStore {
    /// Connects and applies the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = connect_pool(url).await?;
        Self::from_pool(pool).await
    }

    /// Applies the schema on an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(OUTCOME_SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl OutcomeStore for SqliteOutcomeStore {
    async fn upsert(&self, record: &OutcomeRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO outcome_records (
                business_key, process_id, row_number, kind, shell_id, submodel_id,
                asset_id, access_policy_id, usage_policy_id, contract_definition_id,
                deleted, created_on
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(business_key) DO UPDATE SET
                process_id = excluded.process_id,
                row_number = excluded.row_number,
                kind = excluded.kind,
                shell_id = excluded.shell_id,
                submodel_id = excluded.submodel_id,
                asset_id = excluded.asset_id,
                access_policy_id = excluded.access_policy_id,
                usage_policy_id = excluded.usage_policy_id,
                contract_definition_id = excluded.contract_definition_id,
                deleted = excluded.deleted,
                created_on = excluded.created_on
            "#,
        )
        .bind(&record.business_key)
        .bind(&record.process_id)
        .bind(record.row_number as i64)
        .bind(record.kind.as_str())
        .bind(&record.shell_id)
        .bind(&record.submodel_id)
        .bind(&record.asset_id)
        .bind(&record.access_policy_id)
        .bind(&record.usage_policy_id)
        .bind(&record.contract_definition_id)
        .bind(record.deleted as i64)
        .bind(record.created_on.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_business_key(
        &self,
        business_key: &str,
    ) -> Result<Option<OutcomeRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM outcome_records WHERE business_key = ?")
            .bind(business_key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_by_process(&self, process_id: &str) -> Result<Vec<OutcomeRecord>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM outcome_records WHERE process_id = ? ORDER BY row_number")
                .bind(process_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn mark_deleted(&self, business_key: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE outcome_records SET deleted = 1 WHERE business_key = ?")
            .bind(business_key)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(business_key.to_string()));
        }
        Ok(())
    }
}

/// SQLite-backed failure log.
pub struct SqliteFailureLog {
    pool: SqlitePool,
}

impl SqliteFailureLog {
    /// Connects and applies the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = connect_pool(url).await?;
        Self::from_pool(pool).await
    }

    /// Applies the schema on an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(FAILURE_SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl FailureLogStore for SqliteFailureLog {
    async fn append(&self, entry: &FailureLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO failure_log (id, process_id, row_number, stage, message, created_on)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.process_id)
        .bind(entry.row_number.map(|n| n as i64))
        .bind(&entry.stage)
        .bind(&entry.message)
        .bind(entry.created_on.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_process(&self, process_id: &str) -> Result<Vec<FailureLogEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM failure_log WHERE process_id = ? ORDER BY created_on, rowid",
        )
        .bind(process_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let created_raw: String = row.try_get("created_on")?;
                let row_number: Option<i64> = row.try_get("row_number")?;
                Ok(FailureLogEntry {
                    id: row.try_get("id")?,
                    process_id: row.try_get("process_id")?,
                    row_number: row_number.map(|n| n as u32),
                    stage: row.try_get("stage")?,
                    message: row.try_get("message")?,
                    created_on: parse_timestamp(&created_raw)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(business_key: &str) -> OutcomeRecord {
        OutcomeRecord {
            process_id: "p1".to_string(),
            row_number: 3,
            business_key: business_key.to_string(),
            kind: SubmodelKind::Batch,
            shell_id: "urn:uuid:shell-1".to_string(),
            submodel_id: "urn:uuid:sub-1".to_string(),
            asset_id: "batch-shell-sub-key".to_string(),
            access_policy_id: "ap-1".to_string(),
            usage_policy_id: "up-1".to_string(),
            contract_definition_id: "cd-1".to_string(),
            deleted: false,
            created_on: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_outcome_round_trip() {
        let store = SqliteOutcomeStore::connect("sqlite::memory:").await.unwrap();
        store.upsert(&record("urn:uuid:k1")).await.unwrap();

        let found = store
            .find_by_business_key("urn:uuid:k1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.kind, SubmodelKind::Batch);
        assert_eq!(found.row_number, 3);
        assert!(!found.deleted);
        assert!(store
            .find_by_business_key("urn:uuid:missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_upsert_then_mark_deleted() {
        let store = SqliteOutcomeStore::connect("sqlite::memory:").await.unwrap();
        store.upsert(&record("urn:uuid:k1")).await.unwrap();

        let mut updated = record("urn:uuid:k1");
        updated.asset_id = "batch-new".to_string();
        store.upsert(&updated).await.unwrap();

        store.mark_deleted("urn:uuid:k1").await.unwrap();
        let found = store
            .find_by_business_key("urn:uuid:k1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.asset_id, "batch-new");
        assert!(found.deleted);

        let err = store.mark_deleted("urn:uuid:missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stores_share_a_file() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("tb.db").display());

        let outcomes = SqliteOutcomeStore::connect(&url).await.unwrap();
        let failures = SqliteFailureLog::from_pool(outcomes.pool().clone())
            .await
            .unwrap();

        outcomes.upsert(&record("urn:uuid:k1")).await.unwrap();
        failures
            .append(&FailureLogEntry::new("p1", Some(4), "exchange", "boom"))
            .await
            .unwrap();

        assert_eq!(outcomes.find_by_process("p1").await.unwrap().len(), 1);
        let entries = failures.find_by_process("p1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].row_number, Some(4));
        assert_eq!(entries[0].stage, "exchange");
    }
}
