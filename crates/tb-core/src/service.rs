//! Pipeline facade.
//!
//! [`ProvisioningService`] wires the connectors, stores, and orchestrators
//! together and exposes the operations an embedding application needs:
//! batch submission, cancellation, outcome lookups, failure-log reads, and
//! process-level deletion.

use crate::compensation::{CompensationScope, DeleteFacilitator};
use crate::config::PipelineConfig;
use crate::error::ProvisioningStage;
use crate::identity::IdentityResolver;
use crate::model::{FailureLogEntry, OutcomeRecord, Row};
use crate::orchestrator::{BatchOrchestrator, BatchStats, KeyedLocks, RowOrchestrator};
use crate::provisioning::GovernanceProvisioner;
use crate::store::{FailureLogStore, OutcomeStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tb_connectors::{ExchangeConnector, RegistryConnector};
use tb_observability::PipelineMetrics;
use tb_policy::AssetRequestFactory;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Summary of a process-level deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    /// Records whose artifacts were removed and which are now soft-deleted.
    pub deleted: usize,
    /// Records that were already deleted.
    pub skipped: usize,
    /// Records whose compensation left artifacts behind; these stay live.
    pub failed: usize,
}

/// The assembled provisioning pipeline.
pub struct ProvisioningService {
    batch: Arc<BatchOrchestrator>,
    facilitator: DeleteFacilitator,
    outcomes: Arc<dyn OutcomeStore>,
    failures: Arc<dyn FailureLogStore>,
    locks: Arc<KeyedLocks>,
    cancels: Arc<RwLock<HashMap<String, watch::Sender<bool>>>>,
}

impl ProvisioningService {
    /// Wires the full pipeline against the given connectors and stores.
    pub fn new(
        registry: Arc<dyn RegistryConnector>,
        exchange: Arc<dyn ExchangeConnector>,
        outcomes: Arc<dyn OutcomeStore>,
        failures: Arc<dyn FailureLogStore>,
        config: PipelineConfig,
    ) -> Self {
        let config = Arc::new(config);
        let metrics = PipelineMetrics::new();

        let identity = IdentityResolver::new(registry.clone(), config.clone());
        let asset_factory = AssetRequestFactory::new(
            config.exchange_endpoint.clone(),
            config.manufacturer_id.clone(),
        );
        let provisioner = GovernanceProvisioner::new(exchange.clone(), asset_factory);
        let facilitator = DeleteFacilitator::new(registry, exchange, metrics.clone());

        let row = Arc::new(RowOrchestrator::new(
            identity,
            provisioner,
            facilitator.clone(),
            outcomes.clone(),
            metrics.clone(),
        ));
        let locks = Arc::new(KeyedLocks::new());
        let batch = Arc::new(BatchOrchestrator::new(
            row,
            failures.clone(),
            locks.clone(),
            metrics,
            config.max_concurrent_rows,
        ));

        Self {
            batch,
            facilitator,
            outcomes,
            failures,
            locks,
            cancels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Runs a batch to completion. Rows without a business key get one
    /// generated before dispatch.
    pub async fn run_batch(&self, process_id: &str, rows: Vec<Row>) -> BatchStats {
        let rows: Vec<Row> = rows.into_iter().map(Row::with_business_key).collect();
        let (tx, rx) = watch::channel(false);
        self.cancels.write().await.insert(process_id.to_string(), tx);

        let stats = self.batch.run_batch(process_id, rows, rx).await;

        self.cancels.write().await.remove(process_id);
        stats
    }

    /// Submits a batch for background processing.
    pub fn submit_batch(
        self: &Arc<Self>,
        process_id: impl Into<String>,
        rows: Vec<Row>,
    ) -> JoinHandle<BatchStats> {
        let service = self.clone();
        let process_id = process_id.into();
        tokio::spawn(async move { service.run_batch(&process_id, rows).await })
    }

    /// Requests cancellation of an in-flight batch. Rows not yet dispatched
    /// are skipped; rows already running finish normally.
    pub async fn cancel(&self, process_id: &str) -> bool {
        match self.cancels.read().await.get(process_id) {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }

    /// The outcome record for a business key, deleted or not.
    pub async fn outcome(&self, business_key: &str) -> Result<Option<OutcomeRecord>, StoreError> {
        self.outcomes.find_by_business_key(business_key).await
    }

    /// Every outcome record created under a process.
    pub async fn outcomes_for_process(
        &self,
        process_id: &str,
    ) -> Result<Vec<OutcomeRecord>, StoreError> {
        self.outcomes.find_by_process(process_id).await
    }

    /// Every failure logged under a process.
    pub async fn failures_for_process(
        &self,
        process_id: &str,
    ) -> Result<Vec<FailureLogEntry>, StoreError> {
        self.failures.find_by_process(process_id).await
    }

    /// Deletes every provisioned artifact of a process and soft-deletes its
    /// outcome records. Already-deleted records are skipped; records whose
    /// compensation failed stay live and the failure is logged.
    #[instrument(skip(self))]
    pub async fn delete_process(&self, process_id: &str) -> Result<DeleteSummary, StoreError> {
        let records = self.outcomes.find_by_process(process_id).await?;
        let mut summary = DeleteSummary::default();

        for record in records {
            if record.deleted {
                summary.skipped += 1;
                continue;
            }
            let _guard = self.locks.acquire(&record.business_key).await;
            let report = self
                .facilitator
                .compensate(&record, CompensationScope::Entity)
                .await;
            if let Some(message) = report.failure_summary() {
                warn!(business_key = %record.business_key, %message, "deletion incomplete");
                self.log_delete_failure(
                    process_id,
                    record.row_number,
                    ProvisioningStage::Compensation,
                    message,
                )
                .await;
                summary.failed += 1;
                continue;
            }
            // a store hiccup on one record must not block the remaining
            // records; the record stays live for a retry
            if let Err(store_err) = self.outcomes.mark_deleted(&record.business_key).await {
                warn!(
                    business_key = %record.business_key,
                    error = %store_err,
                    "failed to mark record deleted"
                );
                self.log_delete_failure(
                    process_id,
                    record.row_number,
                    ProvisioningStage::Persistence,
                    store_err.to_string(),
                )
                .await;
                summary.failed += 1;
                continue;
            }
            summary.deleted += 1;
        }

        info!(?summary, "process deletion finished");
        Ok(summary)
    }

    async fn log_delete_failure(
        &self,
        process_id: &str,
        row_number: u32,
        stage: ProvisioningStage,
        message: String,
    ) {
        let entry = FailureLogEntry::new(process_id, Some(row_number), stage.as_str(), message);
        if let Err(log_err) = self.failures.append(&entry).await {
            warn!(error = %log_err, "failed to append failure log entry");
        }
    }
}
