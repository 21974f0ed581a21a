//! Row and batch orchestration.
//!
//! [`RowOrchestrator`] drives one row through the full pipeline;
//! [`BatchOrchestrator`] fans rows out over a bounded worker pool, with
//! part rows fully committed before any relationship row starts.

use crate::compensation::{CompensationScope, DeleteFacilitator};
use crate::error::{ProvisioningStage, RowError, RowErrorKind};
use crate::identity::IdentityResolver;
use crate::model::{FailureLogEntry, OutcomeRecord, PartRow, RelationshipRow, Row, SubmodelKind};
use crate::provisioning::GovernanceProvisioner;
use crate::store::{FailureLogStore, OutcomeStore};
use crate::validation;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tb_observability::PipelineMetrics;
use tb_policy::UsagePolicyDeclaration;
use tokio::sync::{watch, Mutex, OwnedMutexGuard, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, info_span, instrument, warn, Instrument};

/// Serializes pipeline work per business key.
///
/// Two rows (or a row and a process deletion) sharing a business key never
/// touch the connectors concurrently.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Drives a single row through validation, identity resolution, update
/// compensation, provisioning, and outcome persistence.
pub struct RowOrchestrator {
    identity: IdentityResolver,
    provisioner: GovernanceProvisioner,
    facilitator: DeleteFacilitator,
    outcomes: Arc<dyn OutcomeStore>,
    metrics: PipelineMetrics,
}

impl RowOrchestrator {
    pub fn new(
        identity: IdentityResolver,
        provisioner: GovernanceProvisioner,
        facilitator: DeleteFacilitator,
        outcomes: Arc<dyn OutcomeStore>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            identity,
            provisioner,
            facilitator,
            outcomes,
            metrics,
        }
    }

    /// Runs one row through the full pipeline.
    pub async fn process_row(
        &self,
        process_id: &str,
        row: &Row,
    ) -> Result<OutcomeRecord, RowError> {
        let row_number = row.row_number();
        validation::validate(row).map_err(|violations| {
            RowError::new(
                row_number,
                ProvisioningStage::Validation,
                RowErrorKind::Validation(violations.iter().map(|v| v.to_string()).collect()),
            )
        })?;

        let record = match row {
            Row::Part(part) => self.process_part(process_id, part).await?,
            Row::Relationship(rel) => self.process_relationship(process_id, rel).await?,
        };
        self.metrics.row_processed();
        Ok(record)
    }

    async fn process_part(
        &self,
        process_id: &str,
        part: &PartRow,
    ) -> Result<OutcomeRecord, RowError> {
        let row_number = part.row_number;
        let resolved = self
            .identity
            .resolve_or_create_shell(part)
            .await
            .map_err(|err| RowError::new(row_number, ProvisioningStage::Registry, err))?;

        self.provision_into_shell(
            process_id,
            row_number,
            part.kind,
            &resolved.shell_id,
            &part.uuid,
            &part.usage_policies,
            &part.bpn_numbers,
        )
        .await
    }

    async fn process_relationship(
        &self,
        process_id: &str,
        rel: &RelationshipRow,
    ) -> Result<OutcomeRecord, RowError> {
        let row_number = rel.row_number;
        let parent = self
            .outcomes
            .find_by_business_key(&rel.parent_uuid)
            .await
            .map_err(|e| RowError::new(row_number, ProvisioningStage::Persistence, e.into()))?
            .filter(|r| !r.deleted);

        let parent = match parent {
            Some(parent) => parent,
            None => {
                return Err(RowError::new(
                    row_number,
                    ProvisioningStage::Registry,
                    RowErrorKind::ParentNotFound(rel.parent_uuid.clone()),
                ))
            }
        };

        self.provision_into_shell(
            process_id,
            row_number,
            rel.kind(),
            &parent.shell_id,
            &rel.uuid,
            &rel.usage_policies,
            &rel.bpn_numbers,
        )
        .await
    }

    /// Shared tail of the pipeline once a shell is known: update
    /// compensation, submodel registration, exchange provisioning, outcome
    /// persistence.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, fields(row_number, shell_id, kind = kind.as_str()))]
    async fn provision_into_shell(
        &self,
        process_id: &str,
        row_number: u32,
        kind: SubmodelKind,
        shell_id: &str,
        business_key: &str,
        usage_policies: &[UsagePolicyDeclaration],
        bpn_numbers: &[String],
    ) -> Result<OutcomeRecord, RowError> {
        let prior = self
            .outcomes
            .find_by_business_key(business_key)
            .await
            .map_err(|e| RowError::new(row_number, ProvisioningStage::Persistence, e.into()))?
            .filter(|r| !r.deleted);

        let mut updating = false;
        if let Some(prior) = &prior {
            let exists = self
                .provisioner
                .asset_exists(&prior.asset_id)
                .await
                .map_err(|err| RowError::new(row_number, ProvisioningStage::Exchange, err))?;
            if exists {
                let report = self
                    .facilitator
                    .compensate(prior, CompensationScope::Update)
                    .await;
                if let Some(message) = report.failure_summary() {
                    return Err(RowError::new(
                        row_number,
                        ProvisioningStage::Compensation,
                        RowErrorKind::CompensationFailed(message),
                    ));
                }
                updating = true;
            }
        }

        // A leftover submodel of this kind under the shell is external
        // drift; refusing is safer than silently re-pointing it.
        self.identity
            .ensure_submodel_absent(shell_id, kind)
            .await
            .map_err(|err| RowError::new(row_number, ProvisioningStage::Registry, err))?;
        let submodel_id = self
            .identity
            .register_submodel(shell_id, kind)
            .await
            .map_err(|err| RowError::new(row_number, ProvisioningStage::Registry, err))?;

        let ids = match self
            .provisioner
            .provision(
                kind,
                shell_id,
                &submodel_id,
                business_key,
                usage_policies,
                bpn_numbers,
            )
            .await
        {
            Ok(ids) => ids,
            Err(provision_err) => {
                // unwind the fresh submodel so a retry does not trip over it
                if let Err(cleanup_err) =
                    self.identity.remove_submodel(shell_id, &submodel_id).await
                {
                    warn!(error = %cleanup_err, "failed to unwind submodel");
                }
                if updating {
                    // the old artifacts are gone, the stored record no
                    // longer describes anything provisioned
                    if let Err(store_err) = self.outcomes.mark_deleted(business_key).await {
                        warn!(error = %store_err, "failed to mark stale outcome deleted");
                    }
                }
                return Err(RowError::new(
                    row_number,
                    ProvisioningStage::Exchange,
                    provision_err,
                ));
            }
        };

        let record = OutcomeRecord {
            process_id: process_id.to_string(),
            row_number,
            business_key: business_key.to_string(),
            kind,
            shell_id: shell_id.to_string(),
            submodel_id,
            asset_id: ids.asset_id,
            access_policy_id: ids.access_policy_id,
            usage_policy_id: ids.usage_policy_id,
            contract_definition_id: ids.contract_definition_id,
            deleted: false,
            created_on: Utc::now(),
        };
        self.outcomes
            .upsert(&record)
            .await
            .map_err(|e| RowError::new(row_number, ProvisioningStage::Persistence, e.into()))?;

        info!(business_key, asset_id = %record.asset_id, updated = updating, "row provisioned");
        Ok(record)
    }
}

/// Summary of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub rows_received: usize,
    pub rows_succeeded: usize,
    pub rows_failed: usize,
    /// Rows not dispatched because the batch was cancelled.
    pub rows_skipped: usize,
}

/// Runs batches: part rows first, then relationship rows, each phase under
/// a bounded worker pool.
pub struct BatchOrchestrator {
    row: Arc<RowOrchestrator>,
    failures: Arc<dyn FailureLogStore>,
    locks: Arc<KeyedLocks>,
    metrics: PipelineMetrics,
    max_concurrent_rows: usize,
}

impl BatchOrchestrator {
    pub fn new(
        row: Arc<RowOrchestrator>,
        failures: Arc<dyn FailureLogStore>,
        locks: Arc<KeyedLocks>,
        metrics: PipelineMetrics,
        max_concurrent_rows: usize,
    ) -> Self {
        Self {
            row,
            failures,
            locks,
            metrics,
            max_concurrent_rows: max_concurrent_rows.max(1),
        }
    }

    /// Runs a batch to completion. Relationship rows only start after every
    /// part row has finished, so parent lookups always see committed
    /// outcomes.
    #[instrument(skip(self, rows, cancel), fields(process_id, rows = rows.len()))]
    pub async fn run_batch(
        &self,
        process_id: &str,
        rows: Vec<Row>,
        cancel: watch::Receiver<bool>,
    ) -> BatchStats {
        let started = Instant::now();
        let mut stats = BatchStats {
            rows_received: rows.len(),
            ..Default::default()
        };

        let (parts, relationships): (Vec<Row>, Vec<Row>) =
            rows.into_iter().partition(|r| !r.is_relationship());
        self.run_phase(process_id, parts, &cancel, &mut stats).await;
        self.run_phase(process_id, relationships, &cancel, &mut stats)
            .await;

        self.metrics.batch_finished(started.elapsed().as_secs_f64());
        info!(?stats, "batch finished");
        stats
    }

    async fn run_phase(
        &self,
        process_id: &str,
        rows: Vec<Row>,
        cancel: &watch::Receiver<bool>,
        stats: &mut BatchStats,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_rows));
        let mut tasks = JoinSet::new();

        for row in rows {
            if *cancel.borrow() {
                stats.rows_skipped += 1;
                continue;
            }
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let orchestrator = self.row.clone();
            let failures = self.failures.clone();
            let locks = self.locks.clone();
            let metrics = self.metrics.clone();
            let process_id = process_id.to_string();
            let span = info_span!("row", process_id = %process_id, row_number = row.row_number());

            tasks.spawn(
                async move {
                    let _permit = permit;
                    let _guard = locks.acquire(row.business_key()).await;
                    // relationship rows write under the parent's shell, so
                    // two siblings must not race the submodel conflict check
                    let _parent_guard = match &row {
                        Row::Relationship(rel) => Some(locks.acquire(&rel.parent_uuid).await),
                        Row::Part(_) => None,
                    };
                    match orchestrator.process_row(&process_id, &row).await {
                        Ok(_) => true,
                        Err(err) => {
                            warn!(error = %err, "row failed");
                            metrics.row_failed(err.stage.as_str());
                            let entry = FailureLogEntry::new(
                                &process_id,
                                Some(err.row_number),
                                err.stage.as_str(),
                                err.to_string(),
                            );
                            if let Err(log_err) = failures.append(&entry).await {
                                warn!(error = %log_err, "failed to append failure log entry");
                            }
                            false
                        }
                    }
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => stats.rows_succeeded += 1,
                Ok(false) => stats.rows_failed += 1,
                Err(join_err) => {
                    warn!(error = %join_err, "row task panicked");
                    stats.rows_failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyed_locks_serialize_same_key() {
        let locks = Arc::new(KeyedLocks::new());

        let guard = locks.acquire("urn:uuid:k1").await;
        let contended = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("urn:uuid:k1").await;
            })
        };
        // a different key is not blocked
        let _other = locks.acquire("urn:uuid:k2").await;

        assert!(!contended.is_finished());
        drop(guard);
        contended.await.unwrap();
    }
}
