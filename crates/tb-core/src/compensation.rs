//! Compensating deletion of provisioned artifacts.
//!
//! Deletion runs in dependency order so no artifact is ever orphaned by a
//! partial run: contract definition, access policy, usage policy, asset,
//! then the registry side. A resource that is already gone counts as
//! success, which makes reruns idempotent.

use crate::model::OutcomeRecord;
use std::sync::Arc;
use tb_connectors::{ConnectorError, ConnectorResult, ExchangeConnector, RegistryConnector};
use tb_observability::PipelineMetrics;
use tracing::{info, instrument, warn};

/// How far a compensation run reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationScope {
    /// Clears exchange artifacts and the old submodel before re-provisioning.
    /// The shell survives.
    Update,
    /// Clears everything, including the registry shell.
    Entity,
}

impl CompensationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationScope::Update => "update",
            CompensationScope::Entity => "entity",
        }
    }
}

/// Result of one deletion step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Deleted,
    AlreadyGone,
    Failed(String),
}

/// One deletion step: what was targeted and how it went.
#[derive(Debug, Clone)]
pub struct CompensationStep {
    pub target: &'static str,
    pub id: String,
    pub outcome: StepOutcome,
}

/// The full trace of one compensation run.
#[derive(Debug, Clone, Default)]
pub struct CompensationReport {
    pub steps: Vec<CompensationStep>,
}

impl CompensationReport {
    pub fn fully_succeeded(&self) -> bool {
        !self
            .steps
            .iter()
            .any(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }

    /// Joined description of the failed steps, if any.
    pub fn failure_summary(&self) -> Option<String> {
        let failures: Vec<String> = self
            .steps
            .iter()
            .filter_map(|s| match &s.outcome {
                StepOutcome::Failed(message) => Some(format!("{} {}: {}", s.target, s.id, message)),
                _ => None,
            })
            .collect();
        if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        }
    }

    fn record_step(&mut self, target: &'static str, id: &str, result: ConnectorResult<()>) {
        let outcome = match result {
            Ok(()) => StepOutcome::Deleted,
            Err(ConnectorError::NotFound(_)) => StepOutcome::AlreadyGone,
            Err(err) => {
                warn!(target_resource = target, id, error = %err, "compensation step failed");
                StepOutcome::Failed(err.to_string())
            }
        };
        self.steps.push(CompensationStep {
            target,
            id: id.to_string(),
            outcome,
        });
    }
}

/// Tears provisioned artifacts down, update- or entity-scoped.
#[derive(Clone)]
pub struct DeleteFacilitator {
    registry: Arc<dyn RegistryConnector>,
    exchange: Arc<dyn ExchangeConnector>,
    metrics: PipelineMetrics,
}

impl DeleteFacilitator {
    pub fn new(
        registry: Arc<dyn RegistryConnector>,
        exchange: Arc<dyn ExchangeConnector>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            registry,
            exchange,
            metrics,
        }
    }

    /// Deletes the artifacts recorded for one row. Failed steps are
    /// reported, not propagated; the caller decides whether to proceed.
    #[instrument(skip(self, record), fields(business_key = %record.business_key, scope = scope.as_str()))]
    pub async fn compensate(
        &self,
        record: &OutcomeRecord,
        scope: CompensationScope,
    ) -> CompensationReport {
        let mut report = CompensationReport::default();

        report.record_step(
            "contract_definition",
            &record.contract_definition_id,
            self.exchange
                .delete_contract_definition(&record.contract_definition_id)
                .await,
        );
        report.record_step(
            "access_policy",
            &record.access_policy_id,
            self.exchange
                .delete_policy_definition(&record.access_policy_id)
                .await,
        );
        report.record_step(
            "usage_policy",
            &record.usage_policy_id,
            self.exchange
                .delete_policy_definition(&record.usage_policy_id)
                .await,
        );
        report.record_step(
            "asset",
            &record.asset_id,
            self.exchange.delete_asset(&record.asset_id).await,
        );
        report.record_step(
            "submodel",
            &record.submodel_id,
            self.registry
                .delete_submodel(&record.shell_id, &record.submodel_id)
                .await,
        );
        if scope == CompensationScope::Entity {
            report.record_step(
                "shell",
                &record.shell_id,
                self.registry.delete_shell(&record.shell_id).await,
            );
        }

        self.metrics.compensation_run(scope.as_str());
        info!(
            steps = report.steps.len(),
            complete = report.fully_succeeded(),
            "compensation finished"
        );
        report
    }
}
