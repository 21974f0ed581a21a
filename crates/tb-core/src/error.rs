//! Row-scoped error taxonomy.
//!
//! Every pipeline failure is attributed to a single row and a single
//! stage; the stage ends up as a label on the failure log entry and the
//! failure metrics.

use crate::store::StoreError;
use tb_connectors::ConnectorError;
use thiserror::Error;

/// Pipeline stage a row failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStage {
    /// Row-level field validation.
    Validation,
    /// Digital-twin registry interaction.
    Registry,
    /// Data-exchange connector interaction.
    Exchange,
    /// Outcome or failure-log persistence.
    Persistence,
    /// Compensating deletion of previously provisioned artifacts.
    Compensation,
}

impl ProvisioningStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStage::Validation => "validation",
            ProvisioningStage::Registry => "registry",
            ProvisioningStage::Exchange => "exchange",
            ProvisioningStage::Persistence => "persistence",
            ProvisioningStage::Compensation => "compensation",
        }
    }
}

impl std::fmt::Display for ProvisioningStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong for one row.
#[derive(Error, Debug)]
pub enum RowErrorKind {
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// More than one shell matched the row's identifier set.
    #[error("ambiguous shell identity for {0}")]
    AmbiguousIdentity(String),

    /// A submodel with this short id is already registered under the shell.
    #[error("submodel {0} already registered under shell {1}")]
    SubmodelConflict(String, String),

    /// The relationship's parent has no live outcome record.
    #[error("no provisioned parent found for {0}")]
    ParentNotFound(String),

    /// Compensation left artifacts behind; the row cannot proceed.
    #[error("compensation incomplete: {0}")]
    CompensationFailed(String),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A failure scoped to a single row, tagged with its pipeline stage.
#[derive(Error, Debug)]
#[error("row {row_number}: {stage}: {kind}")]
pub struct RowError {
    pub row_number: u32,
    pub stage: ProvisioningStage,
    #[source]
    pub kind: RowErrorKind,
}

impl RowError {
    pub fn new(row_number: u32, stage: ProvisioningStage, kind: RowErrorKind) -> Self {
        Self {
            row_number,
            stage,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_error_display_includes_stage() {
        let err = RowError::new(
            3,
            ProvisioningStage::Registry,
            RowErrorKind::AmbiguousIdentity("manufacturerPartId=P1".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "row 3: registry: ambiguous shell identity for manufacturerPartId=P1"
        );
    }

    #[test]
    fn test_validation_errors_are_joined() {
        let err = RowErrorKind::Validation(vec![
            "manufacturer_part_id: must not be blank".to_string(),
            "quantity: must be positive".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: manufacturer_part_id: must not be blank; quantity: must be positive"
        );
    }
}
