//! # tb-core
//!
//! Row provisioning pipeline for Twinbridge.
//!
//! Rows describing parts, batches, and part relationships (as built and as
//! planned) are turned into
//! digital-twin registry entries (shells, submodels) and data-exchange
//! governance artifacts (assets, policies, contract definitions). The
//! pipeline is idempotent per business key: resubmitting a row tears the
//! old exchange artifacts down before provisioning fresh ones, and every
//! failure is isolated to the row it occurred in.

pub mod compensation;
pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod orchestrator;
pub mod provisioning;
pub mod service;
pub mod store;
pub mod validation;

pub use compensation::{
    CompensationReport, CompensationScope, CompensationStep, DeleteFacilitator, StepOutcome,
};
pub use config::PipelineConfig;
pub use error::{ProvisioningStage, RowError, RowErrorKind};
pub use identity::{IdentityResolver, ResolvedShell};
pub use model::{
    FailureLogEntry, LifecyclePhase, OutcomeRecord, PartRow, RelationshipRow, Row, SubmodelKind,
};
pub use orchestrator::{BatchOrchestrator, BatchStats, KeyedLocks, RowOrchestrator};
pub use provisioning::{GovernanceIds, GovernanceProvisioner};
pub use service::{DeleteSummary, ProvisioningService};
pub use store::{
    FailureLogStore, InMemoryFailureLog, InMemoryOutcomeStore, OutcomeStore, StoreError,
};
#[cfg(feature = "database")]
pub use store::{SqliteFailureLog, SqliteOutcomeStore};
pub use validation::{validate, FieldViolation};
