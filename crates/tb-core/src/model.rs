//! Core data model for the provisioning pipeline.
//!
//! Rows are the pipeline's input, immutable once parsed. [`OutcomeRecord`]
//! is its durable output: the five provisioned identifiers plus a soft
//! delete flag, keyed by the row's business key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tb_policy::UsagePolicyDeclaration;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while parsing stored model values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Unknown submodel kind: {0}")]
    UnknownSubmodelKind(String),

    #[error("Unknown lifecycle phase: {0}")]
    UnknownLifecyclePhase(String),
}

/// Lifecycle phase a part row is provisioned under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecyclePhase {
    AsBuilt,
    AsPlanned,
}

impl LifecyclePhase {
    /// Stable string form, used as a shell identifier value.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::AsBuilt => "AsBuilt",
            LifecyclePhase::AsPlanned => "AsPlanned",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ModelError> {
        match s {
            "AsBuilt" => Ok(LifecyclePhase::AsBuilt),
            "AsPlanned" => Ok(LifecyclePhase::AsPlanned),
            other => Err(ModelError::UnknownLifecyclePhase(other.to_string())),
        }
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of submodel a row provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmodelKind {
    /// A serialized part, identified by its serial number.
    SerialPart,
    /// A production batch, identified by its batch id.
    Batch,
    /// A parent-child assembly relationship between two as-built parts.
    AssemblyRelationship,
    /// A single-level bill-of-material link between two as-planned parts.
    SingleLevelBomAsPlanned,
}

impl SubmodelKind {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmodelKind::SerialPart => "serial_part",
            SubmodelKind::Batch => "batch",
            SubmodelKind::AssemblyRelationship => "assembly_relationship",
            SubmodelKind::SingleLevelBomAsPlanned => "single_level_bom_as_planned",
        }
    }

    /// Parses a kind from its stable string form.
    pub fn parse(s: &str) -> Result<Self, ModelError> {
        match s {
            "serial_part" => Ok(SubmodelKind::SerialPart),
            "batch" => Ok(SubmodelKind::Batch),
            "assembly_relationship" => Ok(SubmodelKind::AssemblyRelationship),
            "single_level_bom_as_planned" => Ok(SubmodelKind::SingleLevelBomAsPlanned),
            other => Err(ModelError::UnknownSubmodelKind(other.to_string())),
        }
    }

    /// The short id this kind registers under its shell. At most one
    /// submodel per short id may exist per shell.
    pub fn id_short(&self) -> &'static str {
        match self {
            SubmodelKind::SerialPart => "serialPartTypization",
            SubmodelKind::Batch => "batch",
            SubmodelKind::AssemblyRelationship => "assemblyPartRelationship",
            SubmodelKind::SingleLevelBomAsPlanned => "singleLevelBomAsPlanned",
        }
    }

    /// Semantic model reference attached to registered submodels.
    pub fn semantic_id(&self) -> &'static str {
        match self {
            SubmodelKind::SerialPart => {
                "urn:bamm:io.catenax.serial_part_typization:1.1.0#SerialPartTypization"
            }
            SubmodelKind::Batch => "urn:bamm:io.catenax.batch:1.0.0#Batch",
            SubmodelKind::AssemblyRelationship => {
                "urn:bamm:io.catenax.assembly_part_relationship:1.1.1#AssemblyPartRelationship"
            }
            SubmodelKind::SingleLevelBomAsPlanned => {
                "urn:bamm:io.catenax.single_level_bom_as_planned:1.0.1#SingleLevelBomAsPlanned"
            }
        }
    }

    /// Prefix of the deterministic asset id.
    pub fn asset_prefix(&self) -> &'static str {
        match self {
            SubmodelKind::SerialPart => "serialpart",
            SubmodelKind::Batch => "batch",
            SubmodelKind::AssemblyRelationship => "assemblyrelationship",
            SubmodelKind::SingleLevelBomAsPlanned => "singlelevelbomasplanned",
        }
    }

    /// Human-readable name used in asset metadata.
    pub fn display_name(&self) -> &'static str {
        match self {
            SubmodelKind::SerialPart => "Serialized Part",
            SubmodelKind::Batch => "Batch",
            SubmodelKind::AssemblyRelationship => "Assembly Part Relationship",
            SubmodelKind::SingleLevelBomAsPlanned => "Single Level BoM As Planned",
        }
    }
}

impl std::fmt::Display for SubmodelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A part or batch row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartRow {
    /// One-based position in the submitted batch.
    pub row_number: u32,
    /// Business key, `urn:uuid:` form. Generated at intake when blank.
    pub uuid: String,
    /// Which submodel this row provisions ([`SubmodelKind::SerialPart`] or
    /// [`SubmodelKind::Batch`]).
    pub kind: SubmodelKind,
    pub lifecycle: LifecyclePhase,
    pub manufacturer_part_id: String,
    pub customer_part_id: Option<String>,
    /// Serial number or batch id, depending on `kind`.
    pub part_instance_id: String,
    pub name_at_manufacturer: String,
    /// The row's full payload, served from the data plane the asset fronts.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Usage policy declarations attached to the provisioned asset.
    pub usage_policies: Vec<UsagePolicyDeclaration>,
    /// Business partners granted access.
    pub bpn_numbers: Vec<String>,
}

/// A relationship row linking two provisioned parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRow {
    pub row_number: u32,
    /// Business key of the relationship itself.
    pub uuid: String,
    /// Business key of the parent part; must already be provisioned.
    pub parent_uuid: String,
    /// Business key of the child part.
    pub child_uuid: String,
    pub lifecycle: LifecyclePhase,
    pub quantity: f64,
    pub measurement_unit: String,
    pub usage_policies: Vec<UsagePolicyDeclaration>,
    pub bpn_numbers: Vec<String>,
}

impl RelationshipRow {
    /// As-built relationships provision the assembly relationship submodel,
    /// as-planned ones the single-level BoM.
    pub fn kind(&self) -> SubmodelKind {
        match self.lifecycle {
            LifecyclePhase::AsBuilt => SubmodelKind::AssemblyRelationship,
            LifecyclePhase::AsPlanned => SubmodelKind::SingleLevelBomAsPlanned,
        }
    }
}

/// One pipeline input row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Row {
    Part(PartRow),
    Relationship(RelationshipRow),
}

impl Row {
    pub fn row_number(&self) -> u32 {
        match self {
            Row::Part(p) => p.row_number,
            Row::Relationship(r) => r.row_number,
        }
    }

    /// The business key this row is provisioned under.
    pub fn business_key(&self) -> &str {
        match self {
            Row::Part(p) => &p.uuid,
            Row::Relationship(r) => &r.uuid,
        }
    }

    pub fn kind(&self) -> SubmodelKind {
        match self {
            Row::Part(p) => p.kind,
            Row::Relationship(r) => r.kind(),
        }
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self, Row::Relationship(_))
    }

    /// Returns the row with a generated business key when none was supplied.
    pub fn with_business_key(mut self) -> Self {
        let key = match &mut self {
            Row::Part(p) => &mut p.uuid,
            Row::Relationship(r) => &mut r.uuid,
        };
        if key.trim().is_empty() {
            *key = format!("urn:uuid:{}", Uuid::new_v4());
        }
        self
    }
}

/// The durable result of one provisioned row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    /// The batch the row arrived in.
    pub process_id: String,
    pub row_number: u32,
    /// Business key; the record's primary key.
    pub business_key: String,
    pub kind: SubmodelKind,
    pub shell_id: String,
    pub submodel_id: String,
    pub asset_id: String,
    pub access_policy_id: String,
    pub usage_policy_id: String,
    pub contract_definition_id: String,
    /// Soft delete flag; deleted records stay queryable.
    pub deleted: bool,
    pub created_on: DateTime<Utc>,
}

/// One entry in the per-process failure log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureLogEntry {
    pub id: String,
    pub process_id: String,
    /// The failed row, if the failure is row-scoped.
    pub row_number: Option<u32>,
    /// Pipeline stage the failure is attributed to.
    pub stage: String,
    pub message: String,
    pub created_on: DateTime<Utc>,
}

impl FailureLogEntry {
    pub fn new(
        process_id: &str,
        row_number: Option<u32>,
        stage: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            process_id: process_id.to_string(),
            row_number,
            stage: stage.to_string(),
            message: message.into(),
            created_on: Utc::now(),
        }
    }
}
