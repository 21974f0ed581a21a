//! Usage and access constraint construction.
//!
//! Rows declare usage policies as `(kind, value)` pairs and access rules as
//! a list of business-partner numbers. This module turns both into the
//! constraint sets attached to policy definitions. Constraint sets are
//! unordered; usage declarations are deduplicated so at most one value per
//! kind survives.

use serde::{Deserialize, Serialize};
use tb_connectors::PolicyConstraint;
use thiserror::Error;

/// Operator used by all generated constraints.
const OPERATOR_EQ: &str = "EQ";

/// Left operand of access constraints.
const BUSINESS_PARTNER_OPERAND: &str = "BusinessPartnerNumber";

/// Errors raised while interpreting usage declarations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsagePolicyError {
    #[error("Unknown usage policy kind: {0}")]
    UnknownKind(String),
}

/// The usage policy kinds a row may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsagePolicyKind {
    /// Time-bounded usage.
    Duration,
    /// Usage restricted to a consumer role.
    Role,
    /// Usage restricted to a declared purpose.
    Purpose,
    /// Free-form value, carried as an extensible property rather than a
    /// constraint.
    Custom,
}

impl UsagePolicyKind {
    /// Stable string form used in constraints and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            UsagePolicyKind::Duration => "DURATION",
            UsagePolicyKind::Role => "ROLE",
            UsagePolicyKind::Purpose => "PURPOSE",
            UsagePolicyKind::Custom => "CUSTOM",
        }
    }

    /// Parses a kind from its stable string form.
    pub fn parse(s: &str) -> Result<Self, UsagePolicyError> {
        match s {
            "DURATION" => Ok(UsagePolicyKind::Duration),
            "ROLE" => Ok(UsagePolicyKind::Role),
            "PURPOSE" => Ok(UsagePolicyKind::Purpose),
            "CUSTOM" => Ok(UsagePolicyKind::Custom),
            other => Err(UsagePolicyError::UnknownKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for UsagePolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One usage policy declaration from a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePolicyDeclaration {
    #[serde(rename = "type")]
    pub kind: UsagePolicyKind,
    pub value: String,
}

/// Builds constraint sets from row-level declarations.
pub struct PolicyConstraintBuilder;

impl PolicyConstraintBuilder {
    /// Usage declarations → usage constraint set.
    ///
    /// At most one constraint per kind (first declaration wins); `CUSTOM`
    /// declarations and blank values produce no constraint.
    pub fn usage_constraints(declarations: &[UsagePolicyDeclaration]) -> Vec<PolicyConstraint> {
        let mut seen: Vec<UsagePolicyKind> = Vec::new();
        let mut constraints = Vec::new();

        for declaration in declarations {
            if declaration.kind == UsagePolicyKind::Custom
                || declaration.value.trim().is_empty()
                || seen.contains(&declaration.kind)
            {
                continue;
            }
            seen.push(declaration.kind);
            constraints.push(PolicyConstraint {
                left_operand: declaration.kind.as_str().to_string(),
                operator: OPERATOR_EQ.to_string(),
                right_operand: declaration.value.clone(),
            });
        }

        constraints
    }

    /// Business-partner list → access constraint set, one per distinct BPN.
    pub fn access_constraints(bpn_numbers: &[String]) -> Vec<PolicyConstraint> {
        let mut seen: Vec<&str> = Vec::new();
        let mut constraints = Vec::new();

        for bpn in bpn_numbers {
            let bpn = bpn.trim();
            if bpn.is_empty() || seen.contains(&bpn) {
                continue;
            }
            seen.push(bpn);
            constraints.push(PolicyConstraint {
                left_operand: BUSINESS_PARTNER_OPERAND.to_string(),
                operator: OPERATOR_EQ.to_string(),
                right_operand: bpn.to_string(),
            });
        }

        constraints
    }

    /// The value of the first `CUSTOM` declaration, if any and non-blank.
    pub fn custom_value(declarations: &[UsagePolicyDeclaration]) -> Option<String> {
        declarations
            .iter()
            .find(|d| d.kind == UsagePolicyKind::Custom && !d.value.trim().is_empty())
            .map(|d| d.value.clone())
    }
}
