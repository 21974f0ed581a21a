//! Row validation, the first pipeline stage.
//!
//! A row failing any check is rejected before it reaches a connector.
//! Checks are accumulated so one failure report names every bad field.

use crate::model::{PartRow, RelationshipRow, Row};
use std::collections::HashSet;
use std::fmt;
use tb_policy::UsagePolicyDeclaration;

/// BPN format: `BPNL` followed by twelve alphanumerics.
const BPN_PREFIX: &str = "BPNL";
const BPN_LENGTH: usize = 16;

const URN_UUID_PREFIX: &str = "urn:uuid:";

/// One failed field check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validates one row, returning every violation found.
pub fn validate(row: &Row) -> Result<(), Vec<FieldViolation>> {
    let mut violations = Vec::new();

    check_business_key(row.business_key(), &mut violations);
    match row {
        Row::Part(part) => validate_part(part, &mut violations),
        Row::Relationship(rel) => validate_relationship(rel, &mut violations),
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn validate_part(part: &PartRow, violations: &mut Vec<FieldViolation>) {
    require("manufacturer_part_id", &part.manufacturer_part_id, violations);
    require("part_instance_id", &part.part_instance_id, violations);
    require("name_at_manufacturer", &part.name_at_manufacturer, violations);
    check_bpns(&part.bpn_numbers, violations);
    check_usage_policies(&part.usage_policies, violations);
}

fn validate_relationship(rel: &RelationshipRow, violations: &mut Vec<FieldViolation>) {
    require("parent_uuid", &rel.parent_uuid, violations);
    require("child_uuid", &rel.child_uuid, violations);
    require("measurement_unit", &rel.measurement_unit, violations);
    if !rel.quantity.is_finite() || rel.quantity <= 0.0 {
        violations.push(FieldViolation::new("quantity", "must be positive"));
    }
    check_bpns(&rel.bpn_numbers, violations);
    check_usage_policies(&rel.usage_policies, violations);
}

fn require(field: &str, value: &str, violations: &mut Vec<FieldViolation>) {
    if value.trim().is_empty() {
        violations.push(FieldViolation::new(field, "must not be blank"));
    }
}

fn check_business_key(key: &str, violations: &mut Vec<FieldViolation>) {
    // Blank keys are generated at intake, so only a malformed supplied key
    // is a violation here.
    if !key.trim().is_empty() && !key.starts_with(URN_UUID_PREFIX) {
        violations.push(FieldViolation::new(
            "uuid",
            format!("must be a {}-prefixed identifier", URN_UUID_PREFIX),
        ));
    }
}

fn check_bpns(bpn_numbers: &[String], violations: &mut Vec<FieldViolation>) {
    for bpn in bpn_numbers {
        if !is_valid_bpn(bpn) {
            violations.push(FieldViolation::new(
                "bpn_numbers",
                format!("invalid business partner number: {}", bpn),
            ));
        }
    }
}

fn check_usage_policies(
    declarations: &[UsagePolicyDeclaration],
    violations: &mut Vec<FieldViolation>,
) {
    // at most one declaration per kind
    let mut seen = HashSet::new();
    for declaration in declarations {
        if !seen.insert(declaration.kind) {
            violations.push(FieldViolation::new(
                "usage_policies",
                format!("duplicate declaration for kind {}", declaration.kind),
            ));
        }
    }
}

fn is_valid_bpn(bpn: &str) -> bool {
    bpn.len() == BPN_LENGTH
        && bpn.starts_with(BPN_PREFIX)
        && bpn[BPN_PREFIX.len()..].chars().all(|c| c.is_ascii_alphanumeric())
}
