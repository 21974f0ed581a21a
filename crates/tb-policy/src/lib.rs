//! # tb-policy
//!
//! Policy construction for Twinbridge.
//!
//! This crate translates row-level usage declarations and access
//! business-partner lists into the constraint sets and governance requests
//! the exchange connector consumes. Everything here is pure: no remote
//! calls, no clocks, no state beyond the configured endpoints.

pub mod constraints;
pub mod factories;

pub use constraints::{
    PolicyConstraintBuilder, UsagePolicyDeclaration, UsagePolicyError, UsagePolicyKind,
};
pub use factories::{AssetRequestFactory, ContractDefinitionFactory, PolicyRequestFactory};
