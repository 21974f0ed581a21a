//! Digital-twin registry connector implementations.

mod aas;
mod mock;

pub use aas::{AasRegistryClient, AasRegistryConfig};
pub use mock::MockRegistry;
