//! Data-exchange connector implementations.

mod edc;
mod mock;

pub use edc::{EdcConfig, EdcManagementClient};
pub use mock::MockExchange;
