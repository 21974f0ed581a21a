//! # tb-connectors
//!
//! Connector clients for the external systems Twinbridge provisions:
//! the digital-twin registry (shell/submodel descriptors) and the
//! data-exchange connector (assets, policies, contract definitions).
//!
//! This crate provides the trait definitions, the wire types both systems
//! consume, HTTP client implementations, and in-memory mocks with call
//! recording for orchestrator tests.

pub mod exchange;
pub mod http;
pub mod registry;
pub mod secure_string;
pub mod testing;
pub mod traits;

pub use secure_string::SecureString;

// Re-export traits and wire types
pub use traits::{
    AssetRequest,
    AuthConfig,
    ConnectorConfig,
    ConnectorError,
    ConnectorResult,
    ContractDefinitionRequest,
    DataAddress,
    ExchangeConnector,
    LocalIdentifier,
    PolicyConstraint,
    PolicyDefinitionRequest,
    RegistryConnector,
    ShellDescriptorRequest,
    ShellDescriptorResponse,
    ShellIdentifiers,
    SubmodelDescriptor,
};

// Re-export connector implementations
pub use exchange::{EdcConfig, EdcManagementClient, MockExchange};
pub use registry::{AasRegistryClient, AasRegistryConfig, MockRegistry};
pub use testing::RecordedCall;
