//! Connector trait definitions for Twinbridge.
//!
//! This module defines the interfaces consumed by the provisioning pipeline
//! and the wire types both external systems understand: the digital-twin
//! registry (shells, submodels) and the data-exchange connector (assets,
//! policy definitions, contract definitions).

use crate::secure_string::SecureString;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur in connectors.
#[derive(Error, Debug, Clone)]
pub enum ConnectorError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Configuration for a connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Connector name/identifier.
    pub name: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum retries for transient failures.
    pub max_retries: u32,
    /// Additional headers to include on every request.
    pub headers: HashMap<String, String>,
}

/// Authentication configuration.
///
/// Credential fields use [`SecureString`] so sensitive data is zeroized
/// from memory when no longer needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication.
    None,
    /// API key in a custom header.
    ApiKey {
        /// The API key (zeroized on drop).
        key: SecureString,
        /// The header name carrying the key.
        header_name: String,
    },
    /// Bearer token authentication.
    BearerToken {
        /// The bearer token (zeroized on drop).
        token: SecureString,
    },
    /// Basic authentication.
    Basic {
        /// The username.
        username: String,
        /// The password (zeroized on drop).
        password: SecureString,
    },
    /// OAuth2 client credentials, the scheme both the registry and the
    /// exchange connector use in managed deployments.
    OAuth2 {
        /// The client ID.
        client_id: String,
        /// The client secret (zeroized on drop).
        client_secret: SecureString,
        /// The token URL.
        token_url: String,
        /// The scopes to request.
        scopes: Vec<String>,
    },
}

/// A single local identifier pair (e.g. `manufacturerPartId` → `PART-0001`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentifier {
    pub key: String,
    pub value: String,
}

/// The set of local identifiers a shell is looked up by.
///
/// Lookup semantics: a shell matches when every pair in this set is present
/// among the shell's specific asset ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellIdentifiers {
    pub identifiers: Vec<LocalIdentifier>,
}

impl ShellIdentifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a local identifier pair.
    pub fn add(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.identifiers.push(LocalIdentifier {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Compact form for log messages and error text.
    pub fn to_query_string(&self) -> String {
        self.identifiers
            .iter()
            .map(|id| format!("{}={}", id.key, id.value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Request to create a shell descriptor in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellDescriptorRequest {
    /// Registry identification, `urn:uuid:` form.
    pub id: String,
    /// Short, human-readable id (`{name}_{manufacturerId}_{manufacturerPartId}`).
    pub id_short: String,
    /// Global asset id, the row's business key.
    pub global_asset_id: String,
    /// Local identifiers the shell is discoverable by.
    pub specific_asset_ids: Vec<LocalIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Response from a shell descriptor creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellDescriptorResponse {
    /// The registry-assigned shell identification.
    pub identification: String,
    pub id_short: String,
}

/// A submodel descriptor, used both for registration and listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmodelDescriptor {
    /// Submodel identification, `urn:uuid:` form.
    pub identification: String,
    /// Short id identifying the submodel kind under its shell.
    pub id_short: String,
    /// Semantic model references.
    pub semantic_id: Vec<String>,
    /// Address of the data endpoint backing this submodel.
    pub endpoint_address: String,
}

/// Address of the data plane endpoint an asset fronts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataAddress {
    /// Base URL the connector proxies to.
    pub base_url: String,
    /// Address type understood by the connector (e.g. `HttpData`).
    #[serde(rename = "type")]
    pub address_type: String,
}

/// Request to create an asset in the exchange connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRequest {
    /// Deterministic asset id derived from the provisioned identities.
    pub asset_id: String,
    /// Display name of the asset.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Content type served by the endpoint.
    pub content_type: String,
    /// Additional asset properties.
    pub properties: HashMap<String, String>,
    /// The data endpoint this asset exposes.
    pub data_address: DataAddress,
}

/// A single policy constraint (left operand, operator, right operand).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConstraint {
    pub left_operand: String,
    pub operator: String,
    pub right_operand: String,
}

/// Request to create a policy definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDefinitionRequest {
    /// Generated policy definition id.
    pub id: String,
    /// Constraint set; unordered, deduplicated by constraint kind.
    pub constraints: Vec<PolicyConstraint>,
    /// Free-form extensions (e.g. the value of a custom usage policy).
    pub extensible_properties: HashMap<String, String>,
}

/// Request to create a contract definition binding an asset to its policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDefinitionRequest {
    /// Generated contract definition id.
    pub id: String,
    /// The governed asset.
    pub asset_id: String,
    /// Access policy definition id.
    pub access_policy_id: String,
    /// Usage policy definition id.
    pub usage_policy_id: String,
}

/// Digital-twin registry connector.
///
/// Shells are resolved by local identifier sets; submodels are registered
/// under a shell and addressed by their identification.
#[async_trait]
pub trait RegistryConnector: Send + Sync {
    /// Looks up shell ids matching the given local identifier set.
    async fn lookup_shells(&self, identifiers: &ShellIdentifiers) -> ConnectorResult<Vec<String>>;

    /// Creates a shell descriptor and returns the registry-assigned id.
    async fn create_shell(&self, request: &ShellDescriptorRequest) -> ConnectorResult<String>;

    /// Lists the submodel descriptors registered under a shell.
    async fn list_submodels(&self, shell_id: &str) -> ConnectorResult<Vec<SubmodelDescriptor>>;

    /// Registers a submodel under a shell and returns its identification.
    async fn create_submodel(
        &self,
        shell_id: &str,
        request: &SubmodelDescriptor,
    ) -> ConnectorResult<String>;

    /// Deletes a submodel from a shell.
    async fn delete_submodel(&self, shell_id: &str, submodel_id: &str) -> ConnectorResult<()>;

    /// Deletes a shell descriptor.
    async fn delete_shell(&self, shell_id: &str) -> ConnectorResult<()>;
}

/// Data-exchange connector management API.
///
/// Asset ids are deterministic, so existence is a direct lookup rather than
/// a search. Deletions return [`ConnectorError::NotFound`] for resources that
/// are already gone; compensation treats that as success.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    /// Returns whether an asset with the given id exists.
    async fn asset_exists(&self, asset_id: &str) -> ConnectorResult<bool>;

    /// Creates an asset.
    async fn create_asset(&self, request: &AssetRequest) -> ConnectorResult<()>;

    /// Deletes an asset.
    async fn delete_asset(&self, asset_id: &str) -> ConnectorResult<()>;

    /// Creates a policy definition and returns its id.
    async fn create_policy_definition(
        &self,
        request: &PolicyDefinitionRequest,
    ) -> ConnectorResult<String>;

    /// Deletes a policy definition.
    async fn delete_policy_definition(&self, policy_id: &str) -> ConnectorResult<()>;

    /// Creates a contract definition and returns its id.
    async fn create_contract_definition(
        &self,
        request: &ContractDefinitionRequest,
    ) -> ConnectorResult<String>;

    /// Deletes a contract definition.
    async fn delete_contract_definition(&self, contract_id: &str) -> ConnectorResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_identifiers_query_string() {
        let ids = ShellIdentifiers::new()
            .add("manufacturerPartId", "PART-1")
            .add("manufacturerId", "BPNL000000000001");
        assert_eq!(
            ids.to_query_string(),
            "manufacturerPartId=PART-1,manufacturerId=BPNL000000000001"
        );
    }

    #[test]
    fn test_shell_descriptor_request_serializes_camel_case() {
        let request = ShellDescriptorRequest {
            id: "urn:uuid:1".to_string(),
            id_short: "part_bpnl_p1".to_string(),
            global_asset_id: "urn:uuid:2".to_string(),
            specific_asset_ids: vec![LocalIdentifier {
                key: "manufacturerPartId".to_string(),
                value: "P1".to_string(),
            }],
            description: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["idShort"], "part_bpnl_p1");
        assert_eq!(json["globalAssetId"], "urn:uuid:2");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_data_address_type_field() {
        let address = DataAddress {
            base_url: "https://provider.example.com/data".to_string(),
            address_type: "HttpData".to_string(),
        };
        let json = serde_json::to_value(&address).unwrap();
        assert_eq!(json["type"], "HttpData");
    }

    #[test]
    fn test_connector_error_display() {
        let err = ConnectorError::RateLimited(30);
        assert_eq!(err.to_string(), "Rate limited: retry after 30 seconds");
    }
}
