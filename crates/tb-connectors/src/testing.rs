//! Testing harness for connector implementations.
//!
//! Helper constructors shared by the connector unit tests and by the
//! pipeline tests in downstream crates.

use crate::traits::{
    AuthConfig, ConnectorConfig, LocalIdentifier, ShellDescriptorRequest, SubmodelDescriptor,
};
use std::collections::HashMap;

/// One recorded mock-connector call: operation name plus its primary target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: String,
    pub target: String,
}

/// Creates a test connector config with sensible defaults.
pub fn test_connector_config(name: &str, base_url: &str) -> ConnectorConfig {
    ConnectorConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        auth: AuthConfig::None,
        timeout_secs: 30,
        max_retries: 0,
        headers: HashMap::new(),
    }
}

/// Creates a test connector config with bearer token auth.
pub fn test_connector_config_with_bearer(
    name: &str,
    base_url: &str,
    token: &str,
) -> ConnectorConfig {
    ConnectorConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        auth: AuthConfig::BearerToken {
            token: crate::SecureString::from(token),
        },
        timeout_secs: 30,
        max_retries: 0,
        headers: HashMap::new(),
    }
}

/// Creates a sample shell descriptor request for a manufacturer part id.
pub fn sample_shell_request(global_asset_id: &str, part_id: &str) -> ShellDescriptorRequest {
    ShellDescriptorRequest {
        id: format!("urn:uuid:shell-{}", part_id),
        id_short: format!("part_{}", part_id),
        global_asset_id: global_asset_id.to_string(),
        specific_asset_ids: vec![LocalIdentifier {
            key: "manufacturerPartId".to_string(),
            value: part_id.to_string(),
        }],
        description: None,
    }
}

/// Creates a sample submodel descriptor.
pub fn sample_submodel(identification: &str, id_short: &str) -> SubmodelDescriptor {
    SubmodelDescriptor {
        identification: identification.to_string(),
        id_short: id_short.to_string(),
        semantic_id: vec!["urn:bamm:io.catenax.serial_part:1.0.0#SerialPart".to_string()],
        endpoint_address: "https://provider.example.com/data/submodel".to_string(),
    }
}
