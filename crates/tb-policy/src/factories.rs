//! Governance request factories.
//!
//! Builders for the asset, policy definition, and contract definition
//! requests the exchange connector consumes. Policy and contract ids are
//! freshly generated per request; the asset id is deterministic so the
//! pipeline can detect an already-provisioned row by direct lookup.

use std::collections::HashMap;
use tb_connectors::{
    AssetRequest, ContractDefinitionRequest, DataAddress, PolicyConstraint,
    PolicyDefinitionRequest,
};
use uuid::Uuid;

const HTTP_DATA_TYPE: &str = "HttpData";
const CONTENT_TYPE_JSON: &str = "application/json";

/// Builds asset requests with deterministic ids.
#[derive(Debug, Clone)]
pub struct AssetRequestFactory {
    /// Public endpoint of the data plane the assets front.
    pub exchange_endpoint: String,
    /// Provider business-partner number, part of every endpoint address.
    pub manufacturer_id: String,
}

impl AssetRequestFactory {
    pub fn new(exchange_endpoint: impl Into<String>, manufacturer_id: impl Into<String>) -> Self {
        Self {
            exchange_endpoint: exchange_endpoint.into(),
            manufacturer_id: manufacturer_id.into(),
        }
    }

    /// Deterministic asset id for a provisioned row.
    ///
    /// Derived from the submodel kind prefix, the shell id, the submodel id,
    /// and the row's business key; existence checks are direct lookups on
    /// this id.
    pub fn asset_id(kind_prefix: &str, shell_id: &str, submodel_id: &str, uuid: &str) -> String {
        format!("{}-{}-{}-{}", kind_prefix, shell_id, submodel_id, uuid)
    }

    /// Builds the asset creation request for a provisioned submodel.
    pub fn asset_request(
        &self,
        kind_prefix: &str,
        display_name: &str,
        shell_id: &str,
        submodel_id: &str,
        uuid: &str,
    ) -> AssetRequest {
        let asset_id = Self::asset_id(kind_prefix, shell_id, submodel_id, uuid);
        let base_url = format!(
            "{}/{}/{}-{}/submodel?content=value",
            self.exchange_endpoint.trim_end_matches('/'),
            self.manufacturer_id,
            shell_id,
            submodel_id
        );

        let mut properties = HashMap::new();
        properties.insert("asset:prop:id".to_string(), asset_id.clone());
        properties.insert("asset:prop:name".to_string(), display_name.to_string());

        AssetRequest {
            asset_id,
            name: display_name.to_string(),
            description: format!("{} data endpoint", display_name),
            content_type: CONTENT_TYPE_JSON.to_string(),
            properties,
            data_address: DataAddress {
                base_url,
                address_type: HTTP_DATA_TYPE.to_string(),
            },
        }
    }
}

/// Builds policy definition requests with generated ids.
#[derive(Debug, Clone, Default)]
pub struct PolicyRequestFactory;

impl PolicyRequestFactory {
    /// Builds a policy definition from a constraint set plus extensible
    /// properties (the custom usage value travels here).
    pub fn policy_request(
        constraints: Vec<PolicyConstraint>,
        extensible_properties: HashMap<String, String>,
    ) -> PolicyDefinitionRequest {
        PolicyDefinitionRequest {
            id: Uuid::new_v4().to_string(),
            constraints,
            extensible_properties,
        }
    }
}

/// Builds contract definition requests binding an asset to its policies.
#[derive(Debug, Clone, Default)]
pub struct ContractDefinitionFactory;

impl ContractDefinitionFactory {
    pub fn contract_request(
        asset_id: &str,
        access_policy_id: &str,
        usage_policy_id: &str,
    ) -> ContractDefinitionRequest {
        ContractDefinitionRequest {
            id: Uuid::new_v4().to_string(),
            asset_id: asset_id.to_string(),
            access_policy_id: access_policy_id.to_string(),
            usage_policy_id: usage_policy_id.to_string(),
        }
    }
}
