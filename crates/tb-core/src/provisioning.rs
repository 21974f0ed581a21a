//! Exchange-side provisioning.
//!
//! One provisioned row owns exactly one asset, one access policy, one
//! usage policy, and one contract definition binding the three together.
//! The asset id is deterministic; the policy and contract ids are freshly
//! generated each time.

use crate::error::RowErrorKind;
use crate::model::SubmodelKind;
use std::collections::HashMap;
use std::sync::Arc;
use tb_connectors::ExchangeConnector;
use tb_policy::{
    AssetRequestFactory, ContractDefinitionFactory, PolicyConstraintBuilder, PolicyRequestFactory,
    UsagePolicyDeclaration,
};
use tracing::{info, instrument};

/// Property key carrying the value of a custom usage declaration.
const CUSTOM_USAGE_PROPERTY: &str = "customUsage";

/// The exchange-side identifiers minted for one provisioned row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceIds {
    pub asset_id: String,
    pub access_policy_id: String,
    pub usage_policy_id: String,
    pub contract_definition_id: String,
}

/// Creates the governance artifacts for a registered submodel.
pub struct GovernanceProvisioner {
    exchange: Arc<dyn ExchangeConnector>,
    asset_factory: AssetRequestFactory,
}

impl GovernanceProvisioner {
    pub fn new(exchange: Arc<dyn ExchangeConnector>, asset_factory: AssetRequestFactory) -> Self {
        Self {
            exchange,
            asset_factory,
        }
    }

    /// Deterministic asset id for a provisioned identity.
    pub fn asset_id_for(
        kind: SubmodelKind,
        shell_id: &str,
        submodel_id: &str,
        business_key: &str,
    ) -> String {
        AssetRequestFactory::asset_id(kind.asset_prefix(), shell_id, submodel_id, business_key)
    }

    pub async fn asset_exists(&self, asset_id: &str) -> Result<bool, RowErrorKind> {
        Ok(self.exchange.asset_exists(asset_id).await?)
    }

    /// Creates asset, access policy, usage policy, and contract definition,
    /// in that order.
    #[instrument(skip_all, fields(shell_id, submodel_id))]
    pub async fn provision(
        &self,
        kind: SubmodelKind,
        shell_id: &str,
        submodel_id: &str,
        business_key: &str,
        usage_policies: &[UsagePolicyDeclaration],
        bpn_numbers: &[String],
    ) -> Result<GovernanceIds, RowErrorKind> {
        let asset_request = self.asset_factory.asset_request(
            kind.asset_prefix(),
            kind.display_name(),
            shell_id,
            submodel_id,
            business_key,
        );
        self.exchange.create_asset(&asset_request).await?;

        let access_request = PolicyRequestFactory::policy_request(
            PolicyConstraintBuilder::access_constraints(bpn_numbers),
            HashMap::new(),
        );
        let access_policy_id = self
            .exchange
            .create_policy_definition(&access_request)
            .await?;

        let mut extensible_properties = HashMap::new();
        if let Some(value) = PolicyConstraintBuilder::custom_value(usage_policies) {
            extensible_properties.insert(CUSTOM_USAGE_PROPERTY.to_string(), value);
        }
        let usage_request = PolicyRequestFactory::policy_request(
            PolicyConstraintBuilder::usage_constraints(usage_policies),
            extensible_properties,
        );
        let usage_policy_id = self
            .exchange
            .create_policy_definition(&usage_request)
            .await?;

        let contract_request = ContractDefinitionFactory::contract_request(
            &asset_request.asset_id,
            &access_policy_id,
            &usage_policy_id,
        );
        let contract_definition_id = self
            .exchange
            .create_contract_definition(&contract_request)
            .await?;

        info!(asset_id = %asset_request.asset_id, "provisioned governance artifacts");
        Ok(GovernanceIds {
            asset_id: asset_request.asset_id,
            access_policy_id,
            usage_policy_id,
            contract_definition_id,
        })
    }
}
