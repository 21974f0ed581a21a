//! Data-exchange connector management client.
//!
//! HTTP implementation of [`ExchangeConnector`] against the connector's
//! management API: assets, policy definitions, and contract definitions are
//! plain CRUD resources addressed by their ids.

use crate::http::{HttpClient, RateLimitConfig};
use crate::traits::{
    AssetRequest, ConnectorConfig, ConnectorError, ConnectorResult, ContractDefinitionRequest,
    ExchangeConnector, PolicyDefinitionRequest,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

const ASSETS_PATH: &str = "/assets";
const POLICY_DEFINITIONS_PATH: &str = "/policydefinitions";
const CONTRACT_DEFINITIONS_PATH: &str = "/contractdefinitions";

/// Exchange-connector-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdcConfig {
    /// Base connector configuration.
    #[serde(flatten)]
    pub connector: ConnectorConfig,
    /// Requests per minute allowed against the management API.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

fn default_requests_per_minute() -> u32 {
    120
}

/// Management API client for the data-exchange connector.
pub struct EdcManagementClient {
    client: HttpClient,
}

impl EdcManagementClient {
    /// Creates a new management client.
    pub fn new(config: EdcConfig) -> ConnectorResult<Self> {
        let rate_limit = RateLimitConfig {
            max_requests: config.requests_per_minute,
            period: std::time::Duration::from_secs(60),
            burst_size: 10,
        };
        let client = HttpClient::with_rate_limit(config.connector.clone(), Some(rate_limit))?;

        info!(
            base_url = %config.connector.base_url,
            "Exchange connector client initialized"
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl ExchangeConnector for EdcManagementClient {
    #[instrument(skip(self))]
    async fn asset_exists(&self, asset_id: &str) -> ConnectorResult<bool> {
        let path = format!("{}/{}", ASSETS_PATH, asset_id);
        match self.client.get(&path).await {
            Ok(_) => Ok(true),
            Err(ConnectorError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, request), fields(asset_id = %request.asset_id))]
    async fn create_asset(&self, request: &AssetRequest) -> ConnectorResult<()> {
        self.client.post(ASSETS_PATH, request).await?;
        debug!("Asset created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_asset(&self, asset_id: &str) -> ConnectorResult<()> {
        let path = format!("{}/{}", ASSETS_PATH, asset_id);
        self.client.delete(&path).await?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(policy_id = %request.id))]
    async fn create_policy_definition(
        &self,
        request: &PolicyDefinitionRequest,
    ) -> ConnectorResult<String> {
        self.client.post(POLICY_DEFINITIONS_PATH, request).await?;
        Ok(request.id.clone())
    }

    #[instrument(skip(self))]
    async fn delete_policy_definition(&self, policy_id: &str) -> ConnectorResult<()> {
        let path = format!("{}/{}", POLICY_DEFINITIONS_PATH, policy_id);
        self.client.delete(&path).await?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(contract_id = %request.id))]
    async fn create_contract_definition(
        &self,
        request: &ContractDefinitionRequest,
    ) -> ConnectorResult<String> {
        self.client.post(CONTRACT_DEFINITIONS_PATH, request).await?;
        Ok(request.id.clone())
    }

    #[instrument(skip(self))]
    async fn delete_contract_definition(&self, contract_id: &str) -> ConnectorResult<()> {
        let path = format!("{}/{}", CONTRACT_DEFINITIONS_PATH, contract_id);
        self.client.delete(&path).await?;
        Ok(())
    }
}
