//! AAS digital-twin registry client.
//!
//! HTTP implementation of [`RegistryConnector`] against the asset
//! administration shell registry API: shell descriptors are discovered via
//! the lookup endpoint by local identifier sets, submodel descriptors hang
//! off a shell descriptor.

use crate::http::{HttpClient, RateLimitConfig};
use crate::traits::{
    ConnectorConfig, ConnectorError, ConnectorResult, RegistryConnector, ShellDescriptorRequest,
    ShellDescriptorResponse, ShellIdentifiers, SubmodelDescriptor,
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument};

const LOOKUP_SHELLS_PATH: &str = "/lookup/shells";
const SHELL_DESCRIPTORS_PATH: &str = "/registry/shell-descriptors";

/// Registry-specific configuration.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct AasRegistryConfig {
    /// Base connector configuration.
    #[serde(flatten)]
    pub connector: ConnectorConfig,
    /// Requests per minute allowed against the registry.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

fn default_requests_per_minute() -> u32 {
    240
}

/// Wrapper for paged submodel listings.
#[derive(Debug, Deserialize)]
struct SubmodelListResponse {
    #[serde(default)]
    result: Vec<SubmodelDescriptor>,
}

/// AAS registry client.
pub struct AasRegistryClient {
    client: HttpClient,
}

impl AasRegistryClient {
    /// Creates a new registry client.
    pub fn new(config: AasRegistryConfig) -> ConnectorResult<Self> {
        let rate_limit = RateLimitConfig {
            max_requests: config.requests_per_minute,
            period: std::time::Duration::from_secs(60),
            burst_size: 20,
        };
        let client = HttpClient::with_rate_limit(config.connector.clone(), Some(rate_limit))?;

        info!(
            base_url = %config.connector.base_url,
            "Registry client initialized"
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl RegistryConnector for AasRegistryClient {
    #[instrument(skip(self), fields(identifiers = %identifiers.to_query_string()))]
    async fn lookup_shells(&self, identifiers: &ShellIdentifiers) -> ConnectorResult<Vec<String>> {
        let asset_ids = serde_json::to_string(&identifiers.identifiers)
            .map_err(|e| ConnectorError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .get_with_query(LOOKUP_SHELLS_PATH, &[("assetIds", asset_ids)])
            .await?;

        let shell_ids: Vec<String> = response
            .json()
            .await
            .map_err(|e| ConnectorError::InvalidResponse(e.to_string()))?;

        debug!("Lookup matched {} shell(s)", shell_ids.len());
        Ok(shell_ids)
    }

    #[instrument(skip(self, request), fields(id_short = %request.id_short))]
    async fn create_shell(&self, request: &ShellDescriptorRequest) -> ConnectorResult<String> {
        let response: ShellDescriptorResponse =
            self.client.post_json(SHELL_DESCRIPTORS_PATH, request).await?;
        debug!("Shell created with id '{}'", response.identification);
        Ok(response.identification)
    }

    #[instrument(skip(self))]
    async fn list_submodels(&self, shell_id: &str) -> ConnectorResult<Vec<SubmodelDescriptor>> {
        let path = format!("{}/{}/submodel-descriptors", SHELL_DESCRIPTORS_PATH, shell_id);
        // Shells without submodels respond 404 on some registry versions
        match self.client.get_json::<SubmodelListResponse>(&path).await {
            Ok(listing) => Ok(listing.result),
            Err(ConnectorError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, request), fields(id_short = %request.id_short))]
    async fn create_submodel(
        &self,
        shell_id: &str,
        request: &SubmodelDescriptor,
    ) -> ConnectorResult<String> {
        let path = format!("{}/{}/submodel-descriptors", SHELL_DESCRIPTORS_PATH, shell_id);
        let created: SubmodelDescriptor = self.client.post_json(&path, request).await?;
        Ok(created.identification)
    }

    #[instrument(skip(self))]
    async fn delete_submodel(&self, shell_id: &str, submodel_id: &str) -> ConnectorResult<()> {
        let path = format!(
            "{}/{}/submodel-descriptors/{}",
            SHELL_DESCRIPTORS_PATH, shell_id, submodel_id
        );
        self.client.delete(&path).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_shell(&self, shell_id: &str) -> ConnectorResult<()> {
        let path = format!("{}/{}", SHELL_DESCRIPTORS_PATH, shell_id);
        self.client.delete(&path).await?;
        Ok(())
    }
}
