//! Mock exchange connector for testing.

use crate::testing::RecordedCall;
use crate::traits::{
    AssetRequest, ConnectorError, ConnectorResult, ContractDefinitionRequest, ExchangeConnector,
    PolicyDefinitionRequest,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory exchange connector with call recording and scripted failures.
///
/// Deletions of absent resources return [`ConnectorError::NotFound`], matching
/// the management API, so compensation idempotency can be exercised.
pub struct MockExchange {
    assets: Arc<RwLock<HashMap<String, AssetRequest>>>,
    policies: Arc<RwLock<HashMap<String, PolicyDefinitionRequest>>>,
    contracts: Arc<RwLock<HashMap<String, ContractDefinitionRequest>>>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    failing_ops: Arc<RwLock<HashSet<String>>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            assets: Arc::new(RwLock::new(HashMap::new())),
            policies: Arc::new(RwLock::new(HashMap::new())),
            contracts: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            failing_ops: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Makes every subsequent call of the named operation fail.
    pub async fn fail_operation(&self, operation: &str) {
        self.failing_ops.write().await.insert(operation.to_string());
    }

    /// All recorded calls, in order.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Number of recorded calls for one operation.
    pub async fn call_count(&self, operation: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Recorded calls filtered to deletion operations, in order.
    pub async fn delete_calls(&self) -> Vec<RecordedCall> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.operation.starts_with("delete_"))
            .cloned()
            .collect()
    }

    async fn record(&self, operation: &str, target: &str) -> ConnectorResult<()> {
        self.calls.write().await.push(RecordedCall {
            operation: operation.to_string(),
            target: target.to_string(),
        });
        if self.failing_ops.read().await.contains(operation) {
            return Err(ConnectorError::RequestFailed(format!(
                "scripted failure for {}",
                operation
            )));
        }
        Ok(())
    }
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeConnector for MockExchange {
    async fn asset_exists(&self, asset_id: &str) -> ConnectorResult<bool> {
        self.record("asset_exists", asset_id).await?;
        Ok(self.assets.read().await.contains_key(asset_id))
    }

    async fn create_asset(&self, request: &AssetRequest) -> ConnectorResult<()> {
        self.record("create_asset", &request.asset_id).await?;
        self.assets
            .write()
            .await
            .insert(request.asset_id.clone(), request.clone());
        Ok(())
    }

    async fn delete_asset(&self, asset_id: &str) -> ConnectorResult<()> {
        self.record("delete_asset", asset_id).await?;
        self.assets
            .write()
            .await
            .remove(asset_id)
            .map(|_| ())
            .ok_or_else(|| ConnectorError::NotFound(asset_id.to_string()))
    }

    async fn create_policy_definition(
        &self,
        request: &PolicyDefinitionRequest,
    ) -> ConnectorResult<String> {
        self.record("create_policy_definition", &request.id).await?;
        self.policies
            .write()
            .await
            .insert(request.id.clone(), request.clone());
        Ok(request.id.clone())
    }

    async fn delete_policy_definition(&self, policy_id: &str) -> ConnectorResult<()> {
        self.record("delete_policy_definition", policy_id).await?;
        self.policies
            .write()
            .await
            .remove(policy_id)
            .map(|_| ())
            .ok_or_else(|| ConnectorError::NotFound(policy_id.to_string()))
    }

    async fn create_contract_definition(
        &self,
        request: &ContractDefinitionRequest,
    ) -> ConnectorResult<String> {
        self.record("create_contract_definition", &request.id).await?;
        self.contracts
            .write()
            .await
            .insert(request.id.clone(), request.clone());
        Ok(request.id.clone())
    }

    async fn delete_contract_definition(&self, contract_id: &str) -> ConnectorResult<()> {
        self.record("delete_contract_definition", contract_id).await?;
        self.contracts
            .write()
            .await
            .remove(contract_id)
            .map(|_| ())
            .ok_or_else(|| ConnectorError::NotFound(contract_id.to_string()))
    }
}
