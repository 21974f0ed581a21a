//! Mock registry connector for testing.

use crate::testing::RecordedCall;
use crate::traits::{
    ConnectorError, ConnectorResult, RegistryConnector, ShellDescriptorRequest, ShellIdentifiers,
    SubmodelDescriptor,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredShell {
    id: String,
    request: ShellDescriptorRequest,
}

/// In-memory registry with call recording and scripted failures.
pub struct MockRegistry {
    shells: Arc<RwLock<Vec<StoredShell>>>,
    submodels: Arc<RwLock<HashMap<String, Vec<SubmodelDescriptor>>>>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    failing_ops: Arc<RwLock<HashSet<String>>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            shells: Arc::new(RwLock::new(Vec::new())),
            submodels: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            failing_ops: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Seeds a shell directly, bypassing call recording. Returns the shell id.
    pub async fn seed_shell(&self, request: ShellDescriptorRequest) -> String {
        let id = format!("urn:uuid:{}", Uuid::new_v4());
        self.shells.write().await.push(StoredShell {
            id: id.clone(),
            request,
        });
        id
    }

    /// Seeds a submodel directly under a shell.
    pub async fn seed_submodel(&self, shell_id: &str, descriptor: SubmodelDescriptor) {
        self.submodels
            .write()
            .await
            .entry(shell_id.to_string())
            .or_default()
            .push(descriptor);
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

    fn matches(shell: &StoredShell, identifiers: &ShellIdentifiers) -> bool {
        identifiers
            .identifiers
            .iter()
            .all(|id| shell.request.specific_asset_ids.contains(id))
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryConnector for MockRegistry {
    async fn lookup_shells(&self, identifiers: &ShellIdentifiers) -> ConnectorResult<Vec<String>> {
        self.record("lookup_shells", &identifiers.to_query_string())
            .await?;
        let shells = self.shells.read().await;
        Ok(shells
            .iter()
            .filter(|s| Self::matches(s, identifiers))
            .map(|s| s.id.clone())
            .collect())
    }

    async fn create_shell(&self, request: &ShellDescriptorRequest) -> ConnectorResult<String> {
        self.record("create_shell", &request.id_short).await?;
        let id = request.id.clone();
        self.shells.write().await.push(StoredShell {
            id: id.clone(),
            request: request.clone(),
        });
        Ok(id)
    }

    async fn list_submodels(&self, shell_id: &str) -> ConnectorResult<Vec<SubmodelDescriptor>> {
        self.record("list_submodels", shell_id).await?;
        Ok(self
            .submodels
            .read()
            .await
            .get(shell_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_submodel(
        &self,
        shell_id: &str,
        request: &SubmodelDescriptor,
    ) -> ConnectorResult<String> {
        self.record("create_submodel", shell_id).await?;
        let exists = self.shells.read().await.iter().any(|s| s.id == shell_id);
        if !exists {
            return Err(ConnectorError::NotFound(shell_id.to_string()));
        }
        self.submodels
            .write()
            .await
            .entry(shell_id.to_string())
            .or_default()
            .push(request.clone());
        Ok(request.identification.clone())
    }

    async fn delete_submodel(&self, shell_id: &str, submodel_id: &str) -> ConnectorResult<()> {
        self.record("delete_submodel", submodel_id).await?;
        let mut submodels = self.submodels.write().await;
        let entries = submodels
            .get_mut(shell_id)
            .ok_or_else(|| ConnectorError::NotFound(shell_id.to_string()))?;
        let before = entries.len();
        entries.retain(|s| s.identification != submodel_id);
        if entries.len() == before {
            return Err(ConnectorError::NotFound(submodel_id.to_string()));
        }
        Ok(())
    }

    async fn delete_shell(&self, shell_id: &str) -> ConnectorResult<()> {
        self.record("delete_shell", shell_id).await?;
        let mut shells = self.shells.write().await;
        let before = shells.len();
        shells.retain(|s| s.id != shell_id);
        if shells.len() == before {
            return Err(ConnectorError::NotFound(shell_id.to_string()));
        }
        self.submodels.write().await.remove(shell_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_shell_request;

    #[tokio::test]
    async fn test_lookup_matches_identifier_subset() {
        let registry = MockRegistry::new();
        let shell_id = registry
            .seed_shell(sample_shell_request("urn:uuid:part-1", "PART-1"))
            .await;

        let hit = ShellIdentifiers::new().add("manufacturerPartId", "PART-1");
        let miss = ShellIdentifiers::new().add("manufacturerPartId", "OTHER");

        assert_eq!(registry.lookup_shells(&hit).await.unwrap(), vec![shell_id]);
        assert!(registry.lookup_shells(&miss).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_submodel_is_not_found() {
        let registry = MockRegistry::new();
        let err = registry.delete_submodel("shell-1", "sub-1").await.unwrap_err();
        assert!(matches!(err, ConnectorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let registry = MockRegistry::new();
        registry.fail_operation("create_shell").await;
        let err = registry
            .create_shell(&sample_shell_request("urn:uuid:x", "P"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::RequestFailed(_)));
        assert_eq!(registry.call_count("create_shell").await, 1);
    }
}
