//! Shell identity resolution and submodel registration.
//!
//! Shells are resolved by local identifier set: zero matches creates a
//! fresh shell, exactly one is reused, and more than one is fatal for the
//! row since the pipeline cannot tell which twin it is provisioning.

use crate::config::PipelineConfig;
use crate::error::RowErrorKind;
use crate::model::{PartRow, SubmodelKind};
use std::sync::Arc;
use tb_connectors::{
    LocalIdentifier, RegistryConnector, ShellDescriptorRequest, ShellIdentifiers,
    SubmodelDescriptor,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const KEY_MANUFACTURER_ID: &str = "manufacturerId";
const KEY_MANUFACTURER_PART_ID: &str = "manufacturerPartId";
const KEY_PART_INSTANCE_ID: &str = "partInstanceId";
const KEY_LIFECYCLE_PHASE: &str = "assetLifecyclePhase";
const KEY_CUSTOMER_PART_ID: &str = "customerPartId";

/// A shell id plus whether this run created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedShell {
    pub shell_id: String,
    pub created: bool,
}

/// Resolves and maintains registry-side identities for rows.
pub struct IdentityResolver {
    registry: Arc<dyn RegistryConnector>,
    config: Arc<PipelineConfig>,
}

impl IdentityResolver {
    pub fn new(registry: Arc<dyn RegistryConnector>, config: Arc<PipelineConfig>) -> Self {
        Self { registry, config }
    }

    fn identifiers_for(&self, part: &PartRow) -> ShellIdentifiers {
        ShellIdentifiers::new()
            .add(KEY_MANUFACTURER_ID, self.config.manufacturer_id.as_str())
            .add(KEY_MANUFACTURER_PART_ID, part.manufacturer_part_id.as_str())
            .add(KEY_PART_INSTANCE_ID, part.part_instance_id.as_str())
            .add(KEY_LIFECYCLE_PHASE, part.lifecycle.as_str())
    }

    fn descriptor_request(
        &self,
        part: &PartRow,
        identifiers: &ShellIdentifiers,
    ) -> ShellDescriptorRequest {
        let id_short = format!(
            "{}_{}_{}",
            part.name_at_manufacturer.replace(' ', "_"),
            self.config.manufacturer_id,
            part.manufacturer_part_id
        );
        // lookup never includes customerPartId, but the shell stays
        // discoverable by it
        let mut specific_asset_ids = identifiers.identifiers.clone();
        if let Some(customer_part_id) = part
            .customer_part_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
        {
            specific_asset_ids.push(LocalIdentifier {
                key: KEY_CUSTOMER_PART_ID.to_string(),
                value: customer_part_id.to_string(),
            });
        }
        ShellDescriptorRequest {
            id: format!("urn:uuid:{}", Uuid::new_v4()),
            id_short,
            global_asset_id: part.uuid.clone(),
            specific_asset_ids,
            description: None,
        }
    }

    /// Resolves the shell for a part row, creating one when none exists.
    #[instrument(skip(self, part), fields(row_number = part.row_number))]
    pub async fn resolve_or_create_shell(
        &self,
        part: &PartRow,
    ) -> Result<ResolvedShell, RowErrorKind> {
        let identifiers = self.identifiers_for(part);
        let matches = self.registry.lookup_shells(&identifiers).await?;

        if matches.len() > 1 {
            return Err(RowErrorKind::AmbiguousIdentity(
                identifiers.to_query_string(),
            ));
        }
        if let Some(shell_id) = matches.into_iter().next() {
            debug!(shell_id = %shell_id, "reusing existing shell");
            return Ok(ResolvedShell {
                shell_id,
                created: false,
            });
        }

        let request = self.descriptor_request(part, &identifiers);
        let shell_id = self.registry.create_shell(&request).await?;
        info!(shell_id = %shell_id, "created shell");
        Ok(ResolvedShell {
            shell_id,
            created: true,
        })
    }

    /// Fails when a submodel of the given kind is already registered under
    /// the shell.
    pub async fn ensure_submodel_absent(
        &self,
        shell_id: &str,
        kind: SubmodelKind,
    ) -> Result<(), RowErrorKind> {
        let submodels = self.registry.list_submodels(shell_id).await?;
        if submodels.iter().any(|s| s.id_short == kind.id_short()) {
            return Err(RowErrorKind::SubmodelConflict(
                kind.id_short().to_string(),
                shell_id.to_string(),
            ));
        }
        Ok(())
    }

    /// Registers a fresh submodel under the shell and returns its
    /// identification.
    #[instrument(skip(self), fields(kind = kind.as_str()))]
    pub async fn register_submodel(
        &self,
        shell_id: &str,
        kind: SubmodelKind,
    ) -> Result<String, RowErrorKind> {
        let identification = format!("urn:uuid:{}", Uuid::new_v4());
        let endpoint_address = format!(
            "{}/{}/{}-{}/submodel?content=value&extent=withBlobValue",
            self.config.exchange_endpoint.trim_end_matches('/'),
            self.config.manufacturer_id,
            shell_id,
            identification
        );
        let descriptor = SubmodelDescriptor {
            identification: identification.clone(),
            id_short: kind.id_short().to_string(),
            semantic_id: vec![kind.semantic_id().to_string()],
            endpoint_address,
        };
        let submodel_id = self.registry.create_submodel(shell_id, &descriptor).await?;
        debug!(submodel_id = %submodel_id, "registered submodel");
        Ok(submodel_id)
    }

    /// Best-effort removal of a submodel, used to unwind a half-provisioned
    /// row.
    pub async fn remove_submodel(
        &self,
        shell_id: &str,
        submodel_id: &str,
    ) -> Result<(), RowErrorKind> {
        self.registry.delete_submodel(shell_id, submodel_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LifecyclePhase;
    use tb_connectors::MockRegistry;

    fn part_row(part_id: &str, instance_id: &str) -> PartRow {
        PartRow {
            row_number: 1,
            uuid: "urn:uuid:part-1".to_string(),
            kind: SubmodelKind::SerialPart,
            lifecycle: LifecyclePhase::AsBuilt,
            manufacturer_part_id: part_id.to_string(),
            customer_part_id: None,
            part_instance_id: instance_id.to_string(),
            name_at_manufacturer: "Gearbox Housing".to_string(),
            payload: serde_json::Value::Null,
            usage_policies: Vec::new(),
            bpn_numbers: Vec::new(),
        }
    }

    fn resolver(registry: Arc<MockRegistry>) -> IdentityResolver {
        let config = Arc::new(PipelineConfig::new(
            "BPNL000000000001",
            "https://provider.example.com/data",
        ));
        IdentityResolver::new(registry, config)
    }

    fn matching_shell_request(part: &PartRow) -> ShellDescriptorRequest {
        let pairs = vec![
            ("manufacturerId", "BPNL000000000001"),
            ("manufacturerPartId", part.manufacturer_part_id.as_str()),
            ("partInstanceId", part.part_instance_id.as_str()),
            ("assetLifecyclePhase", "AsBuilt"),
        ];
        ShellDescriptorRequest {
            id: format!("urn:uuid:{}", Uuid::new_v4()),
            id_short: "seeded".to_string(),
            global_asset_id: part.uuid.clone(),
            specific_asset_ids: pairs
                .into_iter()
                .map(|(key, value)| LocalIdentifier {
                    key: key.to_string(),
                    value: value.to_string(),
                })
                .collect(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_zero_matches_creates_shell() {
        let registry = Arc::new(MockRegistry::new());
        let resolver = resolver(registry.clone());

        let resolved = resolver
            .resolve_or_create_shell(&part_row("PART-1", "SN-1"))
            .await
            .unwrap();
        assert!(resolved.created);
        assert_eq!(registry.call_count("create_shell").await, 1);
    }

    #[tokio::test]
    async fn test_one_match_is_reused() {
        let registry = Arc::new(MockRegistry::new());
        let part = part_row("PART-1", "SN-1");
        let seeded = registry.seed_shell(matching_shell_request(&part)).await;
        let resolver = resolver(registry.clone());

        let resolved = resolver.resolve_or_create_shell(&part).await.unwrap();
        assert!(!resolved.created);
        assert_eq!(resolved.shell_id, seeded);
        assert_eq!(registry.call_count("create_shell").await, 0);
    }

    #[tokio::test]
    async fn test_many_matches_is_ambiguous() {
        let registry = Arc::new(MockRegistry::new());
        let part = part_row("PART-1", "SN-1");
        registry.seed_shell(matching_shell_request(&part)).await;
        registry.seed_shell(matching_shell_request(&part)).await;
        let resolver = resolver(registry.clone());

        let err = resolver.resolve_or_create_shell(&part).await.unwrap_err();
        assert!(matches!(err, RowErrorKind::AmbiguousIdentity(_)));
        assert_eq!(registry.call_count("create_shell").await, 0);
    }

    #[tokio::test]
    async fn test_submodel_conflict() {
        let registry = Arc::new(MockRegistry::new());
        let part = part_row("PART-1", "SN-1");
        let shell_id = registry.seed_shell(matching_shell_request(&part)).await;
        registry
            .seed_submodel(
                &shell_id,
                tb_connectors::testing::sample_submodel("urn:uuid:sub-1", "serialPartTypization"),
            )
            .await;
        let resolver = resolver(registry.clone());

        let err = resolver
            .ensure_submodel_absent(&shell_id, SubmodelKind::SerialPart)
            .await
            .unwrap_err();
        assert!(matches!(err, RowErrorKind::SubmodelConflict(_, _)));

        // a different kind under the same shell is fine
        resolver
            .ensure_submodel_absent(&shell_id, SubmodelKind::Batch)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_submodel_builds_endpoint() {
        let registry = Arc::new(MockRegistry::new());
        let part = part_row("PART-1", "SN-1");
        let shell_id = registry.seed_shell(matching_shell_request(&part)).await;
        let resolver = resolver(registry.clone());

        let submodel_id = resolver
            .register_submodel(&shell_id, SubmodelKind::SerialPart)
            .await
            .unwrap();
        assert!(submodel_id.starts_with("urn:uuid:"));

        let submodels = registry.list_submodels(&shell_id).await.unwrap();
        assert_eq!(submodels.len(), 1);
        assert_eq!(submodels[0].id_short, "serialPartTypization");
        assert!(submodels[0]
            .endpoint_address
            .starts_with("https://provider.example.com/data/BPNL000000000001/"));
    }
}
