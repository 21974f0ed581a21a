//! End-to-end pipeline tests against the mock connectors.

use std::sync::Arc;
use tb_connectors::{
    ExchangeConnector, LocalIdentifier, MockExchange, MockRegistry, RegistryConnector,
};
use tb_core::store::{OutcomeStore, StoreError};
use tb_core::{
    BatchOrchestrator, DeleteFacilitator, GovernanceProvisioner, IdentityResolver,
    InMemoryFailureLog, InMemoryOutcomeStore, KeyedLocks, LifecyclePhase, OutcomeRecord, PartRow,
    PipelineConfig, ProvisioningService, RelationshipRow, Row, RowOrchestrator, SubmodelKind,
};
use tb_observability::PipelineMetrics;
use tb_policy::{AssetRequestFactory, UsagePolicyDeclaration, UsagePolicyKind};
use tokio::sync::watch;

const MANUFACTURER: &str = "BPNL000000000001";
const ENDPOINT: &str = "https://provider.example.com/data";

struct Harness {
    registry: Arc<MockRegistry>,
    exchange: Arc<MockExchange>,
    outcomes: Arc<InMemoryOutcomeStore>,
    service: Arc<ProvisioningService>,
}

fn harness() -> Harness {
    let registry = Arc::new(MockRegistry::new());
    let exchange = Arc::new(MockExchange::new());
    let outcomes = Arc::new(InMemoryOutcomeStore::new());
    let failures = Arc::new(InMemoryFailureLog::new());
    let service = Arc::new(ProvisioningService::new(
        registry.clone(),
        exchange.clone(),
        outcomes.clone(),
        failures,
        PipelineConfig::new(MANUFACTURER, ENDPOINT),
    ));
    Harness {
        registry,
        exchange,
        outcomes,
        service,
    }
}

fn part_row(row_number: u32, uuid: &str, part_id: &str, instance_id: &str) -> Row {
    Row::Part(PartRow {
        row_number,
        uuid: uuid.to_string(),
        kind: SubmodelKind::SerialPart,
        lifecycle: LifecyclePhase::AsBuilt,
        manufacturer_part_id: part_id.to_string(),
        customer_part_id: None,
        part_instance_id: instance_id.to_string(),
        name_at_manufacturer: "Gearbox".to_string(),
        payload: serde_json::json!({ "partInstanceId": instance_id }),
        usage_policies: vec![UsagePolicyDeclaration {
            kind: UsagePolicyKind::Duration,
            value: "P30D".to_string(),
        }],
        bpn_numbers: vec!["BPNL000000000002".to_string()],
    })
}

fn relationship_row(row_number: u32, uuid: &str, parent_uuid: &str, child_uuid: &str) -> Row {
    Row::Relationship(RelationshipRow {
        row_number,
        uuid: uuid.to_string(),
        parent_uuid: parent_uuid.to_string(),
        child_uuid: child_uuid.to_string(),
        lifecycle: LifecyclePhase::AsBuilt,
        quantity: 4.0,
        measurement_unit: "unit:piece".to_string(),
        usage_policies: Vec::new(),
        bpn_numbers: Vec::new(),
    })
}

#[tokio::test]
async fn test_create_flow_provisions_all_artifacts() {
    let h = harness();
    let stats = h
        .service
        .run_batch("p1", vec![part_row(3, "urn:uuid:part-1", "PART-1", "SN-1")])
        .await;

    assert_eq!(stats.rows_received, 1);
    assert_eq!(stats.rows_succeeded, 1);
    assert_eq!(stats.rows_failed, 0);

    assert_eq!(h.registry.call_count("create_shell").await, 1);
    assert_eq!(h.registry.call_count("create_submodel").await, 1);
    assert_eq!(h.exchange.call_count("create_asset").await, 1);
    assert_eq!(h.exchange.call_count("create_policy_definition").await, 2);
    assert_eq!(h.exchange.call_count("create_contract_definition").await, 1);

    let record = h.service.outcome("urn:uuid:part-1").await.unwrap().unwrap();
    assert_eq!(record.row_number, 3);
    assert_eq!(record.process_id, "p1");
    assert_eq!(record.kind, SubmodelKind::SerialPart);
    assert!(!record.deleted);
    assert!(record.asset_id.starts_with("serialpart-"));
    assert!(h.exchange.asset_exists(&record.asset_id).await.unwrap());
}

#[tokio::test]
async fn test_resubmission_compensates_then_reprovisions() {
    let h = harness();
    let row = part_row(1, "urn:uuid:part-1", "PART-1", "SN-1");

    h.service.run_batch("p1", vec![row.clone()]).await;
    let first = h.service.outcome("urn:uuid:part-1").await.unwrap().unwrap();

    let stats = h.service.run_batch("p2", vec![row]).await;
    assert_eq!(stats.rows_succeeded, 1);

    // old exchange artifacts removed in dependency order
    let deletes = h.exchange.delete_calls().await;
    let operations: Vec<&str> = deletes.iter().map(|c| c.operation.as_str()).collect();
    assert_eq!(
        operations,
        vec![
            "delete_contract_definition",
            "delete_policy_definition",
            "delete_policy_definition",
            "delete_asset",
        ]
    );
    assert_eq!(deletes[0].target, first.contract_definition_id);
    assert_eq!(deletes[3].target, first.asset_id);

    // the old submodel went too, the shell was reused
    assert_eq!(h.registry.call_count("delete_submodel").await, 1);
    assert_eq!(h.registry.call_count("delete_shell").await, 0);
    assert_eq!(h.registry.call_count("create_shell").await, 1);
    assert_eq!(h.registry.call_count("create_submodel").await, 2);

    let second = h.service.outcome("urn:uuid:part-1").await.unwrap().unwrap();
    assert_eq!(second.process_id, "p2");
    assert_ne!(second.asset_id, first.asset_id);
    assert_ne!(second.submodel_id, first.submodel_id);
    assert_eq!(second.shell_id, first.shell_id);
    assert!(!h.exchange.asset_exists(&first.asset_id).await.unwrap());
    assert!(h.exchange.asset_exists(&second.asset_id).await.unwrap());
}

#[tokio::test]
async fn test_provisioning_failure_after_update_compensation_soft_deletes() {
    let h = harness();
    let row = part_row(1, "urn:uuid:part-1", "PART-1", "SN-1");
    h.service.run_batch("p1", vec![row.clone()]).await;

    h.exchange.fail_operation("create_asset").await;
    let stats = h.service.run_batch("p2", vec![row]).await;
    assert_eq!(stats.rows_failed, 1);

    // the old artifacts are gone, so the stale record is soft-deleted
    let record = h.service.outcome("urn:uuid:part-1").await.unwrap().unwrap();
    assert!(record.deleted);

    let failures = h.service.failures_for_process("p2").await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, "exchange");
    assert_eq!(failures[0].row_number, Some(1));
}

#[tokio::test]
async fn test_ambiguous_identity_has_no_side_effects() {
    let h = harness();
    let row = part_row(1, "urn:uuid:part-1", "PART-1", "SN-1");

    // two shells already match the row's identifier set
    h.service.run_batch("seed", vec![row.clone()]).await;
    let record = h.service.outcome("urn:uuid:part-1").await.unwrap().unwrap();
    let mut duplicate = tb_connectors::testing::sample_shell_request("urn:uuid:other", "PART-1");
    duplicate.specific_asset_ids = vec![
        kv("manufacturerId", MANUFACTURER),
        kv("manufacturerPartId", "PART-1"),
        kv("partInstanceId", "SN-1"),
        kv("assetLifecyclePhase", "AsBuilt"),
    ];
    h.registry.seed_shell(duplicate).await;

    let exchange_calls_before = h.exchange.calls().await.len();
    let stats = h.service.run_batch("p2", vec![row]).await;
    assert_eq!(stats.rows_failed, 1);

    // no connector writes happened for the ambiguous row
    assert_eq!(h.exchange.calls().await.len(), exchange_calls_before);
    assert_eq!(h.registry.call_count("create_shell").await, 1);

    let failures = h.service.failures_for_process("p2").await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, "registry");
    assert!(failures[0].message.contains("ambiguous"));

    // the prior outcome record is untouched
    let after = h.service.outcome("urn:uuid:part-1").await.unwrap().unwrap();
    assert_eq!(after.asset_id, record.asset_id);
    assert!(!after.deleted);
}

fn kv(key: &str, value: &str) -> LocalIdentifier {
    LocalIdentifier {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[tokio::test]
async fn test_validation_failure_never_reaches_connectors() {
    let h = harness();
    let mut row = part_row(1, "urn:uuid:part-1", "", "SN-1");
    if let Row::Part(part) = &mut row {
        part.bpn_numbers.push("garbage".to_string());
    }

    let stats = h.service.run_batch("p1", vec![row]).await;
    assert_eq!(stats.rows_failed, 1);
    assert!(h.registry.calls().await.is_empty());
    assert!(h.exchange.calls().await.is_empty());

    let failures = h.service.failures_for_process("p1").await.unwrap();
    assert_eq!(failures[0].stage, "validation");
    assert!(failures[0].message.contains("manufacturer_part_id"));
    assert!(failures[0].message.contains("bpn_numbers"));
}

#[tokio::test]
async fn test_relationship_without_parent_never_reaches_connectors() {
    let h = harness();
    let stats = h
        .service
        .run_batch(
            "p1",
            vec![relationship_row(
                1,
                "urn:uuid:rel-1",
                "urn:uuid:ghost",
                "urn:uuid:child",
            )],
        )
        .await;

    assert_eq!(stats.rows_failed, 1);
    assert!(h.registry.calls().await.is_empty());
    assert!(h.exchange.calls().await.is_empty());

    let failures = h.service.failures_for_process("p1").await.unwrap();
    assert!(failures[0].message.contains("urn:uuid:ghost"));
}

#[tokio::test]
async fn test_relationship_runs_after_parts_regardless_of_order() {
    let h = harness();
    // relationship listed first; the part phase still commits first
    let rows = vec![
        relationship_row(1, "urn:uuid:rel-1", "urn:uuid:parent", "urn:uuid:child"),
        part_row(2, "urn:uuid:parent", "PART-P", "SN-P"),
        part_row(3, "urn:uuid:child", "PART-C", "SN-C"),
    ];

    let stats = h.service.run_batch("p1", rows).await;
    assert_eq!(stats.rows_succeeded, 3);

    let parent = h.service.outcome("urn:uuid:parent").await.unwrap().unwrap();
    let rel = h.service.outcome("urn:uuid:rel-1").await.unwrap().unwrap();
    assert_eq!(rel.kind, SubmodelKind::AssemblyRelationship);
    // the relationship submodel hangs off the parent's shell
    assert_eq!(rel.shell_id, parent.shell_id);
    assert!(rel.asset_id.starts_with("assemblyrelationship-"));
}

#[tokio::test]
async fn test_as_planned_relationship_provisions_single_level_bom() {
    let h = harness();
    let mut parent = part_row(1, "urn:uuid:parent", "PART-P", "SN-P");
    if let Row::Part(part) = &mut parent {
        part.lifecycle = LifecyclePhase::AsPlanned;
    }
    let mut rel = relationship_row(2, "urn:uuid:rel-1", "urn:uuid:parent", "urn:uuid:child");
    if let Row::Relationship(relationship) = &mut rel {
        relationship.lifecycle = LifecyclePhase::AsPlanned;
    }

    let stats = h.service.run_batch("p1", vec![parent, rel]).await;
    assert_eq!(stats.rows_succeeded, 2);

    let record = h.service.outcome("urn:uuid:rel-1").await.unwrap().unwrap();
    assert_eq!(record.kind, SubmodelKind::SingleLevelBomAsPlanned);
    assert!(record.asset_id.starts_with("singlelevelbomasplanned-"));

    // registered under its own short id, next to the parent's part submodel
    let submodels = h.registry.list_submodels(&record.shell_id).await.unwrap();
    assert!(submodels
        .iter()
        .any(|s| s.id_short == "singleLevelBomAsPlanned"));
    assert!(submodels
        .iter()
        .all(|s| s.id_short != "assemblyPartRelationship"));
}

#[tokio::test]
async fn test_sibling_relationships_serialize_on_the_parent_shell() {
    let h = harness();
    // two as-built relationships under one parent compete for the same
    // short id; exactly one may win
    let rows = vec![
        part_row(1, "urn:uuid:parent", "PART-P", "SN-P"),
        relationship_row(2, "urn:uuid:rel-1", "urn:uuid:parent", "urn:uuid:child-1"),
        relationship_row(3, "urn:uuid:rel-2", "urn:uuid:parent", "urn:uuid:child-2"),
    ];

    let stats = h.service.run_batch("p1", rows).await;
    assert_eq!(stats.rows_succeeded, 2);
    assert_eq!(stats.rows_failed, 1);

    // one part submodel plus exactly one relationship submodel
    assert_eq!(h.registry.call_count("create_submodel").await, 2);

    let failures = h.service.failures_for_process("p1").await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, "registry");
}

#[tokio::test]
async fn test_one_bad_row_does_not_block_the_rest() {
    let h = harness();
    h.exchange.fail_operation("create_contract_definition").await;
    let stats = h
        .service
        .run_batch("p1", vec![part_row(1, "urn:uuid:part-1", "PART-1", "SN-1")])
        .await;
    assert_eq!(stats.rows_failed, 1);

    // clear the scripted failure by using a fresh harness sharing nothing
    let h2 = harness();
    let rows = vec![
        part_row(1, "", "PART-1", "SN-1"), // generated key
        part_row(2, "urn:uuid:part-2", "", "SN-2"), // invalid
        part_row(3, "urn:uuid:part-3", "PART-3", "SN-3"),
    ];
    let stats = h2.service.run_batch("p1", rows).await;
    assert_eq!(stats.rows_succeeded, 2);
    assert_eq!(stats.rows_failed, 1);

    let records = h2.service.outcomes_for_process("p1").await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records[0].business_key.starts_with("urn:uuid:"));
    assert_eq!(records[1].business_key, "urn:uuid:part-3");
}

#[tokio::test]
async fn test_delete_process_tears_down_and_skips_already_deleted() {
    let h = harness();
    h.service
        .run_batch(
            "p1",
            vec![
                part_row(1, "urn:uuid:part-1", "PART-1", "SN-1"),
                part_row(2, "urn:uuid:part-2", "PART-2", "SN-2"),
            ],
        )
        .await;

    let summary = h.service.delete_process("p1").await.unwrap();
    assert_eq!(summary.deleted, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 0);

    // entity scope removes shells too
    assert_eq!(h.registry.call_count("delete_shell").await, 2);
    for key in ["urn:uuid:part-1", "urn:uuid:part-2"] {
        let record = h.service.outcome(key).await.unwrap().unwrap();
        assert!(record.deleted);
        assert!(!h.exchange.asset_exists(&record.asset_id).await.unwrap());
    }

    // a second run touches nothing
    let deletes_before = h.exchange.delete_calls().await.len();
    let summary = h.service.delete_process("p1").await.unwrap();
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.skipped, 2);
    assert_eq!(h.exchange.delete_calls().await.len(), deletes_before);
}

#[tokio::test]
async fn test_delete_process_logs_partial_failures_and_keeps_record_live() {
    let h = harness();
    h.service
        .run_batch("p1", vec![part_row(1, "urn:uuid:part-1", "PART-1", "SN-1")])
        .await;

    h.exchange.fail_operation("delete_asset").await;
    let summary = h.service.delete_process("p1").await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.deleted, 0);

    let record = h.service.outcome("urn:uuid:part-1").await.unwrap().unwrap();
    assert!(!record.deleted);

    let failures = h.service.failures_for_process("p1").await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, "compensation");
}

/// Delegating store that fails `mark_deleted` for one configured key.
struct FlakyOutcomeStore {
    inner: InMemoryOutcomeStore,
    fail_mark_deleted_for: String,
}

#[async_trait::async_trait]
impl OutcomeStore for FlakyOutcomeStore {
    async fn upsert(&self, record: &OutcomeRecord) -> Result<(), StoreError> {
        self.inner.upsert(record).await
    }

    async fn find_by_business_key(
        &self,
        business_key: &str,
    ) -> Result<Option<OutcomeRecord>, StoreError> {
        self.inner.find_by_business_key(business_key).await
    }

    async fn find_by_process(&self, process_id: &str) -> Result<Vec<OutcomeRecord>, StoreError> {
        self.inner.find_by_process(process_id).await
    }

    async fn mark_deleted(&self, business_key: &str) -> Result<(), StoreError> {
        if business_key == self.fail_mark_deleted_for {
            return Err(StoreError::Database("disk full".to_string()));
        }
        self.inner.mark_deleted(business_key).await
    }
}

#[tokio::test]
async fn test_delete_process_survives_store_error_on_one_record() {
    let registry = Arc::new(MockRegistry::new());
    let exchange = Arc::new(MockExchange::new());
    let outcomes = Arc::new(FlakyOutcomeStore {
        inner: InMemoryOutcomeStore::new(),
        fail_mark_deleted_for: "urn:uuid:part-1".to_string(),
    });
    let failures = Arc::new(InMemoryFailureLog::new());
    let service = Arc::new(ProvisioningService::new(
        registry.clone(),
        exchange.clone(),
        outcomes.clone(),
        failures,
        PipelineConfig::new(MANUFACTURER, ENDPOINT),
    ));

    service
        .run_batch(
            "p1",
            vec![
                part_row(1, "urn:uuid:part-1", "PART-1", "SN-1"),
                part_row(2, "urn:uuid:part-2", "PART-2", "SN-2"),
            ],
        )
        .await;

    let summary = service.delete_process("p1").await.unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.failed, 1);

    // both records' remote artifacts were still torn down
    assert_eq!(registry.call_count("delete_shell").await, 2);
    let second = service.outcome("urn:uuid:part-2").await.unwrap().unwrap();
    assert!(second.deleted);

    // the stuck record stays live and the failure is logged
    let first = service.outcome("urn:uuid:part-1").await.unwrap().unwrap();
    assert!(!first.deleted);
    let failures = service.failures_for_process("p1").await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, "persistence");
    assert_eq!(failures[0].row_number, Some(1));
}

#[tokio::test]
async fn test_cancelled_batch_skips_pending_rows() {
    let registry = Arc::new(MockRegistry::new());
    let exchange = Arc::new(MockExchange::new());
    let outcomes: Arc<InMemoryOutcomeStore> = Arc::new(InMemoryOutcomeStore::new());
    let failures = Arc::new(InMemoryFailureLog::new());
    let config = Arc::new(PipelineConfig::new(MANUFACTURER, ENDPOINT));
    let metrics = PipelineMetrics::new();

    let row_orchestrator = Arc::new(RowOrchestrator::new(
        IdentityResolver::new(registry.clone(), config.clone()),
        GovernanceProvisioner::new(
            exchange.clone(),
            AssetRequestFactory::new(ENDPOINT, MANUFACTURER),
        ),
        DeleteFacilitator::new(registry.clone(), exchange.clone(), metrics.clone()),
        outcomes,
        metrics.clone(),
    ));
    let batch = BatchOrchestrator::new(
        row_orchestrator,
        failures,
        Arc::new(KeyedLocks::new()),
        metrics,
        2,
    );

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let rows = vec![
        part_row(1, "urn:uuid:part-1", "PART-1", "SN-1"),
        part_row(2, "urn:uuid:part-2", "PART-2", "SN-2"),
    ];
    let stats = batch.run_batch("p1", rows, rx).await;

    assert_eq!(stats.rows_skipped, 2);
    assert_eq!(stats.rows_succeeded, 0);
    assert!(registry.calls().await.is_empty());
    assert!(exchange.calls().await.is_empty());
}

#[tokio::test]
async fn test_cancel_unknown_process_is_false() {
    let h = harness();
    assert!(!h.service.cancel("nope").await);
}

#[tokio::test]
async fn test_submit_batch_runs_in_background() {
    let h = harness();
    let handle = h
        .service
        .submit_batch("p1", vec![part_row(1, "urn:uuid:part-1", "PART-1", "SN-1")]);
    let stats = handle.await.unwrap();
    assert_eq!(stats.rows_succeeded, 1);
    assert!(h.outcomes
        .find_by_business_key("urn:uuid:part-1")
        .await
        .unwrap()
        .is_some());
}
