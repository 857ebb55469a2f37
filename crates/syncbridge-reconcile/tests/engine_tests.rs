//! Reconciliation engine tests against in-memory connectors.

mod helpers;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use helpers::mock_connector::{person, spec, MockConnector};
use syncbridge_reconcile::prelude::*;
use syncbridge_reconcile::{LockKey, RemoteIdMapping};

fn contacts(records: Vec<syncbridge_connector::record::Record>) -> Arc<MockConnector> {
    MockConnector::new("crm", spec("contacts", &["email"]), records).boxed()
}

fn leads(records: Vec<syncbridge_connector::record::Record>) -> Arc<MockConnector> {
    MockConnector::new("warehouse", spec("leads", &["email"]), records).boxed()
}

fn mapping() -> TableMapping {
    TableMapping::new("contacts", "leads", "email", "email")
}

fn pairs(mappings: &[RemoteIdMapping]) -> Vec<(String, Option<String>)> {
    mappings
        .iter()
        .map(|m| (m.source_record_id.clone(), m.destination_record_id.clone()))
        .collect()
}

#[tokio::test]
async fn test_null_and_missing_keys_stay_unmatched() {
    let source = contacts(vec![
        person("s1", Some("a")),
        person("s2", Some("b")),
        person("s3", None),
    ]);
    let destination = leads(vec![person("d1", Some("b")), person("d2", Some("c"))]);
    let caches = Arc::new(InMemoryCacheRepository::new());
    let engine = ReconciliationEngine::new(source, destination, caches.clone());

    let sync_id = SyncId::new();
    let outcome = engine
        .run_reconciliation(sync_id, &mapping(), &Actor::System)
        .await
        .unwrap();

    assert_eq!(
        pairs(&outcome.id_mappings),
        vec![
            ("s1".to_string(), None),
            ("s2".to_string(), Some("d1".to_string())),
            ("s3".to_string(), None),
        ]
    );
    assert_eq!(outcome.statistics.matched, 1);
    assert_eq!(outcome.statistics.unmatched, 2);
    assert_eq!(outcome.statistics.null_keys, 1);

    let persisted = caches.get_id_mappings(sync_id, "contacts").await.unwrap();
    assert_eq!(persisted, outcome.id_mappings);
    let destination_keys = caches.get_match_keys(sync_id, Side::Destination, "leads").await.unwrap();
    assert_eq!(destination_keys, outcome.match_keys.destination);
}

#[tokio::test]
async fn test_one_mapping_row_per_source_record() {
    let source = contacts(vec![
        person("1", Some("john@x")),
        person("2", Some("jane@x")),
        person("3", Some("bob@x")),
    ]);
    let destination = leads(vec![person("10", Some("john@x")), person("11", Some("jane@x"))]);
    let engine = ReconciliationEngine::new(
        source,
        destination,
        Arc::new(InMemoryCacheRepository::new()),
    );

    let outcome = engine
        .run_reconciliation(SyncId::new(), &mapping(), &Actor::User("u-1".to_string()))
        .await
        .unwrap();

    assert_eq!(outcome.id_mappings.len(), 3);
    assert_eq!(outcome.destination_for("1"), Some("10"));
    assert_eq!(outcome.destination_for("2"), Some("11"));
    assert_eq!(outcome.destination_for("3"), None);
    assert_eq!(outcome.source_records.len(), 3);
    assert_eq!(outcome.destination_records.len(), 2);
}

#[tokio::test]
async fn test_duplicate_destination_keys_resolve_to_first() {
    let source = contacts(vec![person("s1", Some("dup@x"))]);
    let destination = leads(vec![
        person("d1", Some("other@x")),
        person("d2", Some("dup@x")),
        person("d3", Some("dup@x")),
    ]);
    let engine = ReconciliationEngine::new(
        source,
        destination,
        Arc::new(InMemoryCacheRepository::new()),
    );

    for _ in 0..2 {
        let outcome = engine
            .run_reconciliation(SyncId::new(), &mapping(), &Actor::System)
            .await
            .unwrap();
        assert_eq!(outcome.destination_for("s1"), Some("d2"));
        assert_eq!(outcome.statistics.duplicate_destination_keys, 1);
    }
}

#[tokio::test]
async fn test_reruns_without_changes_yield_identical_caches() {
    let source = contacts(vec![
        person("1", Some(" john@x ")),
        person("2", Some("jane@x")),
        person("3", Some("")),
    ]);
    let destination = leads(vec![person("10", Some("john@x")), person("11", Some("jane@x"))]);
    let caches = Arc::new(InMemoryCacheRepository::new());
    let engine = ReconciliationEngine::new(source, destination, caches.clone());
    let sync_id = SyncId::new();

    engine
        .run_reconciliation(sync_id, &mapping(), &Actor::System)
        .await
        .unwrap();
    let first_keys = caches.get_match_keys(sync_id, Side::Source, "contacts").await.unwrap();
    let first_mappings = caches.get_id_mappings(sync_id, "contacts").await.unwrap();

    engine
        .run_reconciliation(sync_id, &mapping(), &Actor::System)
        .await
        .unwrap();
    assert_eq!(caches.get_match_keys(sync_id, Side::Source, "contacts").await.unwrap(), first_keys);
    assert_eq!(caches.get_id_mappings(sync_id, "contacts").await.unwrap(), first_mappings);

    // Keys are trimmed; blank keys are null
    assert_eq!(first_keys[0].key_value.as_deref(), Some("john@x"));
    assert_eq!(first_keys[2].key_value, None);
}

#[tokio::test]
async fn test_each_run_replaces_previous_rows() {
    let source = contacts(vec![person("1", Some("a")), person("2", Some("b"))]);
    let destination = leads(vec![person("10", Some("a"))]);
    let caches = Arc::new(InMemoryCacheRepository::new());
    let engine = ReconciliationEngine::new(source.clone(), destination, caches.clone());
    let sync_id = SyncId::new();

    engine
        .run_reconciliation(sync_id, &mapping(), &Actor::System)
        .await
        .unwrap();
    source.set_records(vec![person("2", Some("b"))]).await;
    engine
        .run_reconciliation(sync_id, &mapping(), &Actor::System)
        .await
        .unwrap();

    let mappings = caches.get_id_mappings(sync_id, "contacts").await.unwrap();
    assert_eq!(pairs(&mappings), vec![("2".to_string(), None)]);
}

#[tokio::test]
async fn test_failed_extraction_keeps_previous_caches_and_releases_locks() {
    let destination = leads(vec![person("10", Some("a"))]);
    let caches = Arc::new(InMemoryCacheRepository::new());
    let locks = Arc::new(InMemoryCollectionLock::new());
    let sync_id = SyncId::new();

    let healthy = ReconciliationEngine::new(
        contacts(vec![person("1", Some("a"))]),
        destination.clone(),
        caches.clone(),
    )
    .with_locks(locks.clone());
    healthy
        .run_reconciliation(sync_id, &mapping(), &Actor::System)
        .await
        .unwrap();

    let broken_source =
        MockConnector::new("crm", spec("contacts", &["email"]), Vec::new()).failing_extraction();
    let broken = ReconciliationEngine::new(broken_source.boxed(), destination, caches.clone())
        .with_locks(locks.clone());
    let err = broken
        .run_reconciliation(sync_id, &mapping(), &Actor::System)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Connector { side: Side::Source, .. }));
    assert!(err.is_transient());
    let mappings = caches.get_id_mappings(sync_id, "contacts").await.unwrap();
    assert_eq!(pairs(&mappings), vec![("1".to_string(), Some("10".to_string()))]);
    assert_eq!(locks.holder(&LockKey::new("crm", "contacts")).await, None);
    assert_eq!(locks.holder(&LockKey::new("warehouse", "leads")).await, None);
}

#[tokio::test]
async fn test_same_collection_id_on_different_connectors() {
    let source = MockConnector::new(
        "postgres",
        spec("contacts", &["email"]),
        vec![person("1", Some("ann@x")), person("2", Some("bo@x"))],
    )
    .boxed();
    let destination = MockConnector::new(
        "sheet",
        spec("contacts", &["email"]),
        vec![person("row-7", Some("bo@x")), person("row-8", Some("cy@x"))],
    )
    .boxed();
    let caches = Arc::new(InMemoryCacheRepository::new());
    let engine = ReconciliationEngine::new(source, destination, caches.clone());
    let mapping = TableMapping::new("contacts", "contacts", "email", "email");
    let sync_id = SyncId::new();

    let outcome = engine
        .run_reconciliation(sync_id, &mapping, &Actor::System)
        .await
        .unwrap();
    assert_eq!(outcome.destination_for("1"), None);
    assert_eq!(outcome.destination_for("2"), Some("row-7"));

    let source_keys = caches
        .get_match_keys(sync_id, Side::Source, "contacts")
        .await
        .unwrap();
    let destination_keys = caches
        .get_match_keys(sync_id, Side::Destination, "contacts")
        .await
        .unwrap();
    assert_eq!(source_keys, outcome.match_keys.source);
    assert_eq!(destination_keys, outcome.match_keys.destination);
    let ids: Vec<_> = destination_keys.iter().map(|k| k.record_id.as_str()).collect();
    assert_eq!(ids, vec!["row-7", "row-8"]);
}

#[tokio::test]
async fn test_missing_destination_collection() {
    let engine = ReconciliationEngine::new(
        contacts(Vec::new()),
        leads(Vec::new()),
        Arc::new(InMemoryCacheRepository::new()),
    );
    let mapping = TableMapping::new("contacts", "prospects", "email", "email");

    let err = engine
        .run_reconciliation(SyncId::new(), &mapping, &Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Connector { side: Side::Destination, .. }));
    assert_eq!(err.error_code(), "SCHEMA_NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_key_column_is_rejected_before_extraction() {
    let source = contacts(vec![person("1", Some("a"))]);
    let engine = ReconciliationEngine::new(
        source.clone(),
        leads(Vec::new()),
        Arc::new(InMemoryCacheRepository::new()),
    );
    let mapping = TableMapping::new("contacts", "leads", "mail", "email");

    let err = engine
        .run_reconciliation(SyncId::new(), &mapping, &Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidMapping { .. }));
    assert_eq!(source.pages_served(), 0);
}

#[tokio::test]
async fn test_locked_collection_refuses_to_start() {
    let source = contacts(vec![person("1", Some("a"))]);
    let locks = Arc::new(InMemoryCollectionLock::new());
    locks
        .try_acquire(&LockKey::new("warehouse", "leads"), "import-job")
        .await
        .unwrap();
    let engine = ReconciliationEngine::new(
        source.clone(),
        leads(Vec::new()),
        Arc::new(InMemoryCacheRepository::new()),
    )
    .with_locks(locks.clone());

    let err = engine
        .run_reconciliation(SyncId::new(), &mapping(), &Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::CollectionLocked { .. }));
    assert_eq!(source.pages_served(), 0);
    assert_eq!(locks.holder(&LockKey::new("crm", "contacts")).await, None);
    assert_eq!(
        locks.holder(&LockKey::new("warehouse", "leads")).await.as_deref(),
        Some("import-job")
    );
}

#[tokio::test]
async fn test_cancelled_run_persists_nothing() {
    let cancel = CancellationToken::new();
    let source = MockConnector::new(
        "crm",
        spec("contacts", &["email"]),
        vec![
            person("1", Some("a")),
            person("2", Some("b")),
            person("3", Some("c")),
            person("4", Some("d")),
        ],
    )
    .cancelling_after_first_page(cancel.clone())
    .boxed();
    let caches = Arc::new(InMemoryCacheRepository::new());
    let locks = Arc::new(InMemoryCollectionLock::new());
    let engine = ReconciliationEngine::new(source.clone(), leads(Vec::new()), caches.clone())
        .with_locks(locks.clone())
        .with_cancellation(cancel);
    let sync_id = SyncId::new();

    let err = engine
        .run_reconciliation(sync_id, &mapping(), &Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Cancelled { .. }));
    assert_eq!(source.pages_served(), 1);
    assert!(caches.get_match_keys(sync_id, Side::Source, "contacts").await.unwrap().is_empty());
    assert!(caches.get_id_mappings(sync_id, "contacts").await.unwrap().is_empty());
    assert_eq!(locks.holder(&LockKey::new("crm", "contacts")).await, None);
}

#[tokio::test]
async fn test_persistence_can_be_disabled() {
    let caches = Arc::new(InMemoryCacheRepository::new());
    let engine = ReconciliationEngine::new(
        contacts(vec![person("1", Some("a"))]),
        leads(vec![person("10", Some("a"))]),
        caches.clone(),
    )
    .with_config(ReconciliationConfig::default().without_persistence());
    let sync_id = SyncId::new();

    let outcome = engine
        .run_reconciliation(sync_id, &mapping(), &Actor::System)
        .await
        .unwrap();
    assert_eq!(outcome.statistics.matched, 1);
    assert!(caches.get_id_mappings(sync_id, "contacts").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_progress_ends_completed() {
    let (sink, receiver) = WatchProgressSink::channel();
    let engine = ReconciliationEngine::new(
        contacts(vec![person("1", Some("a")), person("2", Some("b"))]),
        leads(vec![person("10", Some("a"))]),
        Arc::new(InMemoryCacheRepository::new()),
    )
    .with_progress(Arc::new(sink));

    engine
        .run_reconciliation(SyncId::new(), &mapping(), &Actor::System)
        .await
        .unwrap();

    let last = (*receiver.borrow()).unwrap();
    assert_eq!(last.current_phase, ReconciliationPhase::Completed);
    assert_eq!(last.processed, 2);
    assert_eq!(last.total, Some(2));
}

#[tokio::test]
async fn test_extraction_pages_through_small_batches() {
    let records = (0..7)
        .map(|i| person(&i.to_string(), Some(format!("user{i}@x").as_str())))
        .collect();
    let source = contacts(records);
    let engine = ReconciliationEngine::new(
        source.clone(),
        leads(Vec::new()),
        Arc::new(InMemoryCacheRepository::new()),
    )
    .with_config(ReconciliationConfig::default().with_batch_size(3));

    let outcome = engine
        .run_reconciliation(SyncId::new(), &mapping(), &Actor::System)
        .await
        .unwrap();
    assert_eq!(outcome.source_records.len(), 7);
    // Mock pages hold at most two records
    assert_eq!(source.pages_served(), 4);
}
