//! Batch applier tests.

mod helpers;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use helpers::mock_connector::{person, spec, MockConnector};
use syncbridge_connector::mutation::MutationStatus;
use syncbridge_connector::record::{EntityId, Record};
use syncbridge_reconcile::prelude::*;
use syncbridge_reconcile::LockKey;

fn drafts(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| Record::draft(format!("local-{i}")).with("email", format!("user{i}@x")))
        .collect()
}

#[tokio::test]
async fn test_creates_split_to_write_limit() {
    let connector = MockConnector::new("airtable", spec("leads", &["email"]), Vec::new())
        .with_write_limit(2)
        .boxed();
    let applier = BatchApplier::new(connector.clone());
    assert_eq!(applier.batch_size(), 2);

    let results = applier
        .apply(vec![TablePlan::new(spec("leads", &["email"])).with_creates(drafts(5))])
        .await;
    let report = results.into_iter().next().unwrap();

    assert!(report.is_complete());
    assert_eq!(connector.write_calls(), 3);
    assert_eq!(report.created.len(), 5);
    assert_eq!(report.created[0].local_id, "local-0");
    assert_eq!(report.created[4].native_id, vec!["new-5".to_string()]);
    assert_eq!(connector.records().await.len(), 5);
}

#[tokio::test]
async fn test_vanished_targets_are_reported_not_fatal() {
    let connector = MockConnector::new(
        "airtable",
        spec("leads", &["email"]),
        vec![person("1", Some("a@x")), person("2", Some("b@x"))],
    )
    .boxed();
    let applier = BatchApplier::new(connector.clone());

    let plan = TablePlan::new(spec("leads", &["email"]))
        .with_updates(vec![person("1", Some("a@y")), person("9", Some("z@y"))])
        .with_deletes(vec![EntityId::single("2"), EntityId::single("8")]);
    let report = applier.apply(vec![plan]).await.into_iter().next().unwrap();
    assert!(report.is_complete());

    assert_eq!(report.updated[0].status, MutationStatus::Updated);
    assert!(report.updated[1].is_not_found());
    assert_eq!(report.deleted[0].status, MutationStatus::Deleted);
    assert_eq!(report.not_found(), 2);

    let remaining = connector.records().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id.primary(), "1");
}

#[tokio::test]
async fn test_failed_batch_keeps_committed_ids() {
    let connector = MockConnector::new("airtable", spec("leads", &["email"]), Vec::new())
        .with_write_limit(2)
        .failing_write_call(2)
        .boxed();
    let applier = BatchApplier::new(connector.clone());

    let report = applier
        .apply(vec![TablePlan::new(spec("leads", &["email"])).with_creates(drafts(4))])
        .await
        .into_iter()
        .next()
        .unwrap();

    let err = report.error.as_ref().unwrap();
    assert!(matches!(err, ReconcileError::Connector { side: Side::Destination, .. }));
    assert!(err.is_transient());
    assert_eq!(report.committed(), 2);
    let locals: Vec<_> = report.created.iter().map(|c| c.local_id.as_str()).collect();
    assert_eq!(locals, vec!["local-0", "local-1"]);
    assert_eq!(connector.records().await.len(), 2);
    assert_eq!(connector.write_calls(), 2);
}

#[tokio::test]
async fn test_cancellation_between_batches_keeps_earlier_writes() {
    let cancel = CancellationToken::new();
    let connector = MockConnector::new("airtable", spec("leads", &["email"]), Vec::new())
        .cancelling_after_first_write(cancel.clone())
        .boxed();
    let applier = BatchApplier::new(connector.clone())
        .with_config(ReconciliationConfig::default().with_batch_size(2))
        .with_cancellation(cancel);

    let plan = TablePlan::new(spec("leads", &["email"])).with_creates(drafts(5));
    let report = applier.apply(vec![plan]).await.into_iter().next().unwrap();

    assert!(matches!(report.error, Some(ReconcileError::Cancelled { .. })));
    assert_eq!(report.created.len(), 2);
    assert_eq!(connector.write_calls(), 1);
    assert_eq!(connector.records().await.len(), 2);
}

#[tokio::test]
async fn test_cancelled_before_first_batch() {
    let connector = MockConnector::new("airtable", spec("leads", &["email"]), Vec::new()).boxed();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let applier = BatchApplier::new(connector.clone()).with_cancellation(cancel);

    let results = applier
        .apply(vec![TablePlan::new(spec("leads", &["email"])).with_creates(drafts(3))])
        .await;

    assert!(matches!(
        results[0].error,
        Some(ReconcileError::Cancelled {
            phase: ReconciliationPhase::ApplyMutations
        })
    ));
    assert_eq!(results[0].committed(), 0);
    assert_eq!(connector.write_calls(), 0);
}

#[tokio::test]
async fn test_locked_table_refused_while_others_proceed() {
    let connector = MockConnector::new("airtable", spec("leads", &["email"]), Vec::new()).boxed();
    let locks = Arc::new(InMemoryCollectionLock::new());
    locks
        .try_acquire(&LockKey::new("airtable", "accounts"), "reconcile-run")
        .await
        .unwrap();
    let applier = BatchApplier::new(connector.clone()).with_locks(locks.clone());

    let results = applier
        .apply(vec![
            TablePlan::new(spec("accounts", &["email"])).with_creates(drafts(1)),
            TablePlan::new(spec("leads", &["email"])).with_creates(drafts(2)),
        ])
        .await;

    assert!(matches!(
        results[0].error,
        Some(ReconcileError::CollectionLocked { .. })
    ));
    assert!(results[1].is_complete());
    assert_eq!(results[1].created.len(), 2);
    assert_eq!(locks.holder(&LockKey::new("airtable", "leads")).await, None);
}

#[tokio::test]
async fn test_progress_counts_applied_writes() {
    let connector = MockConnector::new("airtable", spec("leads", &["email"]), Vec::new()).boxed();
    let (sink, receiver) = WatchProgressSink::channel();
    let applier = BatchApplier::new(connector)
        .with_config(ReconciliationConfig::default().with_batch_size(2))
        .with_progress(Arc::new(sink));

    applier
        .apply(vec![TablePlan::new(spec("leads", &["email"])).with_creates(drafts(3))])
        .await;

    let last = (*receiver.borrow()).unwrap();
    assert_eq!(last.current_phase, ReconciliationPhase::ApplyMutations);
    assert_eq!(last.processed, 3);
    assert_eq!(last.total, Some(3));
}
