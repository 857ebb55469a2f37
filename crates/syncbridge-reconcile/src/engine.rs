//! Reconciliation engine orchestrator.
//!
//! A run moves through `ExtractSource`/`ExtractDestination` (concurrently),
//! `BuildMatchKeys` and `BuildIdMapping`, then ends `Completed` or `Failed`.
//! Caches are written once, after everything else succeeded, so a failed or
//! cancelled run leaves the previous run's caches in place.

use futures::TryStreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use syncbridge_connector::record::Record;
use syncbridge_connector::registry::BoxedConnector;
use syncbridge_connector::schema::TableSpec;
use syncbridge_connector::traits::{Connector, RecordExtractor, SchemaIntrospector};

use crate::cache::{CacheRepository, MatchKey, RemoteIdMapping, RunCaches};
use crate::config::ReconciliationConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::lock::{acquire_all, release_all, CollectionLock, InMemoryCollectionLock, LockKey};
use crate::matching::{build_id_mappings, build_match_keys, DestinationIndex};
use crate::progress::{NoopProgress, ProgressReport, ProgressSink};
use crate::statistics::RunStatistics;
use crate::types::{Actor, ReconciliationPhase, Side, SyncId, TableMapping};

/// Match keys of both sides of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchKeys {
    pub source: Vec<MatchKey>,
    pub destination: Vec<MatchKey>,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationOutcome {
    pub sync_id: SyncId,
    pub run_id: Uuid,
    pub source_records: Vec<Record>,
    pub destination_records: Vec<Record>,
    pub match_keys: MatchKeys,
    pub id_mappings: Vec<RemoteIdMapping>,
    pub statistics: RunStatistics,
}

impl ReconciliationOutcome {
    /// Destination partner of a source record, if it has one.
    pub fn destination_for(&self, source_record_id: &str) -> Option<&str> {
        self.id_mappings
            .iter()
            .find(|m| m.source_record_id == source_record_id)
            .and_then(|m| m.destination_record_id.as_deref())
    }
}

/// Matches the records of two connector-backed collections by key.
pub struct ReconciliationEngine {
    source: BoxedConnector,
    destination: BoxedConnector,
    caches: Arc<dyn CacheRepository>,
    locks: Arc<dyn CollectionLock>,
    config: ReconciliationConfig,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("source", &self.source.display_name())
            .field("destination", &self.destination.display_name())
            .field("config", &self.config)
            .finish()
    }
}

impl ReconciliationEngine {
    /// Create an engine with process-local locks and no progress reporting.
    pub fn new(
        source: BoxedConnector,
        destination: BoxedConnector,
        caches: Arc<dyn CacheRepository>,
    ) -> Self {
        Self {
            source,
            destination,
            caches,
            locks: Arc::new(InMemoryCollectionLock::new()),
            config: ReconciliationConfig::default(),
            progress: Arc::new(NoopProgress),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ReconciliationConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a lock table with other engines and batch appliers.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<dyn CollectionLock>) -> Self {
        self.locks = locks;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    fn connector(&self, side: Side) -> &BoxedConnector {
        match side {
            Side::Source => &self.source,
            Side::Destination => &self.destination,
        }
    }

    fn lock_keys(&self, mapping: &TableMapping) -> Vec<LockKey> {
        [Side::Source, Side::Destination]
            .into_iter()
            .map(|side| {
                LockKey::new(
                    self.connector(side).display_name(),
                    mapping.collection_id(side),
                )
            })
            .collect()
    }

    fn check_cancelled(&self, phase: ReconciliationPhase) -> ReconcileResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled { phase });
        }
        Ok(())
    }

    /// Run one reconciliation of `mapping`.
    ///
    /// Refuses to start with `CollectionLocked` when either collection is
    /// busy. Locks are released however the run ends.
    #[instrument(skip(self, mapping), fields(
        sync_id = %sync_id,
        actor = %actor,
        source = %mapping.source_collection_id,
        destination = %mapping.destination_collection_id,
    ))]
    pub async fn run_reconciliation(
        &self,
        sync_id: SyncId,
        mapping: &TableMapping,
        actor: &Actor,
    ) -> ReconcileResult<ReconciliationOutcome> {
        mapping.validate()?;

        let run_id = Uuid::new_v4();
        let holder = run_id.to_string();
        let keys = self.lock_keys(mapping);
        acquire_all(self.locks.as_ref(), &keys, &holder).await?;

        info!(run_id = %run_id, "Started reconciliation run");
        let result = self.run_locked(sync_id, run_id, mapping).await;
        release_all(self.locks.as_ref(), &keys, &holder).await;

        match &result {
            Ok(outcome) => {
                info!(
                    run_id = %run_id,
                    matched = outcome.statistics.matched,
                    unmatched = outcome.statistics.unmatched,
                    duration_ms = outcome.statistics.duration_ms,
                    "Completed reconciliation run"
                );
            }
            Err(e) => {
                self.progress
                    .report(ProgressReport::new(ReconciliationPhase::Failed, 0, None));
                error!(
                    run_id = %run_id,
                    error = %e,
                    code = e.error_code(),
                    transient = e.is_transient(),
                    "Reconciliation run failed"
                );
            }
        }
        result
    }

    async fn run_locked(
        &self,
        sync_id: SyncId,
        run_id: Uuid,
        mapping: &TableMapping,
    ) -> ReconcileResult<ReconciliationOutcome> {
        let started = Instant::now();
        self.check_cancelled(ReconciliationPhase::ExtractSource)?;

        let (source_spec, destination_spec) = tokio::try_join!(
            self.describe(Side::Source, mapping),
            self.describe(Side::Destination, mapping),
        )?;
        Self::check_columns(mapping, &source_spec, &destination_spec)?;

        let (source_records, destination_records) = tokio::try_join!(
            self.extract(Side::Source, &source_spec),
            self.extract(Side::Destination, &destination_spec),
        )?;

        self.check_cancelled(ReconciliationPhase::BuildMatchKeys)?;
        let extracted = (source_records.len() + destination_records.len()) as u64;
        self.progress.report(ProgressReport::new(
            ReconciliationPhase::BuildMatchKeys,
            0,
            Some(extracted),
        ));
        let match_keys = MatchKeys {
            source: build_match_keys(
                sync_id,
                Side::Source,
                &mapping.source_collection_id,
                mapping.key_column(Side::Source),
                &source_records,
            ),
            destination: build_match_keys(
                sync_id,
                Side::Destination,
                &mapping.destination_collection_id,
                mapping.key_column(Side::Destination),
                &destination_records,
            ),
        };

        self.check_cancelled(ReconciliationPhase::BuildIdMapping)?;
        self.progress.report(ProgressReport::new(
            ReconciliationPhase::BuildIdMapping,
            0,
            Some(match_keys.source.len() as u64),
        ));
        let index = DestinationIndex::build(&match_keys.destination);
        let id_mappings = build_id_mappings(&match_keys.source, &index);

        let matched = id_mappings.iter().filter(|m| m.is_matched()).count();
        let null_keys = match_keys
            .source
            .iter()
            .chain(&match_keys.destination)
            .filter(|k| k.key_value.is_none())
            .count();
        let mut statistics = RunStatistics {
            source_records: source_records.len(),
            destination_records: destination_records.len(),
            matched,
            unmatched: id_mappings.len() - matched,
            null_keys,
            duplicate_destination_keys: index.duplicates(),
            duration_ms: 0,
        };

        // Last chance to stop before anything becomes visible
        self.check_cancelled(ReconciliationPhase::BuildIdMapping)?;
        if self.config.persist_caches {
            self.caches
                .replace_run(RunCaches {
                    sync_id,
                    source_collection_id: mapping.source_collection_id.clone(),
                    destination_collection_id: mapping.destination_collection_id.clone(),
                    source_match_keys: match_keys.source.clone(),
                    destination_match_keys: match_keys.destination.clone(),
                    id_mappings: id_mappings.clone(),
                })
                .await?;
        }

        statistics.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.progress.report(ProgressReport::new(
            ReconciliationPhase::Completed,
            id_mappings.len() as u64,
            Some(id_mappings.len() as u64),
        ));

        Ok(ReconciliationOutcome {
            sync_id,
            run_id,
            source_records,
            destination_records,
            match_keys,
            id_mappings,
            statistics,
        })
    }

    async fn describe(&self, side: Side, mapping: &TableMapping) -> ReconcileResult<TableSpec> {
        self.connector(side)
            .describe_collection(mapping.collection_id(side))
            .await
            .map_err(|e| ReconcileError::connector(side, e))
    }

    /// Key and mapped columns must exist on the discovered collections.
    fn check_columns(
        mapping: &TableMapping,
        source: &TableSpec,
        destination: &TableSpec,
    ) -> ReconcileResult<()> {
        let unknown = |e: syncbridge_connector::error::ConnectorError| {
            ReconcileError::invalid_mapping(e.to_string())
        };
        source
            .require_column(mapping.key_column(Side::Source))
            .map_err(unknown)?;
        destination
            .require_column(mapping.key_column(Side::Destination))
            .map_err(unknown)?;
        for column in &mapping.column_mappings {
            source
                .require_column(&column.source_column_id)
                .map_err(unknown)?;
            destination
                .require_column(&column.destination_column_id)
                .map_err(unknown)?;
        }
        Ok(())
    }

    /// Read every record of one side, checking for cancellation between
    /// batches.
    async fn extract(&self, side: Side, spec: &TableSpec) -> ReconcileResult<Vec<Record>> {
        let phase = ReconciliationPhase::extracting(side);
        self.check_cancelled(phase)?;

        let connector = self.connector(side);
        let mut batches = connector.pull_records(spec, self.config.batch_size, None);
        let mut records = Vec::new();
        while let Some(batch) = batches
            .try_next()
            .await
            .map_err(|e| ReconcileError::connector(side, e))?
        {
            records.extend(batch);
            debug!(side = %side, extracted = records.len(), "Extracted batch");
            self.progress
                .report(ProgressReport::new(phase, records.len() as u64, None));
            self.check_cancelled(phase)?;
        }

        info!(side = %side, collection = %spec.id, count = records.len(), "Extraction finished");
        Ok(records)
    }
}
