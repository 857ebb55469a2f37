//! Batched application of caller-planned mutations.
//!
//! Each table's plan runs creates, then updates, then deletes, in batches no
//! larger than the connector accepts. Tables run concurrently; within a table
//! batches run one after another while the table's lock is held.
//!
//! A failed or cancelled batch stops its table, but the report still carries
//! every batch committed before it.

use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use syncbridge_connector::mutation::{CreatedRecord, RecordOutcome};
use syncbridge_connector::record::{EntityId, Record};
use syncbridge_connector::registry::BoxedConnector;
use syncbridge_connector::schema::TableSpec;
use syncbridge_connector::traits::{Connector, MutationExecutor};

use crate::config::ReconciliationConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::lock::{CollectionLock, InMemoryCollectionLock, LockKey};
use crate::progress::{NoopProgress, ProgressReport, ProgressSink};
use crate::types::{ReconciliationPhase, Side};

/// Writes planned for one collection.
#[derive(Debug, Clone)]
pub struct TablePlan {
    pub spec: TableSpec,
    pub creates: Vec<Record>,
    pub updates: Vec<Record>,
    pub deletes: Vec<EntityId>,
}

impl TablePlan {
    pub fn new(spec: TableSpec) -> Self {
        Self {
            spec,
            creates: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_creates(mut self, records: Vec<Record>) -> Self {
        self.creates = records;
        self
    }

    #[must_use]
    pub fn with_updates(mut self, records: Vec<Record>) -> Self {
        self.updates = records;
        self
    }

    #[must_use]
    pub fn with_deletes(mut self, ids: Vec<EntityId>) -> Self {
        self.deletes = ids;
        self
    }

    pub fn len(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What happened to one table's plan.
#[derive(Debug)]
pub struct TableReport {
    pub collection_id: String,
    pub created: Vec<CreatedRecord>,
    pub updated: Vec<RecordOutcome>,
    pub deleted: Vec<RecordOutcome>,
    /// Why the plan stopped early; `None` when every batch was applied.
    pub error: Option<ReconcileError>,
}

impl TableReport {
    fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            error: None,
        }
    }

    fn failed(collection_id: impl Into<String>, error: ReconcileError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(collection_id)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Writes committed before the plan stopped or finished.
    pub fn committed(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Updates and deletes whose target had already vanished.
    pub fn not_found(&self) -> usize {
        self.updated
            .iter()
            .chain(&self.deleted)
            .filter(|o| o.is_not_found())
            .count()
    }
}

/// Applies table plans against one connector.
pub struct BatchApplier {
    connector: BoxedConnector,
    side: Side,
    locks: Arc<dyn CollectionLock>,
    config: ReconciliationConfig,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl BatchApplier {
    /// Create an applier writing to the destination side.
    pub fn new(connector: BoxedConnector) -> Self {
        Self {
            connector,
            side: Side::Destination,
            locks: Arc::new(InMemoryCollectionLock::new()),
            config: ReconciliationConfig::default(),
            progress: Arc::new(NoopProgress),
            cancel: CancellationToken::new(),
        }
    }

    /// Attribute connector failures to `side`.
    #[must_use]
    pub fn for_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ReconciliationConfig) -> Self {
        self.config = config;
        self
    }

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

    /// Largest batch sent in one call.
    pub fn batch_size(&self) -> usize {
        let limit = self.connector.write_batch_limit().unwrap_or(usize::MAX);
        self.config.batch_size.min(limit).max(1)
    }

    /// Apply every plan, one report per plan in the same order.
    ///
    /// A failed table does not stop the others.
    pub async fn apply(&self, plans: Vec<TablePlan>) -> Vec<TableReport> {
        join_all(plans.into_iter().map(|plan| self.apply_table(plan))).await
    }

    #[instrument(skip(self, plan), fields(collection = %plan.spec.id, writes = plan.len()))]
    async fn apply_table(&self, plan: TablePlan) -> TableReport {
        let key = LockKey::new(self.connector.display_name(), &plan.spec.id);
        let holder = Uuid::new_v4().to_string();
        match self.locks.try_acquire(&key, &holder).await {
            Ok(true) => {}
            Ok(false) => {
                let error = ReconcileError::CollectionLocked {
                    collection: key.to_string(),
                };
                warn!(error = %error, "Table plan refused");
                return TableReport::failed(&plan.spec.id, error);
            }
            Err(e) => return TableReport::failed(&plan.spec.id, e),
        }

        let mut report = TableReport::new(&plan.spec.id);
        if let Err(e) = self.apply_locked(&plan, &mut report).await {
            report.error = Some(e);
        }
        if let Err(e) = self.locks.release(&key, &holder).await {
            warn!(key = %key, error = %e, "Failed to release collection lock");
        }

        match &report.error {
            None => info!(
                created = report.created.len(),
                updated = report.updated.len(),
                deleted = report.deleted.len(),
                not_found = report.not_found(),
                "Applied table plan"
            ),
            Some(e) => warn!(
                error = %e,
                code = e.error_code(),
                committed = report.committed(),
                "Table plan aborted"
            ),
        }
        report
    }

    fn check_cancelled(&self) -> ReconcileResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled {
                phase: ReconciliationPhase::ApplyMutations,
            });
        }
        Ok(())
    }

    fn report(&self, processed: usize, total: usize) {
        self.progress.report(ProgressReport::new(
            ReconciliationPhase::ApplyMutations,
            processed as u64,
            Some(total as u64),
        ));
    }

    async fn apply_locked(
        &self,
        plan: &TablePlan,
        report: &mut TableReport,
    ) -> ReconcileResult<()> {
        let spec = &plan.spec;
        let size = self.batch_size();
        let total = plan.len();
        let mut processed = 0;

        for batch in plan.creates.chunks(size) {
            self.check_cancelled()?;
            let created = self
                .connector
                .create_records(spec, batch)
                .await
                .map_err(|e| ReconcileError::connector(self.side, e))?;
            report.created.extend(created);
            processed += batch.len();
            debug!(processed, total, "Applied create batch");
            self.report(processed, total);
        }

        for batch in plan.updates.chunks(size) {
            self.check_cancelled()?;
            let outcomes = self
                .connector
                .update_records(spec, batch)
                .await
                .map_err(|e| ReconcileError::connector(self.side, e))?;
            report.updated.extend(outcomes);
            processed += batch.len();
            debug!(processed, total, "Applied update batch");
            self.report(processed, total);
        }

        for batch in plan.deletes.chunks(size) {
            self.check_cancelled()?;
            let outcomes = self
                .connector
                .delete_records(spec, batch)
                .await
                .map_err(|e| ReconcileError::connector(self.side, e))?;
            report.deleted.extend(outcomes);
            processed += batch.len();
            debug!(processed, total, "Applied delete batch");
            self.report(processed, total);
        }

        Ok(())
    }
}
