//! In-memory connector serving one collection.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use syncbridge_connector::prelude::*;

struct TextMapper;

impl TypeMapper for TextMapper {
    fn map_scalar(&self, _native_type: &str) -> CanonicalType {
        CanonicalType::Text
    }
}

/// Table spec with an `id` key and the given text columns.
pub fn spec(collection: &str, columns: &[&str]) -> TableSpec {
    let mut spec = TableSpec::new(collection, collection)
        .with_primary_key("id")
        .with_column(
            ColumnSpec::new("id", "text", TypeMapping::new(CanonicalType::Text, false)).generated(),
        );
    for column in columns {
        spec = spec.with_column(ColumnSpec::new(
            *column,
            "text",
            TypeMapping::new(CanonicalType::Text, true),
        ));
    }
    spec
}

/// Record keyed by `id` with an optional `email`.
pub fn person(id: &str, email: Option<&str>) -> Record {
    let email = email.map_or(FieldValue::Null, FieldValue::from);
    Record::new(EntityId::single(id)).with("email", email)
}

pub struct MockConnector {
    name: String,
    spec: TableSpec,
    records: Mutex<Vec<Record>>,
    page_size: usize,
    write_limit: Option<usize>,
    fail_extraction: bool,
    fail_write_call: Option<usize>,
    cancel_after_first_write: Option<CancellationToken>,
    cancel_after_first_page: Option<CancellationToken>,
    pages_served: AtomicUsize,
    write_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl MockConnector {
    pub fn new(name: &str, spec: TableSpec, records: Vec<Record>) -> Self {
        Self {
            name: name.to_string(),
            spec,
            records: Mutex::new(records),
            page_size: 2,
            write_limit: None,
            fail_extraction: false,
            fail_write_call: None,
            cancel_after_first_write: None,
            cancel_after_first_page: None,
            pages_served: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    pub fn failing_extraction(mut self) -> Self {
        self.fail_extraction = true;
        self
    }

    /// Fail the `call`-th write (1-based) before it touches the records.
    pub fn failing_write_call(mut self, call: usize) -> Self {
        self.fail_write_call = Some(call);
        self
    }

    /// Cancel `token` as soon as the first write call arrives.
    pub fn cancelling_after_first_write(mut self, token: CancellationToken) -> Self {
        self.cancel_after_first_write = Some(token);
        self
    }

    fn count_write(&self) -> ConnectorResult<()> {
        let call = self.write_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == 1 {
            if let Some(token) = &self.cancel_after_first_write {
                token.cancel();
            }
        }
        if self.fail_write_call == Some(call) {
            return Err(ConnectorError::unavailable("connection reset"));
        }
        Ok(())
    }

    pub fn cancelling_after_first_page(mut self, token: CancellationToken) -> Self {
        self.cancel_after_first_page = Some(token);
        self
    }

    pub fn boxed(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub async fn set_records(&self, records: Vec<Record>) {
        *self.records.lock().await = records;
    }

    pub async fn records(&self) -> Vec<Record> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Rest
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        &TextMapper
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

#[async_trait]
impl SchemaIntrospector for MockConnector {
    async fn list_collections(&self) -> ConnectorResult<Vec<CollectionSummary>> {
        Ok(vec![CollectionSummary::new(&self.spec.id, &self.spec.name)])
    }

    async fn describe_collection(&self, collection_id: &str) -> ConnectorResult<TableSpec> {
        if collection_id == self.spec.id {
            Ok(self.spec.clone())
        } else {
            Err(ConnectorError::schema_not_found(collection_id))
        }
    }
}

#[async_trait]
impl RecordExtractor for MockConnector {
    fn default_batch_size(&self) -> usize {
        self.page_size
    }

    fn effective_batch_size(&self, requested: usize) -> usize {
        requested.clamp(1, self.page_size)
    }

    async fn fetch_page(
        &self,
        _spec: &TableSpec,
        batch_size: usize,
        cursor: Option<PageCursor>,
    ) -> ConnectorResult<RecordPage> {
        if self.fail_extraction {
            return Err(ConnectorError::unavailable("connection reset"));
        }
        let served = self.pages_served.fetch_add(1, Ordering::SeqCst) + 1;
        if served == 1 {
            if let Some(token) = &self.cancel_after_first_page {
                token.cancel();
            }
        }

        let records = self.records.lock().await;
        let offset = cursor.and_then(|c| c.as_offset()).unwrap_or(0) as usize;
        let end = (offset + batch_size).min(records.len());
        let page = records[offset.min(end)..end].to_vec();
        if end < records.len() {
            Ok(RecordPage::with_next(page, PageCursor::offset(end as u64)))
        } else {
            Ok(RecordPage::last(page))
        }
    }
}

#[async_trait]
impl MutationExecutor for MockConnector {
    fn write_batch_limit(&self) -> Option<usize> {
        self.write_limit
    }

    async fn create_records(
        &self,
        _spec: &TableSpec,
        records: &[Record],
    ) -> ConnectorResult<Vec<CreatedRecord>> {
        self.count_write()?;
        if let Some(limit) = self.write_limit {
            if records.len() > limit {
                return Err(ConnectorError::invalid_data("batch over limit"));
            }
        }
        let mut stored = self.records.lock().await;
        let mut created = Vec::with_capacity(records.len());
        for record in records {
            let id = format!("new-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            let mut stored_record = record.clone();
            stored_record.id = EntityId::single(&id);
            stored.push(stored_record);
            created.push(CreatedRecord {
                local_id: record.id.local_id.clone(),
                native_id: vec![id],
            });
        }
        Ok(created)
    }

    async fn update_records(
        &self,
        _spec: &TableSpec,
        records: &[Record],
    ) -> ConnectorResult<Vec<RecordOutcome>> {
        self.count_write()?;
        let mut stored = self.records.lock().await;
        Ok(records
            .iter()
            .map(|record| {
                let status = match stored.iter_mut().find(|r| r.id.primary() == record.id.primary()) {
                    Some(existing) => {
                        existing.fields.extend(record.fields.clone());
                        MutationStatus::Updated
                    }
                    None => MutationStatus::NotFound,
                };
                RecordOutcome::new(&record.id.local_id, status)
            })
            .collect())
    }

    async fn delete_records(
        &self,
        _spec: &TableSpec,
        ids: &[EntityId],
    ) -> ConnectorResult<Vec<RecordOutcome>> {
        self.count_write()?;
        let mut stored = self.records.lock().await;
        Ok(ids
            .iter()
            .map(|id| {
                let before = stored.len();
                stored.retain(|r| r.id.primary() != id.primary());
                let status = if stored.len() < before {
                    MutationStatus::Deleted
                } else {
                    MutationStatus::NotFound
                };
                RecordOutcome::new(&id.local_id, status)
            })
            .collect())
    }
}
