//! File Connector implementation
//!
//! Serves CSV spreadsheets or markdown document directories from a
//! [`FileStore`]. Every mutation batch is applied to the parsed files in
//! memory and written back only after the whole batch validated.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use syncbridge_connector::config::ConnectorConfig;
use syncbridge_connector::error::{ConnectorError, ConnectorResult};
use syncbridge_connector::mutation::{CreatedRecord, MutationStatus, RecordOutcome};
use syncbridge_connector::record::{EntityId, PageCursor, Record, RecordPage};
use syncbridge_connector::registry::{BoxedConnector, ConnectorFactory};
use syncbridge_connector::schema::{CollectionDenylist, CollectionSummary, TableSpec};
use syncbridge_connector::traits::{
    Connector, MutationExecutor, RecordExtractor, SchemaIntrospector,
};
use syncbridge_connector::type_mapper::TypeMapper;
use syncbridge_connector::types::ConnectorType;

use crate::config::{FileConfig, FileFormat};
use crate::documents::{self, Document};
use crate::infer::FileTypeMapper;
use crate::local::LocalFileStore;
use crate::spreadsheet::{self, Sheet};
use crate::store::{join_key, EntryKind, FileStore};

/// Hidden files and underscore-prefixed scratch entries.
const HIDDEN_PATTERNS: &[&str] = &["^\\.", "^_"];

/// File-backed connector.
pub struct FileConnector {
    config: FileConfig,

    display_name: String,

    denylist: CollectionDenylist,

    store: Arc<dyn FileStore>,

    /// Serializes read-modify-write cycles on whole files.
    write_lock: Mutex<()>,

    disposed: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for FileConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConnector")
            .field("config", &self.config)
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl FileConnector {
    /// Create a connector over the local directory named in the config.
    pub fn new(config: FileConfig) -> ConnectorResult<Self> {
        let store = Arc::new(LocalFileStore::new(&config.root));
        Self::with_store(config, store)
    }

    /// Create a connector over any store.
    pub fn with_store(config: FileConfig, store: Arc<dyn FileStore>) -> ConnectorResult<Self> {
        config.validate()?;

        let display_name = format!("{}: {}", config.format.as_str(), config.root);
        let denylist =
            CollectionDenylist::new(config.hidden_collections.iter().cloned(), HIDDEN_PATTERNS)?;

        Ok(Self {
            config,
            display_name,
            denylist,
            store,
            write_lock: Mutex::new(()),
            disposed: Arc::new(RwLock::new(false)),
        })
    }

    /// Override the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn format(&self) -> FileFormat {
        self.config.format
    }

    async fn check_disposed(&self) -> ConnectorResult<()> {
        if *self.disposed.read().await {
            return Err(ConnectorError::invalid_config("connector has been disposed"));
        }
        Ok(())
    }

    /// Resolve a collection id, hiding denied and nested names.
    fn check_collection(&self, collection_id: &str) -> ConnectorResult<()> {
        if collection_id.is_empty()
            || collection_id.contains('/')
            || self.denylist.is_denied(collection_id)
        {
            return Err(ConnectorError::schema_not_found(collection_id));
        }
        Ok(())
    }

    async fn load_sheet(&self, collection_id: &str) -> ConnectorResult<Sheet> {
        let data = self
            .store
            .get_file(&spreadsheet::file_key(collection_id))
            .await?
            .ok_or_else(|| ConnectorError::schema_not_found(collection_id))?;
        Sheet::parse(collection_id, &data)
    }

    async fn save_sheet(&self, collection_id: &str, sheet: &Sheet) -> ConnectorResult<()> {
        self.store
            .put_file(&spreadsheet::file_key(collection_id), sheet.to_bytes()?)
            .await
    }

    /// Load every document of a collection, sorted by id.
    async fn load_documents(&self, collection_id: &str) -> ConnectorResult<Vec<(String, Document)>> {
        let names = self.store.list_files(collection_id).await?;
        let mut docs = Vec::new();
        for name in names {
            let Some(id) = documents::document_id(&name) else {
                continue;
            };
            let Some(data) = self.store.get_file(&join_key(collection_id, &name)).await? else {
                continue;
            };
            docs.push((id.to_string(), Self::decode_document(&name, &data)?));
        }
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(docs)
    }

    fn decode_document(name: &str, data: &[u8]) -> ConnectorResult<Document> {
        let text = std::str::from_utf8(data)
            .map_err(|e| ConnectorError::invalid_data(format!("'{name}' is not UTF-8: {e}")))?;
        Document::parse(name, text)
    }

    /// Store key of an existing document, if the id can name one.
    fn document_key(collection_id: &str, id: &str) -> Option<String> {
        if id.is_empty() || id.contains('/') || id.starts_with('.') {
            return None;
        }
        Some(join_key(collection_id, &format!("{id}{}", documents::EXTENSION)))
    }

    async fn all_records(&self, spec: &TableSpec) -> ConnectorResult<Vec<Record>> {
        self.check_collection(&spec.id)?;
        match self.config.format {
            FileFormat::Csv => {
                let sheet = self.load_sheet(&spec.id).await?;
                Ok(sheet.records(spec))
            }
            FileFormat::Markdown => {
                let docs = self.load_documents(&spec.id).await?;
                Ok(docs
                    .iter()
                    .map(|(id, doc)| documents::record(spec, id, doc))
                    .collect())
            }
        }
    }

    async fn create_documents(
        &self,
        spec: &TableSpec,
        records: &[Record],
    ) -> ConnectorResult<Vec<CreatedRecord>> {
        let existing: BTreeSet<String> = self.store.list_files(&spec.id).await?.into_iter().collect();

        let mut planned: Vec<(String, Document)> = Vec::with_capacity(records.len());
        let mut created = Vec::with_capacity(records.len());
        for record in records {
            let name = documents::file_name_for(&record.id.local_id).ok_or_else(|| {
                ConnectorError::InvalidIdentifier {
                    identifier: record.id.local_id.clone(),
                }
            })?;
            if existing.contains(&name) || planned.iter().any(|(n, _)| *n == name) {
                return Err(ConnectorError::ConstraintViolation {
                    message: format!("document '{name}' already exists in '{}'", spec.id),
                });
            }
            let doc = documents::new_document(spec, record)?;
            let id = documents::document_id(&name).unwrap_or(name.as_str()).to_string();
            created.push(CreatedRecord {
                local_id: record.id.local_id.clone(),
                native_id: vec![id],
            });
            planned.push((name, doc));
        }

        for (name, doc) in planned {
            self.store
                .put_file(&join_key(&spec.id, &name), doc.render()?.into_bytes())
                .await?;
        }
        Ok(created)
    }

    async fn update_documents(
        &self,
        spec: &TableSpec,
        records: &[Record],
    ) -> ConnectorResult<Vec<RecordOutcome>> {
        let mut pending: BTreeMap<String, Document> = BTreeMap::new();
        let mut outcomes = Vec::with_capacity(records.len());

        for record in records {
            let Some(key) = Self::document_key(&spec.id, record.id.primary()) else {
                outcomes.push(RecordOutcome::new(&record.id.local_id, MutationStatus::NotFound));
                continue;
            };
            if !pending.contains_key(&key) {
                match self.store.get_file(&key).await? {
                    Some(data) => {
                        let doc = Self::decode_document(&key, &data)?;
                        pending.insert(key.clone(), doc);
                    }
                    None => {
                        outcomes
                            .push(RecordOutcome::new(&record.id.local_id, MutationStatus::NotFound));
                        continue;
                    }
                }
            }
            if let Some(doc) = pending.get_mut(&key) {
                documents::update_document(spec, doc, record)?;
            }
            outcomes.push(RecordOutcome::new(&record.id.local_id, MutationStatus::Updated));
        }

        for (key, doc) in pending {
            self.store.put_file(&key, doc.render()?.into_bytes()).await?;
        }
        Ok(outcomes)
    }

    async fn delete_documents(
        &self,
        spec: &TableSpec,
        ids: &[EntityId],
    ) -> ConnectorResult<Vec<RecordOutcome>> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let deleted = match Self::document_key(&spec.id, id.primary()) {
                Some(key) => self.store.delete_file(&key).await?,
                None => false,
            };
            let status = if deleted {
                MutationStatus::Deleted
            } else {
                MutationStatus::NotFound
            };
            outcomes.push(RecordOutcome::new(&id.local_id, status));
        }
        Ok(outcomes)
    }
}

#[async_trait]
impl Connector for FileConnector {
    fn connector_type(&self) -> ConnectorType {
        ConnectorType::File
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        &FileTypeMapper
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> ConnectorResult<()> {
        self.check_disposed().await?;
        let entries = self.store.list_collections().await?;
        info!(entries = entries.len(), "File store reachable");
        Ok(())
    }

    async fn dispose(&self) -> ConnectorResult<()> {
        *self.disposed.write().await = true;
        info!("File connector disposed");
        Ok(())
    }
}

#[async_trait]
impl SchemaIntrospector for FileConnector {
    #[instrument(skip(self))]
    async fn list_collections(&self) -> ConnectorResult<Vec<CollectionSummary>> {
        self.check_disposed().await?;
        let entries = self.store.list_collections().await?;

        let collections = entries
            .into_iter()
            .filter_map(|entry| match (self.config.format, entry.kind) {
                (FileFormat::Csv, EntryKind::File) => spreadsheet::collection_id(&entry.name)
                    .map(|id| CollectionSummary::new(id, id)),
                (FileFormat::Markdown, EntryKind::Directory) => {
                    Some(CollectionSummary::new(&entry.name, &entry.name))
                }
                _ => None,
            })
            .collect();
        let visible = self.denylist.filter(collections);

        info!(format = self.config.format.as_str(), count = visible.len(), "Listed collections");
        Ok(visible)
    }

    #[instrument(skip(self))]
    async fn describe_collection(&self, collection_id: &str) -> ConnectorResult<TableSpec> {
        self.check_disposed().await?;
        self.check_collection(collection_id)?;
        match self.config.format {
            FileFormat::Csv => {
                let sheet = self.load_sheet(collection_id).await?;
                Ok(sheet.table_spec(collection_id))
            }
            FileFormat::Markdown => {
                let docs = self.load_documents(collection_id).await?;
                Ok(documents::table_spec(collection_id, &docs))
            }
        }
    }
}

#[async_trait]
impl RecordExtractor for FileConnector {
    /// Pages re-read the file each time; ordering holds while nothing
    /// else writes to the collection.
    #[instrument(skip(self, spec), fields(collection = %spec.id))]
    async fn fetch_page(
        &self,
        spec: &TableSpec,
        batch_size: usize,
        cursor: Option<PageCursor>,
    ) -> ConnectorResult<RecordPage> {
        self.check_disposed().await?;
        let offset = match cursor {
            Some(c) => c.as_offset().ok_or_else(|| {
                ConnectorError::invalid_data(format!("invalid page cursor '{c}'"))
            })?,
            None => 0,
        };
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);

        let all = self.all_records(spec).await?;
        let total = all.len();
        let records: Vec<Record> = all.into_iter().skip(offset).take(batch_size).collect();
        let end = offset.saturating_add(records.len());

        debug!(offset, count = records.len(), total, "Fetched page");

        if end < total {
            Ok(RecordPage::with_next(records, PageCursor::offset(end as u64)))
        } else {
            Ok(RecordPage::last(records))
        }
    }
}

#[async_trait]
impl MutationExecutor for FileConnector {
    #[instrument(skip(self, spec, records), fields(collection = %spec.id, count = records.len()))]
    async fn create_records(
        &self,
        spec: &TableSpec,
        records: &[Record],
    ) -> ConnectorResult<Vec<CreatedRecord>> {
        self.check_disposed().await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        self.check_collection(&spec.id)?;
        let _guard = self.write_lock.lock().await;

        let created = match self.config.format {
            FileFormat::Csv => {
                let mut sheet = self.load_sheet(&spec.id).await?;
                let created = sheet.create(spec, records)?;
                self.save_sheet(&spec.id, &sheet).await?;
                created
            }
            FileFormat::Markdown => self.create_documents(spec, records).await?,
        };

        info!(created = created.len(), "Created records");
        Ok(created)
    }

    #[instrument(skip(self, spec, records), fields(collection = %spec.id, count = records.len()))]
    async fn update_records(
        &self,
        spec: &TableSpec,
        records: &[Record],
    ) -> ConnectorResult<Vec<RecordOutcome>> {
        self.check_disposed().await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        self.check_collection(&spec.id)?;
        let _guard = self.write_lock.lock().await;

        let outcomes = match self.config.format {
            FileFormat::Csv => {
                let mut sheet = self.load_sheet(&spec.id).await?;
                let outcomes = sheet.update(spec, records)?;
                if outcomes.iter().any(|o| !o.is_not_found()) {
                    self.save_sheet(&spec.id, &sheet).await?;
                }
                outcomes
            }
            FileFormat::Markdown => self.update_documents(spec, records).await?,
        };

        let missing = outcomes.iter().filter(|o| o.is_not_found()).count();
        if missing > 0 {
            warn!(missing, "Some records to update no longer exist");
        }
        Ok(outcomes)
    }

    #[instrument(skip(self, spec, ids), fields(collection = %spec.id, count = ids.len()))]
    async fn delete_records(
        &self,
        spec: &TableSpec,
        ids: &[EntityId],
    ) -> ConnectorResult<Vec<RecordOutcome>> {
        self.check_disposed().await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.check_collection(&spec.id)?;
        let _guard = self.write_lock.lock().await;

        let outcomes = match self.config.format {
            FileFormat::Csv => {
                let mut sheet = self.load_sheet(&spec.id).await?;
                let outcomes = sheet.delete(spec, ids)?;
                if outcomes.iter().any(|o| !o.is_not_found()) {
                    self.save_sheet(&spec.id, &sheet).await?;
                }
                outcomes
            }
            FileFormat::Markdown => self.delete_documents(spec, ids).await?,
        };

        debug!(
            deleted = outcomes.iter().filter(|o| !o.is_not_found()).count(),
            "Deleted records"
        );
        Ok(outcomes)
    }
}

/// Builds file connectors from stored credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileConnectorFactory;

impl ConnectorFactory for FileConnectorFactory {
    fn create(&self, display_name: &str, credentials: Value) -> ConnectorResult<BoxedConnector> {
        let config = FileConfig::from_credentials(credentials)?;
        let connector = FileConnector::new(config)?.with_display_name(display_name);
        Ok(Arc::new(connector))
    }
}
