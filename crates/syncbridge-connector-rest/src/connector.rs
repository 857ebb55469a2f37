//! Record-store connector implementation
//!
//! Implements the connector capability traits over the record-store HTTP API.

use async_trait::async_trait;
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use syncbridge_connector::config::ConnectorConfig;
use syncbridge_connector::error::{ConnectorError, ConnectorResult};
use syncbridge_connector::error_details::ErrorDetails;
use syncbridge_connector::mutation::{
    ensure_row_count, writable_fields, CreatedRecord, MutationStatus, RecordOutcome,
};
use syncbridge_connector::record::{EntityId, FieldValue, PageCursor, Record, RecordPage};
use syncbridge_connector::registry::{BoxedConnector, ConnectorFactory};
use syncbridge_connector::schema::{CollectionSummary, ColumnSpec, TableSpec, DEFAULT_PRIMARY_KEY};
use syncbridge_connector::traits::{
    Connector, MutationExecutor, RecordExtractor, SchemaIntrospector,
};
use syncbridge_connector::type_mapper::TypeMapper;
use syncbridge_connector::types::ConnectorType;

use crate::config::{RestConfig, MAX_PAGE_SIZE};
use crate::error::{classify_error_code, is_missing_collection, map_http_error};
use crate::retry::{parse_retry_after, AttemptFailure};
use crate::type_mapper::RecordStoreTypeMapper;
use crate::wire::{
    ApiError, CollectionMeta, CollectionsResponse, CreateRequest, CreateResponse, FieldsPayload,
    RecordsPage, RemoteRecord,
};

/// Native type reported for the synthesized record id column.
const RECORD_ID_TYPE: &str = "recordId";

/// Connector for a hosted record store.
///
/// Every collection gains a read-only `id` column holding the store's
/// record id, which is also its primary key. Record fields are keyed by
/// field id; the API itself speaks field names.
pub struct RestConnector {
    config: RestConfig,

    display_name: String,

    client: Client,

    /// Whether the connector has been disposed.
    disposed: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for RestConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestConnector")
            .field("config", &self.config.redacted())
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl RestConnector {
    /// Create a new record-store connector with the given configuration.
    pub fn new(config: RestConfig) -> ConnectorResult<Self> {
        config.validate()?;

        let display_name = format!("rest: {}", config.base_url);
        let client = Self::build_client(&config)?;

        Ok(Self {
            config,
            display_name,
            client,
            disposed: Arc::new(RwLock::new(false)),
        })
    }

    /// Override the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    fn build_client(config: &RestConfig) -> ConnectorResult<Client> {
        Client::builder()
            .timeout(config.timeouts.request())
            .connect_timeout(config.timeouts.connect())
            .build()
            .map_err(|e| {
                ConnectorError::invalid_config(format!("failed to build HTTP client: {e}"))
            })
    }

    async fn check_disposed(&self) -> ConnectorResult<()> {
        if *self.disposed.read().await {
            return Err(ConnectorError::invalid_config("connector has been disposed"));
        }
        Ok(())
    }

    /// Attach configured headers and credentials.
    fn build_request(&self, method: Method, url: &url::Url) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, url.clone())
            .header(header::ACCEPT, "application/json");

        for (name, value) in &self.config.default_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        self.config.auth.apply(builder)
    }

    /// Send a request, resending it while the retry policy allows.
    ///
    /// A status the policy gives up on is returned as-is for the caller to
    /// map. A `POST` is never resent once the store may have acted on it.
    async fn send_with_retry(
        &self,
        method: Method,
        url: &url::Url,
        body: Option<&Value>,
    ) -> ConnectorResult<Response> {
        self.check_disposed().await?;

        let policy = &self.config.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut request = self.build_request(method.clone(), url);
            if let Some(json_body) = body {
                request = request.json(json_body);
            }

            debug!(url = %url, method = %method, attempt, "Sending request");

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    debug!(url = %url, status = %status, attempt, "Received response");
                    if status.is_success() {
                        return Ok(resp);
                    }

                    let retry_after = resp
                        .headers()
                        .get(header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_retry_after);
                    let failure = AttemptFailure::status(status, retry_after);
                    let Some(wait) = policy.next_delay(&method, failure, attempt) else {
                        return Ok(resp);
                    };

                    warn!(
                        url = %url,
                        method = %method,
                        status = %status,
                        attempt,
                        wait_ms = wait.as_millis(),
                        "Transient response, resending"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    let failure = AttemptFailure::from_transport(&e);
                    let Some(wait) = policy.next_delay(&method, failure, attempt) else {
                        return Err(ConnectorError::unavailable_with_source(
                            format!("{method} {url} failed after {attempt} attempts"),
                            e,
                        ));
                    };

                    warn!(
                        url = %url,
                        method = %method,
                        error = %e,
                        attempt,
                        wait_ms = wait.as_millis(),
                        "Request failed, resending"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Pass successful responses through; map everything else.
    async fn expect_success(
        response: Response,
        collection: Option<&str>,
        operation: &str,
    ) -> ConnectorResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_http_error(status, &body, collection, operation))
    }

    async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> ConnectorResult<T> {
        let body = response
            .text()
            .await
            .map_err(|e| ConnectorError::unavailable_with_source(format!("failed to read {what}"), e))?;
        serde_json::from_str(&body).map_err(|e| ConnectorError::Serialization {
            message: format!("invalid {what}: {e}"),
        })
    }

    async fn fetch_meta(&self, collection: Option<&str>) -> ConnectorResult<CollectionsResponse> {
        let url = self.config.endpoint(&["meta", "collections"])?;
        let response = self.send_with_retry(Method::GET, &url, None).await?;
        let response = Self::expect_success(response, collection, "read schema").await?;
        Self::read_json(response, "collection metadata").await
    }

    /// Build a table spec from collection metadata.
    fn table_spec(meta: CollectionMeta) -> TableSpec {
        let mapper = RecordStoreTypeMapper;
        let record_id = ColumnSpec::new(
            DEFAULT_PRIMARY_KEY,
            RECORD_ID_TYPE,
            mapper.map(RECORD_ID_TYPE, false, false),
        )
        .generated()
        .read_only();

        let mut spec = TableSpec::new(&meta.id, &meta.name)
            .with_primary_key(DEFAULT_PRIMARY_KEY)
            .with_column(record_id);

        for field in meta.fields {
            if field.name == DEFAULT_PRIMARY_KEY || field.id == DEFAULT_PRIMARY_KEY {
                warn!(
                    collection = %meta.id,
                    field = %field.id,
                    "Field shadows the record id column and is skipped"
                );
                continue;
            }
            let mapping = mapper.map(&field.field_type, field.is_array, field.nullable);
            let mut column = ColumnSpec::new(&field.name, &field.field_type, mapping).with_id(&field.id);
            if field.readonly {
                column = column.read_only();
            }
            if field.computed {
                column = column.generated();
            }
            spec = spec.with_column(column);
        }

        spec
    }

    /// Convert a remote record, keying fields by column id.
    ///
    /// The store omits empty fields, so every known column is filled with
    /// `Null` when absent. Unknown fields are dropped.
    fn parse_record(spec: &TableSpec, remote: RemoteRecord) -> Record {
        let mut record = Record::new(EntityId::single(&remote.id));
        for (name, value) in remote.fields {
            if let Some(column) = spec.resolve_column(&name) {
                record
                    .fields
                    .insert(column.id.clone(), FieldValue::from_json(value));
            }
        }
        for column in &spec.columns {
            record
                .fields
                .entry(column.id.clone())
                .or_insert(FieldValue::Null);
        }
        if let Some(pk) = spec.primary_key() {
            record.fields.insert(pk.id.clone(), FieldValue::Text(remote.id));
        }
        record
    }

    /// Writable fields of a record, keyed by field name for the API.
    fn payload_fields(spec: &TableSpec, record: &Record) -> ConnectorResult<Map<String, Value>> {
        let fields = writable_fields(spec, record)?;
        Ok(fields
            .into_iter()
            .filter_map(|(id, value)| spec.column(&id).map(|c| (c.name.clone(), value.to_json())))
            .collect())
    }

    fn native_id(spec: &TableSpec, id: &EntityId) -> ConnectorResult<String> {
        let native = id.primary();
        if native.is_empty() {
            return Err(ConnectorError::invalid_data(format!(
                "record '{}' in '{}' has no record id",
                id.local_id, spec.id
            )));
        }
        Ok(native.to_string())
    }

    /// Issue one `PATCH` or `DELETE`.
    ///
    /// A 404 means the record is gone, unless the store reports that the
    /// whole collection is missing.
    async fn mutate_one(
        &self,
        method: Method,
        spec: &TableSpec,
        native_id: &str,
        body: Option<&Value>,
        on_success: MutationStatus,
    ) -> ConnectorResult<MutationStatus> {
        let url = self
            .config
            .endpoint(&["collections", spec.id.as_str(), "records", native_id])?;
        let response = self.send_with_retry(method, &url, body).await?;
        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            if is_missing_collection(&ApiError::parse(&body)) {
                return Err(ConnectorError::schema_not_found(&spec.id));
            }
            debug!(collection = %spec.id, record = %native_id, "Record no longer exists");
            return Ok(MutationStatus::NotFound);
        }
        Self::expect_success(response, None, on_success.as_str()).await?;
        Ok(on_success)
    }
}

#[async_trait]
impl Connector for RestConnector {
    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Rest
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        &RecordStoreTypeMapper
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> ConnectorResult<()> {
        let meta = self.fetch_meta(None).await?;
        info!(
            base_url = %self.config.base_url,
            collections = meta.collections.len(),
            "Record store connection test successful"
        );
        Ok(())
    }

    fn extract_error_details(&self, err: &ConnectorError) -> ErrorDetails {
        ErrorDetails::describe(err, classify_error_code)
    }

    async fn dispose(&self) -> ConnectorResult<()> {
        *self.disposed.write().await = true;
        info!("Record store connector disposed");
        Ok(())
    }
}

#[async_trait]
impl SchemaIntrospector for RestConnector {
    #[instrument(skip(self))]
    async fn list_collections(&self) -> ConnectorResult<Vec<CollectionSummary>> {
        let meta = self.fetch_meta(None).await?;
        let collections: Vec<_> = meta
            .collections
            .into_iter()
            .map(|c| CollectionSummary::new(c.id, c.name))
            .collect();

        info!(count = collections.len(), "Listed collections");
        Ok(collections)
    }

    #[instrument(skip(self))]
    async fn describe_collection(&self, collection_id: &str) -> ConnectorResult<TableSpec> {
        let meta = self.fetch_meta(Some(collection_id)).await?;
        let collection = meta
            .collections
            .into_iter()
            .find(|c| c.id == collection_id || c.name == collection_id)
            .ok_or_else(|| ConnectorError::schema_not_found(collection_id))?;
        Ok(Self::table_spec(collection))
    }
}

#[async_trait]
impl RecordExtractor for RestConnector {
    fn default_batch_size(&self) -> usize {
        self.config.effective_page_size()
    }

    fn effective_batch_size(&self, requested: usize) -> usize {
        requested.clamp(1, MAX_PAGE_SIZE)
    }

    #[instrument(skip(self, spec), fields(collection = %spec.id))]
    async fn fetch_page(
        &self,
        spec: &TableSpec,
        batch_size: usize,
        cursor: Option<PageCursor>,
    ) -> ConnectorResult<RecordPage> {
        let mut url = self
            .config
            .endpoint(&["collections", spec.id.as_str(), "records"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageSize", &self.effective_batch_size(batch_size).to_string());
            if let Some(cursor) = &cursor {
                query.append_pair("offset", cursor.as_str());
            }
        }

        let response = self.send_with_retry(Method::GET, &url, None).await?;
        let response = Self::expect_success(response, Some(spec.id.as_str()), "read records").await?;
        let page: RecordsPage = Self::read_json(response, "records page").await?;

        let records: Vec<Record> = page
            .records
            .into_iter()
            .map(|r| Self::parse_record(spec, r))
            .collect();

        debug!(count = records.len(), has_more = page.offset.is_some(), "Fetched page");

        match page.offset.filter(|o| !o.is_empty()) {
            Some(next) => Ok(RecordPage::with_next(records, PageCursor::new(next))),
            None => Ok(RecordPage::last(records)),
        }
    }
}

#[async_trait]
impl MutationExecutor for RestConnector {
    fn write_batch_limit(&self) -> Option<usize> {
        Some(self.config.write_batch_limit)
    }

    /// One request per batch; the store creates all records or none.
    #[instrument(skip(self, spec, records), fields(collection = %spec.id, count = records.len()))]
    async fn create_records(
        &self,
        spec: &TableSpec,
        records: &[Record],
    ) -> ConnectorResult<Vec<CreatedRecord>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        if records.len() > self.config.write_batch_limit {
            return Err(ConnectorError::invalid_data(format!(
                "batch of {} records exceeds the limit of {} per request",
                records.len(),
                self.config.write_batch_limit
            )));
        }

        let payload = records
            .iter()
            .map(|r| Self::payload_fields(spec, r).map(|fields| FieldsPayload { fields }))
            .collect::<ConnectorResult<Vec<_>>>()?;
        let body = serde_json::to_value(CreateRequest { records: payload })?;

        let url = self
            .config
            .endpoint(&["collections", spec.id.as_str(), "records"])?;
        let response = self.send_with_retry(Method::POST, &url, Some(&body)).await?;
        let response = Self::expect_success(response, Some(spec.id.as_str()), "create records").await?;
        let confirmed: CreateResponse = Self::read_json(response, "create response").await?;

        ensure_row_count(records.len(), confirmed.records.len())?;

        let created: Vec<CreatedRecord> = records
            .iter()
            .zip(confirmed.records)
            .map(|(record, remote)| CreatedRecord {
                local_id: record.id.local_id.clone(),
                native_id: vec![remote.id],
            })
            .collect();

        info!(created = created.len(), "Created records");
        Ok(created)
    }

    /// Records are patched one by one; earlier patches stay applied when a
    /// later one fails.
    #[instrument(skip(self, spec, records), fields(collection = %spec.id, count = records.len()))]
    async fn update_records(
        &self,
        spec: &TableSpec,
        records: &[Record],
    ) -> ConnectorResult<Vec<RecordOutcome>> {
        // Validate the whole batch before the first request
        let planned = records
            .iter()
            .map(|record| -> ConnectorResult<_> {
                let native_id = Self::native_id(spec, &record.id)?;
                let body = serde_json::to_value(FieldsPayload {
                    fields: Self::payload_fields(spec, record)?,
                })?;
                Ok((record.id.local_id.as_str(), native_id, body))
            })
            .collect::<ConnectorResult<Vec<_>>>()?;

        let mut outcomes = Vec::with_capacity(planned.len());
        for (local_id, native_id, body) in planned {
            let status = self
                .mutate_one(Method::PATCH, spec, &native_id, Some(&body), MutationStatus::Updated)
                .await?;
            outcomes.push(RecordOutcome::new(local_id, status));
        }

        let missing = outcomes.iter().filter(|o| o.is_not_found()).count();
        info!(updated = outcomes.len() - missing, not_found = missing, "Updated records");
        Ok(outcomes)
    }

    #[instrument(skip(self, spec, ids), fields(collection = %spec.id, count = ids.len()))]
    async fn delete_records(
        &self,
        spec: &TableSpec,
        ids: &[EntityId],
    ) -> ConnectorResult<Vec<RecordOutcome>> {
        let planned = ids
            .iter()
            .map(|id| -> ConnectorResult<_> { Ok((id.local_id.as_str(), Self::native_id(spec, id)?)) })
            .collect::<ConnectorResult<Vec<_>>>()?;

        let mut outcomes = Vec::with_capacity(planned.len());
        for (local_id, native_id) in planned {
            let status = self
                .mutate_one(Method::DELETE, spec, &native_id, None, MutationStatus::Deleted)
                .await?;
            outcomes.push(RecordOutcome::new(local_id, status));
        }

        let missing = outcomes.iter().filter(|o| o.is_not_found()).count();
        info!(deleted = outcomes.len() - missing, not_found = missing, "Deleted records");
        Ok(outcomes)
    }
}

/// Factory resolving record-store credentials into a [`RestConnector`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RestConnectorFactory;

impl ConnectorFactory for RestConnectorFactory {
    fn create(&self, display_name: &str, credentials: Value) -> ConnectorResult<BoxedConnector> {
        let config = RestConfig::from_credentials(credentials)?;
        let connector = RestConnector::new(config)?.with_display_name(display_name);
        Ok(Arc::new(connector))
    }
}
