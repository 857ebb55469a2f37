//! Database Connector implementation
//!
//! Implements the connector capability traits for `PostgreSQL`.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use syncbridge_connector::config::ConnectorConfig;
use syncbridge_connector::error::{ConnectorError, ConnectorResult};
use syncbridge_connector::error_details::ErrorDetails;
use syncbridge_connector::mutation::{
    classify_affected, ensure_row_count, insertable_fields, writable_fields, CreatedRecord, MutationStatus,
    RecordOutcome,
};
use syncbridge_connector::record::{EntityId, FieldValue, PageCursor, Record, RecordPage};
use syncbridge_connector::registry::{BoxedConnector, ConnectorFactory};
use syncbridge_connector::schema::{CollectionDenylist, CollectionSummary, TableSpec};
use syncbridge_connector::traits::{
    Connector, MutationExecutor, RecordExtractor, SchemaIntrospector,
};
use syncbridge_connector::type_mapper::TypeMapper;
use syncbridge_connector::types::ConnectorType;

use crate::config::DatabaseConfig;
use crate::error::{classify_sqlstate, map_sqlx_error, UNDEFINED_TABLE};
use crate::introspect;
use crate::sql;
use crate::transaction::BatchTransaction;
use crate::type_mapper::PostgresTypeMapper;

/// Table names hidden from discovery in every database.
const HIDDEN_TABLES: &[&str] = &["schema_migrations", "spatial_ref_sys"];

/// Table name patterns hidden from discovery.
const HIDDEN_TABLE_PATTERNS: &[&str] = &["^pg_", "^_sqlx", "^__"];

/// `PostgreSQL` connector.
///
/// Collections are the base tables of one schema. Records are ordered by
/// primary key and paged with `LIMIT`/`OFFSET`.
pub struct DatabaseConnector {
    config: DatabaseConfig,

    display_name: String,

    denylist: CollectionDenylist,

    /// Connection pool (lazily initialized).
    pool: Arc<RwLock<Option<PgPool>>>,

    /// Whether the connector has been disposed.
    disposed: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for DatabaseConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConnector")
            .field("config", &self.config.redacted())
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl DatabaseConnector {
    /// Create a new database connector with the given configuration.
    pub fn new(config: DatabaseConfig) -> ConnectorResult<Self> {
        config.validate()?;

        let display_name = format!(
            "postgresql: {}@{}/{}",
            config.username, config.host, config.database
        );
        let names = HIDDEN_TABLES
            .iter()
            .map(|s| (*s).to_string())
            .chain(config.hidden_tables.iter().cloned());
        let denylist = CollectionDenylist::new(names, HIDDEN_TABLE_PATTERNS)?;

        Ok(Self {
            config,
            display_name,
            denylist,
            pool: Arc::new(RwLock::new(None)),
            disposed: Arc::new(RwLock::new(false)),
        })
    }

    /// Create a connector over an existing pool.
    pub fn with_pool(config: DatabaseConfig, pool: PgPool) -> ConnectorResult<Self> {
        let connector = Self::new(config)?;
        Ok(Self {
            pool: Arc::new(RwLock::new(Some(pool))),
            ..connector
        })
    }

    /// Override the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    fn schema(&self) -> &str {
        self.config.effective_schema()
    }

    /// Get a connection pool, creating one if necessary.
    async fn get_pool(&self) -> ConnectorResult<PgPool> {
        if *self.disposed.read().await {
            return Err(ConnectorError::invalid_config("connector has been disposed"));
        }

        {
            let pool_guard = self.pool.read().await;
            if let Some(ref pool) = *pool_guard {
                return Ok(pool.clone());
            }
        }

        let mut pool_guard = self.pool.write().await;
        if let Some(ref pool) = *pool_guard {
            return Ok(pool.clone());
        }
        let pool = self.create_pool().await?;
        *pool_guard = Some(pool.clone());
        Ok(pool)
    }

    async fn create_pool(&self) -> ConnectorResult<PgPool> {
        debug!(host = %self.config.host, database = %self.config.database, "Creating database connection pool");

        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(self.config.timeouts.connect())
            .connect_with(self.config.connect_options())
            .await
            .map_err(|e| {
                map_sqlx_error(
                    &format!(
                        "failed to connect to database at {}:{}",
                        self.config.host,
                        self.config.effective_port()
                    ),
                    e,
                )
            })?;

        info!(
            host = %self.config.host,
            database = %self.config.database,
            "Database connection pool established"
        );

        Ok(pool)
    }

    fn parse_row(spec: &TableSpec, raw: &str) -> ConnectorResult<Record> {
        let mut object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)?;
        let parts = spec
            .primary_key_columns
            .iter()
            .map(|key| {
                object
                    .get(key)
                    .map(|v| FieldValue::from_json(v.clone()))
                    .and_then(|v| v.as_key_string())
                    .ok_or_else(|| {
                        ConnectorError::invalid_data(format!(
                            "row in '{}' has a null primary key column '{key}'",
                            spec.id
                        ))
                    })
            })
            .collect::<ConnectorResult<Vec<_>>>()?;

        let id = match <[String; 1]>::try_from(parts) {
            Ok([single]) => EntityId::single(single),
            Err(parts) => EntityId::composite(parts),
        };
        let mut record = Record::new(id);
        for column in &spec.columns {
            let value = object.remove(&column.name).unwrap_or_default();
            record
                .fields
                .insert(column.id.clone(), FieldValue::from_json(value));
        }
        Ok(record)
    }

    /// JSON object holding every key column, for typed key lookups.
    fn key_json(spec: &TableSpec, id: &EntityId) -> ConnectorResult<String> {
        if id.native_id.len() != spec.primary_key_columns.len() {
            return Err(ConnectorError::invalid_data(format!(
                "id '{}' has {} key part(s), '{}' is keyed by {:?}",
                id,
                id.native_id.len(),
                spec.id,
                spec.primary_key_columns
            )));
        }
        let object: serde_json::Map<String, serde_json::Value> = spec
            .primary_key_columns
            .iter()
            .zip(&id.native_id)
            .map(|(key, part)| (key.clone(), serde_json::Value::String(part.clone())))
            .collect();
        Ok(serde_json::Value::Object(object).to_string())
    }

    /// Key parts returned by an insert.
    fn parse_key_parts(raw: &str) -> ConnectorResult<Vec<String>> {
        let parts: Vec<Option<String>> = serde_json::from_str(raw)?;
        parts
            .into_iter()
            .map(|p| p.ok_or_else(|| ConnectorError::invalid_data("insert returned a null key part")))
            .collect()
    }

    fn payload_json(fields: &std::collections::BTreeMap<String, FieldValue>) -> String {
        let object: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(object).to_string()
    }

    /// Column names of a payload, in payload order.
    fn payload_columns<'a>(
        spec: &'a TableSpec,
        fields: &std::collections::BTreeMap<String, FieldValue>,
    ) -> ConnectorResult<Vec<&'a str>> {
        fields
            .keys()
            .map(|id| spec.require_column(id).map(|c| c.name.as_str()))
            .collect()
    }

    async fn update_one(
        &self,
        tx: &mut BatchTransaction,
        spec: &TableSpec,
        record: &Record,
    ) -> ConnectorResult<MutationStatus> {
        let fields = writable_fields(spec, record)?;
        let key = Self::key_json(spec, &record.id)?;

        let affected = if fields.is_empty() {
            let statement = sql::count_by_key(self.schema(), spec)?;
            let (count,): (i64,) = sqlx::query_as(&statement)
                .bind(&key)
                .fetch_one(tx.conn())
                .await
                .map_err(|e| map_sqlx_error("failed to look up record", e))?;
            u64::try_from(count).unwrap_or_default()
        } else {
            let columns = Self::payload_columns(spec, &fields)?;
            let statement = sql::update_one(self.schema(), spec, &columns)?;
            sqlx::query(&statement)
                .bind(Self::payload_json(&fields))
                .bind(&key)
                .execute(tx.conn())
                .await
                .map_err(|e| map_sqlx_error("failed to update record", e))?
                .rows_affected()
        };

        classify_affected(&spec.id, &record.id.local_id, affected, MutationStatus::Updated)
    }

    async fn delete_one(
        &self,
        tx: &mut BatchTransaction,
        spec: &TableSpec,
        id: &EntityId,
    ) -> ConnectorResult<MutationStatus> {
        let key = Self::key_json(spec, id)?;
        let statement = sql::delete_one(self.schema(), spec)?;
        let affected = sqlx::query(&statement)
            .bind(key)
            .execute(tx.conn())
            .await
            .map_err(|e| map_sqlx_error("failed to delete record", e))?
            .rows_affected();

        classify_affected(&spec.id, &id.local_id, affected, MutationStatus::Deleted)
    }
}

#[async_trait]
impl Connector for DatabaseConnector {
    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Database
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        &PostgresTypeMapper
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> ConnectorResult<()> {
        let pool = self.get_pool().await?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| map_sqlx_error("test query failed", e))?;

        info!(
            host = %self.config.host,
            database = %self.config.database,
            "Database connection test successful"
        );

        Ok(())
    }

    fn extract_error_details(&self, err: &ConnectorError) -> ErrorDetails {
        ErrorDetails::describe(err, classify_sqlstate)
    }

    async fn dispose(&self) -> ConnectorResult<()> {
        *self.disposed.write().await = true;

        let mut pool_guard = self.pool.write().await;
        if let Some(pool) = pool_guard.take() {
            pool.close().await;
        }

        info!("Database connector disposed");
        Ok(())
    }
}

#[async_trait]
impl SchemaIntrospector for DatabaseConnector {
    #[instrument(skip(self))]
    async fn list_collections(&self) -> ConnectorResult<Vec<CollectionSummary>> {
        let pool = self.get_pool().await?;
        let tables = introspect::list_tables(&pool, self.schema()).await?;
        let visible = self.denylist.filter(tables);

        info!(schema = %self.schema(), count = visible.len(), "Listed tables");
        Ok(visible)
    }

    #[instrument(skip(self))]
    async fn describe_collection(&self, collection_id: &str) -> ConnectorResult<TableSpec> {
        if self.denylist.is_denied(collection_id) {
            return Err(ConnectorError::schema_not_found(collection_id));
        }
        let pool = self.get_pool().await?;
        introspect::describe_table(&pool, self.schema(), collection_id, &PostgresTypeMapper).await
    }
}

#[async_trait]
impl RecordExtractor for DatabaseConnector {
    #[instrument(skip(self, spec), fields(collection = %spec.id))]
    async fn fetch_page(
        &self,
        spec: &TableSpec,
        batch_size: usize,
        cursor: Option<PageCursor>,
    ) -> ConnectorResult<RecordPage> {
        let pool = self.get_pool().await?;
        let offset = match cursor {
            Some(c) => c.as_offset().ok_or_else(|| {
                ConnectorError::invalid_data(format!("invalid page cursor '{c}'"))
            })?,
            None => 0,
        };

        let statement = sql::select_page(self.schema(), spec)?;
        let rows: Vec<(String,)> = sqlx::query_as(&statement)
            .bind(i64::try_from(batch_size).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&pool)
            .await
            .map_err(|e| {
                let err = map_sqlx_error("failed to fetch records", e);
                if err.native_code() == Some(UNDEFINED_TABLE) {
                    ConnectorError::schema_not_found(&spec.id)
                } else {
                    err
                }
            })?;

        let records = rows
            .iter()
            .map(|(raw,)| Self::parse_row(spec, raw))
            .collect::<ConnectorResult<Vec<_>>>()?;

        debug!(offset, count = records.len(), "Fetched page");

        if records.len() < batch_size {
            Ok(RecordPage::last(records))
        } else {
            let next = offset + records.len() as u64;
            Ok(RecordPage::with_next(records, PageCursor::offset(next)))
        }
    }
}

#[async_trait]
impl MutationExecutor for DatabaseConnector {
    #[instrument(skip(self, spec, records), fields(collection = %spec.id, count = records.len()))]
    async fn create_records(
        &self,
        spec: &TableSpec,
        records: &[Record],
    ) -> ConnectorResult<Vec<CreatedRecord>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let pool = self.get_pool().await?;
        let mut tx = BatchTransaction::begin(&pool, &spec.id, "create").await?;

        let mut created = Vec::with_capacity(records.len());
        for record in records {
            let inserted: ConnectorResult<Option<(String,)>> = async {
                let fields = insertable_fields(spec, record)?;
                let columns = Self::payload_columns(spec, &fields)?;
                let statement = sql::insert_one(self.schema(), spec, &columns)?;
                sqlx::query_as::<_, (String,)>(&statement)
                    .bind(Self::payload_json(&fields))
                    .fetch_optional(tx.conn())
                    .await
                    .map_err(|e| map_sqlx_error("failed to insert record", e))
            }
            .await;

            let native_id = inserted.and_then(|row| {
                row.map(|(raw,)| Self::parse_key_parts(&raw)).transpose()
            });
            let native_id = match native_id {
                Ok(native_id) => native_id,
                Err(e) => return Err(tx.abort(e).await),
            };
            if let Some(native_id) = native_id {
                created.push(CreatedRecord {
                    local_id: record.id.local_id.clone(),
                    native_id,
                });
            }
        }

        if let Err(e) = ensure_row_count(records.len(), created.len()) {
            return Err(tx.abort(e).await);
        }
        tx.commit().await?;

        info!(created = created.len(), "Created records");
        Ok(created)
    }

    #[instrument(skip(self, spec, records), fields(collection = %spec.id, count = records.len()))]
    async fn update_records(
        &self,
        spec: &TableSpec,
        records: &[Record],
    ) -> ConnectorResult<Vec<RecordOutcome>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let pool = self.get_pool().await?;
        let mut tx = BatchTransaction::begin(&pool, &spec.id, "update").await?;

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            match self.update_one(&mut tx, spec, record).await {
                Ok(status) => outcomes.push(RecordOutcome::new(&record.id.local_id, status)),
                Err(e) => return Err(tx.abort(e).await),
            }
        }
        tx.commit().await?;

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
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let pool = self.get_pool().await?;
        let mut tx = BatchTransaction::begin(&pool, &spec.id, "delete").await?;

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            match self.delete_one(&mut tx, spec, id).await {
                Ok(status) => outcomes.push(RecordOutcome::new(&id.local_id, status)),
                Err(e) => return Err(tx.abort(e).await),
            }
        }
        tx.commit().await?;

        let missing = outcomes.iter().filter(|o| o.is_not_found()).count();
        info!(deleted = outcomes.len() - missing, not_found = missing, "Deleted records");
        Ok(outcomes)
    }
}

/// Factory resolving database credentials into a [`DatabaseConnector`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseConnectorFactory;

impl ConnectorFactory for DatabaseConnectorFactory {
    fn create(
        &self,
        display_name: &str,
        credentials: serde_json::Value,
    ) -> ConnectorResult<BoxedConnector> {
        let config = DatabaseConfig::from_credentials(credentials)?;
        let connector = DatabaseConnector::new(config)?.with_display_name(display_name);
        Ok(Arc::new(connector))
    }
}
