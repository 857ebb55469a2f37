//! Connector capability traits
//!
//! A connector is one `Connector` implementation plus the capability traits
//! for discovery, extraction and mutation. [`FullConnector`] is the composed
//! surface the registry hands out.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::{ConnectorError, ConnectorResult};
use crate::error_details::ErrorDetails;
use crate::mutation::{CreatedRecord, RecordOutcome};
use crate::record::{EntityId, PageCursor, Record, RecordPage, RecordStream};
use crate::schema::{CollectionSummary, TableSpec};
use crate::type_mapper::TypeMapper;
use crate::types::ConnectorType;

/// Default extraction batch size when the caller has no preference.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get the kind of source this connector talks to.
    fn connector_type(&self) -> ConnectorType;

    /// Get the display name for this connector instance.
    fn display_name(&self) -> &str;

    /// The type mapper for this source's native types.
    fn type_mapper(&self) -> &dyn TypeMapper;

    /// Perform the cheapest non-mutating round trip to the source.
    async fn test_connection(&self) -> ConnectorResult<()>;

    /// Describe an error for display.
    ///
    /// Never fails; sources with native error codes override this to map
    /// them onto the shared vocabulary.
    fn extract_error_details(&self, err: &ConnectorError) -> ErrorDetails {
        ErrorDetails::describe(err, |_| None)
    }

    /// Release pools and other resources.
    async fn dispose(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

/// Capability for discovering collections and their schemas.
#[async_trait]
pub trait SchemaIntrospector: Connector {
    /// List user-visible collections, source-internal namespaces excluded.
    async fn list_collections(&self) -> ConnectorResult<Vec<CollectionSummary>>;

    /// Describe a collection's columns and primary key.
    ///
    /// Fails with `SchemaNotFound` when the collection does not exist.
    async fn describe_collection(&self, collection_id: &str) -> ConnectorResult<TableSpec>;
}

/// Capability for paginated extraction.
#[async_trait]
pub trait RecordExtractor: Connector {
    /// Batch size this source prefers.
    fn default_batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    /// Clamp a requested batch size to what the source accepts.
    fn effective_batch_size(&self, requested: usize) -> usize {
        requested.max(1)
    }

    /// Fetch one page starting at `cursor` (`None` for the first page).
    async fn fetch_page(
        &self,
        spec: &TableSpec,
        batch_size: usize,
        cursor: Option<PageCursor>,
    ) -> ConnectorResult<RecordPage>;

    /// Lazily stream every record of a collection in batches.
    ///
    /// Ordering is stable for one run. The stream ends after the first page
    /// without a next cursor, or the first empty page. It cannot resume from
    /// the middle; restart with a fresh cursor instead.
    fn pull_records<'a>(
        &'a self,
        spec: &'a TableSpec,
        batch_size: usize,
        cursor: Option<PageCursor>,
    ) -> RecordStream<'a> {
        let batch_size = self.effective_batch_size(batch_size);
        stream::try_unfold(Some(cursor), move |state| async move {
            let Some(cursor) = state else {
                return Ok(None);
            };
            let page = self.fetch_page(spec, batch_size, cursor).await?;
            if page.records.is_empty() {
                return Ok(None);
            }
            let next = page.next_cursor.map(Some);
            Ok(Some((page.records, next)))
        })
        .boxed()
    }
}

/// Capability for batched writes.
#[async_trait]
pub trait MutationExecutor: Connector {
    /// Largest batch one call accepts, if the source imposes a limit.
    fn write_batch_limit(&self) -> Option<usize> {
        None
    }

    /// Create records, returning their identities in input order.
    ///
    /// Fails with `RowCountMismatch`, returning nothing, when the source
    /// confirms a different number of rows than submitted.
    async fn create_records(
        &self,
        spec: &TableSpec,
        records: &[Record],
    ) -> ConnectorResult<Vec<CreatedRecord>>;

    /// Update records by identity; vanished targets come back as `NotFound`.
    async fn update_records(
        &self,
        spec: &TableSpec,
        records: &[Record],
    ) -> ConnectorResult<Vec<RecordOutcome>>;

    /// Delete records by identity; vanished targets come back as `NotFound`.
    async fn delete_records(
        &self,
        spec: &TableSpec,
        ids: &[EntityId],
    ) -> ConnectorResult<Vec<RecordOutcome>>;
}

/// Marker trait for connectors that support every capability.
pub trait FullConnector: SchemaIntrospector + RecordExtractor + MutationExecutor {}

// Blanket implementation for any connector that implements all capabilities
impl<T> FullConnector for T where T: SchemaIntrospector + RecordExtractor + MutationExecutor {}
