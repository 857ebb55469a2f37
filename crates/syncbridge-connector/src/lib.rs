//! # Connector Framework
//!
//! Core abstractions for reading and writing records in external sources:
//! relational databases, spreadsheets and text files, SaaS record stores.
//!
//! ## Architecture
//!
//! Every source kind implements the same capability traits:
//!
//! - [`Connector`] - Base trait: identity, type mapping, connection test, error rendering
//! - [`SchemaIntrospector`] - List collections and describe their columns
//! - [`RecordExtractor`] - Paginated extraction into canonical [`Record`]s
//! - [`MutationExecutor`] - Batched create, update and delete
//!
//! [`FullConnector`] composes all four and is what the [`ConnectorRegistry`]
//! hands out.
//!
//! ## Example
//!
//! ```ignore
//! use syncbridge_connector::prelude::*;
//!
//! let registry = ConnectorRegistry::new();
//! registry.register_factory(ConnectorType::Database, database_factory).await;
//!
//! let connector = registry
//!     .resolve(ConnectorType::Database, "warehouse", credentials)
//!     .await?;
//!
//! connector.test_connection().await?;
//! let spec = connector.describe_collection("customers").await?;
//! let mut batches = connector.pull_records(&spec, 500, None);
//! ```
//!
//! [`Connector`]: traits::Connector
//! [`SchemaIntrospector`]: traits::SchemaIntrospector
//! [`RecordExtractor`]: traits::RecordExtractor
//! [`MutationExecutor`]: traits::MutationExecutor
//! [`FullConnector`]: traits::FullConnector
//! [`ConnectorRegistry`]: registry::ConnectorRegistry
//! [`Record`]: record::Record

pub mod config;
pub mod error;
pub mod error_details;
pub mod mutation;
pub mod record;
pub mod registry;
pub mod schema;
pub mod traits;
pub mod type_mapper;
pub mod types;

/// Prelude module for convenient imports.
///
/// ```
/// use syncbridge_connector::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConnectorConfig, Secret, Timeouts};
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::error_details::{ErrorDetails, ErrorKind};
    pub use crate::mutation::{CreatedRecord, MutationStatus, RecordOutcome};
    pub use crate::record::{EntityId, FieldValue, PageCursor, Record, RecordPage, RecordStream};
    pub use crate::registry::{BoxedConnector, ConnectorFactory, ConnectorRegistry};
    pub use crate::schema::{CollectionDenylist, CollectionSummary, ColumnSpec, TableSpec};
    pub use crate::traits::{
        Connector, FullConnector, MutationExecutor, RecordExtractor, SchemaIntrospector,
    };
    pub use crate::type_mapper::TypeMapper;
    pub use crate::types::{CanonicalType, ConnectorType, TypeMapping};
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;
