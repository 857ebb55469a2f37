//! Reconciliation error types

use thiserror::Error;

use syncbridge_connector::error::ConnectorError;

use crate::types::{ReconciliationPhase, Side};

/// Failure of the cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing database failed.
    #[error("cache database error during {operation}: {source}")]
    Database {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    /// Applying the cache schema failed.
    #[error("cache migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be interpreted.
    #[error("corrupt cache row: {message}")]
    Corrupt { message: String },
}

impl CacheError {
    pub fn database(operation: impl Into<String>, source: sqlx::Error) -> Self {
        CacheError::Database {
            operation: operation.into(),
            source,
        }
    }

    /// Connection-level database failures may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CacheError::Database {
                source: sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed,
                ..
            }
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            CacheError::Database { .. } => "CACHE_DATABASE",
            CacheError::Migration(_) => "CACHE_MIGRATION",
            CacheError::Corrupt { .. } => "CACHE_CORRUPT",
        }
    }
}

/// Error aborting a reconciliation run or a mutation batch.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A connector call failed.
    #[error("{side} connector failed: {source}")]
    Connector {
        side: Side,
        #[source]
        source: ConnectorError,
    },

    /// Reading or persisting the caches failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Another operation holds the collection.
    #[error("collection '{collection}' is locked by another operation")]
    CollectionLocked { collection: String },

    /// The table mapping does not fit the collections.
    #[error("invalid table mapping: {message}")]
    InvalidMapping { message: String },

    /// The run was cancelled.
    #[error("cancelled during {phase}")]
    Cancelled { phase: ReconciliationPhase },
}

impl ReconcileError {
    pub fn connector(side: Side, source: ConnectorError) -> Self {
        ReconcileError::Connector { side, source }
    }

    pub fn invalid_mapping(message: impl Into<String>) -> Self {
        ReconcileError::InvalidMapping {
            message: message.into(),
        }
    }

    /// Whether running again later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Connector { source, .. } => source.is_transient(),
            ReconcileError::Cache(e) => e.is_transient(),
            ReconcileError::CollectionLocked { .. } => true,
            ReconcileError::InvalidMapping { .. } | ReconcileError::Cancelled { .. } => false,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ReconcileError::Connector { source, .. } => source.error_code(),
            ReconcileError::Cache(e) => e.error_code(),
            ReconcileError::CollectionLocked { .. } => "COLLECTION_LOCKED",
            ReconcileError::InvalidMapping { .. } => "INVALID_MAPPING",
            ReconcileError::Cancelled { .. } => "CANCELLED",
        }
    }

    /// The connector error behind this failure, if any.
    pub fn connector_error(&self) -> Option<&ConnectorError> {
        match self {
            ReconcileError::Connector { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
