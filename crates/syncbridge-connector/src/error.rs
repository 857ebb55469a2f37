//! Connector error types
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Availability errors (transient)
    /// The source could not be reached or refused service for now.
    #[error("source unavailable: {message}")]
    SourceUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Authentication errors (permanent until credentials change)
    /// Credentials were rejected by the source.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The credentials are valid but lack a required privilege.
    #[error("permission denied for {operation}")]
    PermissionDenied { operation: String },

    // Configuration errors
    /// Connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// No factory is registered for the requested source kind.
    #[error("unsupported connector type: {connector_type}")]
    UnsupportedConnectorType { connector_type: String },

    // Schema errors
    /// The collection does not exist in the source.
    #[error("collection '{collection}' not found")]
    SchemaNotFound { collection: String },

    /// A field name is not part of the discovered column allowlist.
    #[error("column '{column}' is not defined on collection '{collection}'")]
    UnknownColumn { collection: String, column: String },

    /// A native identifier failed validation.
    #[error("invalid identifier: {identifier}")]
    InvalidIdentifier { identifier: String },

    // Mutation errors (fatal for the current batch)
    /// A batched write confirmed a different number of rows than submitted.
    #[error("row count mismatch: submitted {expected}, source confirmed {actual}")]
    RowCountMismatch { expected: usize, actual: usize },

    /// A single logical update or delete touched more than one native row.
    #[error("identity violation on '{collection}': id {native_id} affected {affected} rows")]
    IdentityViolation {
        collection: String,
        native_id: String,
        affected: u64,
    },

    /// The source rejected a write because of a constraint.
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Invalid data format.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// Error reported by the source itself, carrying its native code when known.
    #[error("source error: {message}")]
    Native {
        message: String,
        code: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,

    // Internal errors
    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization error.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl ConnectorError {
    /// Check if this error is transient and the operation may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, ConnectorError::SourceUnavailable { .. })
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Whether this error aborts the whole batch it occurred in.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            ConnectorError::RowCountMismatch { .. } | ConnectorError::IdentityViolation { .. }
        )
    }

    /// Native error code reported by the source, if any.
    pub fn native_code(&self) -> Option<&str> {
        match self {
            ConnectorError::Native { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            ConnectorError::AuthenticationFailed { .. } => "AUTH_FAILED",
            ConnectorError::PermissionDenied { .. } => "PERMISSION_DENIED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::UnsupportedConnectorType { .. } => "UNSUPPORTED_TYPE",
            ConnectorError::SchemaNotFound { .. } => "SCHEMA_NOT_FOUND",
            ConnectorError::UnknownColumn { .. } => "UNKNOWN_COLUMN",
            ConnectorError::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
            ConnectorError::RowCountMismatch { .. } => "ROW_COUNT_MISMATCH",
            ConnectorError::IdentityViolation { .. } => "IDENTITY_VIOLATION",
            ConnectorError::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::Native { .. } => "SOURCE_ERROR",
            ConnectorError::Cancelled => "CANCELLED",
            ConnectorError::Internal { .. } => "INTERNAL_ERROR",
            ConnectorError::Serialization { .. } => "SERIALIZATION_ERROR",
        }
    }

    // Convenience constructors

    /// Create a source unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        ConnectorError::SourceUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create a source unavailable error with source.
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::SourceUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a schema not found error.
    pub fn schema_not_found(collection: impl Into<String>) -> Self {
        ConnectorError::SchemaNotFound {
            collection: collection.into(),
        }
    }

    /// Create an error carrying a native source code.
    pub fn native(message: impl Into<String>, code: Option<String>) -> Self {
        ConnectorError::Native {
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Create an error carrying a native source code and the underlying error.
    pub fn native_with_source(
        message: impl Into<String>,
        code: Option<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Native {
            message: message.into(),
            code,
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        ConnectorError::InvalidData {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with source.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
