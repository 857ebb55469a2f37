//! User-facing error descriptions.

use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;

/// Stable vocabulary of error categories shared by every source kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UniqueViolation,
    ConstraintViolation,
    PermissionDenied,
    AuthenticationFailed,
    MissingCollection,
    Unavailable,
    InvalidData,
    Unknown,
}

impl ErrorKind {
    /// Default message shown to users for this category.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::UniqueViolation => "A record with the same unique value already exists.",
            ErrorKind::ConstraintViolation => "The change was rejected by a rule defined on the source.",
            ErrorKind::PermissionDenied => "The connection does not have permission to perform this action.",
            ErrorKind::AuthenticationFailed => "The source rejected the supplied credentials.",
            ErrorKind::MissingCollection => "The table or collection no longer exists.",
            ErrorKind::Unavailable => "The source could not be reached. Try again later.",
            ErrorKind::InvalidData => "The source rejected one or more values.",
            ErrorKind::Unknown => "The source reported an unexpected error.",
        }
    }
}

/// Rendered error for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub kind: ErrorKind,
    pub user_message: String,
    pub technical_detail: String,
}

impl ErrorDetails {
    pub fn new(kind: ErrorKind, technical_detail: impl Into<String>) -> Self {
        Self {
            kind,
            user_message: kind.user_message().to_string(),
            technical_detail: technical_detail.into(),
        }
    }

    /// Best-effort description of any connector error.
    ///
    /// `native` classifies the source's own error code when one is present;
    /// everything else falls back to the typed variant, then to `Unknown`.
    pub fn describe(err: &ConnectorError, native: impl Fn(&str) -> Option<ErrorKind>) -> Self {
        let kind = err
            .native_code()
            .and_then(native)
            .unwrap_or_else(|| Self::kind_of(err));
        Self::new(kind, technical_detail(err))
    }

    fn kind_of(err: &ConnectorError) -> ErrorKind {
        match err {
            ConnectorError::SourceUnavailable { .. } => ErrorKind::Unavailable,
            ConnectorError::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
            ConnectorError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            ConnectorError::SchemaNotFound { .. } => ErrorKind::MissingCollection,
            ConnectorError::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            ConnectorError::InvalidData { .. } | ConnectorError::UnknownColumn { .. } => {
                ErrorKind::InvalidData
            }
            _ => ErrorKind::Unknown,
        }
    }
}

/// Error message followed by its source chain.
fn technical_detail(err: &ConnectorError) -> String {
    let mut detail = format!("[{}] {err}", err.error_code());
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_code_wins() {
        let err = ConnectorError::native("duplicate key value", Some("23505".to_string()));
        let details = ErrorDetails::describe(&err, |code| {
            (code == "23505").then_some(ErrorKind::UniqueViolation)
        });
        assert_eq!(details.kind, ErrorKind::UniqueViolation);
        assert!(details.technical_detail.contains("duplicate key value"));
    }

    #[test]
    fn test_falls_back_to_variant() {
        let err = ConnectorError::schema_not_found("orders");
        let details = ErrorDetails::describe(&err, |_| None);
        assert_eq!(details.kind, ErrorKind::MissingCollection);
    }

    #[test]
    fn test_unknown_keeps_raw_detail() {
        let err = ConnectorError::native("weird failure", Some("XX999".to_string()));
        let details = ErrorDetails::describe(&err, |_| None);
        assert_eq!(details.kind, ErrorKind::Unknown);
        assert_eq!(details.user_message, ErrorKind::Unknown.user_message());
        assert!(details.technical_detail.starts_with("[SOURCE_ERROR]"));
    }

    #[test]
    fn test_detail_includes_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = ConnectorError::unavailable_with_source("connect", io);
        let details = ErrorDetails::describe(&err, |_| None);
        assert_eq!(details.kind, ErrorKind::Unavailable);
        assert!(details.technical_detail.ends_with("refused"));
    }
}
