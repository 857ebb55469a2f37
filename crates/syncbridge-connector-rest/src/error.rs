//! HTTP status and error-code mapping.

use reqwest::StatusCode;
use syncbridge_connector::error::ConnectorError;
use syncbridge_connector::error_details::ErrorKind;

use crate::wire::ApiError;

/// Map a failed response onto a [`ConnectorError`].
///
/// `collection` is set when a 404 means the collection itself is gone.
/// Callers that treat 404 as a vanished record check for it first.
pub fn map_http_error(
    status: StatusCode,
    body: &str,
    collection: Option<&str>,
    operation: &str,
) -> ConnectorError {
    let api = ApiError::parse(body);
    let code = api
        .code
        .clone()
        .unwrap_or_else(|| format!("HTTP_{}", status.as_u16()));

    match status {
        StatusCode::UNAUTHORIZED => ConnectorError::AuthenticationFailed {
            message: api.message,
        },
        StatusCode::FORBIDDEN => ConnectorError::PermissionDenied {
            operation: operation.to_string(),
        },
        StatusCode::NOT_FOUND => match collection {
            Some(collection) => ConnectorError::schema_not_found(collection),
            None => ConnectorError::native(api.message, Some(code)),
        },
        // Duplicate values keep their code so error details can name them
        StatusCode::UNPROCESSABLE_ENTITY
            if classify_error_code(&code) != Some(ErrorKind::UniqueViolation) =>
        {
            ConnectorError::invalid_data(api.message)
        }
        StatusCode::TOO_MANY_REQUESTS => {
            ConnectorError::unavailable(format!("rate limited: {}", api.message))
        }
        s if s.is_server_error() => {
            ConnectorError::unavailable(format!("HTTP {s}: {}", api.message))
        }
        _ => ConnectorError::native(format!("HTTP {status}: {}", api.message), Some(code)),
    }
}

/// Whether a 404 body says the collection, not the record, is missing.
pub fn is_missing_collection(error: &ApiError) -> bool {
    matches!(error.code.as_deref(), Some("TABLE_NOT_FOUND"))
}

/// Classify a record-store error type or `HTTP_<status>` code.
pub fn classify_error_code(code: &str) -> Option<ErrorKind> {
    match code {
        "DUPLICATE_VALUE" | "HTTP_409" => Some(ErrorKind::UniqueViolation),
        "INVALID_PERMISSIONS" | "INVALID_PERMISSIONS_OR_MODEL_NOT_FOUND" | "HTTP_403" => {
            Some(ErrorKind::PermissionDenied)
        }
        "AUTHENTICATION_REQUIRED" | "HTTP_401" => Some(ErrorKind::AuthenticationFailed),
        "TABLE_NOT_FOUND" | "NOT_FOUND" | "HTTP_404" => Some(ErrorKind::MissingCollection),
        "INVALID_VALUE_FOR_COLUMN" | "INVALID_REQUEST_UNKNOWN" | "HTTP_400" | "HTTP_422" => {
            Some(ErrorKind::InvalidData)
        }
        "RATE_LIMITED" | "HTTP_429" => Some(ErrorKind::Unavailable),
        c if c.starts_with("HTTP_5") => Some(ErrorKind::Unavailable),
        _ => None,
    }
}
