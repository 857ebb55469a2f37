//! Mapping of `SQLx` and `PostgreSQL` errors onto connector errors.

use syncbridge_connector::error::ConnectorError;
use syncbridge_connector::error_details::ErrorKind;

/// SQLSTATE for a missing relation.
pub const UNDEFINED_TABLE: &str = "42P01";

/// Convert a `SQLx` error, keeping the SQLSTATE when the server sent one.
pub fn map_sqlx_error(context: &str, err: sqlx::Error) -> ConnectorError {
    let server_error = match &err {
        sqlx::Error::Database(db) => Some((
            db.code().map(|c| c.into_owned()),
            db.message().to_string(),
        )),
        _ => None,
    };

    if let Some((code, message)) = server_error {
        return match code.as_deref() {
            Some("28P01" | "28000") => ConnectorError::AuthenticationFailed { message },
            Some(c) if is_unavailable_state(c) => {
                ConnectorError::unavailable_with_source(context.to_string(), err)
            }
            _ => ConnectorError::native_with_source(context.to_string(), code.clone(), err),
        };
    }

    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Protocol(_) => {
            ConnectorError::unavailable_with_source(context.to_string(), err)
        }
        other => ConnectorError::native_with_source(context.to_string(), None, other),
    }
}

/// Connection exceptions, shutdown and resource exhaustion are worth retrying.
fn is_unavailable_state(code: &str) -> bool {
    code.starts_with("08") || code.starts_with("57P") || code.starts_with("53")
}

/// Map a SQLSTATE onto the shared error vocabulary.
pub fn classify_sqlstate(code: &str) -> Option<ErrorKind> {
    let kind = match code {
        "23505" => ErrorKind::UniqueViolation,
        "23502" | "23503" | "23514" | "23P01" => ErrorKind::ConstraintViolation,
        "42501" => ErrorKind::PermissionDenied,
        "28P01" | "28000" => ErrorKind::AuthenticationFailed,
        UNDEFINED_TABLE | "3F000" | "3D000" => ErrorKind::MissingCollection,
        c if c.starts_with("22") => ErrorKind::InvalidData,
        c if is_unavailable_state(c) => ErrorKind::Unavailable,
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_unavailable() {
        let err = map_sqlx_error("connect", sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = map_sqlx_error("connect", sqlx::Error::Io(io));
        assert_eq!(err.error_code(), "SOURCE_UNAVAILABLE");
    }

    #[test]
    fn test_other_errors_keep_context() {
        let err = map_sqlx_error("fetch page", sqlx::Error::RowNotFound);
        assert_eq!(err.error_code(), "SOURCE_ERROR");
        assert_eq!(err.native_code(), None);
        assert!(err.to_string().contains("fetch page"));
    }

    #[test]
    fn test_classify_sqlstate() {
        assert_eq!(classify_sqlstate("23505"), Some(ErrorKind::UniqueViolation));
        assert_eq!(classify_sqlstate("23503"), Some(ErrorKind::ConstraintViolation));
        assert_eq!(classify_sqlstate("42501"), Some(ErrorKind::PermissionDenied));
        assert_eq!(classify_sqlstate("28P01"), Some(ErrorKind::AuthenticationFailed));
        assert_eq!(classify_sqlstate("42P01"), Some(ErrorKind::MissingCollection));
        assert_eq!(classify_sqlstate("22P02"), Some(ErrorKind::InvalidData));
        assert_eq!(classify_sqlstate("08006"), Some(ErrorKind::Unavailable));
        assert_eq!(classify_sqlstate("XX000"), None);
    }
}
