//! CLI error types and exit codes

use syncbridge_connector::error::ConnectorError;
use syncbridge_reconcile::ReconcileError;
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error
/// - 2: Configuration error
/// - 3: Source unavailable
/// - 4: Data error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown connection '{0}'")]
    UnknownConnection(String),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Output error: {0}")]
    Output(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::UnknownConnection(_) => 2,
            CliError::Connector(e) => connector_exit_code(e),
            CliError::Reconcile(e) => match e {
                ReconcileError::Connector { source, .. } => connector_exit_code(source),
                ReconcileError::InvalidMapping { .. } => 2,
                ReconcileError::Cache(_)
                | ReconcileError::CollectionLocked { .. }
                | ReconcileError::Cancelled { .. } => 1,
            },
            CliError::Io(_) | CliError::Output(_) => 1,
        }
    }

    /// Stable code for JSON consumers.
    pub fn error_code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "CONFIG",
            CliError::UnknownConnection(_) => "UNKNOWN_CONNECTION",
            CliError::Connector(e) => e.error_code(),
            CliError::Reconcile(e) => e.error_code(),
            CliError::Io(_) => "IO",
            CliError::Output(_) => "OUTPUT",
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {self}");
        } else {
            eprintln!("Error: {self}");
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {suggestion}");
            } else {
                eprintln!("\nSuggestion: {suggestion}");
            }
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::UnknownConnection(_) => {
                Some("Add the connection under 'connections:' in the config file.")
            }
            CliError::Connector(ConnectorError::AuthenticationFailed { .. }) => {
                Some("Check the credentials of the connection.")
            }
            CliError::Reconcile(ReconcileError::CollectionLocked { .. }) => {
                Some("Wait for the other run to finish, then retry.")
            }
            CliError::Reconcile(ReconcileError::InvalidMapping { .. }) => {
                Some("Run 'syncbridge describe' to list the columns of each collection.")
            }
            _ => None,
        }
    }
}

fn connector_exit_code(err: &ConnectorError) -> i32 {
    match err {
        ConnectorError::SourceUnavailable { .. }
        | ConnectorError::AuthenticationFailed { .. }
        | ConnectorError::PermissionDenied { .. } => 3,
        ConnectorError::InvalidConfiguration { .. }
        | ConnectorError::UnsupportedConnectorType { .. } => 2,
        ConnectorError::SchemaNotFound { .. }
        | ConnectorError::UnknownColumn { .. }
        | ConnectorError::InvalidIdentifier { .. }
        | ConnectorError::RowCountMismatch { .. }
        | ConnectorError::IdentityViolation { .. }
        | ConnectorError::ConstraintViolation { .. }
        | ConnectorError::InvalidData { .. } => 4,
        _ => 1,
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Output(err.to_string())
    }
}
