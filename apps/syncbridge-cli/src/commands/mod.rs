//! CLI command implementations

pub mod collections;
pub mod describe;
pub mod reconcile;
pub mod test_connection;

use tracing::warn;

use syncbridge_connector::registry::{BoxedConnector, ConnectorRegistry};
use syncbridge_connector::traits::Connector;
use syncbridge_connector::types::ConnectorType;
use syncbridge_connector_database::DatabaseConnectorFactory;
use syncbridge_connector_file::FileConnectorFactory;
use syncbridge_connector_rest::RestConnectorFactory;

use crate::config::Config;
use crate::error::CliResult;

/// Loaded configuration plus a registry with every built-in source kind.
pub struct Context {
    pub config: Config,
    registry: ConnectorRegistry,
}

impl Context {
    pub async fn new(config: Config) -> Self {
        let registry = ConnectorRegistry::new();
        registry
            .register_factory(ConnectorType::Database, DatabaseConnectorFactory)
            .await;
        registry
            .register_factory(ConnectorType::Rest, RestConnectorFactory)
            .await;
        registry
            .register_factory(ConnectorType::File, FileConnectorFactory)
            .await;
        Self { config, registry }
    }

    /// Build the connector for a named connection.
    pub async fn connect(&self, name: &str) -> CliResult<BoxedConnector> {
        let entry = self.config.connection(name)?;
        let connector = self
            .registry
            .resolve(entry.kind, name, entry.credentials.clone())
            .await?;
        Ok(connector)
    }
}

/// Release a connector's resources once a command is done with it.
pub async fn dispose(connector: &BoxedConnector) {
    if let Err(e) = connector.dispose().await {
        warn!(connection = %connector.display_name(), error = %e, "Failed to dispose connector");
    }
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
