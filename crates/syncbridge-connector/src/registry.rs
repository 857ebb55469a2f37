//! Connector registry
//!
//! Resolves `(source kind, decrypted credentials)` into a configured
//! connector. One factory is registered per [`ConnectorType`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{ConnectorError, ConnectorResult};
use crate::traits::FullConnector;
use crate::types::ConnectorType;

/// Shared handle to a fully capable connector.
pub type BoxedConnector = Arc<dyn FullConnector>;

/// Builds connectors of one source kind.
pub trait ConnectorFactory: Send + Sync {
    /// Build a connector from decrypted credentials.
    fn create(
        &self,
        display_name: &str,
        credentials: serde_json::Value,
    ) -> ConnectorResult<BoxedConnector>;
}

impl<F> ConnectorFactory for F
where
    F: Fn(&str, serde_json::Value) -> ConnectorResult<BoxedConnector> + Send + Sync,
{
    fn create(
        &self,
        display_name: &str,
        credentials: serde_json::Value,
    ) -> ConnectorResult<BoxedConnector> {
        self(display_name, credentials)
    }
}

/// Registry of connector factories keyed by source kind.
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    factories: Arc<RwLock<HashMap<ConnectorType, Arc<dyn ConnectorFactory>>>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for a source kind, replacing any previous one.
    pub async fn register_factory(
        &self,
        connector_type: ConnectorType,
        factory: impl ConnectorFactory + 'static,
    ) {
        let mut factories = self.factories.write().await;
        if factories
            .insert(connector_type, Arc::new(factory))
            .is_some()
        {
            debug!(connector_type = %connector_type, "Replaced connector factory");
        }
    }

    /// Source kinds with a registered factory.
    pub async fn registered_types(&self) -> Vec<ConnectorType> {
        let factories = self.factories.read().await;
        let mut types: Vec<_> = factories.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    /// Build a connector for the given source kind.
    pub async fn resolve(
        &self,
        connector_type: ConnectorType,
        display_name: &str,
        credentials: serde_json::Value,
    ) -> ConnectorResult<BoxedConnector> {
        let factory = {
            let factories = self.factories.read().await;
            factories.get(&connector_type).cloned()
        }
        .ok_or_else(|| ConnectorError::UnsupportedConnectorType {
            connector_type: connector_type.to_string(),
        })?;

        let connector = factory.create(display_name, credentials)?;
        info!(
            connector_type = %connector_type,
            display_name = %display_name,
            "Resolved connector"
        );
        Ok(connector)
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry").finish_non_exhaustive()
    }
}
