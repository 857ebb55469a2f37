//! Configuration file for the syncbridge CLI
//!
//! ```yaml
//! log_filter: info,syncbridge=debug
//! reconciliation:
//!   batch_size: 500
//! connections:
//!   crm:
//!     kind: rest
//!     credentials:
//!       base_url: https://api.example.com/v1
//!       auth: { type: bearer, token: "..." }
//!   sheets:
//!     kind: file
//!     credentials: { root: ./exports, format: csv }
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use syncbridge_connector::types::ConnectorType;
use syncbridge_reconcile::ReconciliationConfig;

use crate::error::{CliError, CliResult};

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "syncbridge.yaml";

/// One named connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionEntry {
    pub kind: ConnectorType,

    /// Handed to the connector factory as-is.
    #[serde(default = "empty_credentials")]
    pub credentials: serde_json::Value,
}

fn empty_credentials() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            reconciliation: ReconciliationConfig::default(),
            connections: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Parse a YAML document.
    pub fn from_yaml(content: &str) -> CliResult<Self> {
        serde_yaml::from_str(content).map_err(|e| CliError::Config(e.to_string()))
    }

    /// Load the config file.
    ///
    /// A missing file is only an error when the caller named it explicitly.
    pub fn load(path: &Path, explicit: bool) -> CliResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_yaml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(Self::default()),
            Err(e) => Err(CliError::Config(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn connection(&self, name: &str) -> CliResult<&ConnectionEntry> {
        self.connections
            .get(name)
            .ok_or_else(|| CliError::UnknownConnection(name.to_string()))
    }
}
