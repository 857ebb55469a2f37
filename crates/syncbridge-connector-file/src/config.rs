//! File connector configuration.

use serde::{Deserialize, Serialize};
use syncbridge_connector::config::ConnectorConfig;
use syncbridge_connector::error::{ConnectorError, ConnectorResult};
use syncbridge_connector::types::ConnectorType;

/// How collections are laid out in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// One `.csv` file per collection.
    #[default]
    Csv,
    /// One directory of `.md` files per collection.
    Markdown,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Markdown => "markdown",
        }
    }
}

/// Configuration for a file-backed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Local directory holding the collections.
    pub root: String,

    #[serde(default)]
    pub format: FileFormat,

    /// Collection names hidden from discovery.
    #[serde(default)]
    pub hidden_collections: Vec<String>,
}

impl FileConfig {
    pub fn new(root: impl Into<String>, format: FileFormat) -> Self {
        Self {
            root: root.into(),
            format,
            hidden_collections: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_hidden_collection(mut self, name: impl Into<String>) -> Self {
        self.hidden_collections.push(name.into());
        self
    }
}

impl ConnectorConfig for FileConfig {
    fn connector_type() -> ConnectorType {
        ConnectorType::File
    }

    fn validate(&self) -> ConnectorResult<()> {
        if self.root.trim().is_empty() {
            return Err(ConnectorError::invalid_config("root is required"));
        }
        Ok(())
    }

    fn redacted(&self) -> Self {
        self.clone()
    }
}
