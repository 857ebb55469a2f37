//! Turning decrypted credentials into connector configuration.
//!
//! Credentials reach a factory as a JSON object. Each connector kind parses
//! it into its own [`ConnectorConfig`]; secret values are wrapped in
//! [`Secret`] so neither `Debug` output nor redacted copies leak them.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::error::{ConnectorError, ConnectorResult};
use crate::types::ConnectorType;

const MASK: &str = "***REDACTED***";

/// Configuration a factory builds from resolved credentials.
pub trait ConnectorConfig: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn connector_type() -> ConnectorType;

    /// Reject settings the connector cannot work with.
    fn validate(&self) -> ConnectorResult<()>;

    /// Copy safe to log or serialize, every [`Secret`] masked.
    fn redacted(&self) -> Self;

    /// Parse and validate credentials. Serde's message names the bad field
    /// but never echoes its value.
    fn from_credentials(credentials: Value) -> ConnectorResult<Self> {
        if !credentials.is_object() {
            return Err(ConnectorError::invalid_config(format!(
                "{} credentials must be an object",
                Self::connector_type()
            )));
        }
        let config: Self = serde_json::from_value(credentials).map_err(|e| {
            ConnectorError::invalid_config(format!(
                "invalid {} credentials: {e}",
                Self::connector_type()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// A password, token or key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for handing to a driver or header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn masked() -> Self {
        Self(MASK.to_string())
    }

    pub fn is_masked(&self) -> bool {
        self.0 == MASK
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Network timeouts of connectors that talk to a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Establishing a connection, or waiting for a pooled one.
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,

    /// One request or statement, end to end.
    #[serde(default = "default_request_secs")]
    pub request_secs: u64,
}

fn default_connect_secs() -> u64 {
    30
}

fn default_request_secs() -> u64 {
    60
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            request_secs: default_request_secs(),
        }
    }
}

impl Timeouts {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn validate(&self) -> ConnectorResult<()> {
        if self.connect_secs == 0 || self.request_secs == 0 {
            return Err(ConnectorError::invalid_config("timeouts must be at least 1 second"));
        }
        Ok(())
    }
}
