//! # Record-Store Connector
//!
//! Connector for hosted record stores (spreadsheet-style SaaS databases)
//! exposing collections, fields and records over HTTP.
//!
//! ## Features
//!
//! - Collection discovery from `/meta/collections`
//! - Offset-token pagination, pages capped at 100 records
//! - Batched creates in one request, confirmed count checked
//! - Per-record updates and deletes, vanished records reported as `NotFound`
//! - Basic, Bearer and API key authentication
//! - Reads, patches and deletes resent with backoff honouring `Retry-After`;
//!   creates resent only when the store cannot have written them
//! - SSRF protection on the configured base URL
//!
//! ## Example
//!
//! ```ignore
//! use syncbridge_connector::prelude::*;
//! use syncbridge_connector_rest::{RestConfig, RestConnector};
//!
//! let config = RestConfig::new("https://api.records.example.com/v1")
//!     .with_bearer_token("my-api-token");
//!
//! let connector = RestConnector::new(config)?;
//! connector.test_connection().await?;
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod retry;
pub mod type_mapper;
pub mod wire;

// Re-exports
pub use config::{RestAuth, RestConfig, MAX_PAGE_SIZE};
pub use connector::{RestConnector, RestConnectorFactory};
pub use retry::{AttemptFailure, RetryConfig};
pub use type_mapper::RecordStoreTypeMapper;
