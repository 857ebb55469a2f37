//! # File Connector
//!
//! Connector for sources kept as plain files in a local directory:
//!
//! - **CSV**: each top-level `name.csv` is a collection, each row a record.
//! - **Markdown**: each top-level directory is a collection, each `.md` file
//!   a record whose YAML front matter holds the fields.
//!
//! Column types are inferred from the values present. Storage goes through
//! the [`FileStore`] trait so tests and embedders can swap the local
//! directory for another backend.
//!
//! ## Example
//!
//! ```ignore
//! use syncbridge_connector_file::{FileConfig, FileConnector, FileFormat};
//!
//! let connector = FileConnector::new(FileConfig::new("./sheets", FileFormat::Csv))?;
//! let spec = connector.describe_collection("people").await?;
//! ```
//!
//! [`FileStore`]: store::FileStore

pub mod config;
pub mod connector;
pub mod documents;
pub mod infer;
pub mod local;
pub mod spreadsheet;
pub mod store;

pub use config::{FileConfig, FileFormat};
pub use connector::{FileConnector, FileConnectorFactory};
pub use infer::FileTypeMapper;
pub use local::LocalFileStore;
pub use store::{FileStore, InMemoryFileStore};
