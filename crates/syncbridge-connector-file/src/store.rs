//! File storage backing file connectors.
//!
//! Keys are `/`-separated paths relative to the store root: a spreadsheet
//! collection is a top-level `name.csv` file, a document collection is a
//! top-level directory of `.md` files.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use syncbridge_connector::error::{ConnectorError, ConnectorResult};

/// Kind of a top-level store entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// A top-level store entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl StoreEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }
}

/// Storage for the files behind file collections.
///
/// Versioning, if any, is the store's business; connectors only read and
/// replace whole files.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Entries directly under the root, sorted by name.
    async fn list_collections(&self) -> ConnectorResult<Vec<StoreEntry>>;

    /// File names inside a directory collection, sorted.
    ///
    /// Fails with `SchemaNotFound` when the directory does not exist.
    async fn list_files(&self, collection: &str) -> ConnectorResult<Vec<String>>;

    /// Read a file; `None` when it does not exist.
    async fn get_file(&self, key: &str) -> ConnectorResult<Option<Vec<u8>>>;

    /// Create or replace a file.
    async fn put_file(&self, key: &str, data: Vec<u8>) -> ConnectorResult<()>;

    /// Delete a file, returning whether it existed.
    async fn delete_file(&self, key: &str) -> ConnectorResult<bool>;
}

/// Reject keys that could escape the store root.
pub fn validate_key(key: &str) -> ConnectorResult<()> {
    let invalid = key.trim().is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if invalid {
        return Err(ConnectorError::InvalidIdentifier {
            identifier: key.to_string(),
        });
    }
    Ok(())
}

/// Join a collection and a file name into a key.
pub fn join_key(collection: &str, file_name: &str) -> String {
    format!("{collection}/{file_name}")
}

/// Store kept entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryFileStore {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file.
    pub async fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.write().await.insert(key.into(), data.into());
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn list_collections(&self) -> ConnectorResult<Vec<StoreEntry>> {
        let files = self.files.read().await;
        let mut entries: Vec<StoreEntry> = Vec::new();
        for key in files.keys() {
            let entry = match key.split_once('/') {
                Some((dir, _)) => StoreEntry::directory(dir),
                None => StoreEntry::file(key.as_str()),
            };
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn list_files(&self, collection: &str) -> ConnectorResult<Vec<String>> {
        validate_key(collection)?;
        let prefix = format!("{collection}/");
        let files = self.files.read().await;
        let names: Vec<String> = files
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(ConnectorError::schema_not_found(collection));
        }
        Ok(names)
    }

    async fn get_file(&self, key: &str) -> ConnectorResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.files.read().await.get(key).cloned())
    }

    async fn put_file(&self, key: &str, data: Vec<u8>) -> ConnectorResult<()> {
        validate_key(key)?;
        self.files.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> ConnectorResult<bool> {
        validate_key(key)?;
        Ok(self.files.write().await.remove(key).is_some())
    }
}
