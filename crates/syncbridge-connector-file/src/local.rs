//! Local directory file store.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use syncbridge_connector::error::{ConnectorError, ConnectorResult};

use crate::store::{validate_key, FileStore, StoreEntry};

/// File store rooted at a local directory.
///
/// Writes go to a sibling temporary file first and are renamed into place,
/// so readers never observe a half-written file.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> ConnectorResult<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }
}

/// Map an I/O failure onto the connector taxonomy.
fn io_error(operation: &str, err: std::io::Error) -> ConnectorError {
    if err.kind() == ErrorKind::PermissionDenied {
        ConnectorError::PermissionDenied {
            operation: operation.to_string(),
        }
    } else {
        ConnectorError::unavailable_with_source(format!("filestore {operation} failed"), err)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    #[instrument(level = "debug", skip_all)]
    async fn list_collections(&self) -> ConnectorResult<Vec<StoreEntry>> {
        let mut entries = Vec::new();
        let mut rd = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| io_error("read_dir", e))?;

        while let Some(ent) = rd.next_entry().await.map_err(|e| io_error("next_entry", e))? {
            let meta = ent.metadata().await.map_err(|e| io_error("metadata", e))?;
            let name = ent.file_name().to_string_lossy().to_string();
            if meta.is_dir() {
                entries.push(StoreEntry::directory(name));
            } else if meta.is_file() {
                entries.push(StoreEntry::file(name));
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    #[instrument(level = "debug", skip_all, fields(collection = %collection))]
    async fn list_files(&self, collection: &str) -> ConnectorResult<Vec<String>> {
        let dir = self.path_for(collection)?;
        let mut rd = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConnectorError::schema_not_found(collection));
            }
            Err(e) => return Err(io_error("read_dir", e)),
        };

        let mut names = Vec::new();
        while let Some(ent) = rd.next_entry().await.map_err(|e| io_error("next_entry", e))? {
            let meta = ent.metadata().await.map_err(|e| io_error("metadata", e))?;
            if meta.is_file() {
                names.push(ent.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    #[instrument(level = "debug", skip_all, fields(key = %key))]
    async fn get_file(&self, key: &str) -> ConnectorResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", e)),
        }
    }

    #[instrument(level = "debug", skip_all, fields(key = %key, bytes = data.len()))]
    async fn put_file(&self, key: &str, data: Vec<u8>) -> ConnectorResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create_dir", e))?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(".syncbridge-tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| io_error("write", e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error("rename", e));
        }

        debug!(path = %path.display(), "Wrote file");
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(key = %key))]
    async fn delete_file(&self, key: &str) -> ConnectorResult<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error("delete", e)),
        }
    }
}
