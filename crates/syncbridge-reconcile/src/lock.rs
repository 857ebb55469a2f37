//! Per-collection operation locks.
//!
//! At most one reconciliation run or mutation batch may work on a logical
//! collection at a time. Holders release explicitly on every exit path.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{ReconcileError, ReconcileResult};

/// A collection within one connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    pub connection: String,
    pub collection_id: String,
}

impl LockKey {
    pub fn new(connection: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            collection_id: collection_id.into(),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.connection, self.collection_id)
    }
}

/// Exclusive claims on collections.
#[async_trait]
pub trait CollectionLock: Send + Sync {
    /// Claim a collection for `holder`; `false` when someone else holds it.
    ///
    /// Re-acquiring a key one already holds succeeds.
    async fn try_acquire(&self, key: &LockKey, holder: &str) -> ReconcileResult<bool>;

    /// Give up a claim. Releasing a key one does not hold is a no-op.
    async fn release(&self, key: &LockKey, holder: &str) -> ReconcileResult<()>;
}

/// Claim every key or none, in a stable order.
///
/// Fails with `CollectionLocked` naming the first key already taken.
pub async fn acquire_all(
    lock: &dyn CollectionLock,
    keys: &[LockKey],
    holder: &str,
) -> ReconcileResult<()> {
    let mut ordered: Vec<&LockKey> = keys.iter().collect();
    ordered.sort();
    ordered.dedup();

    let mut taken: Vec<LockKey> = Vec::with_capacity(ordered.len());
    for key in ordered {
        match lock.try_acquire(key, holder).await {
            Ok(true) => taken.push(key.clone()),
            Ok(false) => {
                release_all(lock, &taken, holder).await;
                return Err(ReconcileError::CollectionLocked {
                    collection: key.to_string(),
                });
            }
            Err(e) => {
                release_all(lock, &taken, holder).await;
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Release every key, logging failures instead of returning them.
pub async fn release_all(lock: &dyn CollectionLock, keys: &[LockKey], holder: &str) {
    for key in keys {
        if let Err(e) = lock.release(key, holder).await {
            warn!(key = %key, holder, error = %e, "Failed to release collection lock");
        }
    }
}

/// Process-local lock table.
#[derive(Debug, Default)]
pub struct InMemoryCollectionLock {
    holders: Mutex<HashMap<LockKey, String>>,
}

impl InMemoryCollectionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of a key.
    pub async fn holder(&self, key: &LockKey) -> Option<String> {
        self.holders.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl CollectionLock for InMemoryCollectionLock {
    async fn try_acquire(&self, key: &LockKey, holder: &str) -> ReconcileResult<bool> {
        let mut holders = self.holders.lock().await;
        match holders.get(key) {
            Some(current) if current != holder => {
                debug!(key = %key, holder, current = %current, "Collection already locked");
                Ok(false)
            }
            _ => {
                holders.insert(key.clone(), holder.to_string());
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &LockKey, holder: &str) -> ReconcileResult<()> {
        let mut holders = self.holders.lock().await;
        if holders.get(key).is_some_and(|current| current == holder) {
            holders.remove(key);
        }
        Ok(())
    }
}
