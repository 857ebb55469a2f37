//! Match-key and remote-id-mapping caches.
//!
//! Match keys are scoped by `(sync_id, side, collection_id)` and id
//! mappings by `(sync_id, source collection_id)`, so both ends of a sync may
//! use the same collection id. Every successful run fully replaces its
//! scopes, and its rows become visible all at once or not at all.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::CacheResult;
use crate::types::{Side, SyncId};

/// Key value of one record in one run; `None` when the key was blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchKey {
    pub sync_id: SyncId,
    pub side: Side,
    pub collection_id: String,
    pub record_id: String,
    pub key_value: Option<String>,
}

/// Destination partner of one source record; `None` when unmatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIdMapping {
    pub sync_id: SyncId,
    /// The source collection.
    pub collection_id: String,
    pub source_record_id: String,
    pub destination_record_id: Option<String>,
}

impl RemoteIdMapping {
    pub fn is_matched(&self) -> bool {
        self.destination_record_id.is_some()
    }
}

/// Everything one run persists, written in a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCaches {
    pub sync_id: SyncId,
    pub source_collection_id: String,
    pub destination_collection_id: String,
    pub source_match_keys: Vec<MatchKey>,
    pub destination_match_keys: Vec<MatchKey>,
    pub id_mappings: Vec<RemoteIdMapping>,
}

/// Storage for the reconciliation caches.
#[async_trait]
pub trait CacheRepository: Send + Sync {
    /// Match keys of one side's collection, in the order they were written.
    async fn get_match_keys(
        &self,
        sync_id: SyncId,
        side: Side,
        collection_id: &str,
    ) -> CacheResult<Vec<MatchKey>>;

    /// Id mappings of a source collection, in the order they were written.
    async fn get_id_mappings(
        &self,
        sync_id: SyncId,
        collection_id: &str,
    ) -> CacheResult<Vec<RemoteIdMapping>>;

    /// Replace every row of the run's scopes with the run's rows, atomically.
    async fn replace_run(&self, caches: RunCaches) -> CacheResult<()>;
}

type Scope = (SyncId, String);
type KeyScope = (SyncId, Side, String);

#[derive(Debug, Default)]
struct Tables {
    match_keys: HashMap<KeyScope, Vec<MatchKey>>,
    id_mappings: HashMap<Scope, Vec<RemoteIdMapping>>,
}

/// Process-local cache store.
#[derive(Debug, Default)]
pub struct InMemoryCacheRepository {
    tables: RwLock<Tables>,
}

impl InMemoryCacheRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheRepository for InMemoryCacheRepository {
    async fn get_match_keys(
        &self,
        sync_id: SyncId,
        side: Side,
        collection_id: &str,
    ) -> CacheResult<Vec<MatchKey>> {
        let tables = self.tables.read().await;
        Ok(tables
            .match_keys
            .get(&(sync_id, side, collection_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_id_mappings(
        &self,
        sync_id: SyncId,
        collection_id: &str,
    ) -> CacheResult<Vec<RemoteIdMapping>> {
        let tables = self.tables.read().await;
        Ok(tables
            .id_mappings
            .get(&(sync_id, collection_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_run(&self, caches: RunCaches) -> CacheResult<()> {
        let mut tables = self.tables.write().await;
        let sync_id = caches.sync_id;
        tables.match_keys.insert(
            (sync_id, Side::Source, caches.source_collection_id.clone()),
            caches.source_match_keys,
        );
        tables.match_keys.insert(
            (sync_id, Side::Destination, caches.destination_collection_id),
            caches.destination_match_keys,
        );
        tables
            .id_mappings
            .insert((sync_id, caches.source_collection_id), caches.id_mappings);
        Ok(())
    }
}
