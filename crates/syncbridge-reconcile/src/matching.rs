//! Key extraction and record pairing.

use std::collections::HashMap;
use tracing::debug;

use syncbridge_connector::record::Record;

use crate::cache::{MatchKey, RemoteIdMapping};
use crate::types::{Side, SyncId};

/// Normalized key of a record: the field rendered as text and trimmed.
///
/// Absent, null and blank values have no key.
pub fn key_value(record: &Record, key_column: &str) -> Option<String> {
    record
        .get(key_column)
        .and_then(|value| value.as_key_string())
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

/// One match key per record, in extraction order.
pub fn build_match_keys(
    sync_id: SyncId,
    side: Side,
    collection_id: &str,
    key_column: &str,
    records: &[Record],
) -> Vec<MatchKey> {
    records
        .iter()
        .map(|record| MatchKey {
            sync_id,
            side,
            collection_id: collection_id.to_string(),
            record_id: record.id.local_id.clone(),
            key_value: key_value(record, key_column),
        })
        .collect()
}

/// Destination keys mapped to their record, the first record winning ties.
#[derive(Debug, Default)]
pub struct DestinationIndex {
    by_key: HashMap<String, String>,
    duplicates: usize,
}

impl DestinationIndex {
    pub fn build(keys: &[MatchKey]) -> Self {
        let mut index = Self::default();
        for key in keys {
            let Some(value) = &key.key_value else {
                continue;
            };
            if index.by_key.contains_key(value) {
                debug!(key = %value, record_id = %key.record_id, "Duplicate destination key");
                index.duplicates += 1;
            } else {
                index.by_key.insert(value.clone(), key.record_id.clone());
            }
        }
        index
    }

    pub fn lookup(&self, key_value: Option<&str>) -> Option<&str> {
        key_value.and_then(|k| self.by_key.get(k)).map(String::as_str)
    }

    /// Destination records hidden behind an earlier record with the same key.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

/// One mapping row per source key, `None` for misses and null keys.
pub fn build_id_mappings(
    source_keys: &[MatchKey],
    index: &DestinationIndex,
) -> Vec<RemoteIdMapping> {
    source_keys
        .iter()
        .map(|key| RemoteIdMapping {
            sync_id: key.sync_id,
            collection_id: key.collection_id.clone(),
            source_record_id: key.record_id.clone(),
            destination_record_id: index.lookup(key.key_value.as_deref()).map(str::to_string),
        })
        .collect()
}
