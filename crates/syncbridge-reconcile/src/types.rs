//! Reconciliation domain types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ReconcileError, ReconcileResult};

/// Identifier of a sync: one configured pairing of collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncId(pub Uuid);

impl SyncId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SyncId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SyncId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Which end of a mapping a collection sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Destination,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Source => "source",
            Side::Destination => "destination",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationPhase {
    ExtractSource,
    ExtractDestination,
    BuildMatchKeys,
    BuildIdMapping,
    ApplyMutations,
    Completed,
    Failed,
}

impl ReconciliationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractSource => "extract_source",
            Self::ExtractDestination => "extract_destination",
            Self::BuildMatchKeys => "build_match_keys",
            Self::BuildIdMapping => "build_id_mapping",
            Self::ApplyMutations => "apply_mutations",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Extraction phase for one side.
    pub fn extracting(side: Side) -> Self {
        match side {
            Side::Source => Self::ExtractSource,
            Side::Destination => Self::ExtractDestination,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ReconciliationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who started a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Actor {
    User(String),
    Schedule(String),
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{id}"),
            Actor::Schedule(id) => write!(f, "schedule:{id}"),
            Actor::System => f.write_str("system"),
        }
    }
}

/// A source column written to a destination column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source_column_id: String,
    pub destination_column_id: String,
}

impl ColumnMapping {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source_column_id: source.into(),
            destination_column_id: destination.into(),
        }
    }
}

/// Columns whose values align records across the two collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMatching {
    pub source_key_column: String,
    pub destination_key_column: String,
}

/// Caller-supplied pairing of two collections, fixed for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    pub source_collection_id: String,
    pub destination_collection_id: String,
    #[serde(default)]
    pub column_mappings: Vec<ColumnMapping>,
    pub record_matching: RecordMatching,
}

impl TableMapping {
    pub fn new(
        source_collection_id: impl Into<String>,
        destination_collection_id: impl Into<String>,
        source_key_column: impl Into<String>,
        destination_key_column: impl Into<String>,
    ) -> Self {
        Self {
            source_collection_id: source_collection_id.into(),
            destination_collection_id: destination_collection_id.into(),
            column_mappings: Vec::new(),
            record_matching: RecordMatching {
                source_key_column: source_key_column.into(),
                destination_key_column: destination_key_column.into(),
            },
        }
    }

    #[must_use]
    pub fn with_column(mut self, source: impl Into<String>, destination: impl Into<String>) -> Self {
        self.column_mappings.push(ColumnMapping::new(source, destination));
        self
    }

    pub fn collection_id(&self, side: Side) -> &str {
        match side {
            Side::Source => &self.source_collection_id,
            Side::Destination => &self.destination_collection_id,
        }
    }

    pub fn key_column(&self, side: Side) -> &str {
        match side {
            Side::Source => &self.record_matching.source_key_column,
            Side::Destination => &self.record_matching.destination_key_column,
        }
    }

    /// Check the mapping before any source is touched.
    pub fn validate(&self) -> ReconcileResult<()> {
        for side in [Side::Source, Side::Destination] {
            if self.collection_id(side).trim().is_empty() {
                return Err(ReconcileError::invalid_mapping(format!(
                    "{side} collection is required"
                )));
            }
            if self.key_column(side).trim().is_empty() {
                return Err(ReconcileError::invalid_mapping(format!(
                    "{side} key column is required"
                )));
            }
        }
        Ok(())
    }
}
