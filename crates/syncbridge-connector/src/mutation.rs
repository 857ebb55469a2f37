//! Mutation payloads and outcomes
//!
//! Shared rules every `MutationExecutor` applies before and after touching
//! the source: payload sanitizing against the column allowlist, and the row
//! count checks that decide between success, `NotFound`, and a batch abort.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ConnectorError, ConnectorResult};
use crate::record::{FieldValue, Record};
use crate::schema::TableSpec;

/// Identity assigned to a newly created record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRecord {
    /// The caller's local id of the submitted record.
    pub local_id: String,

    /// Native identity assigned by the source.
    pub native_id: Vec<String>,
}

/// Per-record result of an update or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Updated,
    Deleted,
    /// The target no longer exists in the source.
    NotFound,
}

impl MutationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationStatus::Updated => "updated",
            MutationStatus::Deleted => "deleted",
            MutationStatus::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub local_id: String,
    pub status: MutationStatus,
}

impl RecordOutcome {
    pub fn new(local_id: impl Into<String>, status: MutationStatus) -> Self {
        Self {
            local_id: local_id.into(),
            status,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == MutationStatus::NotFound
    }
}

/// Build the writable payload of a record.
///
/// Generated, read-only and primary key columns are dropped. Any field that
/// does not resolve to a discovered column fails with `UnknownColumn`, so
/// caller-chosen names never reach a native statement unchecked.
pub fn writable_fields(
    spec: &TableSpec,
    record: &Record,
) -> ConnectorResult<BTreeMap<String, FieldValue>> {
    payload_fields(spec, record, false)
}

/// Build the payload of a record being created.
///
/// Like [`writable_fields`], but key columns the source does not generate
/// are kept: a natural or composite key has to be supplied on insert.
pub fn insertable_fields(
    spec: &TableSpec,
    record: &Record,
) -> ConnectorResult<BTreeMap<String, FieldValue>> {
    payload_fields(spec, record, true)
}

fn payload_fields(
    spec: &TableSpec,
    record: &Record,
    keep_keys: bool,
) -> ConnectorResult<BTreeMap<String, FieldValue>> {
    let mut payload = BTreeMap::new();
    for (column_id, value) in &record.fields {
        if !keep_keys && spec.is_primary_key(column_id) {
            continue;
        }
        let column = spec.require_column(column_id)?;
        if !column.is_writable() {
            continue;
        }
        payload.insert(column.id.clone(), value.clone());
    }
    Ok(payload)
}

/// Fail unless the source confirmed exactly as many rows as were submitted.
pub fn ensure_row_count(expected: usize, actual: usize) -> ConnectorResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ConnectorError::RowCountMismatch { expected, actual })
    }
}

/// Classify the affected row count of a single-record update or delete.
///
/// Zero rows means the target vanished, one row is success, anything more
/// breaks the identity assumption and must abort the batch.
pub fn classify_affected(
    collection: &str,
    native_id: &str,
    affected: u64,
    on_success: MutationStatus,
) -> ConnectorResult<MutationStatus> {
    match affected {
        0 => Ok(MutationStatus::NotFound),
        1 => Ok(on_success),
        n => Err(ConnectorError::IdentityViolation {
            collection: collection.to_string(),
            native_id: native_id.to_string(),
            affected: n,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EntityId;
    use crate::schema::ColumnSpec;
    use crate::types::{CanonicalType, TypeMapping};

    fn spec() -> TableSpec {
        let text = TypeMapping::new(CanonicalType::Text, true);
        TableSpec::new("contacts", "contacts")
            .with_column(ColumnSpec::new("id", "uuid", text).generated())
            .with_column(ColumnSpec::new("email", "text", text))
            .with_column(ColumnSpec::new("created_at", "timestamptz", text).generated())
            .with_column(ColumnSpec::new("version", "int4", text).read_only())
    }

    #[test]
    fn test_writable_fields_strips_server_owned_columns() {
        let record = Record::new(EntityId::single("1"))
            .with("id", "1")
            .with("email", "a@x")
            .with("created_at", "2024-01-01T00:00:00Z")
            .with("version", 3i64);
        let payload = writable_fields(&spec(), &record).unwrap();
        assert_eq!(payload.len(), 1);
        assert_eq!(payload.get("email"), Some(&FieldValue::from("a@x")));
    }

    #[test]
    fn test_insertable_fields_keep_natural_key_columns() {
        let text = TypeMapping::new(CanonicalType::Text, false);
        let memberships = TableSpec::new("memberships", "memberships")
            .with_column(ColumnSpec::new("tenant", "text", text))
            .with_column(ColumnSpec::new("id", "int4", text))
            .with_column(ColumnSpec::new("role", "text", text))
            .with_composite_key(["tenant", "id"]);
        let record = Record::draft("n1")
            .with("tenant", "acme")
            .with("id", 1i64)
            .with("role", "admin");

        assert_eq!(insertable_fields(&memberships, &record).unwrap().len(), 3);
        assert_eq!(writable_fields(&memberships, &record).unwrap().len(), 1);

        // A generated key is still left to the source
        let draft = Record::draft("n2").with("id", "1").with("email", "a@x");
        assert_eq!(insertable_fields(&spec(), &draft).unwrap().len(), 1);
    }

    #[test]
    fn test_writable_fields_rejects_unknown_columns() {
        let record = Record::draft("n1").with("\"; DROP TABLE contacts; --", "x");
        let err = writable_fields(&spec(), &record).unwrap_err();
        assert!(matches!(err, ConnectorError::UnknownColumn { .. }));
    }

    #[test]
    fn test_ensure_row_count() {
        assert!(ensure_row_count(5, 5).is_ok());
        let err = ensure_row_count(5, 4).unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::RowCountMismatch {
                expected: 5,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_classify_affected() {
        assert_eq!(
            classify_affected("t", "1", 0, MutationStatus::Updated).unwrap(),
            MutationStatus::NotFound
        );
        assert_eq!(
            classify_affected("t", "1", 1, MutationStatus::Deleted).unwrap(),
            MutationStatus::Deleted
        );
        let err = classify_affected("t", "1", 2, MutationStatus::Updated).unwrap_err();
        assert!(err.is_batch_fatal());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&MutationStatus::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
    }
}
