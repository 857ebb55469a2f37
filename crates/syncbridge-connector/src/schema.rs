//! Collection schema types
//!
//! Types describing a collection's columns and primary key, plus the denylist
//! used to hide source-internal namespaces during discovery.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{ConnectorError, ConnectorResult};
use crate::types::{CanonicalType, TypeMapping};

/// Primary key column name assumed when the source defines none.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// A collection as listed by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub id: String,
    pub display_name: String,
}

impl CollectionSummary {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A single column of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Stable column identifier used as the key in record fields.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Native type name as reported by the source.
    pub native_type: String,

    /// Canonical type derived from the native type.
    pub canonical_type: CanonicalType,

    pub nullable: bool,

    /// The source rejects writes to this column.
    #[serde(default)]
    pub readonly: bool,

    /// The source assigns this column's value (identity, serial, default).
    #[serde(default)]
    pub generated: bool,
}

impl ColumnSpec {
    /// Create a column whose id and name are the same.
    pub fn new(name: impl Into<String>, native_type: impl Into<String>, mapping: TypeMapping) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            native_type: native_type.into(),
            canonical_type: mapping.canonical,
            nullable: mapping.nullable,
            readonly: false,
            generated: false,
        }
    }

    /// Override the column id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Mark the column as read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Mark the column as source-generated.
    #[must_use]
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    /// Whether values for this column may be sent in create/update payloads.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        !self.readonly && !self.generated
    }
}

/// Schema of one collection.
///
/// The column list doubles as the identifier allowlist: every field name a
/// mutation wants to write must resolve to one of these columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub id: String,
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    /// Key column names in key order. More than one for composite keys.
    pub primary_key_columns: Vec<String>,
}

impl TableSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            columns: Vec::new(),
            primary_key_columns: vec![DEFAULT_PRIMARY_KEY.to_string()],
        }
    }

    #[must_use]
    pub fn with_column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn with_primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key_columns = vec![name.into()];
        self
    }

    /// Key made of several columns, in key order.
    #[must_use]
    pub fn with_composite_key<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key_columns = names.into_iter().map(Into::into).collect();
        self
    }

    /// Find a column by id.
    pub fn column(&self, id: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Find a column by id, falling back to its display name.
    pub fn resolve_column(&self, id_or_name: &str) -> Option<&ColumnSpec> {
        self.column(id_or_name)
            .or_else(|| self.columns.iter().find(|c| c.name == id_or_name))
    }

    fn key_column(&self, key: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == key || c.id == key)
    }

    pub fn is_composite_key(&self) -> bool {
        self.primary_key_columns.len() > 1
    }

    /// The key column of a single-column key, if it is part of the column list.
    pub fn primary_key(&self) -> Option<&ColumnSpec> {
        match self.primary_key_columns.as_slice() {
            [key] => self.key_column(key),
            _ => None,
        }
    }

    /// Every key column in key order, or `None` if one is not in the column
    /// list.
    pub fn key_columns(&self) -> Option<Vec<&ColumnSpec>> {
        if self.primary_key_columns.is_empty() {
            return None;
        }
        self.primary_key_columns
            .iter()
            .map(|key| self.key_column(key))
            .collect()
    }

    /// Check whether a column id is part of the primary key.
    pub fn is_primary_key(&self, column_id: &str) -> bool {
        self.primary_key_columns
            .iter()
            .any(|key| match self.key_column(key) {
                Some(column) => column.id == column_id,
                None => key == column_id,
            })
    }

    /// Columns a create or update payload may carry.
    pub fn writable_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns
            .iter()
            .filter(|c| c.is_writable() && !self.is_primary_key(&c.id))
    }

    /// Validate a field id against the column allowlist.
    pub fn require_column(&self, column_id: &str) -> ConnectorResult<&ColumnSpec> {
        self.column(column_id)
            .ok_or_else(|| ConnectorError::UnknownColumn {
                collection: self.id.clone(),
                column: column_id.to_string(),
            })
    }
}

/// Names and patterns of collections hidden from discovery.
#[derive(Debug, Clone, Default)]
pub struct CollectionDenylist {
    names: HashSet<String>,
    patterns: Vec<Regex>,
}

impl CollectionDenylist {
    /// Build a denylist from exact names and regular expressions.
    pub fn new<N, P>(names: N, patterns: P) -> ConnectorResult<Self>
    where
        N: IntoIterator,
        N::Item: Into<String>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let names = names.into_iter().map(|n| n.into().to_lowercase()).collect();
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    ConnectorError::invalid_config(format!(
                        "invalid denylist pattern '{}': {e}",
                        p.as_ref()
                    ))
                })
            })
            .collect::<ConnectorResult<Vec<_>>>()?;
        Ok(Self { names, patterns })
    }

    /// Check whether a collection name is hidden.
    pub fn is_denied(&self, name: &str) -> bool {
        self.names.contains(&name.to_lowercase()) || self.patterns.iter().any(|p| p.is_match(name))
    }

    /// Drop denied collections from a discovery result, keeping order.
    pub fn filter(&self, collections: Vec<CollectionSummary>) -> Vec<CollectionSummary> {
        collections
            .into_iter()
            .filter(|c| !self.is_denied(&c.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text() -> TypeMapping {
        TypeMapping::new(CanonicalType::Text, true)
    }

    fn people() -> TableSpec {
        TableSpec::new("people", "People")
            .with_column(
                ColumnSpec::new("id", "int4", TypeMapping::new(CanonicalType::Numeric, false))
                    .generated(),
            )
            .with_column(ColumnSpec::new("email", "text", text()))
            .with_column(ColumnSpec::new("updated_at", "timestamptz", text()).read_only())
            .with_column(ColumnSpec::new("full_name", "text", text()).with_id("fld_name"))
    }

    #[test]
    fn test_writable_columns_skip_pk_generated_and_readonly() {
        let spec = people();
        let writable: Vec<_> = spec.writable_columns().map(|c| c.id.as_str()).collect();
        assert_eq!(writable, vec!["email", "fld_name"]);
    }

    #[test]
    fn test_require_column() {
        let spec = people();
        assert!(spec.require_column("email").is_ok());
        let err = spec.require_column("email; DROP TABLE people").unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_COLUMN");
    }

    #[test]
    fn test_resolve_column_by_name() {
        let spec = people();
        assert_eq!(spec.resolve_column("full_name").unwrap().id, "fld_name");
        assert_eq!(spec.resolve_column("fld_name").unwrap().name, "full_name");
    }

    #[test]
    fn test_default_primary_key() {
        let spec = TableSpec::new("t", "t");
        assert_eq!(spec.primary_key_columns, vec![DEFAULT_PRIMARY_KEY]);
        assert!(spec.primary_key().is_none());
        assert!(spec.key_columns().is_none());
        assert!(spec.is_primary_key("id"));
    }

    #[test]
    fn test_composite_key() {
        let mapping = TypeMapping::new(CanonicalType::Text, false);
        let spec = TableSpec::new("memberships", "memberships")
            .with_column(ColumnSpec::new("tenant", "text", mapping))
            .with_column(ColumnSpec::new("id", "int4", mapping))
            .with_column(ColumnSpec::new("role", "text", mapping))
            .with_composite_key(["tenant", "id"]);

        assert!(spec.is_composite_key());
        assert!(spec.primary_key().is_none());
        let keys: Vec<&str> = spec
            .key_columns()
            .unwrap()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(keys, vec!["tenant", "id"]);
        assert!(spec.is_primary_key("tenant"));
        assert!(spec.is_primary_key("id"));
        let writable: Vec<&str> = spec.writable_columns().map(|c| c.id.as_str()).collect();
        assert_eq!(writable, vec!["role"]);
    }

    #[test]
    fn test_denylist() {
        let denylist =
            CollectionDenylist::new(["pg_catalog", "information_schema"], ["^pg_temp", "^_sqlx"])
                .unwrap();
        assert!(denylist.is_denied("pg_catalog"));
        assert!(denylist.is_denied("INFORMATION_SCHEMA"));
        assert!(denylist.is_denied("pg_temp_3"));
        assert!(denylist.is_denied("_sqlx_migrations"));
        assert!(!denylist.is_denied("customers"));

        let kept = denylist.filter(vec![
            CollectionSummary::new("customers", "customers"),
            CollectionSummary::new("_sqlx_migrations", "_sqlx_migrations"),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "customers");
    }

    #[test]
    fn test_denylist_rejects_bad_pattern() {
        assert!(CollectionDenylist::new(Vec::<String>::new(), ["("]).is_err());
    }
}
