//! Schema discovery over `information_schema`.

use sqlx::{FromRow, PgPool};
use tracing::debug;

use syncbridge_connector::error::{ConnectorError, ConnectorResult};
use syncbridge_connector::schema::{CollectionSummary, ColumnSpec, TableSpec, DEFAULT_PRIMARY_KEY};
use syncbridge_connector::type_mapper::TypeMapper;

use crate::error::map_sqlx_error;

/// Column defaults that mean the server assigns the value.
const GENERATED_DEFAULT_MARKERS: &[&str] = &[
    "nextval(",
    "gen_random_uuid(",
    "uuid_generate_",
    "now()",
    "current_timestamp",
    "clock_timestamp(",
];

/// One row of `information_schema.columns`.
#[derive(Debug, Clone, FromRow)]
pub struct ColumnRow {
    pub column_name: String,
    pub data_type: String,
    pub udt_name: String,
    pub is_nullable: String,
    pub column_default: Option<String>,
    pub is_identity: Option<String>,
    pub is_generated: Option<String>,
    pub is_updatable: Option<String>,
}

impl ColumnRow {
    fn is_array(&self) -> bool {
        self.data_type.eq_ignore_ascii_case("ARRAY")
    }

    /// Type name fed to the mapper: the element `udt_name` for arrays and
    /// user-defined types, the SQL data type otherwise.
    fn native_type(&self) -> &str {
        if self.is_array() || self.data_type.eq_ignore_ascii_case("USER-DEFINED") {
            self.udt_name.trim_start_matches('_')
        } else {
            &self.data_type
        }
    }

    fn is_generated(&self) -> bool {
        let identity = self
            .is_identity
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("YES"));
        let computed = self
            .is_generated
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("ALWAYS"));
        let defaulted = self.column_default.as_deref().is_some_and(|d| {
            let d = d.to_lowercase();
            GENERATED_DEFAULT_MARKERS.iter().any(|m| d.contains(m))
        });
        identity || computed || defaulted
    }

    fn is_readonly(&self) -> bool {
        let computed = self
            .is_generated
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("ALWAYS"));
        let not_updatable = self
            .is_updatable
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("NO"));
        computed || not_updatable
    }

    /// Build the canonical column description.
    pub fn to_column_spec(&self, mapper: &dyn TypeMapper) -> ColumnSpec {
        let nullable = self.is_nullable.eq_ignore_ascii_case("YES");
        let mapping = mapper.map(self.native_type(), self.is_array(), nullable);
        let native_type = if self.is_array() {
            format!("{}[]", self.native_type())
        } else {
            self.native_type().to_string()
        };

        let mut column = ColumnSpec::new(&self.column_name, native_type, mapping);
        if self.is_generated() {
            column = column.generated();
        }
        if self.is_readonly() {
            column = column.read_only();
        }
        column
    }
}

/// The key columns records are identified by, falling back to the agreed
/// default name when the table declares no primary key.
pub fn resolve_primary_key(table: &str, key_columns: Vec<String>) -> Vec<String> {
    if key_columns.is_empty() {
        debug!(table = %table, "No primary key defined, using default");
        return vec![DEFAULT_PRIMARY_KEY.to_string()];
    }
    key_columns
}

/// List base tables in `schema`.
pub async fn list_tables(pool: &PgPool, schema: &str) -> ConnectorResult<Vec<CollectionSummary>> {
    let names: Vec<(String,)> = sqlx::query_as(
        r"
        SELECT table_name::text
        FROM information_schema.tables
        WHERE table_schema = $1 AND table_type = 'BASE TABLE'
        ORDER BY table_name
        ",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("failed to list tables", e))?;

    Ok(names
        .into_iter()
        .map(|(name,)| CollectionSummary::new(name.clone(), name))
        .collect())
}

/// Describe one table; `SchemaNotFound` if it has no visible columns.
pub async fn describe_table(
    pool: &PgPool,
    schema: &str,
    table: &str,
    mapper: &dyn TypeMapper,
) -> ConnectorResult<TableSpec> {
    let rows: Vec<ColumnRow> = sqlx::query_as(
        r"
        SELECT
            column_name::text AS column_name,
            data_type::text AS data_type,
            udt_name::text AS udt_name,
            is_nullable::text AS is_nullable,
            column_default::text AS column_default,
            is_identity::text AS is_identity,
            is_generated::text AS is_generated,
            is_updatable::text AS is_updatable
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = $2
        ORDER BY ordinal_position
        ",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("failed to query columns", e))?;

    if rows.is_empty() {
        return Err(ConnectorError::schema_not_found(table));
    }

    let key_columns: Vec<(String,)> = sqlx::query_as(
        r"
        SELECT kcu.column_name::text
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
            AND tc.table_name = kcu.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
            AND tc.table_schema = $1
            AND tc.table_name = $2
        ORDER BY kcu.ordinal_position
        ",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("failed to query primary key", e))?;
    let key_columns: Vec<String> = key_columns.into_iter().map(|(c,)| c).collect();

    let mut spec = TableSpec::new(table, table)
        .with_composite_key(resolve_primary_key(table, key_columns));
    for row in &rows {
        spec = spec.with_column(row.to_column_spec(mapper));
    }

    debug!(
        table = %table,
        column_count = spec.columns.len(),
        primary_key = ?spec.primary_key_columns,
        "Described table"
    );

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_mapper::PostgresTypeMapper;
    use syncbridge_connector::types::CanonicalType;

    fn row(name: &str, data_type: &str, udt: &str) -> ColumnRow {
        ColumnRow {
            column_name: name.to_string(),
            data_type: data_type.to_string(),
            udt_name: udt.to_string(),
            is_nullable: "YES".to_string(),
            column_default: None,
            is_identity: Some("NO".to_string()),
            is_generated: Some("NEVER".to_string()),
            is_updatable: Some("YES".to_string()),
        }
    }

    #[test]
    fn test_serial_column_is_generated() {
        let mut r = row("id", "integer", "int4");
        r.is_nullable = "NO".to_string();
        r.column_default = Some("nextval('people_id_seq'::regclass)".to_string());
        let col = r.to_column_spec(&PostgresTypeMapper);
        assert!(col.generated);
        assert!(!col.readonly);
        assert!(!col.nullable);
        assert_eq!(col.canonical_type, CanonicalType::Numeric);
    }

    #[test]
    fn test_identity_and_computed_columns() {
        let mut identity = row("id", "bigint", "int8");
        identity.is_identity = Some("YES".to_string());
        assert!(identity.to_column_spec(&PostgresTypeMapper).generated);

        let mut computed = row("full_name", "text", "text");
        computed.is_generated = Some("ALWAYS".to_string());
        let col = computed.to_column_spec(&PostgresTypeMapper);
        assert!(col.generated);
        assert!(col.readonly);
    }

    #[test]
    fn test_plain_default_is_not_generated() {
        let mut r = row("status", "text", "text");
        r.column_default = Some("'active'::text".to_string());
        assert!(!r.to_column_spec(&PostgresTypeMapper).generated);
    }

    #[test]
    fn test_array_column() {
        let col = row("tags", "ARRAY", "_text").to_column_spec(&PostgresTypeMapper);
        assert_eq!(col.canonical_type, CanonicalType::TextArray);
        assert_eq!(col.native_type, "text[]");
    }

    #[test]
    fn test_enum_column_maps_to_text() {
        let col = row("mood", "USER-DEFINED", "mood").to_column_spec(&PostgresTypeMapper);
        assert_eq!(col.canonical_type, CanonicalType::Text);
        assert_eq!(col.native_type, "mood");
    }

    #[test]
    fn test_resolve_primary_key() {
        assert_eq!(resolve_primary_key("t", Vec::new()), vec!["id"]);
        assert_eq!(resolve_primary_key("t", vec!["uuid".to_string()]), vec!["uuid"]);
        assert_eq!(
            resolve_primary_key("t", vec!["region".to_string(), "code".to_string()]),
            vec!["region", "code"]
        );
    }
}
