//! SQL statement builders.
//!
//! Every identifier that reaches a statement has already been resolved
//! against a discovered [`TableSpec`]; these helpers only quote.

use syncbridge_connector::error::{ConnectorError, ConnectorResult};
use syncbridge_connector::schema::TableSpec;

/// Quote an identifier, doubling embedded quotes.
///
/// Identifiers containing NUL cannot be represented and are rejected.
pub fn quote_identifier(identifier: &str) -> ConnectorResult<String> {
    if identifier.is_empty() || identifier.contains('\0') {
        return Err(ConnectorError::InvalidIdentifier {
            identifier: identifier.escape_debug().to_string(),
        });
    }
    Ok(format!("\"{}\"", identifier.replace('"', "\"\"")))
}

/// Fully qualified, quoted table name.
pub fn qualified_table(schema: &str, table: &str) -> ConnectorResult<String> {
    Ok(format!("{}.{}", quote_identifier(schema)?, quote_identifier(table)?))
}

/// Quoted key columns of a described table, in key order.
pub fn key_columns(spec: &TableSpec) -> ConnectorResult<Vec<String>> {
    let columns = spec.key_columns().ok_or_else(|| {
        ConnectorError::invalid_data(format!(
            "collection '{}' has no primary key column(s) {:?}",
            spec.id, spec.primary_key_columns
        ))
    })?;
    columns.iter().map(|c| quote_identifier(&c.name)).collect()
}

/// `t."k1" ASC, t."k2" ASC`
fn key_order(keys: &[String]) -> String {
    keys.iter()
        .map(|k| format!("t.{k} ASC"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Match of the key tuple against a JSON object holding every key column,
/// typed through the table's row type.
fn key_match(table: &str, keys: &[String], placeholder: &str) -> String {
    let lhs = keys
        .iter()
        .map(|k| format!("t.{k}"))
        .collect::<Vec<_>>()
        .join(", ");
    let rhs = keys.join(", ");
    format!("({lhs}) = (SELECT {rhs} FROM json_populate_record(NULL::{table}, {placeholder}::json))")
}

/// Key columns rendered as a JSON array holding one text id per part.
fn key_returning(keys: &[String]) -> String {
    let parts = keys
        .iter()
        .map(|k| format!("{k}::text"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("json_build_array({parts})::text")
}

fn column_list(columns: &[&str]) -> ConnectorResult<String> {
    Ok(columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<ConnectorResult<Vec<_>>>()?
        .join(", "))
}

/// Page query returning each row as JSON text, ordered by the full key.
///
/// Binds: `$1` limit, `$2` offset.
pub fn select_page(schema: &str, spec: &TableSpec) -> ConnectorResult<String> {
    Ok(format!(
        "SELECT row_to_json(t)::text AS record FROM {} AS t ORDER BY {} LIMIT $1 OFFSET $2",
        qualified_table(schema, &spec.name)?,
        key_order(&key_columns(spec)?)
    ))
}

/// Insert of one record from a JSON object, typed by the table's row type.
/// Returns the key parts as a JSON array of strings.
///
/// Binds: `$1` JSON payload.
pub fn insert_one(schema: &str, spec: &TableSpec, columns: &[&str]) -> ConnectorResult<String> {
    let table = qualified_table(schema, &spec.name)?;
    let pk = key_returning(&key_columns(spec)?);
    if columns.is_empty() {
        return Ok(format!(
            "INSERT INTO {table} DEFAULT VALUES RETURNING {pk}"
        ));
    }
    let cols = column_list(columns)?;
    Ok(format!(
        "INSERT INTO {table} ({cols}) SELECT {cols} FROM json_populate_record(NULL::{table}, $1::json) RETURNING {pk}"
    ))
}

/// Update of one record by primary key.
///
/// Binds: `$1` JSON payload, `$2` JSON object holding every key column.
pub fn update_one(schema: &str, spec: &TableSpec, columns: &[&str]) -> ConnectorResult<String> {
    let table = qualified_table(schema, &spec.name)?;
    let matches = key_match(&table, &key_columns(spec)?, "$2");
    let cols = column_list(columns)?;
    Ok(format!(
        "UPDATE {table} AS t SET ({cols}) = (SELECT {cols} FROM json_populate_record(NULL::{table}, $1::json)) \
         WHERE {matches}"
    ))
}

/// Count of rows matching a primary key.
///
/// Binds: `$1` JSON object holding every key column.
pub fn count_by_key(schema: &str, spec: &TableSpec) -> ConnectorResult<String> {
    let table = qualified_table(schema, &spec.name)?;
    let matches = key_match(&table, &key_columns(spec)?, "$1");
    Ok(format!("SELECT count(*) FROM {table} AS t WHERE {matches}"))
}

/// Delete of one record by primary key.
///
/// Binds: `$1` JSON object holding every key column.
pub fn delete_one(schema: &str, spec: &TableSpec) -> ConnectorResult<String> {
    let table = qualified_table(schema, &spec.name)?;
    let matches = key_match(&table, &key_columns(spec)?, "$1");
    Ok(format!("DELETE FROM {table} AS t WHERE {matches}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncbridge_connector::schema::ColumnSpec;
    use syncbridge_connector::types::{CanonicalType, TypeMapping};

    fn spec() -> TableSpec {
        let mapping = TypeMapping::new(CanonicalType::Text, true);
        TableSpec::new("contacts", "contacts")
            .with_column(ColumnSpec::new("id", "int4", mapping).generated())
            .with_column(ColumnSpec::new("email", "text", mapping))
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users").unwrap(), "\"users\"");
        assert_eq!(
            quote_identifier("user\"; DROP TABLE x; --").unwrap(),
            "\"user\"\"; DROP TABLE x; --\""
        );
        assert!(quote_identifier("").is_err());
        assert!(quote_identifier("a\0b").is_err());
    }

    #[test]
    fn test_select_page() {
        let sql = select_page("public", &spec()).unwrap();
        assert_eq!(
            sql,
            "SELECT row_to_json(t)::text AS record FROM \"public\".\"contacts\" AS t ORDER BY t.\"id\" ASC LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn test_insert_one() {
        let sql = insert_one("public", &spec(), &["email"]).unwrap();
        assert!(sql.starts_with("INSERT INTO \"public\".\"contacts\" (\"email\") SELECT \"email\""));
        assert!(sql.ends_with("RETURNING json_build_array(\"id\"::text)::text"));

        let sql = insert_one("public", &spec(), &[]).unwrap();
        assert!(sql.contains("DEFAULT VALUES"));
    }

    #[test]
    fn test_update_one_uses_typed_key() {
        let sql = update_one("crm", &spec(), &["email"]).unwrap();
        assert!(sql.contains("SET (\"email\") = (SELECT \"email\""));
        assert!(sql.contains("WHERE (t.\"id\") = (SELECT \"id\" FROM json_populate_record(NULL::\"crm\".\"contacts\", $2::json))"));
    }

    #[test]
    fn test_composite_key_statements() {
        let mapping = TypeMapping::new(CanonicalType::Text, false);
        let spec = TableSpec::new("memberships", "memberships")
            .with_column(ColumnSpec::new("tenant", "text", mapping))
            .with_column(ColumnSpec::new("id", "int4", mapping))
            .with_column(ColumnSpec::new("role", "text", mapping))
            .with_composite_key(["tenant", "id"]);

        let page = select_page("public", &spec).unwrap();
        assert!(page.contains("ORDER BY t.\"tenant\" ASC, t.\"id\" ASC LIMIT"));

        let delete = delete_one("public", &spec).unwrap();
        assert_eq!(
            delete,
            "DELETE FROM \"public\".\"memberships\" AS t WHERE (t.\"tenant\", t.\"id\") = \
             (SELECT \"tenant\", \"id\" FROM json_populate_record(NULL::\"public\".\"memberships\", $1::json))"
        );

        let insert = insert_one("public", &spec, &["tenant", "id", "role"]).unwrap();
        assert!(insert.ends_with("RETURNING json_build_array(\"tenant\"::text, \"id\"::text)::text"));
    }

    #[test]
    fn test_missing_primary_key_column() {
        let spec = TableSpec::new("logs", "logs").with_column(ColumnSpec::new(
            "line",
            "text",
            TypeMapping::new(CanonicalType::Text, true),
        ));
        assert!(delete_one("public", &spec).is_err());
    }
}
