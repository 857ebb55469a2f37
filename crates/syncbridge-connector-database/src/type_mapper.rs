//! `PostgreSQL` type mapping.

use syncbridge_connector::type_mapper::{normalize_type_name, TypeMapper};
use syncbridge_connector::types::CanonicalType;

/// Maps `PostgreSQL` type names (either `information_schema` data types or
/// `udt_name`s) onto canonical types.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresTypeMapper;

impl TypeMapper for PostgresTypeMapper {
    fn map_scalar(&self, native_type: &str) -> CanonicalType {
        let name = normalize_type_name(native_type);
        let name = name.trim_start_matches('_');
        match name {
            "smallint" | "integer" | "bigint" | "int" | "int2" | "int4" | "int8" | "numeric"
            | "decimal" | "real" | "double precision" | "float4" | "float8" | "money"
            | "smallserial" | "serial" | "bigserial" | "serial2" | "serial4" | "serial8"
            | "oid" => CanonicalType::Numeric,
            "boolean" | "bool" => CanonicalType::Boolean,
            "json" | "jsonb" | "hstore" => CanonicalType::Json,
            n if n.starts_with("timestamp") || n.starts_with("time") || n == "date" => {
                CanonicalType::Timestamp
            }
            _ => CanonicalType::Text,
        }
    }
}
