//! Value typing for schemaless files.
//!
//! Files carry no declared types, so columns get a native type inferred
//! from their values: `number`, `boolean`, `datetime`, `list`, `object` or
//! `text`.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use syncbridge_connector::record::FieldValue;
use syncbridge_connector::type_mapper::{normalize_type_name, TypeMapper};
use syncbridge_connector::types::CanonicalType;

pub const TEXT: &str = "text";
pub const NUMBER: &str = "number";
pub const BOOLEAN: &str = "boolean";
pub const DATETIME: &str = "datetime";
pub const LIST: &str = "list";
pub const OBJECT: &str = "object";

/// Maps inferred file value types onto canonical types.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTypeMapper;

impl TypeMapper for FileTypeMapper {
    fn map_scalar(&self, native_type: &str) -> CanonicalType {
        match normalize_type_name(native_type).as_str() {
            NUMBER | "rownumber" => CanonicalType::Numeric,
            BOOLEAN => CanonicalType::Boolean,
            DATETIME | "date" => CanonicalType::Timestamp,
            LIST => CanonicalType::TextArray,
            OBJECT => CanonicalType::Json,
            _ => CanonicalType::Text,
        }
    }
}

fn is_timestamp(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

fn is_number(value: &str) -> bool {
    value.parse::<f64>().is_ok_and(f64::is_finite)
}

fn is_boolean(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
}

/// Combine the types of two values seen in the same column.
pub fn merge_types(a: &'static str, b: &'static str) -> &'static str {
    if a == b {
        a
    } else if a == OBJECT || b == OBJECT || a == LIST || b == LIST {
        OBJECT
    } else {
        TEXT
    }
}

/// Type of a single spreadsheet cell; `None` for empty cells.
pub fn cell_type(cell: &str) -> Option<&'static str> {
    let cell = cell.trim();
    if cell.is_empty() {
        None
    } else if is_number(cell) {
        Some(NUMBER)
    } else if is_boolean(cell) {
        Some(BOOLEAN)
    } else if is_timestamp(cell) {
        Some(DATETIME)
    } else {
        Some(TEXT)
    }
}

/// Type of a front matter value; `None` for nulls.
pub fn yaml_type(value: &serde_yaml::Value) -> Option<&'static str> {
    match value {
        serde_yaml::Value::Null => None,
        serde_yaml::Value::Bool(_) => Some(BOOLEAN),
        serde_yaml::Value::Number(_) => Some(NUMBER),
        serde_yaml::Value::String(s) if is_timestamp(s) => Some(DATETIME),
        serde_yaml::Value::String(_) | serde_yaml::Value::Tagged(_) => Some(TEXT),
        serde_yaml::Value::Sequence(_) => Some(LIST),
        serde_yaml::Value::Mapping(_) => Some(OBJECT),
    }
}

/// Infer a column type from its observed value types.
///
/// Columns without a single non-empty value are `text`.
pub fn infer<I>(types: I) -> &'static str
where
    I: IntoIterator<Item = Option<&'static str>>,
{
    types
        .into_iter()
        .flatten()
        .reduce(merge_types)
        .unwrap_or(TEXT)
}

/// Parse a spreadsheet cell according to its column type.
pub fn parse_cell(cell: &str, native_type: &str) -> FieldValue {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return FieldValue::Null;
    }
    match native_type {
        NUMBER => trimmed
            .parse::<i64>()
            .map(FieldValue::Integer)
            .or_else(|_| trimmed.parse::<f64>().map(FieldValue::Float))
            .unwrap_or_else(|_| FieldValue::Text(cell.to_string())),
        BOOLEAN if is_boolean(trimmed) => FieldValue::Boolean(trimmed.eq_ignore_ascii_case("true")),
        _ => FieldValue::Text(cell.to_string()),
    }
}

/// Render a value into a spreadsheet cell.
pub fn format_cell(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => String::new(),
        FieldValue::Boolean(b) => b.to_string(),
        FieldValue::Integer(i) => i.to_string(),
        FieldValue::Float(f) => f.to_string(),
        FieldValue::Text(s) => s.clone(),
        FieldValue::Array(_) | FieldValue::Json(_) => value.to_json().to_string(),
    }
}

/// Convert a front matter value into a field value.
pub fn from_yaml(value: &serde_yaml::Value) -> FieldValue {
    serde_json::to_value(value).map_or(FieldValue::Null, FieldValue::from_json)
}

/// Convert a field value into a front matter value.
pub fn to_yaml(value: &FieldValue) -> serde_yaml::Value {
    let json: Value = value.to_json();
    serde_yaml::to_value(json).unwrap_or(serde_yaml::Value::Null)
}
