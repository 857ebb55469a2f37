//! Canonical record types
//!
//! The uniform `{id, fields}` representation every connector reads into and
//! writes from, independent of source kind.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ConnectorResult;

/// Identity of a record inside one collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId {
    /// Identifier unique within the collection.
    pub local_id: String,

    /// Source-specific identifier parts, in key order.
    pub native_id: Vec<String>,
}

impl EntityId {
    /// Identity backed by a single native key.
    pub fn single(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            local_id: id.clone(),
            native_id: vec![id],
        }
    }

    /// Identity backed by a composite native key.
    pub fn composite(parts: Vec<String>) -> Self {
        Self {
            local_id: parts.join(":"),
            native_id: parts,
        }
    }

    /// The first native key part, used by single-key sources.
    pub fn primary(&self) -> &str {
        self.native_id
            .first()
            .map_or(self.local_id.as_str(), String::as_str)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.local_id)
    }
}

/// A canonical field value.
///
/// Timestamps travel as RFC 3339 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Array(Vec<FieldValue>),
    Json(Value),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON value into a field value.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => n.as_f64().map_or(FieldValue::Null, FieldValue::Float),
            },
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => {
                FieldValue::Array(items.into_iter().map(FieldValue::from_json).collect())
            }
            obj @ Value::Object(_) => FieldValue::Json(obj),
        }
    }

    /// Convert into a JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Array(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
            FieldValue::Json(v) => v.clone(),
        }
    }

    /// Render the value as a match key.
    ///
    /// Text is trimmed; null, empty and whitespace-only values yield `None`.
    /// Integral floats render without a fractional part so `42` and `42.0`
    /// produce the same key.
    pub fn as_key_string(&self) -> Option<String> {
        let rendered = match self {
            FieldValue::Null => return None,
            FieldValue::Text(s) => s.trim().to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                format!("{}", *f as i64)
            }
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Array(_) | FieldValue::Json(_) => self.to_json().to_string(),
        };
        if rendered.is_empty() {
            None
        } else {
            Some(rendered)
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// A canonical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: EntityId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    /// A record that has no native identity yet, for create payloads.
    pub fn draft(local_id: impl Into<String>) -> Self {
        Self::new(EntityId {
            local_id: local_id.into(),
            native_id: Vec::new(),
        })
    }

    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    /// Fields as a JSON object.
    pub fn fields_json(&self) -> serde_json::Map<String, Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

/// Opaque position in a paginated extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(String);

impl PageCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Cursor for a numeric row offset.
    pub fn offset(offset: u64) -> Self {
        Self(offset.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the cursor back into a numeric offset.
    pub fn as_offset(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of extracted records.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<Record>,

    /// Cursor of the following page; `None` once the collection is exhausted.
    pub next_cursor: Option<PageCursor>,
}

impl RecordPage {
    pub fn last(records: Vec<Record>) -> Self {
        Self {
            records,
            next_cursor: None,
        }
    }

    pub fn with_next(records: Vec<Record>, next: PageCursor) -> Self {
        Self {
            records,
            next_cursor: Some(next),
        }
    }
}

/// Lazy, finite sequence of record batches.
pub type RecordStream<'a> = BoxStream<'a, ConnectorResult<Vec<Record>>>;
