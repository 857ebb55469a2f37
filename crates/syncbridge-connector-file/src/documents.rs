//! Markdown documents with YAML front matter.
//!
//! A collection is a top-level directory of `.md` files. Each file is one
//! record: the front matter holds its fields, the text after it is the
//! `body` column and the file stem is the primary key.

use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::BTreeMap;

use syncbridge_connector::error::{ConnectorError, ConnectorResult};
use syncbridge_connector::mutation::writable_fields;
use syncbridge_connector::record::{EntityId, FieldValue, Record};
use syncbridge_connector::schema::{ColumnSpec, TableSpec, DEFAULT_PRIMARY_KEY};
use syncbridge_connector::type_mapper::TypeMapper;

use crate::infer::{self, FileTypeMapper};

pub const EXTENSION: &str = ".md";

/// Column holding the text after the front matter.
pub const BODY_COLUMN: &str = "body";

/// Native type of the file-stem key column.
const FILE_STEM_TYPE: &str = "filename";

const DELIMITER: &str = "---";

/// Record id of a document file name, if it is one.
pub fn document_id(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(EXTENSION)
        .filter(|stem| !stem.is_empty())
}

/// File name for a new document, derived from a caller-supplied id.
///
/// Anything outside `[A-Za-z0-9._-]` becomes `-`; leading dots are dropped
/// so the file never turns hidden.
pub fn file_name_for(id: &str) -> Option<String> {
    let slug: String = id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_start_matches('.');
    if slug.is_empty() {
        None
    } else {
        Some(format!("{slug}{EXTENSION}"))
    }
}

/// One parsed document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub front_matter: Mapping,
    pub body: String,
}

impl Document {
    /// Parse a document. Text without a leading `---` line has no front
    /// matter and is all body.
    pub fn parse(name: &str, text: &str) -> ConnectorResult<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut lines = text.split_inclusive('\n');
        let opens = lines
            .next()
            .is_some_and(|first| first.trim_end() == DELIMITER);
        if !opens {
            return Ok(Self {
                front_matter: Mapping::new(),
                body: text.to_string(),
            });
        }

        let mut yaml = String::new();
        let mut closed = false;
        let mut consumed = 0;
        for line in lines {
            consumed += line.len();
            if line.trim_end() == DELIMITER {
                closed = true;
                break;
            }
            yaml.push_str(line);
        }
        if !closed {
            return Err(ConnectorError::invalid_data(format!(
                "unterminated front matter in '{name}'"
            )));
        }

        let header_len = text.split_inclusive('\n').next().map_or(0, str::len);
        let body = text[header_len + consumed..].to_string();

        let front_matter = serde_yaml::from_str::<Option<Mapping>>(&yaml)
            .map_err(|e| ConnectorError::invalid_data(format!("invalid front matter in '{name}': {e}")))?
            .unwrap_or_default();

        Ok(Self { front_matter, body })
    }

    /// Render the document back to text.
    pub fn render(&self) -> ConnectorResult<String> {
        let yaml = if self.front_matter.is_empty() {
            String::new()
        } else {
            serde_yaml::to_string(&self.front_matter).map_err(|e| ConnectorError::Serialization {
                message: format!("failed to render front matter: {e}"),
            })?
        };
        Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n{}", self.body))
    }

    /// Apply written fields; nulls remove keys.
    fn apply(&mut self, fields: BTreeMap<String, FieldValue>) {
        for (name, value) in fields {
            if name == BODY_COLUMN {
                self.body = value.as_text().map(str::to_string).unwrap_or_default();
            } else if value.is_null() {
                self.front_matter.remove(name.as_str());
            } else {
                self.front_matter.insert(YamlValue::String(name), infer::to_yaml(&value));
            }
        }
    }
}

/// Describe a collection from its documents.
///
/// Front matter keys become columns in order of first appearance.
pub fn table_spec(collection: &str, documents: &[(String, Document)]) -> TableSpec {
    let mapper = FileTypeMapper;
    let mut spec = TableSpec::new(collection, collection)
        .with_primary_key(DEFAULT_PRIMARY_KEY)
        .with_column(
            ColumnSpec::new(
                DEFAULT_PRIMARY_KEY,
                FILE_STEM_TYPE,
                mapper.map(FILE_STEM_TYPE, false, false),
            )
            .generated()
            .read_only(),
        )
        .with_column(ColumnSpec::new(
            BODY_COLUMN,
            infer::TEXT,
            mapper.map(infer::TEXT, false, true),
        ));

    let mut keys: Vec<String> = Vec::new();
    for (_, doc) in documents {
        for key in doc.front_matter.keys() {
            let Some(key) = key.as_str() else { continue };
            if key == DEFAULT_PRIMARY_KEY || key == BODY_COLUMN {
                continue;
            }
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }

    for key in keys {
        let native_type = infer::infer(
            documents
                .iter()
                .map(|(_, doc)| doc.front_matter.get(key.as_str()).and_then(infer::yaml_type)),
        );
        spec = spec.with_column(ColumnSpec::new(
            &key,
            native_type,
            mapper.map(native_type, false, true),
        ));
    }

    spec
}

/// Convert a document into a canonical record.
pub fn record(spec: &TableSpec, id: &str, doc: &Document) -> Record {
    let mut record = Record::new(EntityId::single(id));
    for column in &spec.columns {
        let value = if column.id == DEFAULT_PRIMARY_KEY {
            FieldValue::Text(id.to_string())
        } else if column.id == BODY_COLUMN {
            FieldValue::Text(doc.body.clone())
        } else {
            doc.front_matter
                .get(column.id.as_str())
                .map_or(FieldValue::Null, infer::from_yaml)
        };
        record.fields.insert(column.id.clone(), value);
    }
    record
}

/// Build a new document from a record's writable fields.
pub fn new_document(spec: &TableSpec, record: &Record) -> ConnectorResult<Document> {
    let mut doc = Document::default();
    doc.apply(writable_fields(spec, record)?);
    Ok(doc)
}

/// Apply a record's writable fields to an existing document.
pub fn update_document(spec: &TableSpec, doc: &mut Document, record: &Record) -> ConnectorResult<()> {
    doc.apply(writable_fields(spec, record)?);
    Ok(())
}
