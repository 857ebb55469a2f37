//! CSV spreadsheets.
//!
//! A collection is one top-level `name.csv` file. The header row names the
//! columns. The first column named `id` is the primary key; sheets without
//! one are keyed by 1-based row number, which shifts when rows are deleted.
//!
//! Mutations edit the parsed sheet in memory and the caller writes the file
//! back once, after the whole batch has been applied.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use syncbridge_connector::error::{ConnectorError, ConnectorResult};
use syncbridge_connector::mutation::{
    classify_affected, writable_fields, CreatedRecord, MutationStatus, RecordOutcome,
};
use syncbridge_connector::record::{EntityId, FieldValue, Record};
use syncbridge_connector::schema::{ColumnSpec, TableSpec, DEFAULT_PRIMARY_KEY};
use syncbridge_connector::type_mapper::TypeMapper;

use crate::infer::{self, FileTypeMapper};

/// UTF-8 BOM bytes.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Native type of the synthesized row-number key.
const ROW_NUMBER_TYPE: &str = "rownumber";

pub const EXTENSION: &str = ".csv";

/// Collection id of a spreadsheet file name, if it is one.
pub fn collection_id(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(EXTENSION)
        .filter(|stem| !stem.is_empty())
}

/// Store key of a spreadsheet collection.
pub fn file_key(collection: &str) -> String {
    format!("{collection}{EXTENSION}")
}

fn strip_utf8_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(UTF8_BOM).unwrap_or(data)
}

/// A parsed CSV file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    /// Parse CSV bytes. Short rows are padded with empty cells.
    pub fn parse(collection: &str, data: &[u8]) -> ConnectorResult<Self> {
        let data = strip_utf8_bom(data);
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| {
                ConnectorError::invalid_data(format!("failed to read headers of '{collection}': {e}"))
            })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut seen = BTreeSet::new();
        for header in &headers {
            if header.is_empty() || !seen.insert(header.as_str()) {
                return Err(ConnectorError::invalid_data(format!(
                    "'{collection}' has an empty or duplicate column header '{header}'"
                )));
            }
        }

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                ConnectorError::invalid_data(format!(
                    "failed to parse row {} of '{collection}': {e}",
                    idx + 2
                ))
            })?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            // Blank trailing cells are export padding; anything else has no column to land in
            if row[headers.len().min(row.len())..].iter().any(|c| !c.trim().is_empty()) {
                return Err(ConnectorError::invalid_data(format!(
                    "row {} of '{collection}' has {} cells but only {} columns",
                    idx + 2,
                    row.len(),
                    headers.len()
                )));
            }
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    /// Serialize back to CSV bytes.
    pub fn to_bytes(&self) -> ConnectorResult<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .map_err(|e| ConnectorError::internal(format!("CSV write error: {e}")))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| ConnectorError::internal(format!("CSV write error: {e}")))?;
        }
        writer
            .into_inner()
            .map_err(|e| ConnectorError::internal(format!("CSV flush error: {e}")))
    }

    fn id_column(&self) -> Option<usize> {
        self.headers.iter().position(|h| h == DEFAULT_PRIMARY_KEY)
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Primary key value of a row.
    fn row_id(&self, idx: usize) -> String {
        match self.id_column() {
            Some(col) => self.rows[idx][col].trim().to_string(),
            None => (idx + 1).to_string(),
        }
    }

    /// Indices of the rows carrying a primary key value.
    fn find_rows(&self, native_id: &str) -> Vec<usize> {
        (0..self.rows.len())
            .filter(|&idx| self.row_id(idx) == native_id)
            .collect()
    }

    /// Next key for an appended row: one past the largest integer id.
    fn next_id(&self) -> String {
        match self.id_column() {
            Some(col) => {
                let max = self
                    .rows
                    .iter()
                    .filter_map(|row| row[col].trim().parse::<i64>().ok())
                    .max()
                    .unwrap_or(0);
                (max + 1).to_string()
            }
            None => (self.rows.len() + 1).to_string(),
        }
    }

    /// Describe the sheet's columns.
    pub fn table_spec(&self, collection: &str) -> TableSpec {
        let mapper = FileTypeMapper;
        let mut spec = TableSpec::new(collection, collection).with_primary_key(DEFAULT_PRIMARY_KEY);

        if self.id_column().is_none() {
            spec = spec.with_column(
                ColumnSpec::new(
                    DEFAULT_PRIMARY_KEY,
                    ROW_NUMBER_TYPE,
                    mapper.map(ROW_NUMBER_TYPE, false, false),
                )
                .generated()
                .read_only(),
            );
        }

        for (col, header) in self.headers.iter().enumerate() {
            let native_type = infer::infer(self.rows.iter().map(|row| infer::cell_type(&row[col])));
            if header == DEFAULT_PRIMARY_KEY {
                spec = spec.with_column(
                    ColumnSpec::new(header, native_type, mapper.map(native_type, false, false))
                        .generated(),
                );
            } else {
                spec = spec.with_column(ColumnSpec::new(
                    header,
                    native_type,
                    mapper.map(native_type, false, true),
                ));
            }
        }

        spec
    }

    /// Every row as a canonical record.
    pub fn records(&self, spec: &TableSpec) -> Vec<Record> {
        let types: HashMap<&str, &str> = spec
            .columns
            .iter()
            .map(|c| (c.id.as_str(), c.native_type.as_str()))
            .collect();
        let synthesized = self.id_column().is_none();

        (0..self.rows.len())
            .map(|idx| {
                let id = self.row_id(idx);
                let mut record = Record::new(EntityId::single(&id));
                for (col, header) in self.headers.iter().enumerate() {
                    let native_type = types.get(header.as_str()).copied().unwrap_or(infer::TEXT);
                    record
                        .fields
                        .insert(header.clone(), infer::parse_cell(&self.rows[idx][col], native_type));
                }
                if synthesized {
                    let number = i64::try_from(idx + 1).unwrap_or(i64::MAX);
                    record
                        .fields
                        .insert(DEFAULT_PRIMARY_KEY.to_string(), FieldValue::Integer(number));
                }
                record
            })
            .collect()
    }

    /// Write a record's fields into a row.
    fn apply_fields(&mut self, idx: usize, fields: &BTreeMap<String, FieldValue>) {
        for (name, value) in fields {
            if let Some(col) = self.column_index(name) {
                self.rows[idx][col] = infer::format_cell(value);
            }
        }
    }

    /// Append records, assigning keys.
    pub fn create(&mut self, spec: &TableSpec, records: &[Record]) -> ConnectorResult<Vec<CreatedRecord>> {
        let mut created = Vec::with_capacity(records.len());
        for record in records {
            let fields = writable_fields(spec, record)?;
            let id = self.next_id();

            self.rows.push(vec![String::new(); self.headers.len()]);
            let idx = self.rows.len() - 1;
            if let Some(col) = self.id_column() {
                self.rows[idx][col] = id.clone();
            }
            self.apply_fields(idx, &fields);

            created.push(CreatedRecord {
                local_id: record.id.local_id.clone(),
                native_id: vec![id],
            });
        }
        Ok(created)
    }

    /// Update rows by key.
    pub fn update(&mut self, spec: &TableSpec, records: &[Record]) -> ConnectorResult<Vec<RecordOutcome>> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let fields = writable_fields(spec, record)?;
            let native_id = record.id.primary();
            let rows = self.find_rows(native_id);
            let status = classify_affected(&spec.id, native_id, rows.len() as u64, MutationStatus::Updated)?;
            if let Some(&idx) = rows.first() {
                self.apply_fields(idx, &fields);
            }
            outcomes.push(RecordOutcome::new(&record.id.local_id, status));
        }
        Ok(outcomes)
    }

    /// Delete rows by key.
    ///
    /// Keys are resolved against the sheet as it was before the batch, so
    /// row-number keys stay meaningful while earlier rows are removed.
    pub fn delete(&mut self, spec: &TableSpec, ids: &[EntityId]) -> ConnectorResult<Vec<RecordOutcome>> {
        let mut outcomes = Vec::with_capacity(ids.len());
        let mut doomed = BTreeSet::new();
        for id in ids {
            let native_id = id.primary();
            let rows = self.find_rows(native_id);
            let mut status = classify_affected(&spec.id, native_id, rows.len() as u64, MutationStatus::Deleted)?;
            if let Some(&idx) = rows.first() {
                // Listed twice in one batch: the second is already gone
                if !doomed.insert(idx) {
                    status = MutationStatus::NotFound;
                }
            }
            outcomes.push(RecordOutcome::new(&id.local_id, status));
        }
        for idx in doomed.into_iter().rev() {
            self.rows.remove(idx);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncbridge_connector::types::CanonicalType;

    const PEOPLE: &str = "id,email,age,active\n1,john@x.com,34,true\n2,jane@x.com,,false\n";

    fn sheet(data: &str) -> Sheet {
        Sheet::parse("people", data.as_bytes()).unwrap()
    }

    #[test]
    fn test_collection_id() {
        assert_eq!(collection_id("people.csv"), Some("people"));
        assert_eq!(collection_id(".csv"), None);
        assert_eq!(collection_id("notes.md"), None);
        assert_eq!(file_key("people"), "people.csv");
    }

    #[test]
    fn test_parse_strips_bom_and_pads_rows() {
        let mut data = UTF8_BOM.to_vec();
        data.extend_from_slice(b"id,name\n1\n");
        let sheet = Sheet::parse("t", &data).unwrap();
        assert_eq!(sheet.headers, vec!["id", "name"]);
        assert_eq!(sheet.rows, vec![vec!["1".to_string(), String::new()]]);
    }

    #[test]
    fn test_parse_rejects_cells_beyond_header() {
        let err = Sheet::parse("t", b"id,name\n1,ann\n2,bob,bob@x.com\n").unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidData { .. }));
        assert!(err.to_string().contains("row 3"), "{err}");

        let sheet = Sheet::parse("t", b"id,name\n1,ann,,\n").unwrap();
        assert_eq!(sheet.rows, vec![vec!["1".to_string(), "ann".to_string()]]);
    }

    #[test]
    fn test_parse_rejects_duplicate_headers() {
        let err = Sheet::parse("t", b"a,a\n1,2\n").unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidData { .. }));
    }

    #[test]
    fn test_table_spec_with_id_column() {
        let spec = sheet(PEOPLE).table_spec("people");
        assert_eq!(spec.columns.len(), 4);
        let id = spec.primary_key().unwrap();
        assert_eq!(id.id, "id");
        assert!(id.generated);
        assert_eq!(spec.column("age").unwrap().canonical_type, CanonicalType::Numeric);
        assert_eq!(spec.column("active").unwrap().canonical_type, CanonicalType::Boolean);
        assert_eq!(spec.column("email").unwrap().canonical_type, CanonicalType::Text);
    }

    #[test]
    fn test_row_numbers_when_no_id_column() {
        let sheet = sheet("email\na@x.com\nb@x.com\n");
        let spec = sheet.table_spec("contacts");
        assert_eq!(spec.columns[0].native_type, "rownumber");
        let records = sheet.records(&spec);
        assert_eq!(records[1].id, EntityId::single("2"));
        assert_eq!(records[1].get("id"), Some(&FieldValue::Integer(2)));
    }

    #[test]
    fn test_records_parse_typed_cells() {
        let sheet = sheet(PEOPLE);
        let spec = sheet.table_spec("people");
        let records = sheet.records(&spec);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("age"), Some(&FieldValue::Integer(34)));
        assert_eq!(records[1].get("age"), Some(&FieldValue::Null));
        assert_eq!(records[1].get("active"), Some(&FieldValue::Boolean(false)));
    }

    #[test]
    fn test_create_assigns_next_id() {
        let mut sheet = sheet(PEOPLE);
        let spec = sheet.table_spec("people");
        let created = sheet
            .create(&spec, &[Record::draft("n1").with("email", "bob@x.com").with("id", "99")])
            .unwrap();
        assert_eq!(created[0].native_id, vec!["3".to_string()]);
        assert_eq!(sheet.rows[2], vec!["3", "bob@x.com", "", ""]);
    }

    #[test]
    fn test_update_and_missing_row() {
        let mut sheet = sheet(PEOPLE);
        let spec = sheet.table_spec("people");
        let outcomes = sheet
            .update(
                &spec,
                &[
                    Record::new(EntityId::single("2")).with("age", 41i64),
                    Record::new(EntityId::single("7")).with("age", 1i64),
                ],
            )
            .unwrap();
        assert_eq!(outcomes[0].status, MutationStatus::Updated);
        assert_eq!(outcomes[1].status, MutationStatus::NotFound);
        assert_eq!(sheet.rows[1][2], "41");
    }

    #[test]
    fn test_duplicate_keys_are_identity_violations() {
        let mut sheet = sheet("id,email\n1,a@x.com\n1,b@x.com\n");
        let spec = sheet.table_spec("dupes");
        let err = sheet
            .update(&spec, &[Record::new(EntityId::single("1")).with("email", "c@x.com")])
            .unwrap_err();
        assert!(matches!(err, ConnectorError::IdentityViolation { affected: 2, .. }));

        let err = sheet.delete(&spec, &[EntityId::single("1")]).unwrap_err();
        assert!(matches!(err, ConnectorError::IdentityViolation { .. }));
    }

    #[test]
    fn test_delete_row_numbers_resolved_before_removal() {
        let mut sheet = sheet("email\na\nb\nc\n");
        let spec = sheet.table_spec("letters");
        let outcomes = sheet
            .delete(&spec, &[EntityId::single("1"), EntityId::single("3"), EntityId::single("1")])
            .unwrap();
        let statuses: Vec<_> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![MutationStatus::Deleted, MutationStatus::Deleted, MutationStatus::NotFound]
        );
        assert_eq!(sheet.rows, vec![vec!["b".to_string()]]);
    }

    #[test]
    fn test_round_trip_bytes() {
        let original = sheet("id,note\n1,\"hello, world\"\n");
        let reparsed = Sheet::parse("t", &original.to_bytes().unwrap()).unwrap();
        assert_eq!(original, reparsed);
    }
}
