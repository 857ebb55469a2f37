//! Record-store field type mapping.

use syncbridge_connector::type_mapper::{normalize_type_name, TypeMapper};
use syncbridge_connector::types::CanonicalType;

/// Maps hosted record-store field types (`singleLineText`, `checkbox`, ...)
/// onto canonical types.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordStoreTypeMapper;

impl TypeMapper for RecordStoreTypeMapper {
    fn map_scalar(&self, native_type: &str) -> CanonicalType {
        match normalize_type_name(native_type).as_str() {
            "singlelinetext" | "multilinetext" | "richtext" | "email" | "url" | "phone"
            | "phonenumber" | "singleselect" | "autonumbertext" => CanonicalType::Text,
            "number" | "currency" | "percent" | "rating" | "duration" | "autonumber"
            | "count" => CanonicalType::Numeric,
            "checkbox" => CanonicalType::Boolean,
            "date" | "datetime" | "createdtime" | "lastmodifiedtime" => CanonicalType::Timestamp,
            "multipleselects" | "multiplerecordlinks" => CanonicalType::TextArray,
            "multipleattachments" | "attachment" | "collaborator" | "multiplecollaborators"
            | "barcode" | "button" | "object" | "json" => CanonicalType::Json,
            _ => CanonicalType::Text,
        }
    }
}
