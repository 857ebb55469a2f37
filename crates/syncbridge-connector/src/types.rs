//! Connector type definitions
//!
//! Source kinds and the canonical column type vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of external source a connector talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorType {
    /// Relational database (`PostgreSQL`)
    Database,
    /// Spreadsheets and text files held in a file store
    File,
    /// SaaS record store reached over HTTP
    Rest,
}

impl ConnectorType {
    /// Get all available connector types.
    #[must_use]
    pub fn all() -> &'static [ConnectorType] {
        &[
            ConnectorType::Database,
            ConnectorType::File,
            ConnectorType::Rest,
        ]
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorType::Database => "database",
            ConnectorType::File => "file",
            ConnectorType::Rest => "rest",
        }
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConnectorType {
    type Err = ParseConnectorTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "database" | "postgres" | "postgresql" => Ok(ConnectorType::Database),
            "file" => Ok(ConnectorType::File),
            "rest" => Ok(ConnectorType::Rest),
            _ => Err(ParseConnectorTypeError(s.to_string())),
        }
    }
}

/// Error parsing connector type from string.
#[derive(Debug, Clone)]
pub struct ParseConnectorTypeError(String);

impl fmt::Display for ParseConnectorTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid connector type '{}', expected one of: database, file, rest",
            self.0
        )
    }
}

impl std::error::Error for ParseConnectorTypeError {}

/// Source-independent column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonicalType {
    Text,
    Numeric,
    Boolean,
    Timestamp,
    Json,
    TextArray,
    NumericArray,
    BooleanArray,
}

impl CanonicalType {
    /// Wrap a scalar type in its nearest array variant.
    ///
    /// Timestamps have no dedicated array type and degrade to text arrays;
    /// JSON already covers nested values and is returned unchanged, as are
    /// types that are already arrays.
    #[must_use]
    pub fn array_of(self) -> Self {
        match self {
            CanonicalType::Text | CanonicalType::Timestamp => CanonicalType::TextArray,
            CanonicalType::Numeric => CanonicalType::NumericArray,
            CanonicalType::Boolean => CanonicalType::BooleanArray,
            other => other,
        }
    }

    /// Check whether this is one of the array variants.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            CanonicalType::TextArray | CanonicalType::NumericArray | CanonicalType::BooleanArray
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalType::Text => "TEXT",
            CanonicalType::Numeric => "NUMERIC",
            CanonicalType::Boolean => "BOOLEAN",
            CanonicalType::Timestamp => "TIMESTAMP",
            CanonicalType::Json => "JSON",
            CanonicalType::TextArray => "TEXT_ARRAY",
            CanonicalType::NumericArray => "NUMERIC_ARRAY",
            CanonicalType::BooleanArray => "BOOLEAN_ARRAY",
        }
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of mapping a native type: the base canonical type plus nullability.
///
/// Nullability never changes `canonical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeMapping {
    pub canonical: CanonicalType,
    pub nullable: bool,
}

impl TypeMapping {
    #[must_use]
    pub fn new(canonical: CanonicalType, nullable: bool) -> Self {
        Self {
            canonical,
            nullable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_type_roundtrip() {
        for ct in ConnectorType::all() {
            let parsed: ConnectorType = ct.as_str().parse().unwrap();
            assert_eq!(*ct, parsed);
        }
        assert_eq!(
            "PostgreSQL".parse::<ConnectorType>().unwrap(),
            ConnectorType::Database
        );
        assert!("ldap".parse::<ConnectorType>().is_err());
    }

    #[test]
    fn test_array_of() {
        assert_eq!(CanonicalType::Text.array_of(), CanonicalType::TextArray);
        assert_eq!(CanonicalType::Timestamp.array_of(), CanonicalType::TextArray);
        assert_eq!(CanonicalType::Numeric.array_of(), CanonicalType::NumericArray);
        assert_eq!(CanonicalType::Boolean.array_of(), CanonicalType::BooleanArray);
        assert_eq!(CanonicalType::Json.array_of(), CanonicalType::Json);
        assert_eq!(
            CanonicalType::TextArray.array_of(),
            CanonicalType::TextArray
        );
    }

    #[test]
    fn test_canonical_type_serialization() {
        let json = serde_json::to_string(&CanonicalType::NumericArray).unwrap();
        assert_eq!(json, "\"NUMERIC_ARRAY\"");
    }
}
