//! Native type to canonical type mapping.

use crate::types::{CanonicalType, TypeMapping};

/// Maps a source's native type names onto [`CanonicalType`].
///
/// Implementations only provide [`TypeMapper::map_scalar`], which must be
/// total: unknown names fall back to `Text` (or `Json` for structured types).
/// Array and nullability handling is shared.
pub trait TypeMapper: Send + Sync {
    /// Map a scalar (non-array) native type name.
    fn map_scalar(&self, native_type: &str) -> CanonicalType;

    /// Map a native type descriptor.
    fn map(&self, native_type: &str, is_array: bool, is_nullable: bool) -> TypeMapping {
        let base = self.map_scalar(native_type);
        let canonical = if is_array { base.array_of() } else { base };
        TypeMapping::new(canonical, is_nullable)
    }
}

impl<T: TypeMapper + ?Sized> TypeMapper for &T {
    fn map_scalar(&self, native_type: &str) -> CanonicalType {
        (**self).map_scalar(native_type)
    }
}

/// Normalize a native type name for matching: lowercase, trimmed, with any
/// parenthesized size or precision suffix removed (`varchar(255)` -> `varchar`).
#[must_use]
pub fn normalize_type_name(native_type: &str) -> String {
    let lowered = native_type.trim().to_lowercase();
    match lowered.find('(') {
        Some(idx) => {
            let head = lowered[..idx].trim_end();
            let tail = lowered[idx..]
                .find(')')
                .map(|end| lowered[idx + end + 1..].trim())
                .unwrap_or("");
            if tail.is_empty() {
                head.to_string()
            } else {
                format!("{head} {tail}")
            }
        }
        None => lowered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TinyMapper;

    impl TypeMapper for TinyMapper {
        fn map_scalar(&self, native_type: &str) -> CanonicalType {
            match normalize_type_name(native_type).as_str() {
                "int" => CanonicalType::Numeric,
                "bool" => CanonicalType::Boolean,
                _ => CanonicalType::Text,
            }
        }
    }

    #[test]
    fn test_nullability_keeps_base_type() {
        let mapper = TinyMapper;
        for native in ["int", "bool", "mystery", ""] {
            for is_array in [false, true] {
                let a = mapper.map(native, is_array, false);
                let b = mapper.map(native, is_array, true);
                assert_eq!(a.canonical, b.canonical);
                assert!(!a.nullable);
                assert!(b.nullable);
            }
        }
    }

    #[test]
    fn test_arrays_wrap_element_type() {
        let mapper = TinyMapper;
        assert_eq!(
            mapper.map("int", true, false).canonical,
            CanonicalType::NumericArray
        );
        assert_eq!(
            mapper.map("unknown", true, true).canonical,
            CanonicalType::TextArray
        );
    }

    #[test]
    fn test_normalize_type_name() {
        assert_eq!(normalize_type_name("VARCHAR(255)"), "varchar");
        assert_eq!(normalize_type_name(" numeric(10, 2) "), "numeric");
        assert_eq!(
            normalize_type_name("timestamp(3) with time zone"),
            "timestamp with time zone"
        );
        assert_eq!(normalize_type_name("text"), "text");
    }
}
