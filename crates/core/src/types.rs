//! Data type definitions for kvorm.

/// Supported column data types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 string
    String,
    /// Date and time stored as Unix timestamp (milliseconds)
    DateTime,
    /// Binary data
    Bytes,
}

impl DataType {
    /// Returns whether values of this type are decoded before comparison.
    #[inline]
    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::DateTime)
    }

    /// Returns whether this type is nullable by default.
    pub fn is_nullable_by_default(&self) -> bool {
        matches!(self, DataType::Bytes)
    }

    /// Returns whether the backend can maintain a secondary index on this type.
    pub fn is_indexable(&self) -> bool {
        !matches!(self, DataType::Bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporal() {
        assert!(DataType::DateTime.is_temporal());
        assert!(!DataType::String.is_temporal());
    }

    #[test]
    fn test_indexable() {
        assert!(DataType::Int64.is_indexable());
        assert!(!DataType::Bytes.is_indexable());
    }
}
