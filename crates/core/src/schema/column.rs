//! Column definition for kvorm table schemas.

use crate::types::DataType;
use alloc::string::String;

/// A column definition in a table schema.
#[derive(Clone, Debug)]
pub struct Column {
    /// Column name.
    name: String,
    /// Data type of the column.
    data_type: DataType,
    /// Whether this column allows null values.
    nullable: bool,
    /// Whether the backend keeps a secondary index on this column.
    indexed: bool,
}

impl Column {
    /// Creates a new column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: data_type.is_nullable_by_default(),
            indexed: false,
        }
    }

    /// Sets whether this column is nullable.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Sets whether writes maintain a secondary index on this column.
    pub fn indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Whether values of this column are decoded before comparison.
    #[inline]
    pub fn is_temporal(&self) -> bool {
        self.data_type.is_temporal()
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.data_type == other.data_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_new() {
        let col = Column::new("author_id", DataType::Int64);
        assert_eq!(col.name(), "author_id");
        assert_eq!(col.data_type(), DataType::Int64);
        assert!(!col.is_nullable());
        assert!(!col.is_indexed());
    }

    #[test]
    fn test_column_builder() {
        let col = Column::new("created", DataType::DateTime)
            .nullable(true)
            .indexed(true);
        assert!(col.is_nullable());
        assert!(col.is_indexed());
        assert!(col.is_temporal());
    }
}
