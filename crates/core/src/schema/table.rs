//! Table definition for kvorm schemas.

use super::column::Column;
use crate::error::{Error, Result};
use crate::record::ID_FIELD;
use crate::types::DataType;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// Cardinality of a relationship between two tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationshipKind {
    /// `local_column` on this table points at `remote_column` of the target.
    ManyToOne,
    /// `remote_column` on the target points at `local_column` of this table.
    OneToMany,
}

/// A declared relationship from one table to another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub name: String,
    pub kind: RelationshipKind,
    pub target: String,
    pub local_column: String,
    pub remote_column: String,
}

/// A table definition: columns, secondary indexes and relationships.
#[derive(Clone, Debug)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    relationships: Vec<Relationship>,
}

impl TableSchema {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[inline]
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Gets a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    #[inline]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Gets a relationship by name.
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Names of the columns the backend indexes on write.
    pub fn indexed_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.is_indexed())
            .map(|c| c.name())
    }
}

/// Builder for creating table definitions.
///
/// Every table gets an integer `id` column; declaring it explicitly is allowed
/// as long as it stays `Int64`.
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    relationships: Vec<Relationship>,
}

impl TableBuilder {
    /// Creates a new table builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: alloc::vec![Column::new(ID_FIELD, DataType::Int64)],
            relationships: Vec::new(),
        })
    }

    /// Adds a column to the table.
    pub fn add_column(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        let name = name.into();
        self.push_column(Column::new(name, data_type))
    }

    /// Adds a fully configured column.
    pub fn push_column(mut self, column: Column) -> Result<Self> {
        check_naming_rules(column.name())?;
        if column.name() == ID_FIELD {
            if column.data_type() != DataType::Int64 {
                return Err(Error::invalid_schema(format!(
                    "Column {} of {} must be Int64",
                    ID_FIELD, self.name
                )));
            }
            self.columns[0] = column;
            return Ok(self);
        }
        if self.columns.iter().any(|c| c.name() == column.name()) {
            return Err(Error::invalid_schema(format!(
                "Column already exists: {}",
                column.name()
            )));
        }
        self.columns.push(column);
        Ok(self)
    }

    /// Marks existing columns as nullable.
    pub fn add_nullable(mut self, columns: &[&str]) -> Self {
        for name in columns {
            if let Some(col) = self.columns.iter_mut().find(|c| c.name() == *name) {
                *col = col.clone().nullable(true);
            }
        }
        self
    }

    /// Declares a secondary index on an existing column.
    pub fn add_index(mut self, column: &str) -> Result<Self> {
        let col = self
            .columns
            .iter_mut()
            .find(|c| c.name() == column)
            .ok_or_else(|| Error::invalid_schema(format!("Column not found: {}", column)))?;
        if !col.data_type().is_indexable() {
            return Err(Error::invalid_schema(format!(
                "Column is not indexable: {}",
                column
            )));
        }
        *col = col.clone().indexed(true);
        Ok(self)
    }

    /// Declares a relationship to another table.
    ///
    /// The target table is checked when the table is registered.
    pub fn add_relationship(
        mut self,
        name: impl Into<String>,
        kind: RelationshipKind,
        target: impl Into<String>,
        local_column: impl Into<String>,
        remote_column: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        if self.relationships.iter().any(|r| r.name == name) {
            return Err(Error::invalid_schema(format!(
                "Relationship already exists: {}",
                name
            )));
        }
        let local_column = local_column.into();
        if !self.columns.iter().any(|c| c.name() == local_column) {
            return Err(Error::invalid_schema(format!(
                "Column not found: {}",
                local_column
            )));
        }
        self.relationships.push(Relationship {
            name,
            kind,
            target: target.into(),
            local_column,
            remote_column: remote_column.into(),
        });
        Ok(self)
    }

    pub fn build(self) -> Result<TableSchema> {
        Ok(TableSchema {
            name: self.name,
            columns: self.columns,
            relationships: self.relationships,
        })
    }
}

/// Validates a table, column or relationship name.
pub(crate) fn check_naming_rules(name: &str) -> Result<()> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(Error::invalid_schema("Name cannot be empty")),
        Some(first) if !first.is_ascii_alphabetic() && first != '_' => {
            return Err(Error::invalid_schema(format!(
                "Name must start with letter or underscore: {}",
                name
            )))
        }
        Some(_) => {}
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::invalid_schema(format!(
            "Name contains invalid characters: {}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_builder_implicit_id() {
        let table = TableBuilder::new("authors")
            .unwrap()
            .add_column("name", DataType::String)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(table.name(), "authors");
        assert_eq!(table.columns().len(), 2);
        assert_eq!(table.columns()[0].name(), "id");
        assert!(table.has_column("name"));
    }

    #[test]
    fn test_table_builder_explicit_id() {
        let table = TableBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(table.columns().len(), 1);

        let result = TableBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::String);
        assert!(result.is_err());
    }

    #[test]
    fn test_table_builder_duplicate_column() {
        let result = TableBuilder::new("t")
            .unwrap()
            .add_column("a", DataType::Int64)
            .unwrap()
            .add_column("a", DataType::String);
        assert!(matches!(result, Err(Error::InvalidSchema { .. })));
    }

    #[test]
    fn test_table_builder_invalid_name() {
        assert!(TableBuilder::new("").is_err());
        assert!(TableBuilder::new("1books").is_err());
        assert!(TableBuilder::new("my-books").is_err());
        assert!(TableBuilder::new("_books").is_ok());
    }

    #[test]
    fn test_table_builder_index() {
        let table = TableBuilder::new("books")
            .unwrap()
            .add_column("author_id", DataType::Int64)
            .unwrap()
            .add_column("cover", DataType::Bytes)
            .unwrap()
            .add_index("author_id")
            .unwrap()
            .build()
            .unwrap();
        let indexed: Vec<&str> = table.indexed_columns().collect();
        assert_eq!(indexed, alloc::vec!["author_id"]);

        let result = TableBuilder::new("books")
            .unwrap()
            .add_column("cover", DataType::Bytes)
            .unwrap()
            .add_index("cover");
        assert!(result.is_err());

        let result = TableBuilder::new("books").unwrap().add_index("missing");
        assert!(result.is_err());
    }

    #[test]
    fn test_table_builder_relationship() {
        let table = TableBuilder::new("books")
            .unwrap()
            .add_column("author_id", DataType::Int64)
            .unwrap()
            .add_relationship("author", RelationshipKind::ManyToOne, "authors", "author_id", "id")
            .unwrap()
            .build()
            .unwrap();
        let rel = table.relationship("author").unwrap();
        assert_eq!(rel.target, "authors");
        assert_eq!(rel.kind, RelationshipKind::ManyToOne);

        let result = TableBuilder::new("books")
            .unwrap()
            .add_relationship("author", RelationshipKind::ManyToOne, "authors", "nope", "id");
        assert!(result.is_err());
    }
}
