//! Schema registry.
//!
//! The registry is built once at startup and passed by reference to the
//! compiler, the tuple engine and the query façade.

use super::column::Column;
use super::table::TableSchema;
use crate::error::{Error, Result};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;

/// Table name → table schema.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    tables: BTreeMap<String, TableSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table. Relationships must target tables that are already
    /// registered or the table itself.
    pub fn register(&mut self, table: TableSchema) -> Result<()> {
        if self.tables.contains_key(table.name()) {
            return Err(Error::invalid_schema(format!(
                "Table already registered: {}",
                table.name()
            )));
        }
        for rel in table.relationships() {
            let target = if rel.target == table.name() {
                Some(&table)
            } else {
                self.tables.get(&rel.target)
            };
            match target {
                None => {
                    return Err(Error::invalid_schema(format!(
                        "Relationship {} targets unknown table {}",
                        rel.name, rel.target
                    )))
                }
                Some(t) if !t.has_column(&rel.remote_column) => {
                    return Err(Error::invalid_schema(format!(
                        "Relationship {} targets unknown column {}.{}",
                        rel.name, rel.target, rel.remote_column
                    )))
                }
                Some(_) => {}
            }
        }
        self.tables.insert(String::from(table.name()), table);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_table(mut self, table: TableSchema) -> Result<Self> {
        self.register(table)?;
        Ok(self)
    }

    #[inline]
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    /// Resolves `table.column`, failing with `SchemaMismatch` when either is
    /// unknown.
    pub fn resolve_column(&self, table: &str, column: &str) -> Result<&Column> {
        let schema = self.table(table).ok_or_else(|| Error::unknown_table(table))?;
        schema
            .column(column)
            .ok_or_else(|| Error::unknown_column(table, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RelationshipKind, TableBuilder};
    use crate::types::DataType;

    fn authors() -> TableSchema {
        TableBuilder::new("authors")
            .unwrap()
            .add_column("name", DataType::String)
            .unwrap()
            .build()
            .unwrap()
    }

    fn books() -> TableSchema {
        TableBuilder::new("books")
            .unwrap()
            .add_column("author_id", DataType::Int64)
            .unwrap()
            .add_relationship("author", RelationshipKind::ManyToOne, "authors", "author_id", "id")
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = SchemaRegistry::new()
            .with_table(authors())
            .unwrap()
            .with_table(books())
            .unwrap();

        assert!(registry.contains("books"));
        assert_eq!(
            registry.resolve_column("books", "author_id").unwrap().data_type(),
            DataType::Int64
        );
        assert_eq!(
            registry.resolve_column("books", "isbn").unwrap_err(),
            Error::unknown_column("books", "isbn")
        );
        assert_eq!(
            registry.resolve_column("shelves", "id").unwrap_err(),
            Error::unknown_table("shelves")
        );
    }

    #[test]
    fn test_register_duplicate() {
        let mut registry = SchemaRegistry::new();
        registry.register(authors()).unwrap();
        assert!(registry.register(authors()).is_err());
    }

    #[test]
    fn test_register_dangling_relationship() {
        let mut registry = SchemaRegistry::new();
        assert!(matches!(
            registry.register(books()),
            Err(Error::InvalidSchema { .. })
        ));
    }
}
