//! Schema module for kvorm.
//!
//! Columns, tables with their secondary indexes and relationships, and the
//! registry that holds them.

mod column;
mod registry;
mod table;

pub use column::Column;
pub use registry::SchemaRegistry;
pub use table::{Relationship, RelationshipKind, TableBuilder, TableSchema};
