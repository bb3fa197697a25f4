//! kvorm Core - Core types and schema definitions for kvorm.
//!
//! This crate provides the foundational types shared by the query engine, the
//! storage layer and the query façade:
//!
//! - `DataType`: Supported column types (Boolean, Int64, Float64, String, DateTime, Bytes)
//! - `Value`: Scalar values stored in record fields
//! - `Record`: A flat field map with its per-object version
//! - `schema`: Columns, tables, relationships and the `SchemaRegistry`
//! - `Codec`: Conversion between in-memory and storable values
//! - `Error`: Error taxonomy for every kvorm operation
//!
//! # Example
//!
//! ```rust
//! use kvorm_core::{DataType, Record, Value};
//! use kvorm_core::schema::{SchemaRegistry, TableBuilder};
//!
//! let authors = TableBuilder::new("authors")
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let registry = SchemaRegistry::new().with_table(authors).unwrap();
//! assert!(registry.resolve_column("authors", "name").is_ok());
//!
//! let record = Record::with_id(1).field("name", "Alice");
//! assert_eq!(record.id(), Some(1));
//! assert_eq!(record.get("name"), Some(&Value::String("Alice".into())));
//! ```

#![no_std]

extern crate alloc;

pub mod codec;
mod error;
pub mod pattern_match;
mod record;
pub mod schema;
mod types;
mod value;

pub use codec::{Codec, IdentityCodec};
pub use error::{Error, Result};
pub use record::{Record, RecordId, ID_FIELD};
pub use types::DataType;
pub use value::Value;
