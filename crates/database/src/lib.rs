//! kvorm Database - Query façade for kvorm.
//!
//! This crate ties the compiler, the tuple engine and the session layer
//! together behind one entry point:
//!
//! - `Database`: Compile, validate and run SELECT statements; open sessions
//! - `DatabaseConfig`: JSON-loadable settings for every layer
//! - `RequestContext`: Per-request record cache with backend read hints
//! - `Model` / `Related`: Typed rows and lazily loaded relationships
//!
//! # Example
//!
//! ```rust
//! use kvorm_core::schema::{SchemaRegistry, TableBuilder};
//! use kvorm_core::{DataType, Record, Value};
//! use kvorm_database::Database;
//! use kvorm_storage::ObjectRef;
//!
//! let authors = TableBuilder::new("authors")
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! let db = Database::in_memory(SchemaRegistry::new().with_table(authors).unwrap());
//!
//! db.run_in_session(|session| {
//!     session.add(ObjectRef::new("authors", Record::new().field("name", "Ann")));
//!     session.add(ObjectRef::new("authors", Record::new().field("name", "Bo")));
//!     Ok(())
//! })
//! .unwrap();
//!
//! let rows = db.execute("SELECT name FROM authors WHERE name LIKE 'A%'").unwrap();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(db.scalar("SELECT COUNT(id) FROM authors").unwrap(), Value::Int64(2));
//! ```

pub mod config;
pub mod database;
pub mod hints;
pub mod model;
pub mod request;

pub use config::DatabaseConfig;
pub use database::Database;
pub use hints::derive_hints;
pub use model::{required, required_id, Model, Related};
pub use request::RequestContext;

pub use kvorm_core::{Error, Record, Result, Value};
pub use kvorm_query::{QueryTree, TupleRow};
