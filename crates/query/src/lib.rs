//! kvorm Query - SQL compilation and the join/tuple engine for kvorm.
//!
//! This crate turns SQL SELECT text into result tuples over plain record sets:
//!
//! - `parser`: Lexer and compiler producing a `QueryTree`
//! - `tree`: The compiled, serializable query description
//! - `ast`: Predicate expressions and their two-valued evaluation
//! - `tuples`: Join-pair extraction, outer/cartesian joins, aggregates, tuple building
//! - `executor`: Subquery binding and statement execution against a `RecordSource`
//! - `cache`: Bounded LRU caches and query-text fingerprints
//!
//! # Example
//!
//! ```rust
//! use kvorm_core::Record;
//! use kvorm_query::{compile, InMemorySource, QueryExecutor};
//!
//! let tree = compile("SELECT * FROM authors a, books b WHERE a.id = b.author_id").unwrap();
//! let mut source = InMemorySource::new()
//!     .with_table("authors", vec![Record::with_id(1).field("name", "Ann")])
//!     .with_table("books", vec![Record::with_id(7).field("author_id", 1i64)]);
//!
//! let rows = QueryExecutor::new().execute(&tree, &mut source).unwrap();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(rows[0].record("b").unwrap().id(), Some(7));
//! ```

#![no_std]

extern crate alloc;

pub mod ast;
pub mod cache;
pub mod executor;
pub mod parser;
pub mod tree;
pub mod tuples;

pub use cache::{fingerprint, BoundedCache};
pub use executor::{InMemorySource, QueryExecutor, RecordSource};
pub use parser::{compile, Compiler, CompilerOptions};
pub use tree::{AggregateFunc, Attribute, QueryTree};
pub use tuples::{TupleBuilder, TupleRow};
