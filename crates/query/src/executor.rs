//! Statement execution: subqueries first, then the outer statement.

use crate::ast::Bindings;
use crate::tree::QueryTree;
use crate::tuples::{TupleBuilder, TupleRow};
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use kvorm_core::schema::SchemaRegistry;
use kvorm_core::{Codec, Error, IdentityCodec, Record, Result};

static IDENTITY: IdentityCodec = IdentityCodec;

/// Deepest subquery nesting the executor follows.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Supplies the full record set of a table.
///
/// Implementations decide where records come from: a backend, a request-level
/// cache, or a plain map in tests. `tree` is the statement the records are for,
/// so a source can derive lookup hints from it.
pub trait RecordSource {
    fn records(&mut self, table: &str, tree: &QueryTree) -> Result<Vec<Record>>;
}

impl<S: RecordSource + ?Sized> RecordSource for &mut S {
    fn records(&mut self, table: &str, tree: &QueryTree) -> Result<Vec<Record>> {
        (**self).records(table, tree)
    }
}

/// A record source backed by a map, for tests and one-off evaluation.
#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
    tables: BTreeMap<String, Vec<Record>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the records of a table.
    pub fn add_table(&mut self, name: impl Into<String>, records: Vec<Record>) {
        self.tables.insert(name.into(), records);
    }

    pub fn with_table(mut self, name: impl Into<String>, records: Vec<Record>) -> Self {
        self.add_table(name, records);
        self
    }
}

impl RecordSource for InMemorySource {
    fn records(&mut self, table: &str, _tree: &QueryTree) -> Result<Vec<Record>> {
        Ok(self.tables.get(table).cloned().unwrap_or_default())
    }
}

/// Runs compiled statements against a record source.
///
/// Subqueries stored in `tree.variables` are executed before the statement
/// that references them; their results are bound to the placeholders:
///
/// - an aggregate subquery binds its single value;
/// - any other subquery binds the first selected value of every row (or the
///   id of the row's first record for `*` selects).
pub struct QueryExecutor<'a> {
    registry: Option<&'a SchemaRegistry>,
    codec: &'a dyn Codec,
    max_depth: usize,
}

impl Default for QueryExecutor<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> QueryExecutor<'a> {
    pub fn new() -> Self {
        Self {
            registry: None,
            codec: &IDENTITY,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_registry(mut self, registry: &'a SchemaRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_codec(mut self, codec: &'a dyn Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Executes `tree`, pulling each distinct table once from `source`.
    pub fn execute<S: RecordSource + ?Sized>(
        &self,
        tree: &QueryTree,
        source: &mut S,
    ) -> Result<Vec<TupleRow>> {
        self.execute_at(tree, source, 0)
    }

    fn execute_at<S: RecordSource + ?Sized>(
        &self,
        tree: &QueryTree,
        source: &mut S,
        depth: usize,
    ) -> Result<Vec<TupleRow>> {
        if depth > self.max_depth {
            return Err(Error::invalid_operation("subqueries nested too deeply"));
        }

        let mut bindings = Bindings::new();
        for (name, subquery) in &tree.variables {
            let rows = self.execute_at(subquery, source, depth + 1)?;
            let values: Vec<_> = if subquery.is_aggregate() {
                rows.first().map(|r| alloc::vec![r.first_value()]).unwrap_or_default()
            } else {
                rows.iter().map(TupleRow::first_value).collect()
            };
            tracing::debug!(placeholder = name.as_str(), values = values.len(), "bound subquery");
            bindings.insert(name.clone(), values);
        }

        let mut records = BTreeMap::new();
        for table in tree.tables() {
            records.insert(table.to_string(), source.records(table, tree)?);
        }

        let mut builder = TupleBuilder::new()
            .with_max_depth(self.max_depth)
            .with_codec(self.codec)
            .with_bindings(bindings);
        if let Some(registry) = self.registry {
            builder = builder.with_registry(registry);
        }
        builder.build(tree, &records)
    }
}
