//! Database - Main entry point for kvorm queries and sessions.
//!
//! `Database` ties the schema registry, the backend, the lock service and the
//! codec together:
//!
//! - `execute` compiles SQL text (through a bounded tree cache), validates it
//!   against the registry and runs it through the tuple engine;
//! - `query_as` / `query_pairs` / `scalar` adapt result rows for the caller;
//! - `session` / `run_in_session` hand out transactional sessions.

use crate::config::DatabaseConfig;
use crate::model::Model;
use crate::request::RequestContext;
use kvorm_core::schema::{RelationshipKind, SchemaRegistry};
use kvorm_core::{Codec, Error, Record, Result, Value, ID_FIELD};
use kvorm_query::ast::{is_placeholder, ColumnRef, Expr};
use kvorm_query::{
    fingerprint, Attribute, BoundedCache, Compiler, QueryExecutor, QueryTree, TupleRow,
};
use kvorm_storage::{
    retry_on_conflict, Backend, LockService, MemoryBackend, MemoryLockService, Session, TextCodec,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// The query façade.
///
/// Cheap to share between threads (`&Database` is enough for queries and
/// sessions). The tree cache is the only state kept across calls; record
/// caches live in a [`RequestContext`] per call.
pub struct Database {
    registry: Arc<SchemaRegistry>,
    backend: Arc<dyn Backend>,
    locks: Arc<dyn LockService>,
    codec: Arc<dyn Codec>,
    config: DatabaseConfig,
    compiler: Compiler,
    trees: Mutex<BoundedCache<u64, QueryTree>>,
}

impl Database {
    pub fn new(
        registry: SchemaRegistry,
        backend: Arc<dyn Backend>,
        locks: Arc<dyn LockService>,
    ) -> Self {
        let config = DatabaseConfig::default();
        Self {
            registry: Arc::new(registry),
            backend,
            locks,
            codec: Arc::new(TextCodec),
            compiler: Compiler::with_options(config.compiler),
            trees: Mutex::new(BoundedCache::new(config.tree_cache_size)),
            config,
        }
    }

    /// A database over an in-memory backend and lock service.
    pub fn in_memory(registry: SchemaRegistry) -> Self {
        Self::new(
            registry,
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryLockService::new()),
        )
    }

    pub fn with_config(mut self, config: DatabaseConfig) -> Self {
        self.compiler = Compiler::with_options(config.compiler);
        self.trees = Mutex::new(BoundedCache::new(config.tree_cache_size));
        self.config = config;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// (hits, misses) of the compiled-tree cache.
    pub fn tree_cache_stats(&self) -> (u64, u64) {
        self.trees.lock().stats()
    }

    /// Compiles and validates a statement, reusing a cached tree for text
    /// seen before (whitespace differences ignored).
    pub fn compile(&self, text: &str) -> Result<QueryTree> {
        let key = fingerprint(text);
        if let Some(tree) = self.trees.lock().get(&key) {
            return Ok(tree.clone());
        }
        let started = Instant::now();
        let tree = self.compiler.compile(text)?;
        self.validate(&tree)?;
        tracing::debug!(elapsed_us = started.elapsed().as_micros() as u64, "compiled statement");
        self.trees.lock().insert(key, tree.clone());
        Ok(tree)
    }

    /// Checks every table and column a tree mentions against the registry.
    ///
    /// A qualifier naming a registered table that is not in FROM is let
    /// through: the tuple engine answers such a statement with no rows.
    pub fn validate(&self, tree: &QueryTree) -> Result<()> {
        for model in &tree.models {
            if !self.registry.contains(model) {
                return Err(Error::unknown_table(model.clone()));
            }
        }

        let mut columns: Vec<ColumnRef> = Vec::new();
        for attribute in &tree.attributes {
            match attribute {
                Attribute::Column(c) => columns.push(c.clone()),
                Attribute::AllOf(label) => {
                    if tree.table_for(label).is_none() && !self.registry.contains(label) {
                        return Err(Error::unknown_table(label.clone()));
                    }
                }
                Attribute::Wildcard => {}
            }
        }
        let clauses = tree
            .where_clauses
            .iter()
            .chain(tree.joining_clauses.iter())
            .chain(tree.outer_join_filters.values().flatten());
        for clause in clauses {
            Expr::parse_with(clause, self.config.compiler.max_depth)?
                .visit_columns(&mut |c: &ColumnRef| columns.push(c.clone()));
        }

        for column in &columns {
            self.validate_column(tree, column)?;
        }
        for subquery in tree.variables.values() {
            self.validate(subquery)?;
        }
        Ok(())
    }

    fn validate_column(&self, tree: &QueryTree, column: &ColumnRef) -> Result<()> {
        if column.column == ID_FIELD || is_placeholder(&column.column) {
            return Ok(());
        }
        match &column.table {
            Some(name) => {
                let table = match tree.table_for(name) {
                    Some(table) => table,
                    None if self.registry.contains(name) => name.as_str(),
                    None => return Err(Error::unknown_table(name.clone())),
                };
                self.registry.resolve_column(table, &column.column).map(|_| ())
            }
            None => {
                let declared = tree.models.iter().any(|m| {
                    self.registry
                        .table(m)
                        .map(|t| t.has_column(&column.column))
                        .unwrap_or(false)
                });
                if declared {
                    Ok(())
                } else {
                    let first = tree.models.first().cloned().unwrap_or_default();
                    Err(Error::unknown_column(first, column.column.clone()))
                }
            }
        }
    }

    /// A fresh per-request record source.
    pub fn request(&self) -> RequestContext<'_> {
        RequestContext::new(&*self.backend, &self.registry, self.config.record_cache_size)
            .with_hints(self.config.use_index_hints)
            .with_max_depth(self.config.compiler.max_depth)
    }

    /// Runs a SELECT statement.
    pub fn execute(&self, text: &str) -> Result<Vec<TupleRow>> {
        let tree = self.compile(text)?;
        self.execute_tree(&tree)
    }

    /// Runs an already compiled (and validated) tree.
    pub fn execute_tree(&self, tree: &QueryTree) -> Result<Vec<TupleRow>> {
        let mut request = self.request();
        self.execute_in(tree, &mut request)
    }

    /// Runs a tree against an existing request context, sharing its record
    /// cache with earlier statements of the same request.
    pub fn execute_in(&self, tree: &QueryTree, request: &mut RequestContext<'_>) -> Result<Vec<TupleRow>> {
        let started = Instant::now();
        let rows = QueryExecutor::new()
            .with_registry(&self.registry)
            .with_codec(&*self.codec)
            .with_max_depth(self.config.compiler.max_depth)
            .execute(tree, request)?;
        tracing::debug!(
            tables = ?tree.models,
            rows = rows.len(),
            backend_reads = request.backend_reads(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "executed query"
        );
        Ok(rows)
    }

    /// Runs a statement and decodes the first record of table `T::TABLE` in
    /// every row.
    pub fn query_as<T: Model>(&self, text: &str) -> Result<Vec<T>> {
        let tree = self.compile(text)?;
        let rows = self.execute_tree(&tree)?;
        rows.iter()
            .filter_map(|row| record_of(&tree, row, T::TABLE))
            .map(T::from_record)
            .collect()
    }

    /// Runs a two-table statement and decodes each row as a pair. The second
    /// element is absent for unmatched LEFT JOIN rows.
    pub fn query_pairs<A: Model, B: Model>(&self, text: &str) -> Result<Vec<(A, Option<B>)>> {
        let tree = self.compile(text)?;
        let rows = self.execute_tree(&tree)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(first) = record_of(&tree, row, A::TABLE) else {
                continue;
            };
            let second = record_of(&tree, row, B::TABLE)
                .map(B::from_record)
                .transpose()?;
            out.push((A::from_record(first)?, second));
        }
        Ok(out)
    }

    /// First value of the first row (an aggregate, or a selected column);
    /// NULL for an empty result.
    pub fn scalar(&self, text: &str) -> Result<Value> {
        Ok(self
            .execute(text)?
            .first()
            .map(TupleRow::first_value)
            .unwrap_or(Value::Null))
    }

    /// A new session over this database's backend and lock service.
    pub fn session(&self) -> Session {
        Session::new(self.backend.clone(), self.locks.clone())
            .with_config(self.config.session)
            .with_codec(self.codec.clone())
            .with_registry(self.registry.clone())
    }

    /// Runs `unit` in a fresh session and commits it, re-running both on
    /// conflict as the retry policy allows.
    pub fn run_in_session<T, F>(&self, mut unit: F) -> Result<T>
    where
        F: FnMut(&mut Session) -> Result<T>,
    {
        retry_on_conflict(&self.config.retry, |attempt| {
            let mut session = self.session();
            tracing::debug!(session = %session.id(), attempt, "running unit of work");
            let value = unit(&mut session)?;
            session.flush()?;
            Ok(value)
        })
    }

    /// Loads the objects on the far side of a relationship declared on
    /// `table`.
    pub fn load_relationship<T: Model>(
        &self,
        table: &str,
        record: &Record,
        relationship: &str,
    ) -> Result<Vec<T>> {
        let schema = self
            .registry
            .table(table)
            .ok_or_else(|| Error::unknown_table(table))?;
        let rel = schema
            .relationship(relationship)
            .ok_or_else(|| Error::unknown_column(table, relationship))?;
        if rel.target != T::TABLE {
            return Err(Error::invalid_operation(format!(
                "relationship {}.{} targets {}, not {}",
                table,
                relationship,
                rel.target,
                T::TABLE
            )));
        }

        let value = record.get_or_null(&rel.local_column);
        if value.is_null() {
            return Ok(Vec::new());
        }
        let mut tree = QueryTree::default();
        tree.attributes.push(Attribute::Wildcard);
        tree.models.push(rel.target.clone());
        tree.labels.push(rel.target.clone());
        tree.where_clauses.push(
            Expr::eq(
                Expr::column(rel.target.clone(), rel.remote_column.clone()),
                Expr::Literal(value),
            )
            .to_string(),
        );

        let rows = self.execute_tree(&tree)?;
        let mut objects = rows
            .iter()
            .filter_map(|row| row.record(&rel.target))
            .map(T::from_record)
            .collect::<Result<Vec<T>>>()?;
        if rel.kind == RelationshipKind::ManyToOne {
            objects.truncate(1);
        }
        Ok(objects)
    }
}

/// The record of the first label bound to `table` in a row.
fn record_of<'r>(tree: &QueryTree, row: &'r TupleRow, table: &str) -> Option<&'r Record> {
    tree.labels
        .iter()
        .zip(tree.models.iter())
        .filter(|(_, model)| model.as_str() == table)
        .find_map(|(label, _)| row.record(label))
}
