//! Per-request record loading.

use crate::hints::derive_hints;
use kvorm_core::schema::SchemaRegistry;
use kvorm_core::{Record, Result};
use kvorm_query::{BoundedCache, CompilerOptions, QueryTree, RecordSource};
use kvorm_storage::{Backend, Hint};

/// Record sets pulled from the backend during one request.
///
/// A statement with subqueries, or several statements issued under the same
/// context, read each `(table, hints)` combination once. The cache lives and
/// dies with the context; nothing is shared between requests.
pub struct RequestContext<'a> {
    backend: &'a dyn Backend,
    registry: &'a SchemaRegistry,
    records: BoundedCache<(String, Vec<Hint>), Vec<Record>>,
    use_hints: bool,
    max_depth: usize,
}

impl<'a> RequestContext<'a> {
    pub fn new(backend: &'a dyn Backend, registry: &'a SchemaRegistry, cache_size: usize) -> Self {
        Self {
            backend,
            registry,
            records: BoundedCache::new(cache_size),
            use_hints: true,
            max_depth: CompilerOptions::default().max_depth,
        }
    }

    pub fn with_hints(mut self, enabled: bool) -> Self {
        self.use_hints = enabled;
        self
    }

    /// Nesting bound used when reading hints out of stored clauses.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Number of backend reads issued so far.
    pub fn backend_reads(&self) -> u64 {
        self.records.stats().1
    }

    /// Forgets every cached record set, e.g. after a write in the same request.
    pub fn invalidate(&mut self) {
        self.records.clear();
    }
}

impl RecordSource for RequestContext<'_> {
    fn records(&mut self, table: &str, tree: &QueryTree) -> Result<Vec<Record>> {
        let hints = if self.use_hints {
            derive_hints(tree, self.registry, table, self.max_depth)
        } else {
            Vec::new()
        };
        let backend = self.backend;
        let key = (table.to_string(), hints);
        let hints = key.1.clone();
        self.records
            .get_or_try_insert_with(key, || backend.get_all(table, &hints))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvorm_core::schema::TableBuilder;
    use kvorm_core::DataType;
    use kvorm_query::compile;
    use kvorm_storage::MemoryBackend;

    fn setup() -> (MemoryBackend, SchemaRegistry) {
        let backend = MemoryBackend::new();
        for id in 1..=5 {
            backend.put("books", id, Record::new().field("n", id), &[]).unwrap();
        }
        let registry = SchemaRegistry::new()
            .with_table(
                TableBuilder::new("books")
                    .unwrap()
                    .add_column("n", DataType::Int64)
                    .unwrap()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        (backend, registry)
    }

    #[test]
    fn test_reads_are_cached_per_request() {
        let (backend, registry) = setup();
        let mut ctx = RequestContext::new(&backend, &registry, 8);
        let tree = compile("SELECT * FROM books").unwrap();
        assert_eq!(ctx.records("books", &tree).unwrap().len(), 5);
        assert_eq!(ctx.records("books", &tree).unwrap().len(), 5);
        assert_eq!(ctx.backend_reads(), 1);

        ctx.invalidate();
        ctx.records("books", &tree).unwrap();
        assert_eq!(ctx.backend_reads(), 2);
    }

    #[test]
    fn test_hinted_reads_are_keyed_separately() {
        let (backend, registry) = setup();
        let mut ctx = RequestContext::new(&backend, &registry, 8);
        let narrow = compile("SELECT * FROM books WHERE id = 2").unwrap();
        let wide = compile("SELECT * FROM books").unwrap();
        assert_eq!(ctx.records("books", &narrow).unwrap().len(), 1);
        assert_eq!(ctx.records("books", &wide).unwrap().len(), 5);

        let mut plain = RequestContext::new(&backend, &registry, 8).with_hints(false);
        assert_eq!(plain.records("books", &narrow).unwrap().len(), 5);
    }
}
