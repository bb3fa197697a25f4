//! In-memory backend.

use crate::backend::{Backend, Hint};
use kvorm_core::{Error, Record, RecordId, Result, Value};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// State of one table.
#[derive(Debug)]
struct TableData {
    records: BTreeMap<RecordId, Record>,
    /// column → value → keys.
    indexes: BTreeMap<String, BTreeMap<Value, BTreeSet<RecordId>>>,
    next_key: RecordId,
    version: u64,
    object_versions: BTreeMap<RecordId, u64>,
}

impl Default for TableData {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
            next_key: 1,
            version: 0,
            object_versions: BTreeMap::new(),
        }
    }
}

impl TableData {
    fn unindex(&mut self, key: RecordId) {
        for entries in self.indexes.values_mut() {
            entries.retain(|_, keys| {
                keys.remove(&key);
                !keys.is_empty()
            });
        }
    }
}

/// A `Backend` kept in process memory.
///
/// Every operation runs under one mutex, which makes the counters atomic in
/// the same sense a remote store's are. `set_available(false)` simulates an
/// unreachable store.
#[derive(Debug)]
pub struct MemoryBackend {
    tables: Mutex<BTreeMap<String, TableData>>,
    available: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of records stored in `table`.
    pub fn len(&self, table: &str) -> usize {
        self.tables
            .lock()
            .get(table)
            .map(|t| t.records.len())
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::backend_unavailable("memory backend is offline"))
        }
    }
}

impl Backend for MemoryBackend {
    fn next_key(&self, table: &str) -> Result<RecordId> {
        self.check_available()?;
        let mut tables = self.tables.lock();
        let data = tables.entry(table.to_string()).or_default();
        let key = data.next_key;
        data.next_key += 1;
        Ok(key)
    }

    fn put(
        &self,
        table: &str,
        key: RecordId,
        mut record: Record,
        secondary_indexes: &[String],
    ) -> Result<Record> {
        self.check_available()?;
        let mut tables = self.tables.lock();
        let data = tables.entry(table.to_string()).or_default();

        data.version += 1;
        let version = data.object_versions.entry(key).or_insert(0);
        *version += 1;
        let version = *version;

        record.set_id(key);
        record.set_version(version);

        data.unindex(key);
        for column in secondary_indexes {
            let value = record.get_or_null(column);
            if value.is_null() {
                continue;
            }
            data.indexes
                .entry(column.clone())
                .or_default()
                .entry(value)
                .or_default()
                .insert(key);
        }

        // Keys chosen by the caller must never be handed out again.
        if key >= data.next_key {
            data.next_key = key + 1;
        }
        data.records.insert(key, record.clone());
        Ok(record)
    }

    fn remove(&self, table: &str, key: RecordId) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.lock();
        let data = tables.entry(table.to_string()).or_default();
        data.records.remove(&key);
        data.unindex(key);
        data.object_versions.remove(&key);
        data.version += 1;
        Ok(())
    }

    fn get(&self, table: &str, key: RecordId) -> Result<Option<Record>> {
        self.check_available()?;
        let tables = self.tables.lock();
        Ok(tables.get(table).and_then(|t| t.records.get(&key)).cloned())
    }

    fn get_all(&self, table: &str, hints: &[Hint]) -> Result<Vec<Record>> {
        self.check_available()?;
        let tables = self.tables.lock();
        let Some(data) = tables.get(table) else {
            return Ok(Vec::new());
        };
        if hints.is_empty() {
            return Ok(data.records.values().cloned().collect());
        }

        let mut keys = BTreeSet::new();
        for hint in hints {
            match hint {
                Hint::Id(id) => {
                    if data.records.contains_key(id) {
                        keys.insert(*id);
                    }
                }
                Hint::Index { column, value } => match data.indexes.get(column) {
                    Some(index) => {
                        if let Some(found) = index.get(value) {
                            keys.extend(found.iter().copied());
                        }
                    }
                    // Not indexed: fall back to a scan.
                    None => keys.extend(
                        data.records
                            .values()
                            .filter(|r| hint.matches(r))
                            .filter_map(Record::id),
                    ),
                },
            }
        }
        Ok(keys
            .iter()
            .filter_map(|k| data.records.get(k))
            .cloned()
            .collect())
    }

    fn object_version(&self, table: &str, key: RecordId) -> Result<u64> {
        self.check_available()?;
        let tables = self.tables.lock();
        Ok(tables
            .get(table)
            .and_then(|t| t.object_versions.get(&key))
            .copied()
            .unwrap_or(0))
    }

    fn table_version(&self, table: &str) -> Result<u64> {
        self.check_available()?;
        let tables = self.tables.lock();
        Ok(tables.get(table).map(|t| t.version).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed() -> Vec<String> {
        vec!["author_id".to_string()]
    }

    #[test]
    fn test_next_key_is_monotonic() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.next_key("books").unwrap(), 1);
        assert_eq!(backend.next_key("books").unwrap(), 2);
        assert_eq!(backend.next_key("authors").unwrap(), 1);

        backend.put("books", 10, Record::new(), &[]).unwrap();
        assert_eq!(backend.next_key("books").unwrap(), 11);
    }

    #[test]
    fn test_put_stamps_versions() {
        let backend = MemoryBackend::new();
        let stored = backend
            .put("books", 1, Record::new().field("title", "a"), &[])
            .unwrap();
        assert_eq!(stored.id(), Some(1));
        assert_eq!(stored.version(), 1);

        let stored = backend.put("books", 1, stored, &[]).unwrap();
        assert_eq!(stored.version(), 2);
        assert_eq!(backend.object_version("books", 1).unwrap(), 2);
        assert_eq!(backend.table_version("books").unwrap(), 2);
        assert_eq!(backend.get("books", 1).unwrap().unwrap().version(), 2);
    }

    #[test]
    fn test_remove_resets_object_version() {
        let backend = MemoryBackend::new();
        backend.put("books", 1, Record::new(), &[]).unwrap();
        backend.remove("books", 1).unwrap();
        assert_eq!(backend.object_version("books", 1).unwrap(), 0);
        assert_eq!(backend.table_version("books").unwrap(), 2);
        assert!(backend.get("books", 1).unwrap().is_none());
        assert_eq!(backend.object_version("books", 99).unwrap(), 0);
    }

    #[test]
    fn test_get_all_hints_are_a_union() {
        let backend = MemoryBackend::new();
        for (id, author) in [(1, 2i64), (2, 2), (3, 3), (4, 4)] {
            backend
                .put("books", id, Record::new().field("author_id", author), &indexed())
                .unwrap();
        }
        assert_eq!(backend.get_all("books", &[]).unwrap().len(), 4);

        let hits = backend
            .get_all("books", &[Hint::index("author_id", 2i64), Hint::Id(4)])
            .unwrap();
        let ids: Vec<_> = hits.iter().filter_map(Record::id).collect();
        assert_eq!(ids, vec![1, 2, 4]);

        // Unindexed column falls back to a scan.
        backend
            .put("books", 5, Record::new().field("title", "x"), &indexed())
            .unwrap();
        let hits = backend.get_all("books", &[Hint::index("title", "x")]).unwrap();
        assert_eq!(hits.len(), 1);

        assert!(backend.get_all("shelves", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_reindex_on_update() {
        let backend = MemoryBackend::new();
        backend
            .put("books", 1, Record::new().field("author_id", 2i64), &indexed())
            .unwrap();
        backend
            .put("books", 1, Record::new().field("author_id", 3i64), &indexed())
            .unwrap();
        assert!(backend
            .get_all("books", &[Hint::index("author_id", 2i64)])
            .unwrap()
            .is_empty());
        assert_eq!(
            backend
                .get_all("books", &[Hint::index("author_id", 3i64)])
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_offline() {
        let backend = MemoryBackend::new();
        backend.set_available(false);
        assert!(matches!(
            backend.next_key("books"),
            Err(Error::BackendUnavailable { .. })
        ));
        backend.set_available(true);
        assert!(backend.next_key("books").is_ok());
    }
}
