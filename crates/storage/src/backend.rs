//! Storage backend contract.
//!
//! The backend is a keyed record store with atomic counters: a per-table
//! primary-key generator, per-table and per-object version counters, and
//! secondary-index sets. Every concurrency guarantee kvorm gives rests on the
//! atomicity of these operations; nothing in-process substitutes for it.

use kvorm_core::{Record, RecordId, Result, Value};

/// Narrows a `get_all` to a subset of records. Several hints are combined as
/// a union.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Hint {
    /// The record with this primary key.
    Id(RecordId),
    /// Records whose secondary-indexed `column` holds `value`.
    Index { column: String, value: Value },
}

impl Hint {
    pub fn index(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Hint::Index {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Whether `record` is selected by this hint.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Hint::Id(id) => record.id() == Some(*id),
            Hint::Index { column, value } => record.get(column) == Some(value),
        }
    }
}

/// A key-value store as seen by kvorm.
///
/// Implementations must be safe to share between threads; several sessions
/// (in this process or others) may use the same backend at once. An
/// unreachable store reports `Error::BackendUnavailable`.
pub trait Backend: Send + Sync {
    /// Atomically allocates a fresh primary key for `table`.
    fn next_key(&self, table: &str) -> Result<RecordId>;

    /// Stores `record` under `key`.
    ///
    /// Bumps the table's and the object's version counters, stamps the new
    /// object version into the returned record and indexes it under the
    /// current value of every column in `secondary_indexes`.
    fn put(
        &self,
        table: &str,
        key: RecordId,
        record: Record,
        secondary_indexes: &[String],
    ) -> Result<Record>;

    /// Deletes a record, bumps the table version and resets the object's
    /// version counter. Removing an absent key is not an error.
    fn remove(&self, table: &str, key: RecordId) -> Result<()>;

    fn get(&self, table: &str, key: RecordId) -> Result<Option<Record>>;

    /// Every record of `table`, or with hints the union of the records
    /// matching any hint. Records come back in key order.
    fn get_all(&self, table: &str, hints: &[Hint]) -> Result<Vec<Record>>;

    /// Current version of an object; 0 when it was never written (or has
    /// been removed).
    fn object_version(&self, table: &str, key: RecordId) -> Result<u64>;

    /// Number of writes `table` has seen.
    fn table_version(&self, table: &str) -> Result<u64>;
}
