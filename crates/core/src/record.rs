//! Record structure for kvorm.
//!
//! A `Record` is the single container type for every row the system handles:
//! freshly built objects, records read from the backend and rows rehydrated by
//! the tuple engine all go through the same field map.

use crate::value::Value;
use alloc::collections::BTreeMap;
use alloc::string::String;

/// Primary key of a record within its table.
pub type RecordId = i64;

/// Name of the primary-key field.
pub const ID_FIELD: &str = "id";

/// A flat mapping of column name to value, plus the per-object version the
/// backend stamped on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
    /// Version captured when the record was read or written. 0 means the
    /// record has never been persisted.
    version: u64,
}

impl Record {
    /// Creates an empty, unpersisted record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an unpersisted record carrying the given primary key.
    pub fn with_id(id: RecordId) -> Self {
        let mut record = Self::new();
        record.set_id(id);
        record
    }

    /// Creates a record from an existing field map.
    pub fn from_fields(fields: BTreeMap<String, Value>) -> Self {
        Self { fields, version: 0 }
    }

    /// Builder-style field setter.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style version setter.
    pub fn versioned(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Returns the primary key, if the record carries an integer `id`.
    #[inline]
    pub fn id(&self) -> Option<RecordId> {
        self.fields.get(ID_FIELD).and_then(Value::as_i64)
    }

    pub fn set_id(&mut self, id: RecordId) {
        self.fields.insert(String::from(ID_FIELD), Value::Int64(id));
    }

    /// Returns the value of a field. Absent fields read as `None`.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns the value of a field, treating an absent field as Null.
    pub fn get_or_null(&self, name: &str) -> Value {
        self.fields.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterates over fields in column-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[inline]
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the captured per-object version.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Whether this record has been written to the backend at least once.
    #[inline]
    pub fn is_persisted(&self) -> bool {
        self.version > 0
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::from_fields(iter.into_iter().collect())
    }
}
