//! Typed rows.

use kvorm_core::{Error, Record, RecordId, Result, Value};
use kvorm_storage::{ObjectRef, Staged};

/// A type stored as the records of one table.
///
/// `to_record` should carry the id and the version `from_record` saw, so
/// that sessions can detect concurrent writes to the object.
pub trait Model: Sized {
    const TABLE: &'static str;

    fn from_record(record: &Record) -> Result<Self>;

    fn to_record(&self) -> Record;

    /// The object as a session entry.
    fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(Self::TABLE, self.to_record())
    }
}

/// A relationship that may not have been loaded yet.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Related<T> {
    #[default]
    Unloaded,
    Loaded(T),
}

impl<T> Related<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Related::Loaded(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Related::Loaded(value) => Some(value),
            Related::Unloaded => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Related::Loaded(value) => Some(value),
            Related::Unloaded => None,
        }
    }
}

impl<T: Model> Related<T> {
    /// Session entry for the related object; unloaded relationships are
    /// skipped by the session instead of being forced to load.
    pub fn staged(&self) -> Staged {
        match self {
            Related::Loaded(value) => Staged::Loaded(value.object_ref()),
            Related::Unloaded => Staged::Unloaded {
                table: T::TABLE.to_string(),
            },
        }
    }
}

/// A field that must be present (and not null) for `from_record` to succeed.
pub fn required<'r>(record: &'r Record, table: &str, name: &str) -> Result<&'r Value> {
    match record.get(name) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(Error::invalid_operation(format!(
            "{} record is missing field {}",
            table, name
        ))),
    }
}

/// Reads the id of a persisted record.
pub fn required_id(record: &Record, table: &str) -> Result<RecordId> {
    record
        .id()
        .ok_or_else(|| Error::invalid_operation(format!("{} record has no id", table)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tag {
        id: Option<RecordId>,
        version: u64,
        label: String,
    }

    impl Model for Tag {
        const TABLE: &'static str = "tags";

        fn from_record(record: &Record) -> Result<Self> {
            Ok(Tag {
                id: Some(required_id(record, Self::TABLE)?),
                version: record.version(),
                label: required(record, Self::TABLE, "label")?
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            })
        }

        fn to_record(&self) -> Record {
            let mut record = Record::new().field("label", self.label.as_str());
            if let Some(id) = self.id {
                record.set_id(id);
            }
            record.versioned(self.version)
        }
    }

    #[test]
    fn test_model_round_trip() {
        let record = Record::with_id(4).field("label", "rust").versioned(2);
        let tag = Tag::from_record(&record).unwrap();
        assert_eq!(tag.label, "rust");
        assert_eq!(tag.to_record(), record);
        assert_eq!(tag.object_ref().table, "tags");
    }

    #[test]
    fn test_missing_field() {
        let record = Record::with_id(4);
        assert!(matches!(
            Tag::from_record(&record),
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_related() {
        let unloaded: Related<Tag> = Related::Unloaded;
        assert!(!unloaded.is_loaded());
        assert!(matches!(unloaded.staged(), Staged::Unloaded { .. }));

        let loaded = Related::Loaded(Tag {
            id: Some(1),
            version: 1,
            label: "x".into(),
        });
        assert!(loaded.is_loaded());
        assert!(matches!(loaded.staged(), Staged::Loaded(_)));
        assert_eq!(loaded.into_option().unwrap().label, "x");
    }
}
