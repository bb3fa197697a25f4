//! Transactional sessions.
//!
//! A session stages creates, updates and deletes, then commits them as one
//! unit of work:
//!
//! 1. lock every staged object that has a primary key
//!    (`session_lock_<table>_<id>`, bounded wait, TTL);
//! 2. with version checking on, compare each object's captured version with
//!    the backend's current one;
//! 3. only then persist staged adds (allocating keys for new objects) and
//!    remove staged deletes;
//! 4. release every held lock and clear both staging pools.
//!
//! A lock or version failure aborts before any write with `Error::Conflict`.
//! The session never retries; see [`crate::retry`].

use crate::backend::Backend;
use crate::lock::LockService;
use chrono::{DateTime, Utc};
use kvorm_core::schema::SchemaRegistry;
use kvorm_core::{Codec, Error, Record, RecordId, Result};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Session settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// TTL of the per-object commit locks.
    pub lock_ttl_ms: u64,
    /// Compare captured object versions with the backend before writing.
    pub check_version_numbers: bool,
    /// Age after which the session refuses to commit.
    pub timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: 100,
            check_version_numbers: true,
            timeout_ms: 300_000,
        }
    }
}

impl SessionConfig {
    pub fn lock_ttl_ms(mut self, ms: u64) -> Self {
        self.lock_ttl_ms = ms;
        self
    }

    pub fn check_version_numbers(mut self, check: bool) -> Self {
        self.check_version_numbers = check;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }
}

/// A record bound to its table. The record's version is the one captured
/// when it was loaded (0 for objects never persisted).
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectRef {
    pub table: String,
    pub record: Record,
}

impl ObjectRef {
    pub fn new(table: impl Into<String>, record: Record) -> Self {
        Self {
            table: table.into(),
            record,
        }
    }

    #[inline]
    pub fn id(&self) -> Option<RecordId> {
        self.record.id()
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.record.version()
    }

    /// Structural identity: same table and same id when both have one,
    /// otherwise equal fields.
    pub fn same_identity(&self, other: &ObjectRef) -> bool {
        if self.table != other.table {
            return false;
        }
        match (self.id(), other.id()) {
            (Some(a), Some(b)) => a == b,
            _ => self.record.fields() == other.record.fields(),
        }
    }

    /// Name of the commit lock guarding this object.
    pub fn lock_name(&self) -> Option<String> {
        self.id().map(|id| lock_name(&self.table, id))
    }
}

/// Name of the commit lock for `table`/`id`.
pub fn lock_name(table: &str, id: RecordId) -> String {
    format!("session_lock_{}_{}", table, id)
}

/// Something handed to `add` or `delete`: a loaded object, or a relationship
/// that was never loaded (skipped).
#[derive(Clone, Debug, PartialEq)]
pub enum Staged {
    Loaded(ObjectRef),
    Unloaded { table: String },
}

impl From<ObjectRef> for Staged {
    fn from(object: ObjectRef) -> Self {
        Staged::Loaded(object)
    }
}

/// Session lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing staged.
    Idle,
    Staging,
    Committing,
}

/// What a successful commit wrote.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommitOutcome {
    /// Stored objects with their assigned ids and new versions.
    pub persisted: Vec<ObjectRef>,
    /// `(table, id)` of removed objects.
    pub deleted: Vec<(String, RecordId)>,
}

impl CommitOutcome {
    pub fn is_empty(&self) -> bool {
        self.persisted.is_empty() && self.deleted.is_empty()
    }

    /// Stored objects of one table.
    pub fn persisted_in<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ObjectRef> {
        self.persisted.iter().filter(move |o| o.table == table)
    }
}

/// A unit of work against a backend.
///
/// Not meant to be shared between threads while staging; several sessions
/// may run concurrently against the same backend and lock service.
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    config: SessionConfig,
    backend: Arc<dyn Backend>,
    locks: Arc<dyn LockService>,
    codec: Option<Arc<dyn Codec>>,
    registry: Option<Arc<SchemaRegistry>>,
    pending_add: Vec<ObjectRef>,
    pending_delete: Vec<ObjectRef>,
    held_locks: Vec<String>,
    state: SessionState,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("state", &self.state)
            .field("pending_add", &self.pending_add.len())
            .field("pending_delete", &self.pending_delete.len())
            .field("held_locks", &self.held_locks)
            .finish()
    }
}

impl Session {
    pub fn new(backend: Arc<dyn Backend>, locks: Arc<dyn LockService>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            config: SessionConfig::default(),
            backend,
            locks,
            codec: None,
            registry: None,
            pending_add: Vec::new(),
            pending_delete: Vec::new(),
            held_locks: Vec::new(),
            state: SessionState::Idle,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Codec applied to every field before it is written.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Registry whose indexed columns become secondary indexes on write.
    pub fn with_registry(mut self, registry: Arc<SchemaRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn pending_add(&self) -> &[ObjectRef] {
        &self.pending_add
    }

    pub fn pending_delete(&self) -> &[ObjectRef] {
        &self.pending_delete
    }

    /// Locks currently held by this session. Empty outside a commit.
    pub fn held_locks(&self) -> &[String] {
        &self.held_locks
    }

    /// Whether the session outlived its timeout.
    pub fn is_expired(&self) -> bool {
        let age = Utc::now().signed_duration_since(self.created_at);
        age.num_milliseconds() > self.config.timeout_ms as i64
    }

    /// Stages an object for upsert. Objects already staged are ignored;
    /// unloaded relationships are skipped.
    pub fn add(&mut self, object: impl Into<Staged>) {
        if let Staged::Loaded(object) = object.into() {
            if !self.pending_add.iter().any(|o| o.same_identity(&object)) {
                self.pending_add.push(object);
                self.state = SessionState::Staging;
            }
        }
    }

    pub fn add_all<I>(&mut self, objects: I)
    where
        I: IntoIterator,
        I::Item: Into<Staged>,
    {
        for object in objects {
            self.add(object);
        }
    }

    /// Stages an object for upsert, superseding any staged entry with the
    /// same identity.
    pub fn update(&mut self, object: ObjectRef) {
        self.pending_add.retain(|o| !o.same_identity(&object));
        self.pending_add.push(object);
        self.state = SessionState::Staging;
    }

    /// Stages an object for removal.
    pub fn delete(&mut self, object: impl Into<Staged>) {
        if let Staged::Loaded(object) = object.into() {
            if !self.pending_delete.iter().any(|o| o.same_identity(&object)) {
                self.pending_delete.push(object);
                self.state = SessionState::Staging;
            }
        }
    }

    /// Drops everything staged.
    pub fn rollback(&mut self) {
        self.pending_add.clear();
        self.pending_delete.clear();
        self.state = SessionState::Idle;
    }

    /// Opens a scope that commits when finished and rolls back when dropped.
    pub fn begin(&mut self) -> SessionScope<'_> {
        SessionScope {
            session: self,
            finished: false,
        }
    }

    /// Commits staged work; see [`Session::commit`].
    pub fn flush(&mut self) -> Result<CommitOutcome> {
        tracing::info!(session = %self.id, adds = self.pending_add.len(), deletes = self.pending_delete.len(), "flushing session");
        self.commit()
    }

    /// Commits staged work atomically.
    ///
    /// Whatever the result, every lock taken is released and both staging
    /// pools are cleared afterwards.
    pub fn commit(&mut self) -> Result<CommitOutcome> {
        if self.pending_add.is_empty() && self.pending_delete.is_empty() {
            self.state = SessionState::Idle;
            return Ok(CommitOutcome::default());
        }
        if self.is_expired() {
            self.rollback();
            return Err(Error::invalid_operation(format!(
                "session {} expired before commit",
                self.id
            )));
        }

        self.state = SessionState::Committing;
        let result = self
            .acquire_locks()
            .and_then(|_| self.check_versions())
            .and_then(|_| self.write());
        let released = self.release_locks();
        self.rollback();

        match &result {
            Ok(outcome) => {
                let ids: Vec<_> = outcome.persisted.iter().filter_map(ObjectRef::id).collect();
                tracing::info!(session = %self.id, ?ids, deleted = outcome.deleted.len(), "session committed");
            }
            Err(err @ Error::Conflict { .. }) => {
                tracing::warn!(session = %self.id, error = %err, "session aborted on conflict");
            }
            Err(err) => {
                tracing::warn!(session = %self.id, error = %err, "session commit failed");
            }
        }
        let outcome = result?;
        released?;
        Ok(outcome)
    }

    fn staged(&self) -> impl Iterator<Item = &ObjectRef> {
        self.pending_add.iter().chain(self.pending_delete.iter())
    }

    fn acquire_locks(&mut self) -> Result<()> {
        let ttl = Duration::from_millis(self.config.lock_ttl_ms);
        let owner = self.id.to_string();
        let names: Vec<String> = self.staged().filter_map(ObjectRef::lock_name).collect();
        for name in names {
            if self.held_locks.contains(&name) {
                continue;
            }
            if !self.locks.lock(&name, &owner, ttl)? {
                return Err(Error::conflict(format!("could not acquire {}", name)));
            }
            self.held_locks.push(name);
        }
        Ok(())
    }

    fn check_versions(&self) -> Result<()> {
        if !self.config.check_version_numbers {
            return Ok(());
        }
        for object in self.staged() {
            let (Some(id), captured) = (object.id(), object.version()) else {
                continue;
            };
            // Never loaded from the backend: nothing to compare against.
            if captured == 0 {
                continue;
            }
            let current = self.backend.object_version(&object.table, id)?;
            if current != captured {
                return Err(Error::conflict(format!(
                    "{} {} is at version {}, session loaded version {}",
                    object.table, id, current, captured
                )));
            }
        }
        Ok(())
    }

    fn write(&self) -> Result<CommitOutcome> {
        let mut outcome = CommitOutcome::default();
        for object in &self.pending_add {
            let mut record = match &self.codec {
                Some(codec) => object
                    .record
                    .iter()
                    .map(|(name, value)| (name.to_string(), codec.encode(value)))
                    .collect::<Record>()
                    .versioned(object.version()),
                None => object.record.clone(),
            };
            let id = match record.id() {
                Some(id) => id,
                None => {
                    let id = self.backend.next_key(&object.table)?;
                    record.set_id(id);
                    id
                }
            };
            let stored = self
                .backend
                .put(&object.table, id, record, &self.secondary_indexes(&object.table))?;
            outcome.persisted.push(ObjectRef::new(object.table.clone(), stored));
        }
        for object in &self.pending_delete {
            if let Some(id) = object.id() {
                self.backend.remove(&object.table, id)?;
                outcome.deleted.push((object.table.clone(), id));
            }
        }
        Ok(outcome)
    }

    fn secondary_indexes(&self, table: &str) -> Vec<String> {
        self.registry
            .as_ref()
            .and_then(|r| r.table(table))
            .map(|t| t.indexed_columns().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Releases every held lock, dropping each from the held set before the
    /// call so a failed release is never attempted twice.
    fn release_locks(&mut self) -> Result<()> {
        let owner = self.id.to_string();
        let mut first_error = None;
        while let Some(name) = self.held_locks.pop() {
            if let Err(err) = self.locks.unlock(&name, &owner) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Scoped unit of work: `finish` commits, dropping without `finish` rolls
/// back.
pub struct SessionScope<'s> {
    session: &'s mut Session,
    finished: bool,
}

impl SessionScope<'_> {
    pub fn finish(mut self) -> Result<CommitOutcome> {
        self.finished = true;
        self.session.flush()
    }
}

impl Deref for SessionScope<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for SessionScope<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for SessionScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.session.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::MemoryLockService;
    use crate::memory::MemoryBackend;

    fn setup() -> (Arc<MemoryBackend>, Arc<MemoryLockService>) {
        (Arc::new(MemoryBackend::new()), Arc::new(MemoryLockService::new()))
    }

    fn session(backend: &Arc<MemoryBackend>, locks: &Arc<MemoryLockService>) -> Session {
        Session::new(backend.clone(), locks.clone())
    }

    fn book(title: &str) -> ObjectRef {
        ObjectRef::new("books", Record::new().field("title", title))
    }

    #[test]
    fn test_add_dedupes_by_identity() {
        let (backend, locks) = setup();
        let mut s = session(&backend, &locks);
        assert_eq!(s.state(), SessionState::Idle);

        s.add(book("a"));
        s.add(book("a"));
        s.add(ObjectRef::new("books", Record::with_id(1).field("title", "x")));
        s.add(ObjectRef::new("books", Record::with_id(1).field("title", "y")));
        s.add(Staged::Unloaded { table: "authors".into() });
        assert_eq!(s.pending_add().len(), 2);
        assert_eq!(s.state(), SessionState::Staging);
    }

    #[test]
    fn test_update_supersedes() {
        let (backend, locks) = setup();
        let mut s = session(&backend, &locks);
        s.add(ObjectRef::new("books", Record::with_id(1).field("title", "x")));
        s.update(ObjectRef::new("books", Record::with_id(1).field("title", "y")));
        assert_eq!(s.pending_add().len(), 1);
        assert_eq!(
            s.pending_add()[0].record.get("title"),
            Some(&kvorm_core::Value::from("y"))
        );
    }

    #[test]
    fn test_commit_assigns_keys_and_versions() {
        let (backend, locks) = setup();
        let mut s = session(&backend, &locks);
        s.add_all([book("a"), book("b")]);
        let outcome = s.commit().unwrap();

        let ids: Vec<_> = outcome.persisted.iter().filter_map(ObjectRef::id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(outcome.persisted.iter().all(|o| o.version() == 1));
        assert_eq!(backend.len("books"), 2);
        assert!(s.pending_add().is_empty());
        assert!(s.held_locks().is_empty());
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(locks.held(), 0);
    }

    #[test]
    fn test_commit_deletes() {
        let (backend, locks) = setup();
        let stored = backend.put("books", 1, Record::new(), &[]).unwrap();
        let mut s = session(&backend, &locks);
        s.delete(ObjectRef::new("books", stored));
        let outcome = s.commit().unwrap();
        assert_eq!(outcome.deleted, vec![("books".to_string(), 1)]);
        assert!(backend.get("books", 1).unwrap().is_none());
    }

    #[test]
    fn test_lock_conflict_writes_nothing() {
        let (backend, locks) = setup();
        let stored = backend.put("books", 1, Record::new(), &[]).unwrap();
        assert!(locks
            .lock(&lock_name("books", 1), "other", Duration::from_secs(10))
            .unwrap());

        let mut s = session(&backend, &locks);
        s.add(book("new"));
        s.update(ObjectRef::new("books", stored.clone().field("title", "changed")));
        let err = s.commit().unwrap_err();
        assert!(err.is_retryable());

        assert_eq!(backend.len("books"), 1);
        assert_eq!(backend.object_version("books", 1).unwrap(), 1);
        assert!(s.pending_add().is_empty());
        assert!(s.held_locks().is_empty());
        // Only the foreign lock is left.
        assert_eq!(locks.held(), 1);
    }

    #[test]
    fn test_stale_version_conflicts() {
        let (backend, locks) = setup();
        let stored = backend.put("books", 1, Record::new().field("n", 0i64), &[]).unwrap();

        let mut first = session(&backend, &locks);
        let mut second = session(&backend, &locks);
        first.update(ObjectRef::new("books", stored.clone().field("n", 1i64)));
        second.update(ObjectRef::new("books", stored.field("n", 2i64)));

        first.commit().unwrap();
        let err = second.commit().unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        let current = backend.get("books", 1).unwrap().unwrap();
        assert_eq!(current.get("n"), Some(&kvorm_core::Value::Int64(1)));
        assert_eq!(current.version(), 2);
    }

    #[test]
    fn test_version_check_can_be_disabled() {
        let (backend, locks) = setup();
        let stored = backend.put("books", 1, Record::new(), &[]).unwrap();
        backend.put("books", 1, stored.clone(), &[]).unwrap();

        let mut s = session(&backend, &locks)
            .with_config(SessionConfig::default().check_version_numbers(false));
        s.update(ObjectRef::new("books", stored));
        assert!(s.commit().is_ok());
        assert_eq!(backend.object_version("books", 1).unwrap(), 3);
    }

    #[test]
    fn test_backend_failure_releases_locks() {
        let (backend, locks) = setup();
        let stored = backend.put("books", 1, Record::new(), &[]).unwrap();
        backend.set_available(false);

        let mut s = session(&backend, &locks);
        s.update(ObjectRef::new("books", stored));
        let err = s.commit().unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { .. }));
        assert!(!err.is_retryable());
        assert_eq!(locks.held(), 0);
        assert!(s.pending_add().is_empty());
    }

    #[test]
    fn test_expired_session_refuses_commit() {
        let (backend, locks) = setup();
        let mut s = session(&backend, &locks).with_config(SessionConfig::default().timeout_ms(0));
        s.add(book("a"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(s.is_expired());
        assert!(matches!(s.commit(), Err(Error::InvalidOperation { .. })));
        assert_eq!(backend.len("books"), 0);
    }

    #[test]
    fn test_scope_commits_on_finish_and_rolls_back_on_drop() {
        let (backend, locks) = setup();
        let mut s = session(&backend, &locks);
        {
            let mut scope = s.begin();
            scope.add(book("dropped"));
        }
        assert!(s.pending_add().is_empty());

        let mut scope = s.begin();
        scope.add(book("kept"));
        let outcome = scope.finish().unwrap();
        assert_eq!(outcome.persisted_in("books").count(), 1);
        assert_eq!(backend.len("books"), 1);
    }

    #[test]
    fn test_codec_and_indexes_applied_on_write() {
        use crate::backend::Hint;
        use crate::codec::TextCodec;
        use kvorm_core::schema::TableBuilder;
        use kvorm_core::{DataType, Value};

        let registry = SchemaRegistry::new()
            .with_table(
                TableBuilder::new("events")
                    .unwrap()
                    .add_column("at", DataType::DateTime)
                    .unwrap()
                    .add_column("kind", DataType::String)
                    .unwrap()
                    .add_index("kind")
                    .unwrap()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let (backend, locks) = setup();
        let mut s = session(&backend, &locks)
            .with_codec(Arc::new(TextCodec))
            .with_registry(Arc::new(registry));
        s.add(ObjectRef::new(
            "events",
            Record::new()
                .field("at", Value::DateTime(0))
                .field("kind", "boot"),
        ));
        s.commit().unwrap();

        let stored = backend
            .get_all("events", &[Hint::index("kind", "boot")])
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(
            stored[0].get("at"),
            Some(&Value::String("1970-01-01 00:00:00".into()))
        );
    }
}
