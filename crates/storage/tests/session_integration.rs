//! Integration tests for sessions against the in-memory backend.

use kvorm_core::{Error, Record, Value};
use kvorm_storage::{
    lock_name, retry_on_conflict, Backend, LockService, MemoryBackend, MemoryLockService,
    ObjectRef, RetryPolicy, Session,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn setup() -> (Arc<MemoryBackend>, Arc<MemoryLockService>) {
    (
        Arc::new(MemoryBackend::new()),
        Arc::new(MemoryLockService::new().with_attempts(3)),
    )
}

/// Loads the counter, bumps it and commits; conflicts surface to the caller.
fn increment(backend: &Arc<MemoryBackend>, locks: &Arc<MemoryLockService>) -> kvorm_core::Result<()> {
    let current = backend
        .get("counters", 1)?
        .ok_or_else(|| Error::invalid_operation("counter missing"))?;
    let value = current.get("value").and_then(Value::as_i64).unwrap_or(0);
    let mut session = Session::new(backend.clone(), locks.clone());
    session.update(ObjectRef::new("counters", current.field("value", value + 1)));
    session.commit().map(|_| ())
}

#[test]
fn test_concurrent_increments_are_serialized() {
    let (backend, locks) = setup();
    backend
        .put("counters", 1, Record::new().field("value", 0i64), &[])
        .unwrap();

    let policy = RetryPolicy::default().max_attempts(1_000).backoff_ms(0, 2);
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let backend = backend.clone();
            let locks = locks.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    retry_on_conflict(&policy, |_| increment(&backend, &locks)).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let counter = backend.get("counters", 1).unwrap().unwrap();
    assert_eq!(counter.get("value"), Some(&Value::Int64(40)));
    assert_eq!(counter.version(), 41);
    assert_eq!(locks.held(), 0);
}

#[test]
fn test_deleted_object_conflicts_with_stale_update() {
    let (backend, locks) = setup();
    let stored = backend.put("books", 1, Record::new(), &[]).unwrap();

    let mut deleter = Session::new(backend.clone(), locks.clone());
    deleter.delete(ObjectRef::new("books", stored.clone()));
    deleter.commit().unwrap();

    let mut writer = Session::new(backend.clone(), locks.clone());
    writer.update(ObjectRef::new("books", stored.field("title", "late")));
    assert!(matches!(writer.commit(), Err(Error::Conflict { .. })));
    assert!(backend.get("books", 1).unwrap().is_none());
}

#[test]
fn test_expired_foreign_lock_does_not_block() {
    let (backend, locks) = setup();
    let stored = backend.put("books", 1, Record::new(), &[]).unwrap();
    assert!(locks
        .lock(&lock_name("books", 1), "expired", Duration::from_millis(1))
        .unwrap());
    thread::sleep(Duration::from_millis(5));

    let mut session = Session::new(backend.clone(), locks.clone());
    session.update(ObjectRef::new("books", stored));
    assert!(session.commit().is_ok());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: when any one of N staged objects cannot be locked, none of
    /// the N objects gets a new version.
    #[test]
    fn commit_is_all_or_nothing(count in 1usize..8, blocked in 0usize..8) {
        let blocked = blocked % count;
        let (backend, locks) = setup();
        let stored: Vec<Record> = (0..count)
            .map(|i| backend.put("items", i as i64 + 1, Record::new(), &[]).unwrap())
            .collect();
        prop_assert!(locks
            .lock(&lock_name("items", blocked as i64 + 1), "other", Duration::from_secs(30))
            .unwrap());

        let mut session = Session::new(backend.clone(), locks.clone());
        for record in &stored {
            session.update(ObjectRef::new("items", record.clone().field("touched", true)));
        }
        prop_assert!(session.commit().unwrap_err().is_retryable());

        for i in 0..count {
            prop_assert_eq!(backend.object_version("items", i as i64 + 1).unwrap(), 1);
        }
        prop_assert_eq!(locks.held(), 1);
        prop_assert_eq!(backend.table_version("items").unwrap(), count as u64);
    }
}
