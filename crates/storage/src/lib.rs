//! kvorm Storage - Backend contract and transactional sessions for kvorm.
//!
//! This crate provides the write side of kvorm:
//!
//! - `Backend`: The key-value store contract (keys, versions, secondary indexes)
//! - `MemoryBackend`: An in-process backend for tests and embedding
//! - `LockService` / `MemoryLockService`: Named locks with TTL
//! - `TextCodec`: Timestamp ⇄ text codec
//! - `Session`: Staged, all-or-nothing multi-object writes with optimistic checks
//! - `retry_on_conflict`: Caller-side retry with randomized backoff
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use kvorm_core::Record;
//! use kvorm_storage::{Backend, MemoryBackend, MemoryLockService, ObjectRef, Session};
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let locks = Arc::new(MemoryLockService::new());
//!
//! let mut session = Session::new(backend.clone(), locks);
//! session.add(ObjectRef::new("authors", Record::new().field("name", "Ann")));
//! let outcome = session.commit().unwrap();
//!
//! let id = outcome.persisted[0].id().unwrap();
//! assert_eq!(backend.object_version("authors", id).unwrap(), 1);
//! ```

pub mod backend;
pub mod codec;
pub mod lock;
pub mod memory;
pub mod retry;
pub mod session;

pub use backend::{Backend, Hint};
pub use codec::{TextCodec, DATETIME_FORMAT};
pub use lock::{LockService, MemoryLockService};
pub use memory::MemoryBackend;
pub use retry::{retry_on_conflict, RetryPolicy};
pub use session::{
    lock_name, CommitOutcome, ObjectRef, Session, SessionConfig, SessionScope, SessionState,
    Staged,
};
