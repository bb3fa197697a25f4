//! Distributed lock service contract and an in-memory implementation.
//!
//! Locks are named, exclusive and carry a TTL after which they may be taken
//! over. Every acquisition names an owner, and only the current owner can
//! release. Acquisition never queues: an attempt either succeeds within its
//! wait window or reports failure.

use kvorm_core::{Error, Result};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// A mutual-exclusion service shared by every session using a backend.
pub trait LockService: Send + Sync {
    /// Tries to take `name` on behalf of `owner` for at most `ttl`.
    /// `Ok(false)` means the lock is held by someone else. Taking a lock the
    /// owner already holds extends it.
    fn lock(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Releases `name` if `owner` still holds it. Releasing a lock that is
    /// not held, or that expired and was taken over, is not an error.
    fn unlock(&self, name: &str, owner: &str) -> Result<()>;
}

/// Bounds of the pause between two acquisition attempts.
const RETRY_PAUSE_MS: (u64, u64) = (5, 10);

/// In-process lock service.
///
/// Each lock records its expiry; an expired lock counts as free. A busy lock
/// is retried `attempts` times with a random 5–10 ms pause in between.
#[derive(Debug)]
pub struct MemoryLockService {
    locks: Mutex<BTreeMap<String, Held>>,
    attempts: usize,
    available: AtomicBool,
}

#[derive(Debug)]
struct Held {
    owner: String,
    expiry: Instant,
}

impl Default for MemoryLockService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLockService {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(BTreeMap::new()),
            attempts: 1,
            available: AtomicBool::new(true),
        }
    }

    /// Number of acquisition attempts before giving up. At least one is made.
    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether `name` is currently held (and not expired).
    pub fn is_locked(&self, name: &str) -> bool {
        self.locks
            .lock()
            .get(name)
            .map(|held| held.expiry > Instant::now())
            .unwrap_or(false)
    }

    /// Owner of `name`, if it is held and not expired.
    pub fn owner(&self, name: &str) -> Option<String> {
        self.locks
            .lock()
            .get(name)
            .filter(|held| held.expiry > Instant::now())
            .map(|held| held.owner.clone())
    }

    /// Number of live locks.
    pub fn held(&self) -> usize {
        let now = Instant::now();
        self.locks.lock().values().filter(|h| h.expiry > now).count()
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::backend_unavailable("lock service is offline"))
        }
    }

    fn try_lock(&self, name: &str, owner: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut locks = self.locks.lock();
        match locks.get(name) {
            Some(held) if held.expiry > now && held.owner != owner => false,
            _ => {
                locks.insert(
                    name.to_string(),
                    Held {
                        owner: owner.to_string(),
                        expiry: now + ttl,
                    },
                );
                true
            }
        }
    }
}

impl LockService for MemoryLockService {
    fn lock(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        for attempt in 0..self.attempts {
            if attempt > 0 {
                let pause = rand::rng().random_range(RETRY_PAUSE_MS.0..=RETRY_PAUSE_MS.1);
                thread::sleep(Duration::from_millis(pause));
            }
            if self.try_lock(name, owner, ttl) {
                tracing::debug!(lock = name, owner, "acquired lock");
                return Ok(true);
            }
        }
        tracing::debug!(lock = name, attempts = self.attempts, "lock is busy");
        Ok(false)
    }

    fn unlock(&self, name: &str, owner: &str) -> Result<()> {
        self.check_available()?;
        let mut locks = self.locks.lock();
        match locks.get(name) {
            Some(held) if held.owner == owner => {
                locks.remove(name);
                tracing::debug!(lock = name, owner, "released lock");
            }
            Some(held) => {
                tracing::warn!(
                    lock = name,
                    owner,
                    holder = held.owner.as_str(),
                    "lock was taken over, not releasing"
                );
            }
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_millis(100);

    #[test]
    fn test_lock_is_exclusive() {
        let service = MemoryLockService::new();
        assert!(service.lock("a", "s1", TTL).unwrap());
        assert!(!service.lock("a", "s2", TTL).unwrap());
        assert!(service.lock("b", "s2", TTL).unwrap());
        assert_eq!(service.held(), 2);
        assert_eq!(service.owner("a").as_deref(), Some("s1"));
    }

    #[test]
    fn test_owner_relock_extends() {
        let service = MemoryLockService::new();
        assert!(service.lock("a", "s1", Duration::from_millis(1)).unwrap());
        assert!(service.lock("a", "s1", Duration::from_secs(10)).unwrap());
        thread::sleep(Duration::from_millis(5));
        assert!(service.is_locked("a"));
    }

    #[test]
    fn test_unlock_frees() {
        let service = MemoryLockService::new();
        assert!(service.lock("a", "s1", TTL).unwrap());
        service.unlock("a", "s1").unwrap();
        assert!(!service.is_locked("a"));
        assert!(service.lock("a", "s2", TTL).unwrap());
        // Releasing twice is harmless.
        service.unlock("a", "s2").unwrap();
        service.unlock("a", "s2").unwrap();
    }

    #[test]
    fn test_only_owner_can_unlock() {
        let service = MemoryLockService::new();
        assert!(service.lock("a", "s1", TTL).unwrap());
        service.unlock("a", "s2").unwrap();
        assert_eq!(service.owner("a").as_deref(), Some("s1"));
    }

    #[test]
    fn test_expired_holder_cannot_release_new_owner() {
        let service = MemoryLockService::new();
        assert!(service.lock("a", "s1", Duration::from_millis(1)).unwrap());
        thread::sleep(Duration::from_millis(5));
        assert!(!service.is_locked("a"));
        assert!(service.lock("a", "s2", TTL).unwrap());

        service.unlock("a", "s1").unwrap();
        assert!(service.is_locked("a"));
        assert_eq!(service.owner("a").as_deref(), Some("s2"));
        assert!(!service.lock("a", "s3", TTL).unwrap());
    }

    #[test]
    fn test_retries_are_bounded() {
        let service = MemoryLockService::new().with_attempts(3);
        assert!(service.lock("a", "s1", Duration::from_secs(10)).unwrap());
        let started = Instant::now();
        assert!(!service.lock("a", "s2", TTL).unwrap());
        // Two pauses of at most 10 ms each, plus scheduling slack.
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_offline() {
        let service = MemoryLockService::new();
        service.set_available(false);
        assert!(matches!(
            service.lock("a", "s1", TTL),
            Err(Error::BackendUnavailable { .. })
        ));
        assert!(matches!(
            service.unlock("a", "s1"),
            Err(Error::BackendUnavailable { .. })
        ));
    }
}
