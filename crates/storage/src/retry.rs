//! Caller-side retry of conflicting units of work.

use kvorm_core::Result;
use rand::Rng;
use std::thread;
use std::time::Duration;

/// How often and how patiently to re-run a conflicting unit of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryPolicy {
    /// Total attempts, the first included.
    pub max_attempts: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            min_backoff_ms: 10,
            max_backoff_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// Runs once, never retries.
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn backoff_ms(mut self, min: u64, max: u64) -> Self {
        self.min_backoff_ms = min;
        self.max_backoff_ms = max;
        self
    }

    /// A random pause within the configured bounds.
    pub fn backoff(&self) -> Duration {
        let (low, high) = if self.min_backoff_ms <= self.max_backoff_ms {
            (self.min_backoff_ms, self.max_backoff_ms)
        } else {
            (self.max_backoff_ms, self.min_backoff_ms)
        };
        Duration::from_millis(rand::rng().random_range(low..=high))
    }
}

/// Runs `unit` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. `unit` receives the attempt number,
/// starting at 1, and must redo the whole stage-then-commit sequence.
pub fn retry_on_conflict<T, F>(policy: &RetryPolicy, mut unit: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match unit(attempt) {
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let backoff = policy.backoff();
                tracing::warn!(attempt, backoff_ms = backoff.as_millis() as u64, error = %err, "conflict, retrying");
                thread::sleep(backoff);
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvorm_core::Error;

    fn fast() -> RetryPolicy {
        RetryPolicy::default().backoff_ms(0, 1)
    }

    #[test]
    fn test_retries_until_success() {
        let result = retry_on_conflict(&fast(), |attempt| {
            if attempt < 3 {
                Err(Error::conflict("busy"))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<()> = retry_on_conflict(&fast().max_attempts(4), |_| {
            calls += 1;
            Err(Error::conflict("busy"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_non_retryable_errors_pass_through() {
        let mut calls = 0;
        let result: Result<()> = retry_on_conflict(&fast(), |_| {
            calls += 1;
            Err(Error::backend_unavailable("down"))
        });
        assert!(matches!(result, Err(Error::BackendUnavailable { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_backoff_within_bounds() {
        let policy = RetryPolicy::default().backoff_ms(10, 20);
        for _ in 0..50 {
            let pause = policy.backoff();
            assert!(pause >= Duration::from_millis(10) && pause <= Duration::from_millis(20));
        }
        assert_eq!(RetryPolicy::never().max_attempts, 1);
    }
}
