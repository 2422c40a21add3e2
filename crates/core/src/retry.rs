//! Bounded retry with exponential backoff for transient storage failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Retry policy applied at the operation boundary (assign, revoke, approve).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1).
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Backoff before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let ms = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(ms.min(self.max_backoff_ms))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number and must re-acquire any lock
    /// scope it needs on every call. Exhausted transient failures surface as
    /// [`DomainError::Conflict`].
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> DomainResult<T>
    where
        F: FnMut(u32) -> DomainResult<T>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < max => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        error = %err,
                        "transient failure, retrying in {:?}",
                        delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(DomainError::Unavailable(msg)) => {
                    tracing::error!(operation, attempts = attempt, "retries exhausted");
                    return Err(DomainError::conflict(format!(
                        "{operation} failed after {attempt} attempts: storage unavailable: {msg}"
                    )));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn transient_failures_are_retried() {
        let mut calls = 0;
        let result = fast().run("assign", |_| {
            calls += 1;
            if calls < 3 {
                Err(DomainError::unavailable("busy"))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn exhausted_retries_become_conflict() {
        let mut calls = 0;
        let result: DomainResult<()> = fast().run("assign", |_| {
            calls += 1;
            Err(DomainError::unavailable("busy"))
        });
        assert_eq!(calls, 3);
        assert!(matches!(result, Err(DomainError::Conflict(_))));
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let mut calls = 0;
        let result: DomainResult<()> = fast().run("assign", |_| {
            calls += 1;
            Err(DomainError::validation("bad"))
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(5), Duration::from_millis(50));
    }
}
