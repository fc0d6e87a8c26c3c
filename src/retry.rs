//! Retry policy for the whole authenticate+fetch flow.
//!
//! The policy is an explicit value the caller applies around the flow;
//! the portal client itself never retries. There is no delay between
//! attempts - the portal either answers or it doesn't.

use std::fmt::Display;
use std::future::Future;

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 4 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run `op` until it succeeds or `max_attempts` attempts have failed,
    /// returning the first success or the last error.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts => {
                    warn!(attempt, error = %err, "Attempt failed, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let calls = Cell::new(0u32);
        let policy = RetryPolicy::new(4);

        let result: Result<u32, &str> = policy
            .run(|| {
                calls.set(calls.get() + 1);
                async { Ok(7) }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_makes_exactly_max_attempts_on_persistent_failure() {
        let calls = Cell::new(0u32);
        let policy = RetryPolicy::new(4);

        let result: Result<u32, String> = policy
            .run(|| {
                calls.set(calls.get() + 1);
                async { Err("portal down".to_string()) }
            })
            .await;

        assert_eq!(result, Err("portal down".to_string()));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_succeeds_on_later_attempt() {
        let calls = Cell::new(0u32);
        let policy = RetryPolicy::new(3);

        let result: Result<u32, String> = policy
            .run(|| {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move {
                    if attempt < 3 {
                        Err("not yet".to_string())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = Cell::new(0u32);
        let policy = RetryPolicy { max_attempts: 0 };

        let result: Result<u32, String> = policy
            .run(|| {
                calls.set(calls.get() + 1);
                async { Err("no".to_string()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
