//! Part-transfer retry with exponential backoff.
//!
//! A single part failing over an unreliable link is the expected transient
//! fault of this subsystem; it is retried a bounded number of times with
//! increasing delays before the task surfaces an error.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Retry policy for one part transfer.
#[derive(Debug, Clone)]
pub struct PartRetryPolicy {
    /// Total attempts per part, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry (doubles each attempt).
    pub base_delay: Duration,
    /// Upper bound on the backoff delay.
    pub max_delay: Duration,
}

impl Default for PartRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl PartRetryPolicy {
    /// Backoff before retry number `retry` (1-based).
    fn backoff(&self, retry: u32) -> Duration {
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)));
        delay.min(self.max_delay)
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// On exhaustion returns the last error together with the number of
    /// attempts consumed.
    pub async fn run<T, E, F, Fut>(&self, what: &str, operation: F) -> Result<T, (E, u32)>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);

        for attempt in 1..=attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    let delay = self.backoff(attempt);
                    debug!(
                        "{} attempt {}/{} failed, retrying in {:?}: {}",
                        what, attempt, attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err((e, attempt)),
            }
        }

        unreachable!("loop returns on last attempt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = PartRetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
        };

        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        // Capped from here on
        assert_eq!(policy.backoff(4), Duration::from_secs(2));
        assert_eq!(policy.backoff(9), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_first_attempt_success_does_not_sleep() {
        let policy = PartRetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result = policy
            .run("part 1", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(7) }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_eventual_success() {
        let policy = PartRetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let calls = AtomicU32::new(0);

        let result = policy
            .run("part 2", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("connection reset")
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let policy = PartRetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };

        let result: Result<(), _> = policy
            .run("part 3", || async { Err::<(), _>("timeout") })
            .await;

        let (error, attempts) = result.unwrap_err();
        assert_eq!(error, "timeout");
        assert_eq!(attempts, 3);
    }
}
