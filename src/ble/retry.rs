//! Retry logic for transient BLE failures.
//!
//! # Example
//!
//! ```
//! use easyhome_ble::ble::retry::{with_retry, RetryPolicy};
//! use easyhome_ble::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryPolicy::immediate(3);
//! let value = with_retry(&policy, "read", || async { Ok::<_, Error>(42) }).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least 1 is always made).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after each failure.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_connect()
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt count and default backoff.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::for_connect()
        }
    }

    /// Exactly one attempt.
    pub fn none() -> Self {
        Self::immediate(1)
    }

    /// Fixed attempt count with no delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Patient settings for establishing a link to a device that may be
    /// waking up or busy with another central.
    pub fn for_connect() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        }
    }

    /// Number of attempts actually made when every attempt fails.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let nanos = self.initial_delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = nanos.min(self.max_delay.as_nanos() as f64);
        Duration::from_nanos(capped.round() as u64)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempts are used up. Returns the last error on failure.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!("{} attempt {} of {}", name, attempt, attempts);

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && e.is_transient() => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "{} attempt {} failed: {} (retrying in {:?})",
                    name, attempt, e, delay
                );
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Like [`with_retry`], but also reports how many attempts were made.
pub(crate) async fn with_retry_counted<F, Fut, T>(
    policy: &RetryPolicy,
    name: &str,
    mut operation: F,
) -> std::result::Result<T, (u32, Error)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut made = 0;
    let result = with_retry(policy, name, || {
        made += 1;
        operation()
    })
    .await;
    result.map_err(|e| (made, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> Error {
        Error::ConnectionFailed {
            reason: "busy".to_string(),
        }
    }

    #[test]
    fn test_delay_backoff() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(350));
    }

    #[test]
    fn test_immediate_has_no_delay() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.attempts(), 3);
        assert_eq!(RetryPolicy::immediate(0).attempts(), 1);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryPolicy::immediate(3), "op", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let result = with_retry_counted(&RetryPolicy::immediate(4), "op", || async {
            Err::<(), _>(transient())
        })
        .await;

        let (attempts, err) = result.unwrap_err();
        assert_eq!(attempts, 4);
        assert!(matches!(err, Error::ConnectionFailed { .. }));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryPolicy::immediate(5), "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::CharacteristicNotFound {
                uuid: "ffe2".to_string(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_sleeps_between_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        };
        let started = std::time::Instant::now();
        let _ = with_retry(&policy, "op", || async { Err::<(), _>(transient()) }).await;

        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
