use std::future::Future;
use std::time::Duration;

use parcel_core::{Error, ProviderConfig, Result};
use tokio::time::{sleep, timeout};

/// How model calls are bounded and retried.
///
/// Every attempt runs under `attempt_timeout`. Only errors for which
/// [`Error::is_retryable`] holds are retried; validation failures return
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first, at least 1
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any delay
    pub max_backoff: Duration,
    /// Wall-clock limit per attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ProviderConfig::default())
    }
}

impl RetryPolicy {
    /// Policy from the `[provider]` config section.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            attempt_timeout: config.timeout(),
        }
    }

    /// Single attempt, still bounded by the timeout.
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            attempt_timeout,
        }
    }

    /// Delay before retry number `retry` (1-based): doubling from
    /// `initial_backoff`, capped at `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `attempt` until it succeeds, fails permanently, or attempts run
    /// out.
    ///
    /// # Errors
    /// Returns the first non-retryable error, or the last error once
    /// `max_attempts` is reached. An attempt exceeding the timeout counts as
    /// `Error::Timeout`.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut tried = 0;

        loop {
            tried += 1;
            let outcome = match timeout(self.attempt_timeout, attempt()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::Timeout {
                    operation: operation.to_owned(),
                    seconds: self.attempt_timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && tried < max_attempts => {
                    let delay = self.backoff(tried);
                    tracing::warn!(
                        "{operation} attempt {tried}/{max_attempts} failed: {error}; retrying in {delay:?}"
                    );
                    sleep(delay).await;
                }
                Err(error) => {
                    if tried > 1 {
                        tracing::error!("{operation} failed after {tried} attempts: {error}");
                    }
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            attempt_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(3),
            attempt_timeout: Duration::from_secs(60),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(4), Duration::from_secs(3));
        assert_eq!(policy.backoff(40), Duration::from_secs(3));
    }

    #[test]
    fn config_values_carry_over() {
        let config = ProviderConfig {
            max_attempts: 0,
            ..ProviderConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let value = fast_policy(3)
            .run("generate", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Provider("503".to_owned()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let error = fast_policy(5)
            .run("interpretation", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Interpretation("not JSON".to_owned()))
            })
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Interpretation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let error = fast_policy(2)
            .run("generate", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Provider("429".to_owned()))
            })
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Provider(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let policy = RetryPolicy::no_retry(Duration::from_millis(20));
        let error = policy
            .run("generate", || async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Timeout { ref operation, .. } if operation == "generate"));
    }
}
