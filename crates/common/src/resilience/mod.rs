//! Timeouts and bounded retries around external calls
//!
//! Every attempt runs under `tokio::time::timeout`. Retryable failures are
//! retried with exponential backoff until `max_retries` extra attempts have
//! been spent.

use crate::config::ResilienceConfig;
use crate::errors::{AppError, Result};
use backoff::{future::retry_notify, ExponentialBackoffBuilder};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Retry and timeout policy for one call site
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first
    pub max_retries: u32,

    /// First backoff interval
    pub initial_backoff: Duration,

    /// Backoff ceiling
    pub max_backoff: Duration,

    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Build a policy from configuration and a call-site timeout
    pub fn from_config(config: &ResilienceConfig, timeout: Duration) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            timeout,
        }
    }

    /// Single attempt, no backoff
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            timeout,
        }
    }
}

/// Run `call` under the policy.
///
/// `operation` names the call site in logs and timeout errors.
pub async fn call_with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = AtomicU32::new(0);
    let attempts = &attempts;
    let timeout = policy.timeout;
    let max_attempts = policy.max_retries + 1;

    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_backoff)
        .with_max_interval(policy.max_backoff)
        .with_max_elapsed_time(None)
        .build();

    retry_notify(
        backoff,
        || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let fut = call();
            async move {
                let result = match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(AppError::Timeout {
                        operation: operation.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                };
                result.map_err(|e| {
                    if e.is_retryable() && attempt < max_attempts {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        },
        |e: AppError, wait: Duration| {
            tracing::warn!(
                operation = operation,
                attempt = attempts.load(Ordering::SeqCst),
                max_attempts = max_attempts,
                wait_ms = wait.as_millis() as u64,
                error = %e,
                "External call failed, retrying"
            );
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = call_with_retry(&fast_policy(2), "test", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::Index { message: "503".into(), retryable: true })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(tokio_test::assert_ok!(result), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<()> = call_with_retry(&fast_policy(1), "test", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Index { message: "503".into(), retryable: true })
            }
        })
        .await;

        assert!(matches!(result, Err(AppError::Index { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<()> = call_with_retry(&fast_policy(3), "test", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::generation("model returned no choices"))
            }
        })
        .await;

        tokio_test::assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_becomes_error() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(10),
            ..fast_policy(0)
        };

        let result: Result<()> = call_with_retry(&policy, "slow.call", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(AppError::Timeout { operation, timeout_ms }) => {
                assert_eq!(operation, "slow.call");
                assert_eq!(timeout_ms, 10);
            }
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }
}
