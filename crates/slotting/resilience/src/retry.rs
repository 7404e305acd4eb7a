//! Exponential-backoff retry.

use std::future::Future;

use tracing::warn;

use crate::config::RetryPolicy;
use crate::error::{ResilienceError, Result};

/// Run `attempt` until it succeeds, fails permanently, or the policy runs out.
///
/// Only transient store errors are retried. An open circuit fails straight
/// through so callers see the distinct breaker error rather than a generic
/// exhaustion error.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut number = 1;

    loop {
        let err = match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err);
        }

        if number >= max_attempts {
            return Err(match err {
                ResilienceError::Store(last) => ResilienceError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: number,
                    last,
                },
                other => other,
            });
        }

        let delay = policy.delay_for(number);
        warn!(
            operation,
            attempt = number,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Store call failed, retrying"
        );
        tokio::time::sleep(delay).await;
        number += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotting_store::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors_with_doubling_delay() {
        let calls = &AtomicU32::new(0);
        let started = Instant::now();

        let result = retry_with_backoff(&RetryPolicy::default(), "query", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(StoreError::Unavailable("reset".into()).into())
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        // 1s after the first failure, 2s after the second.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_wraps_last_error() {
        let calls = &AtomicU32::new(0);

        let err = retry_with_backoff(&RetryPolicy::default(), "upsert", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(StoreError::Unavailable("reset".into()).into())
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            ResilienceError::RetriesExhausted {
                operation,
                attempts,
                last,
            } => {
                assert_eq!(operation, "upsert");
                assert_eq!(attempts, 3);
                assert!(last.is_transient());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);

        let err = retry_with_backoff(&RetryPolicy::default(), "update", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(StoreError::Constraint("duplicate code".into()).into())
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ResilienceError::Store(StoreError::Constraint(_))));
    }

    #[tokio::test]
    async fn test_circuit_open_is_not_retried() {
        let calls = &AtomicU32::new(0);

        let err = retry_with_backoff(&RetryPolicy::default(), "query", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ResilienceError::CircuitOpen {
                name: "store".into(),
            })
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.is_circuit_open());
    }
}
