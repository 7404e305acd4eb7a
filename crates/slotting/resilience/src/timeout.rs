//! Timeout race helper.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ResilienceError, Result};

/// Race `operation` against a timer.
///
/// When the timer wins the operation is dropped and the caller stops waiting.
/// A request the store has already received is not recalled.
pub async fn with_timeout<T, Fut>(operation: &str, limit: Duration, future: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                operation,
                limit_ms = limit.as_millis() as u64,
                "Store operation timed out"
            );
            Err(ResilienceError::Timeout {
                operation: operation.to_string(),
                after: limit,
            })
        }
    }
}
