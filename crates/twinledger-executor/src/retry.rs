//! Bounded retry with exponential backoff for calls that cross the network.

use std::future::Future;

use tracing::warn;
use twinledger_types::{Result, RetryPolicy};

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` is exhausted. Only `Timeout` and `Unreachable` are
/// retried; the last error is returned as-is.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation = what,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
