//! Exponential backoff for transient provider failures

use crate::error::Result;
use crate::provider::RetryConfig;
use std::future::Future;
use tokio::time::sleep;
use tracing::warn;

/// Result of a retried call plus the number of calls made
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

/// Call `operation` until it succeeds, fails permanently, or runs out of attempts
///
/// Only errors classified as transient are retried.
pub async fn with_backoff<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let result = operation().await;
        attempt += 1;
        match result {
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = config.delay_for_attempt(attempt - 1);
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying: {}",
                    e
                );
                sleep(delay).await;
            }
            result => {
                return RetryOutcome {
                    result,
                    attempts: attempt,
                };
            }
        }
    }
}
