//! Bounded retry with random exponential backoff

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use ballast_core::{Result, RetryConfig};

/// Deterministic backoff cap for a given attempt
///
/// Attempt `n` (zero-based) waits a random duration up to
/// `min(base_delay * 2^n, max_delay)`; the cap schedule is nondecreasing.
pub fn backoff_delay(policy: &RetryConfig, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    policy
        .base_delay
        .saturating_mul(factor)
        .min(policy.max_delay)
}

/// Run `f` up to `policy.max_attempts` times
///
/// Only errors classified retryable are retried; everything else returns
/// immediately. Each retry waits a jittered exponential delay. On
/// exhaustion the final error is re-raised unchanged.
pub async fn with_retry<T, F, Fut>(policy: &RetryConfig, operation: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                let cap = backoff_delay(policy, attempt);
                let wait = cap.mul_f64(rand::thread_rng().gen::<f64>());
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "Retrying after transient storage error"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    operation,
                    attempts = attempt + 1,
                    error = %e,
                    "Operation failed"
                );
                return Err(e);
            }
        }
    }
}
