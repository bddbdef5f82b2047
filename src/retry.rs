//! Retry logic with exponential backoff
//!
//! Transient transport failures (connect errors, timeouts, 5xx responses)
//! are retried with exponential backoff and optional jitter; everything
//! else surfaces immediately. The budget and delays come from
//! [`RetryConfig`](crate::config::RetryConfig).

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, connection resets, server-side 5xx)
/// should return `true`. Permanent failures (unknown source, rejected asset,
/// corrupt state file) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Connect failures, timeouts, and server-error statuses are the
            // transient class; 4xx statuses never reach here as Transport
            // (they are classified as SourceNotFound / AssetRejected).
            Error::Transport(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Rejections are handled by the resolver fallback, not by retry
            Error::AssetRejected { .. } => false,
            Error::Resolution(_) => false,
            Error::SourceNotFound { .. } => false,
            Error::Listing(_) => false,
            Error::Persistence(_) => false,
            Error::Serialization(_) => false,
            Error::Config(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Retries the operation while it fails with a retryable error and the
/// attempt budget is not exhausted. Returns the successful result, or the
/// last error once the budget runs out or a non-retryable error occurs.
pub async fn request_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "request succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "request failed, retrying"
                );

                let jittered_delay = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(jittered_delay).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "request failed after all retry attempts exhausted"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay falls between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
