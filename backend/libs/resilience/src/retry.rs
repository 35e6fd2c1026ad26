/// Retry policy with linear backoff and per-call pacing
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Backoff step; the wait before retry `n` is `attempt_delay * n`
    pub attempt_delay: Duration,
    /// Delay applied before every call, including the first
    pub min_call_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            attempt_delay: Duration::from_millis(500),
            min_call_delay: Duration::from_millis(100),
        }
    }
}

impl RetryConfig {
    /// Wait before the given retry (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.attempt_delay.saturating_mul(attempt)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("Max retries ({retries}) exceeded: {source}")]
    MaxRetriesExceeded { retries: u32, source: E },
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> RetryError<E> {
    /// The error returned by the last attempt.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::MaxRetriesExceeded { source, .. } => source,
            RetryError::OperationFailed(e) => e,
        }
    }
}

/// Execute a future with retry logic
///
/// Errors reporting `is_retryable() == false` are returned immediately as
/// `OperationFailed`. Retryable errors are retried up to `max_retries` times.
pub async fn with_retry<F, Fut, T, E>(config: RetryConfig, mut f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        if !config.min_call_delay.is_zero() {
            tokio::time::sleep(config.min_call_delay).await;
        }

        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => {
                debug!("Non-retryable failure: {}", e);
                return Err(RetryError::OperationFailed(e));
            }
            Err(e) => {
                attempt += 1;

                if attempt > config.max_retries {
                    warn!("Max retries ({}) reached: {}", config.max_retries, e);
                    return Err(RetryError::MaxRetriesExceeded {
                        retries: config.max_retries,
                        source: e,
                    });
                }

                let delay = config.backoff_for(attempt);

                warn!(
                    "Retry attempt {}/{} after error: {}, waiting {:?}",
                    attempt, config.max_retries, e, delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
