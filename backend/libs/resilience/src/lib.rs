/// Resilience patterns for calls to external services
///
/// This library provides the retry policy shared by upstream clients:
/// - **Classified retry**: errors decide whether they are worth another attempt
/// - **Linear backoff**: the delay grows with the attempt number
/// - **Pacing**: a minimum delay before every call, including the first
///
/// # Example: Upstream call with bounded retries
///
/// ```rust,no_run
/// use resilience::{with_retry, Retryable, RetryConfig};
///
/// #[derive(Debug)]
/// struct Flaky;
///
/// impl std::fmt::Display for Flaky {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         write!(f, "flaky")
///     }
/// }
///
/// impl Retryable for Flaky {
///     fn is_retryable(&self) -> bool {
///         true
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let result = with_retry(RetryConfig::default(), || async {
///         // Your HTTP call here
///         Ok::<_, Flaky>(())
///     })
///     .await;
/// }
/// ```

pub mod retry;

// Re-export main types for convenience
pub use retry::{with_retry, RetryConfig, RetryError, Retryable};
