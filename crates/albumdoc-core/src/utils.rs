//! Utility functions shared by the core and the transports.

use anyhow::Result;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use albumdoc_core::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Retry a transport API operation with exponential backoff.
///
/// Meant for idempotent calls such as resolving and downloading a file or
/// posting a status notice. Document delivery is deliberately not routed
/// through here: a conversion attempt is single-shot.
///
/// The retry strategy uses exponential backoff with jitter:
/// - Initial delay: 500ms
/// - Max delay: 4s
/// - Max attempts: 3 (see constants in `config.rs`)
///
/// # Examples
///
/// ```no_run
/// use albumdoc_core::utils::retry_transport_operation;
/// use anyhow::Result;
///
/// async fn fetch() -> Result<Vec<u8>> {
///     Ok(vec![])
/// }
///
/// # async fn example() -> Result<()> {
/// let buffer = retry_transport_operation(|| async { fetch().await }).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns the last error if all attempts fail.
pub async fn retry_transport_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TRANSPORT_INITIAL_BACKOFF_MS, TRANSPORT_MAX_BACKOFF_MS, TRANSPORT_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TRANSPORT_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TRANSPORT_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TRANSPORT_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Transport operation failed after {} attempts: {}",
            TRANSPORT_MAX_RETRIES, e
        );
        e
    })
}
