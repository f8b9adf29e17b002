//! Utility functions for text handling, byte formatting and Telegram retries.

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
/// use oxide_relay::utils::truncate_str;
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

/// Formats a byte count as megabytes with one decimal place.
///
/// # Examples
///
/// ```
/// use oxide_relay::utils::format_megabytes;
/// assert_eq!(format_megabytes(1_572_864), "1.5MB");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.1}MB", bytes as f64 / 1024.0 / 1024.0)
}

/// Decodes HTML entities in a scraped attribute value (`&amp;` -> `&`).
#[must_use]
pub fn decode_entities(value: &str) -> String {
    html_escape::decode_html_entities(value).into_owned()
}

/// Retry a Telegram API operation with exponential backoff.
///
/// Used for status message edits, which may fail on transient network errors.
///
/// - Initial delay: 500ms
/// - Max delay: 4s
/// - Max attempts: 3 (see constants in `config.rs`)
///
/// # Errors
///
/// Returns the last error if all attempts fail.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }

    #[test]
    fn test_format_megabytes() {
        assert_eq!(format_megabytes(0), "0.0MB");
        assert_eq!(format_megabytes(10 * 1024 * 1024), "10.0MB");
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(
            decode_entities("https://cdn.example/v.mp4?a=1&amp;b=2"),
            "https://cdn.example/v.mp4?a=1&b=2"
        );
        assert_eq!(decode_entities("plain"), "plain");
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_error() -> Result<()> {
        let calls = AtomicUsize::new(0);
        let value = retry_telegram_operation(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    anyhow::bail!("network down");
                }
                Ok(42)
            }
        })
        .await?;

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }
}
