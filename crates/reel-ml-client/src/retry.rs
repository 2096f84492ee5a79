//! Retry loop shared by the HTTP clients.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{MlError, MlResult};

/// Run `operation` up to `max_retries + 1` times, backing off 500ms·2ⁿ
/// between retryable failures.
pub(crate) async fn with_retry<F, Fut, T>(op_name: &str, max_retries: u32, operation: F) -> MlResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = MlResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = Duration::from_millis(500 * 2u64.pow(attempt.min(6)));
                warn!(
                    "{} failed (attempt {}), retrying in {:?}: {}",
                    op_name,
                    attempt + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| MlError::RequestFailed(format!("{op_name}: no attempts made"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", 2, || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(MlError::Timeout(1))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: MlResult<()> = with_retry("op", 3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MlError::from_status(400, "bad"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
