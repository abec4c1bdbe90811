//! Bounded-retry wrapper for write operations against a busy store.
//!
//! A single-file store has one writer at a time; small write bursts from the
//! submission side, the workers, and the cleanup sweep routinely collide.
//! Every repository write routes through [`with_write_retry`], which absorbs
//! busy/locked errors with deterministic exponential backoff and surfaces
//! [`Error::OperationBusy`] only once the attempt budget is spent. Any other
//! error class propagates unchanged on the first attempt.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use docpress_core::{defaults, Error, Result};

/// Run a write operation with up to five attempts, sleeping
/// 100/200/400/800/1600 ms between attempts on busy/locked errors.
pub async fn with_write_retry<T, F, Fut>(operation: &'static str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = Duration::from_millis(defaults::WRITE_RETRY_BASE_DELAY_MS);
    let mut attempt: u32 = 1;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_busy() => {
                if attempt >= defaults::WRITE_RETRY_ATTEMPTS {
                    warn!(
                        subsystem = "db",
                        component = "retry",
                        op = operation,
                        attempt,
                        "Store still busy after final attempt"
                    );
                    return Err(Error::OperationBusy {
                        operation: operation.to_string(),
                    });
                }
                warn!(
                    subsystem = "db",
                    component = "retry",
                    op = operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Store busy, retrying write"
                );
                sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_success_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result = with_write_retry("test_op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_busy_error_surfaces_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_write_retry("test_op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Provider("model unavailable".to_string()))
        })
        .await;

        match result {
            Err(Error::Provider(msg)) => assert_eq!(msg, "model unavailable"),
            other => panic!("expected Provider error, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_never_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_write_retry("test_op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::DocumentNotFound("doc-1".to_string()))
        })
        .await;

        assert!(matches!(result, Err(Error::DocumentNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
