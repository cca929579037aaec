//! Bounded retry with exponential backoff
//!
//! Wraps backend transport calls. Delay doubles per attempt
//! (base, base*2, base*4, ...); the final failure is surfaced as
//! [`PipelineError::Transport`] carrying the attempt count.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{PipelineError, Result};

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Retry an async operation with exponential backoff.
///
/// # Arguments
///
/// - `service`: service name for logging and the final error
/// - `attempts`: total attempts, including the first
/// - `base_delay`: delay before the second attempt; doubles afterwards
pub async fn with_backoff<T, F, Fut>(
    service: &str,
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, String>>,
{
    debug_assert!(attempts > 0);
    let mut delay = base_delay;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(message) => {
                last_error = message;
                if attempt < attempts {
                    warn!(
                        service,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %last_error,
                        "Transport call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    Err(PipelineError::Transport {
        service: service.to_string(),
        attempts,
        message: last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("svc", 3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(42) }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("svc", 3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("flaky".to_string())
                } else {
                    Ok("done")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_surface_transport_error() {
        let calls = AtomicU32::new(0);
        let err = with_backoff::<(), _, _>("embedding", 3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("connection refused".to_string()) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            PipelineError::Transport {
                service, attempts, ..
            } => {
                assert_eq!(service, "embedding");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
