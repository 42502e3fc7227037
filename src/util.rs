//! Small shared helpers: jittered exponential backoff and deadline wrapping.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{CatalystError, Result};

/// Exponential backoff delay for `attempt` (0-based): base * 2^attempt with
/// +/-25% jitter.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(16));
    let jitter = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_millis((exp as f64 * jitter) as u64)
}

/// Run `op` up to `1 + retries` times, backing off between attempts. Only
/// transient errors are retried; rate limiting and validation failures
/// surface immediately.
pub async fn retry_transient<T, F, Fut>(
    label: &str,
    retries: u32,
    base_ms: u64,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < retries => {
                let delay = backoff_delay(attempt, base_ms);
                warn!(
                    operation = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Enforce a deadline on `fut`, mapping expiry to `DeadlineExceeded`.
pub async fn with_deadline<T, Fut>(label: &str, deadline: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(CatalystError::DeadlineExceeded {
            operation: label.to_string(),
            elapsed_ms: deadline.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_exponentially_within_jitter() {
        for attempt in 0..4 {
            let d = backoff_delay(attempt, 500).as_millis() as u64;
            let nominal = 500u64 << attempt;
            assert!(d >= nominal * 3 / 4, "attempt {attempt}: {d} < {}", nominal * 3 / 4);
            assert!(d <= nominal * 5 / 4 + 1, "attempt {attempt}: {d} > {}", nominal * 5 / 4);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_transient("test", 2, 1, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CatalystError::DeadlineExceeded {
                        operation: "probe".into(),
                        elapsed_ms: 1,
                    })
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let err = retry_transient("test", 5, 1, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(CatalystError::Validation("bad".into())) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_maps_to_deadline_exceeded() {
        let err = with_deadline("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CatalystError::DeadlineExceeded { .. }));
    }
}
