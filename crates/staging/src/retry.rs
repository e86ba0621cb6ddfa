//! Bounded retry execution around remote calls.
//!
//! Wraps an async operation with the [`BackoffPolicy`] ladder. The operation
//! reports failures as strings; [`is_retryable_error`] decides from the
//! message whether another attempt is worth it (timeouts, resets, 5xx, 429)
//! or not (4xx client errors).

use std::time::Duration;

use tokio::time::sleep;

use crate::backoff::BackoffPolicy;

/// Result of a retried operation, with attempt accounting for metrics.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: Result<T, String>,
    /// 1 means the first try succeeded.
    pub attempts: u32,
    pub total_wait: Duration,
}

impl<T> RetryOutcome<T> {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, String> {
        self.result
    }
}

/// Run `operation` until it succeeds, a non-retryable error appears, or the
/// policy's attempt budget is spent.
pub async fn run_with_retry<T, F, Fut>(policy: &BackoffPolicy, mut operation: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, String>>,
{
    let mut total_wait = Duration::ZERO;
    let mut last_error = None;

    for attempt in 0..=policy.max_attempts {
        match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt + 1,
                    total_wait,
                };
            }
            Err(message) => {
                let retryable = is_retryable_error(&message);
                last_error = Some(message);
                if !retryable || attempt == policy.max_attempts {
                    return RetryOutcome {
                        result: Err(last_error.unwrap_or_default()),
                        attempts: attempt + 1,
                        total_wait,
                    };
                }
                let delay = policy.delay_for(attempt + 1);
                total_wait += delay;
                if delay > Duration::ZERO {
                    sleep(delay).await;
                }
            }
        }
    }

    RetryOutcome {
        result: Err(last_error.unwrap_or_else(|| "retry budget exhausted".into())),
        attempts: policy.max_attempts + 1,
        total_wait,
    }
}

/// Classify an error message as transient or permanent. Unknown errors are
/// retried; a wasted attempt is cheaper than a lost document.
pub fn is_retryable_error(message: &str) -> bool {
    let lower = message.to_lowercase();

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("reset")
        || lower.contains("refused")
        || lower.contains("dns")
        || lower.contains("unreachable")
        || lower.contains("broken pipe")
    {
        return true;
    }
    if lower.contains("500")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("504")
        || lower.contains("429")
    {
        return true;
    }
    if lower.contains("400")
        || lower.contains("401")
        || lower.contains("403")
        || lower.contains("404")
        || lower.contains("422")
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy() -> BackoffPolicy {
        BackoffPolicy::remote_call()
            .with_base(Duration::ZERO)
            .with_jitter(false)
    }

    #[tokio::test]
    async fn first_try_success() {
        let outcome = run_with_retry(&instant_policy(), |_| async { Ok::<_, String>(7) }).await;
        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn eventual_success_counts_attempts() {
        let calls = AtomicU32::new(0);
        let outcome = run_with_retry(&instant_policy(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("connection reset".to_string())
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = run_with_retry(&instant_policy(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("HTTP 404 not found".to_string()) }
        })
        .await;
        assert!(!outcome.succeeded());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion() {
        let outcome: RetryOutcome<()> = run_with_retry(&instant_policy(), |_| async {
            Err("503 service unavailable".to_string())
        })
        .await;
        assert!(!outcome.succeeded());
        assert_eq!(outcome.attempts, 4);
    }

    #[test]
    fn classification() {
        assert!(is_retryable_error("request timed out"));
        assert!(is_retryable_error("HTTP 429 too many requests"));
        assert!(is_retryable_error("connection refused"));
        assert!(!is_retryable_error("HTTP 401 unauthorized"));
        assert!(!is_retryable_error("HTTP 422 unprocessable"));
        assert!(is_retryable_error("some novel catastrophe"));
    }
}
