use omnisearch_core::{ProviderError, Result};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Sleep before retry number `attempt` (0-based): `initial_delay * 2^attempt`, no jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(31)))
    }
}

/// Run `op` up to `max_retries + 1` times, backing off exponentially between attempts.
///
/// Every error is retried regardless of kind; the last error is returned unmodified.
pub async fn retry_with_backoff<T, F, Fut>(op: F, policy: RetryPolicy) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_backoff_when(op, policy, |_| true).await
}

/// Like [`retry_with_backoff`], but gives up immediately on errors `should_retry` rejects.
pub async fn retry_with_backoff_when<T, F, Fut, P>(
    mut op: F,
    policy: RetryPolicy,
    should_retry: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&ProviderError) -> bool,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_retries && should_retry(&e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    provider = %e.provider,
                    kind = %e.kind,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e.message,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnisearch_core::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn delay_sequence_doubles() {
        let p = RetryPolicy::default();
        let ds: Vec<u128> = (0..3).map(|i| p.delay_for(i).as_millis()).collect();
        assert_eq!(ds, vec![1000, 2000, 4000]);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let out = retry_with_backoff(
            move || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(ProviderError::provider("HTTP 503", "tavily"))
                    } else {
                        Ok(n)
                    }
                }
            },
            RetryPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_sleep_the_full_schedule() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let t0 = tokio::time::Instant::now();
        let err = retry_with_backoff(
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ProviderError::rate_limit("Rate limit exceeded", "brave"))
                }
            },
            RetryPolicy::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err, ProviderError::rate_limit("Rate limit exceeded", "brave"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(t0.elapsed(), Duration::from_millis(7_000));
    }

    #[tokio::test(start_paused = true)]
    async fn predicate_stops_on_invalid_input() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = retry_with_backoff_when(
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ProviderError::invalid_input("bad", "exa"))
                }
            },
            RetryPolicy::default(),
            ProviderError::is_retryable,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
