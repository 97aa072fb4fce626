//! Bounded polling for asynchronous upstream jobs (crawls, multi-step extraction).
//!
//! This loop has its own attempt budget and must not be wrapped in `retry_with_backoff`.

use crate::http::{HttpClient, ResponseBody};
use omnisearch_core::{PollingConfig, ProviderError, Result};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    Completed(T),
    Failed(String),
    Processing,
}

/// Sleep `interval`, check, repeat, for at most `max_attempts` checks.
///
/// Errors returned by `check` are treated as "still processing" for that attempt.
pub async fn poll<T, F, Fut>(
    provider: &str,
    max_attempts: u32,
    interval: Duration,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>>>,
{
    for attempt in 1..=max_attempts {
        tokio::time::sleep(interval).await;
        match check().await {
            Ok(PollStatus::Completed(v)) => {
                tracing::debug!(provider, attempt, "job completed");
                return Ok(v);
            }
            Ok(PollStatus::Failed(msg)) => {
                return Err(ProviderError::provider(format!("Job failed: {msg}"), provider));
            }
            Ok(PollStatus::Processing) => {
                tracing::debug!(provider, attempt, max_attempts, "job still processing");
            }
            Err(e) => {
                tracing::debug!(
                    provider,
                    attempt,
                    max_attempts,
                    error = %e,
                    "status check failed; counting as still processing"
                );
            }
        }
    }
    Err(ProviderError::provider(
        format!("Job timed out after {max_attempts} polling attempts"),
        provider,
    ))
}

/// Poll `config.status_url` with `http`, interpreting each JSON body with `interpret`.
pub async fn poll_status_url<T, I>(
    http: &HttpClient,
    config: &PollingConfig,
    interpret: I,
) -> Result<T>
where
    I: Fn(ResponseBody) -> Result<PollStatus<T>>,
{
    let client = http
        .with_bearer(&config.api_key)
        .with_timeout_ms(config.timeout_ms)
        .with_retry(crate::retry::RetryPolicy::none());
    let client = &client;
    let interpret = &interpret;
    poll(
        &config.provider_name,
        config.max_attempts,
        Duration::from_millis(config.poll_interval_ms),
        || async move {
            let body = client.get(&config.status_url, &[]).await?;
            interpret(body)
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnisearch_core::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_data_after_k_processing_checks() {
        let calls = counter();
        let c = calls.clone();
        let out = poll("firecrawl", 10, Duration::from_millis(500), move || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                Ok(if n < 3 {
                    PollStatus::Processing
                } else {
                    PollStatus::Completed("done")
                })
            }
        })
        .await
        .unwrap();
        assert_eq!(out, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempt_budget() {
        let calls = counter();
        let c = calls.clone();
        let t0 = tokio::time::Instant::now();
        let err = poll("firecrawl", 5, Duration::from_millis(1_000), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(PollStatus::<()>::Processing)
            }
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProviderError);
        assert!(err.message.contains("timed out"));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // Sleep precedes every check, including the first.
        assert_eq!(t0.elapsed(), Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_failure_stops_immediately() {
        let calls = counter();
        let c = calls.clone();
        let err = poll("firecrawl", 10, Duration::from_millis(10), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(PollStatus::<()>::Failed("crawl blocked".to_string()))
            }
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProviderError);
        assert_eq!(err.provider, "firecrawl");
        assert!(err.message.contains("crawl blocked"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_check_errors_are_swallowed() {
        let calls = counter();
        let c = calls.clone();
        let out = poll("firecrawl", 4, Duration::from_millis(10), move || {
            let c = c.clone();
            async move {
                match c.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(ProviderError::api("Network error: reset", "firecrawl")),
                    _ => Ok(PollStatus::Completed(7)),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
