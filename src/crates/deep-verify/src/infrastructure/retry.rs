//! Retry wrapper for LLM attempts.
//!
//! Only errors the categorizer marks retryable are retried; everything else
//! surfaces after the first failure.

use crate::config::{seconds, LlmConfig};
use crate::{DeepVerifyError, Result};
use std::future::Future;
use std::time::Duration;
use tooling::async_utils::retry::{with_retry_if, RetryPolicy};

/// Bounded exponential backoff over retryable errors.
#[derive(Debug, Clone)]
pub struct RetryHandler {
    policy: RetryPolicy,
}

impl Default for RetryHandler {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

impl RetryHandler {
    /// `max_retries` retries after the first attempt.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration, jitter: f64) -> Self {
        let policy = RetryPolicy::new(max_retries as usize + 1)
            .with_initial_interval(base_delay.as_secs_f64())
            .with_backoff_factor(2.0)
            .with_max_interval(max_delay.as_secs_f64())
            .with_jitter(jitter);
        Self { policy }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            config.max_retries,
            seconds(config.base_delay_secs),
            seconds(config.max_delay_secs),
            config.jitter,
        )
    }

    /// A handler that never retries.
    pub fn no_retry() -> Self {
        Self {
            policy: RetryPolicy::new(1),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn max_attempts(&self) -> usize {
        self.policy.max_attempts
    }

    /// Run `operation` (given the 0-based attempt index) until it succeeds,
    /// fails with a non-retryable error or attempts run out.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retry_if(&self.policy, operation, |error: &DeepVerifyError| {
            error.categorize().retryable
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn handler(max_retries: u32) -> RetryHandler {
        RetryHandler::new(max_retries, Duration::from_secs(1), Duration::from_secs(30), 0.0)
    }

    #[test]
    fn test_from_config() {
        let handler = RetryHandler::default();
        assert_eq!(handler.max_attempts(), 4);
        assert_eq!(handler.policy().max_interval, 30.0);
        assert_eq!(RetryHandler::no_retry().max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicUsize::new(0);
        let result = handler(3)
            .execute(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(ProviderError::Transient("overloaded".into()).into())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicUsize::new(0);
        let err = handler(3)
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ProviderError::Authentication("bad key".into()).into()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DeepVerifyError::Provider(ProviderError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_errors_not_retried() {
        let calls = AtomicUsize::new(0);
        let _ = handler(3)
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DeepVerifyError::Parse("bad json".into())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();
        let err = handler(2)
            .execute(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err::<(), _>(ProviderError::ExitCode {
                        code: 503,
                        message: format!("attempt {attempt}"),
                    }
                    .into())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("attempt 2"));
        // 1s + 2s of backoff
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
