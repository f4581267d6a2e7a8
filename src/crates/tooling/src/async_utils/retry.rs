//! Retry utilities for async operations
//!
//! Configurable retry policies with exponential backoff and additive jitter,
//! plus a retry loop that only repeats errors a caller-supplied predicate
//! accepts as retryable.

use rand::Rng;
use regex::Regex;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retrying failed operations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: usize,

    /// Initial interval between retries in seconds
    pub initial_interval: f64,

    /// Multiplier for the interval after each retry
    pub backoff_factor: f64,

    /// Maximum interval between retries in seconds
    pub max_interval: f64,

    /// Upper bound of the random fraction added to each delay (0.0 disables jitter)
    pub jitter: f64,
}

impl RetryPolicy {
    /// Create a new retry policy with the given max attempts
    ///
    /// # Example
    ///
    /// ```rust
    /// use tooling::async_utils::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new(3);
    /// assert_eq!(policy.max_attempts, 3);
    /// ```
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_interval: 1.0,
            backoff_factor: 2.0,
            max_interval: 30.0,
            jitter: 0.2,
        }
    }

    /// Set the initial interval between retries
    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    /// Set the backoff factor
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the maximum interval between retries
    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    /// Set the jitter fraction (0.0 disables jitter)
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction.max(0.0);
        self
    }

    /// Calculate the delay after a failed attempt (0-indexed)
    ///
    /// `initial_interval * backoff_factor ^ attempt`, capped at `max_interval`,
    /// then extended by a random fraction in `[0, jitter]` of itself.
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        if attempt >= self.max_attempts {
            return Duration::from_secs(0);
        }

        let base_delay = self.initial_interval * self.backoff_factor.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_interval).max(0.0);

        let final_delay = if self.jitter > 0.0 {
            let fraction = rand::thread_rng().gen_range(0.0..=self.jitter);
            capped_delay * (1.0 + fraction)
        } else {
            capped_delay
        };

        Duration::try_from_secs_f64(final_delay).unwrap_or_else(|_| self.max_delay())
    }

    /// `max_interval` as a `Duration`
    pub fn max_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_interval.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Delay before the next attempt, honouring a server hint up to `max_interval`
    ///
    /// The hint never shortens the computed backoff.
    pub fn delay_with_hint(&self, attempt: usize, hint: Option<Duration>) -> Duration {
        let backoff = self.calculate_delay(attempt);
        match hint {
            Some(hint) => hint.min(self.max_delay()).max(backoff),
            None => backoff,
        }
    }

    /// Check if another attempt is allowed after `attempts` attempts
    pub fn should_retry(&self, attempts: usize) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Execute an async operation, retrying only errors accepted by `is_retryable`
///
/// The operation receives the 0-based attempt index. The last error is
/// returned once the policy is exhausted or a non-retryable error occurs.
///
/// # Example
///
/// ```rust,ignore
/// use tooling::async_utils::retry::{with_retry_if, RetryPolicy};
///
/// let policy = RetryPolicy::new(3);
/// let body = with_retry_if(
///     &policy,
///     |attempt| fetch(attempt),
///     |error: &FetchError| error.is_transient(),
/// )
/// .await?;
/// ```
pub async fn with_retry_if<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> std::result::Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(error) => {
                let attempts = attempt + 1;

                if !is_retryable(&error) {
                    debug!(attempt = attempts, error = %error, "Non-retryable error, giving up");
                    return Err(error);
                }

                if !policy.should_retry(attempts) {
                    warn!(
                        attempts = attempts,
                        error = %error,
                        "Retries exhausted"
                    );
                    return Err(error);
                }

                let delay =
                    policy.delay_with_hint(attempt, extract_retry_after(&error.to_string()));

                debug!(
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt = attempts;
            }
        }
    }
}

/// Check if an error message indicates a transient error that should be retried
///
/// # Example
///
/// ```rust
/// use tooling::async_utils::retry::is_retryable_error;
///
/// assert!(is_retryable_error("Connection timeout"));
/// assert!(is_retryable_error("503 Service Unavailable"));
/// assert!(!is_retryable_error("404 Not Found"));
/// ```
pub fn is_retryable_error(error_msg: &str) -> bool {
    let lower = error_msg.to_lowercase();

    lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("network")
        || lower.contains("rate limit")
        || lower.contains("overloaded")
        || lower.contains("503")
        || lower.contains("504")
        || lower.contains("502")
        || lower.contains("500")
        || lower.contains("429")
        || lower.contains("unavailable")
        || lower.contains("too many requests")
}

/// Extract a retry-after hint from an error message
///
/// # Example
///
/// ```rust
/// use tooling::async_utils::retry::extract_retry_after;
/// use std::time::Duration;
///
/// assert_eq!(extract_retry_after("Retry after 30 seconds"), Some(Duration::from_secs(30)));
/// assert_eq!(extract_retry_after("retry-after: 60"), Some(Duration::from_secs(60)));
/// ```
pub fn extract_retry_after(error_msg: &str) -> Option<Duration> {
    RETRY_HINTS
        .iter()
        .find_map(|re| re.captures(error_msg))
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// "retry after N", "retry-after: N", "reset in Ns"; at most six digits
static RETRY_HINTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bretry[\s_-]?after\b[\s:=]*(\d{1,6})\b",
        r"(?i)\breset\s+in\s+(\d{1,6})\s*s",
    ]
    .into_iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_interval, 1.0);
        assert_eq!(policy.backoff_factor, 2.0);
        assert_eq!(policy.max_interval, 30.0);
        assert_eq!(policy.jitter, 0.2);
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::new(5)
            .with_initial_interval(1.0)
            .with_backoff_factor(2.0)
            .with_max_interval(100.0)
            .with_jitter(0.0);

        assert_eq!(policy.calculate_delay(0).as_secs_f64(), 1.0);
        assert_eq!(policy.calculate_delay(1).as_secs_f64(), 2.0);
        assert_eq!(policy.calculate_delay(2).as_secs_f64(), 4.0);
        assert_eq!(policy.calculate_delay(3).as_secs_f64(), 8.0);
    }

    #[test]
    fn test_max_interval_cap() {
        let policy = RetryPolicy::new(10)
            .with_initial_interval(1.0)
            .with_max_interval(5.0)
            .with_jitter(0.0);

        assert_eq!(policy.calculate_delay(3).as_secs_f64(), 5.0);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::new(5)
            .with_initial_interval(1.0)
            .with_jitter(0.2);

        for _ in 0..50 {
            let delay = policy.calculate_delay(0).as_secs_f64();
            assert!((1.0..=1.2 + 1e-9).contains(&delay), "delay {delay}");
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::new(3);

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_if_recovers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(4).with_jitter(0.0);

        let counter = calls.clone();
        let result: Result<&str, String> = with_retry_if(
            &policy,
            |_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("connection reset".to_string())
                    } else {
                        Ok("done")
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_if_stops_on_permanent_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(4).with_jitter(0.0);

        let counter = calls.clone();
        let result: Result<(), String> = with_retry_if(
            &policy,
            |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("401 Unauthorized".to_string())
                }
            },
            |error| is_retryable_error(error),
        )
        .await;

        assert_eq!(result.unwrap_err(), "401 Unauthorized");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_exhausts_attempts() {
        let attempts_seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let policy = RetryPolicy::new(3).with_jitter(0.0);

        let seen = attempts_seen.clone();
        let result: Result<(), String> = with_retry_if(
            &policy,
            |attempt| {
                seen.lock().unwrap().push(attempt);
                async { Err("503 unavailable".to_string()) }
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(*attempts_seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_honours_retry_after_hint() {
        let policy = RetryPolicy::new(2)
            .with_initial_interval(0.1)
            .with_jitter(0.0);
        let start = tokio::time::Instant::now();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _: Result<(), String> = with_retry_if(
            &policy,
            |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("rate limit, retry after 5 seconds".to_string())
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_hint_is_capped_at_max_interval() {
        let policy = RetryPolicy::new(2)
            .with_initial_interval(0.1)
            .with_max_interval(2.0)
            .with_jitter(0.0);
        let start = tokio::time::Instant::now();

        let _: Result<(), String> = with_retry_if(
            &policy,
            |_| async { Err("429: retry after 999999 seconds".to_string()) },
            |_| true,
        )
        .await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[test]
    fn test_delay_with_hint() {
        let policy = RetryPolicy::new(5)
            .with_initial_interval(1.0)
            .with_max_interval(10.0)
            .with_jitter(0.0);

        assert_eq!(policy.delay_with_hint(0, None), Duration::from_secs(1));
        assert_eq!(policy.delay_with_hint(0, Some(Duration::from_secs(4))), Duration::from_secs(4));
        assert_eq!(policy.delay_with_hint(2, Some(Duration::ZERO)), Duration::from_secs(4));
        assert_eq!(
            policy.delay_with_hint(0, Some(Duration::from_secs(86_400))),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error("Connection timeout"));
        assert!(is_retryable_error("504 Gateway Timeout"));
        assert!(is_retryable_error("Rate limit exceeded"));
        assert!(is_retryable_error("Too many requests"));

        assert!(!is_retryable_error("404 Not Found"));
        assert!(!is_retryable_error("401 Unauthorized"));
        assert!(!is_retryable_error("Validation error"));
    }

    #[test]
    fn test_extract_retry_after() {
        assert_eq!(
            extract_retry_after("Please retry after 45 seconds"),
            Some(Duration::from_secs(45))
        );
        assert_eq!(
            extract_retry_after("Rate limit reset in 120s"),
            Some(Duration::from_secs(120))
        );
        assert_eq!(
            extract_retry_after("retry-after: 60"),
            Some(Duration::from_secs(60))
        );
        assert_eq!(extract_retry_after("no hint here"), None);
        // digits unrelated to the hint are ignored
        assert_eq!(
            extract_retry_after("retry the request after fixing field 3000"),
            None
        );
        assert_eq!(extract_retry_after("retry after 12345678901 seconds"), None);
    }
}
