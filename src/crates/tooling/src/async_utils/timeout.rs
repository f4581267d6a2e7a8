//! Timeout utilities for async operations
//!
//! `with_timeout` bounds a single future; `TimeoutGuard` carries one deadline
//! across several awaits so later steps only get the time that is left.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Execute an async operation with a timeout
///
/// # Example
///
/// ```rust,ignore
/// use tooling::async_utils::timeout::{with_timeout, TimeoutError};
/// use std::time::Duration;
///
/// match with_timeout(Duration::from_secs(1), slow_operation()).await {
///     Err(TimeoutError::Timeout(limit)) => println!("gave up after {limit:?}"),
///     other => println!("{other:?}"),
/// }
/// ```
pub async fn with_timeout<F, T, E>(
    duration: Duration,
    operation: F,
) -> std::result::Result<T, TimeoutError<E>>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(error)) => Err(TimeoutError::OperationFailed(error)),
        Err(_elapsed) => Err(TimeoutError::Timeout(duration)),
    }
}

/// Error type for timeout operations
#[derive(Debug, PartialEq)]
pub enum TimeoutError<E> {
    /// Operation completed but failed
    OperationFailed(E),
    /// Operation did not complete within the limit
    Timeout(Duration),
}

impl<E> TimeoutError<E> {
    /// Whether the limit elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutError::Timeout(_))
    }
}

impl<E: std::fmt::Display> std::fmt::Display for TimeoutError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutError::OperationFailed(e) => write!(f, "Operation failed: {}", e),
            TimeoutError::Timeout(d) => write!(f, "Operation timed out after {:?}", d),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for TimeoutError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimeoutError::OperationFailed(e) => Some(e),
            TimeoutError::Timeout(_) => None,
        }
    }
}

/// A deadline shared by several awaits
///
/// # Example
///
/// ```rust,ignore
/// use tooling::async_utils::timeout::TimeoutGuard;
/// use std::time::Duration;
///
/// let guard = TimeoutGuard::new(Duration::from_secs(120));
/// while let Some(next) = tokio::time::timeout_at(guard.deadline(), tasks.join_next()).await? {
///     // ...
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    deadline: Instant,
    duration: Duration,
}

impl TimeoutGuard {
    /// Start a deadline `duration` from now
    pub fn new(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
            duration,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// The instant the guard expires
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Get the original timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Execute an operation bounded by the remaining time
    pub async fn execute<F, T, E>(&self, operation: F) -> std::result::Result<T, TimeoutError<E>>
    where
        F: Future<Output = std::result::Result<T, E>>,
    {
        if self.is_expired() {
            return Err(TimeoutError::Timeout(self.duration));
        }

        match tokio::time::timeout_at(self.deadline, operation).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(TimeoutError::OperationFailed(error)),
            Err(_elapsed) => Err(TimeoutError::Timeout(self.duration)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_success() {
        let result = with_timeout(Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, String>("success")
        })
        .await;

        assert_eq!(result.unwrap(), "success");
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_exceeded() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, String>("late")
        })
        .await;

        assert_eq!(
            result.unwrap_err(),
            TimeoutError::Timeout(Duration::from_millis(10))
        );
    }

    #[tokio::test]
    async fn test_with_timeout_operation_fails() {
        let result = with_timeout(Duration::from_millis(100), async {
            Err::<String, _>("operation error")
        })
        .await;

        let error = result.unwrap_err();
        assert!(!error.is_timeout());
        assert_eq!(error, TimeoutError::OperationFailed("operation error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_tracks_deadline() {
        let guard = TimeoutGuard::new(Duration::from_secs(10));
        assert!(!guard.is_expired());

        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(guard.deadline() - Instant::now(), Duration::from_secs(6));
        assert_eq!(guard.duration(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_expires() {
        let guard = TimeoutGuard::new(Duration::from_millis(5));

        tokio::time::advance(Duration::from_millis(10)).await;

        assert!(guard.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_execute_uses_shared_deadline() {
        let guard = TimeoutGuard::new(Duration::from_secs(1));

        let first = guard
            .execute(async {
                tokio::time::sleep(Duration::from_millis(700)).await;
                Ok::<_, String>(1)
            })
            .await;
        assert_eq!(first.unwrap(), 1);

        // only 300ms remain for the second step
        let second = guard
            .execute(async {
                tokio::time::sleep(Duration::from_millis(700)).await;
                Ok::<_, String>(2)
            })
            .await;
        assert!(second.unwrap_err().is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_execute_already_expired() {
        let guard = TimeoutGuard::new(Duration::from_millis(1));
        tokio::time::advance(Duration::from_millis(10)).await;

        let result = guard.execute(async { Ok::<_, String>("never") }).await;

        assert!(result.unwrap_err().is_timeout());
    }
}
