//! Async utilities for bounded, retried calls
//!
//! - `retry`: retry policies with exponential backoff and jitter
//! - `timeout`: per-call timeouts and shared deadlines
//!
//! # Example
//!
//! ```rust,ignore
//! use tooling::async_utils::retry::{with_retry_if, RetryPolicy};
//! use tooling::async_utils::timeout::{with_timeout, TimeoutGuard};
//! use std::time::Duration;
//!
//! let deadline = TimeoutGuard::new(Duration::from_secs(90));
//! let policy = RetryPolicy::new(4);
//!
//! let reply = deadline
//!     .execute(with_retry_if(
//!         &policy,
//!         |_attempt| with_timeout(Duration::from_secs(30), call_provider()),
//!         |error| error.is_retryable(),
//!     ))
//!     .await?;
//! ```

pub mod retry;
pub mod timeout;
