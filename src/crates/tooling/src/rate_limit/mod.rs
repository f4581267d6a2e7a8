//! Rate limiting utilities
//!
//! Token bucket limiting for outbound calls. Tokens refill lazily from elapsed
//! time, so an idle limiter costs nothing; the bucket never holds more than its
//! capacity and never goes negative.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Smallest sleep used while waiting for a refill.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Longest single sleep; waiters re-check the bucket after each one.
const MAX_WAIT: Duration = Duration::from_secs(60);

/// Floor for the refill rate, about one token a day.
pub const MIN_REFILL_PER_SECOND: f64 = 1.0 / 86_400.0;

/// Snapshot of a limiter's state
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitStatus {
    /// Tokens that could be granted right now
    pub tokens_available: f64,
    /// Maximum tokens the bucket holds
    pub capacity: u32,
    /// Tokens added per second
    pub refill_per_second: f64,
    /// Time since the bucket was last refilled
    pub since_last_refill: Duration,
}

/// Shared capability of every limiter the workspace hands out
///
/// Implementations must be safe to share between concurrently running tasks.
#[async_trait]
pub trait TokenLimiter: Send + Sync + std::fmt::Debug {
    /// Wait until `tokens` are available, take them, and return the time spent waiting.
    async fn acquire(&self, tokens: u32) -> Duration;

    /// Take `tokens` only if they are available now.
    async fn try_acquire(&self, tokens: u32) -> bool;

    /// Current bucket state.
    async fn status(&self) -> RateLimitStatus;

    /// Refill the bucket completely.
    async fn reset(&self);

    /// Whether this limiter never throttles.
    fn is_unlimited(&self) -> bool {
        false
    }
}

/// Token bucket rate limiter
///
/// # Example
///
/// ```rust,ignore
/// use tooling::rate_limit::{RateLimiter, TokenLimiter};
///
/// // 60 calls per minute, refilled at one per second
/// let limiter = RateLimiter::per_minute(60);
/// limiter.acquire(1).await;
/// ```
#[derive(Clone, Debug)]
pub struct RateLimiter {
    state: Arc<Mutex<BucketState>>,
}

#[derive(Debug)]
struct BucketState {
    capacity: u32,
    tokens: f64,
    refill_per_second: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a full bucket holding `capacity` tokens, refilled at `refill_per_second`.
    ///
    /// Rates below [`MIN_REFILL_PER_SECOND`], NaN or infinite are raised to it.
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        let refill_per_second = if refill_per_second.is_finite() {
            refill_per_second.max(MIN_REFILL_PER_SECOND)
        } else {
            MIN_REFILL_PER_SECOND
        };

        Self {
            state: Arc::new(Mutex::new(BucketState {
                capacity,
                tokens: capacity as f64,
                refill_per_second,
                last_refill: Instant::now(),
            })),
        }
    }

    /// Bucket of `limit` tokens refilled evenly over one minute.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, limit as f64 / 60.0)
    }
}

#[async_trait]
impl TokenLimiter for RateLimiter {
    async fn acquire(&self, tokens: u32) -> Duration {
        if tokens == 0 {
            return Duration::ZERO;
        }

        let mut waited = Duration::ZERO;
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                state.refill();

                let wanted = state.clamp_request(tokens);
                if state.tokens >= wanted {
                    state.tokens -= wanted;
                    return waited;
                }

                let deficit = wanted - state.tokens;
                refill_wait(deficit, state.refill_per_second)
            };

            debug!(
                tokens = tokens,
                wait_ms = wait.as_millis() as u64,
                "Rate limit reached, waiting for refill"
            );
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }

    async fn try_acquire(&self, tokens: u32) -> bool {
        let mut state = self.state.lock().await;
        state.refill();

        let wanted = state.clamp_request(tokens);
        if state.tokens >= wanted {
            state.tokens -= wanted;
            true
        } else {
            false
        }
    }

    async fn status(&self) -> RateLimitStatus {
        let mut state = self.state.lock().await;
        state.refill();

        RateLimitStatus {
            tokens_available: state.tokens,
            capacity: state.capacity,
            refill_per_second: state.refill_per_second,
            since_last_refill: state.last_refill.elapsed(),
        }
    }

    async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.tokens = state.capacity as f64;
        state.last_refill = Instant::now();
    }
}

/// Time to refill `deficit` tokens, clamped to `[MIN_WAIT, MAX_WAIT]`.
fn refill_wait(deficit: f64, refill_per_second: f64) -> Duration {
    Duration::try_from_secs_f64(deficit / refill_per_second)
        .unwrap_or(MAX_WAIT)
        .clamp(MIN_WAIT, MAX_WAIT)
}

impl BucketState {
    /// Refill tokens based on elapsed time
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let capacity = self.capacity as f64;

        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_per_second).min(capacity);
        self.last_refill = now;
    }

    /// Requests larger than the bucket are served as a full bucket.
    fn clamp_request(&self, tokens: u32) -> f64 {
        tokens.min(self.capacity) as f64
    }
}

/// Limiter that grants every request immediately
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpRateLimiter;

#[async_trait]
impl TokenLimiter for NoOpRateLimiter {
    async fn acquire(&self, _tokens: u32) -> Duration {
        Duration::ZERO
    }

    async fn try_acquire(&self, _tokens: u32) -> bool {
        true
    }

    async fn status(&self) -> RateLimitStatus {
        RateLimitStatus {
            tokens_available: f64::INFINITY,
            capacity: u32::MAX,
            refill_per_second: f64::INFINITY,
            since_last_refill: Duration::ZERO,
        }
    }

    async fn reset(&self) {}

    fn is_unlimited(&self) -> bool {
        true
    }
}

/// Build the limiter for a per-minute budget
///
/// `None` or zero disables limiting.
pub fn create_rate_limiter(per_minute: Option<u32>) -> Arc<dyn TokenLimiter> {
    match per_minute {
        Some(limit) if limit > 0 => Arc::new(RateLimiter::per_minute(limit)),
        _ => Arc::new(NoOpRateLimiter),
    }
}
