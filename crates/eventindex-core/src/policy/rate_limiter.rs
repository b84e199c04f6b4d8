//! Token bucket rate limiter.
//!
//! Tokens accrue at `refill_rate` tokens/second up to `capacity`. Every
//! backend I/O call takes one token through [`RateLimiter::wait`], which
//! sleeps until a token is available or the cancellation token fires.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::IndexerError;

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Maximum tokens in the bucket (burst size).
    pub capacity: f64,
    /// Token refill rate (tokens per second).
    pub refill_rate: f64,
}

impl RateLimiterConfig {
    /// `rate` requests per second with a burst of one.
    pub fn per_second(rate: f64) -> Self {
        Self {
            capacity: 1.0,
            refill_rate: rate,
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::per_second(5.0)
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket.
pub struct TokenBucket {
    config: RateLimiterConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    /// Try to take `cost` tokens without waiting.
    pub fn try_acquire(&self, cost: f64) -> bool {
        let mut state = self.lock();
        self.refill(&mut state);

        if state.tokens >= cost {
            state.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Estimated wait before `cost` tokens are available.
    pub fn wait_time(&self, cost: f64) -> Duration {
        let mut state = self.lock();
        self.refill(&mut state);
        let deficit = cost - state.tokens;
        if deficit <= 0.0 {
            Duration::ZERO
        } else if self.config.refill_rate <= 0.0 {
            Duration::MAX
        } else {
            Duration::from_secs_f64(deficit / self.config.refill_rate)
        }
    }

    /// Currently available tokens.
    pub fn available(&self) -> f64 {
        let mut state = self.lock();
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.config.refill_rate).min(self.config.capacity);
        state.last_refill = now;
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rate limiter guarding every backend I/O call.
pub struct RateLimiter {
    bucket: TokenBucket,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: TokenBucket::new(config),
        }
    }

    /// Take one token if available.
    pub fn try_acquire(&self) -> bool {
        self.bucket.try_acquire(1.0)
    }

    /// Wait time before one token is available.
    pub fn wait_time(&self) -> Duration {
        self.bucket.wait_time(1.0)
    }

    /// Block until a token is available.
    ///
    /// Returns [`IndexerError::Cancelled`] as soon as `cancel` fires, whether it
    /// was already cancelled on entry or fires while waiting.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), IndexerError> {
        loop {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }
            if self.try_acquire() {
                return Ok(());
            }
            let wait = self.wait_time().max(Duration::from_millis(1));
            tracing::trace!(wait_ms = wait.as_millis() as u64, "rate limited, waiting for token");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(IndexerError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.bucket.config)
            .finish()
    }
}
