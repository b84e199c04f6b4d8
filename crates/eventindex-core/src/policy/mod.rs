//! Reliability policies for backend calls.
//!
//! ```text
//! latest height:  [RetryPolicy] → [RateLimiter] → backend
//! fetch events:                   [RateLimiter] → backend
//! ```

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::{RateLimiter, RateLimiterConfig, TokenBucket};
pub use retry::{RetryConfig, RetryPolicy};

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::IndexerError;

/// Sleep for `duration` unless `cancel` fires first.
pub async fn sleep_or_cancel(
    cancel: &CancellationToken,
    duration: Duration,
) -> Result<(), IndexerError> {
    if cancel.is_cancelled() {
        return Err(IndexerError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(IndexerError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_completes() {
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();
        sleep_or_cancel(&cancel, Duration::from_secs(5)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_interrupted_by_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let start = tokio::time::Instant::now();
        let err = sleep_or_cancel(&cancel, Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, IndexerError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
