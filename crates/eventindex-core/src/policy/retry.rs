//! Bounded retry with linear backoff, used around the latest-height probe.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::IndexerError;
use crate::policy::sleep_or_cancel;

/// Configuration for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after attempt `n` is `n * backoff_step`.
    pub backoff_step: Duration,
    /// Cap on a single delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_step: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Stateless retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay after the `attempt`-th failure (1-based).
    /// Returns `None` once no attempts remain.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.config.max_attempts {
            return None;
        }
        let linear = self.config.backoff_step.saturating_mul(attempt);
        Some(linear.min(self.config.max_backoff))
    }

    /// Sum of every delay one fully failing run sleeps through.
    pub fn total_backoff(&self) -> Duration {
        (1..self.config.max_attempts)
            .filter_map(|attempt| self.next_delay(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// Cancellation (from `op` or while sleeping) is returned immediately and
    /// never retried. After the last failure the error is wrapped in
    /// [`IndexerError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, IndexerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, IndexerError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => match self.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying latest height probe"
                        );
                        sleep_or_cancel(cancel, delay).await?;
                    }
                    None => {
                        return Err(IndexerError::RetriesExhausted {
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }
                },
            }
        }
    }
}
