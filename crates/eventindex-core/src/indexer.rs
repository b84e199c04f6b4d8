//! Indexer configuration and state types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::policy::{RateLimiterConfig, RetryConfig, RetryPolicy};
use crate::types::EventFilter;

/// Configuration for an indexer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Name used to label log lines from this instance.
    pub id: String,
    /// First height to index.
    pub start_height: u64,
    /// Contract and event-type filter.
    pub filter: EventFilter,
    /// Heights per `fetch_events` call.
    pub batch_size: u64,
    /// Live poll interval (milliseconds).
    pub poll_interval_ms: u64,
    /// Pause after a failed range fetch or exhausted height probe (milliseconds).
    pub recovery_interval_ms: u64,
    /// Backend requests per second.
    pub rate_limit: f64,
    /// Attempts per latest-height probe.
    pub max_height_probe_attempts: u32,
    /// Linear backoff step between probe attempts (milliseconds).
    pub retry_backoff_ms: u64,
    /// Upper bound on a single probe backoff (milliseconds).
    pub max_retry_backoff_ms: u64,
    /// Event queue capacity.
    pub queue_capacity: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            start_height: 1,
            filter: EventFilter::default(),
            batch_size: 100,
            poll_interval_ms: 5_000,
            recovery_interval_ms: 5_000,
            rate_limit: 5.0,
            max_height_probe_attempts: 5,
            retry_backoff_ms: 1_000,
            max_retry_backoff_ms: 10_000,
            queue_capacity: 1_000,
        }
    }
}

impl IndexerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_interval_ms)
    }

    /// Retry settings for the latest-height probe.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_height_probe_attempts,
            backoff_step: Duration::from_millis(self.retry_backoff_ms),
            max_backoff: Duration::from_millis(self.max_retry_backoff_ms),
        }
    }

    /// Token bucket settings: `rate_limit` tokens per second, burst of one.
    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::per_second(self.rate_limit)
    }

    /// Longest time the indexer can go between two rounds of height probes
    /// while the node is down: every backoff of one exhausted probe plus the
    /// recovery pause that follows it. RPC latency is not included.
    pub fn probe_recovery_bound(&self) -> Duration {
        RetryPolicy::new(self.retry_config()).total_backoff() + self.recovery_interval()
    }

    /// Check the configuration. Called by `Indexer::run` before anything is spawned.
    pub fn validate(&self) -> Result<(), IndexerError> {
        self.filter.validate()?;
        if self.batch_size == 0 {
            return Err(IndexerError::Config("batch_size must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(IndexerError::Config("poll_interval_ms must be non-zero".into()));
        }
        if !(self.rate_limit.is_finite() && self.rate_limit > 0.0) {
            return Err(IndexerError::Config(format!(
                "rate_limit must be a positive number, got {}",
                self.rate_limit
            )));
        }
        if self.max_height_probe_attempts == 0 {
            return Err(IndexerError::Config(
                "max_height_probe_attempts must be at least 1".into(),
            ));
        }
        if self.max_retry_backoff_ms < self.retry_backoff_ms {
            return Err(IndexerError::Config(
                "max_retry_backoff_ms must not be below retry_backoff_ms".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(IndexerError::Config("queue_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Runtime state of the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Constructed, `run` not called yet.
    Initializing,
    /// Catching up from the start height to the chain tip.
    HistoricalSync,
    /// Caught up; live poll is tailing new heights.
    Polling,
    /// Both phases have exited.
    Stopped,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::HistoricalSync => write!(f, "historical-sync"),
            Self::Polling => write!(f, "polling"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
