//! Fluent builder API for indexer configuration.
//!
//! # Example
//!
//! ```rust
//! use eventindex_core::IndexerBuilder;
//!
//! let config = IndexerBuilder::new()
//!     .id("task-created")
//!     .start_height(1_200_000)
//!     .contract("layer1qxyzcontract")
//!     .event_type("wasm-NewTaskCreated")
//!     .batch_size(50)
//!     .rate_limit(4.0)
//!     .build_config();
//! assert_eq!(config.batch_size, 50);
//! ```

use crate::indexer::IndexerConfig;
use crate::types::EventFilter;

/// Fluent builder for [`IndexerConfig`].
#[derive(Debug, Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
        }
    }

    /// Set the name used in log lines.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the first height to index.
    pub fn start_height(mut self, height: u64) -> Self {
        self.config.start_height = height;
        self
    }

    /// Set the target contract identity.
    pub fn contract(mut self, contract: impl Into<String>) -> Self {
        self.config.filter.contract = contract.into();
        self
    }

    /// Add an event type to the allow-list.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.config.filter.event_types.insert(event_type.into());
        self
    }

    /// Replace the whole filter.
    pub fn filter(mut self, filter: EventFilter) -> Self {
        self.config.filter = filter;
        self
    }

    /// Set the number of heights per range fetch.
    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the live poll interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the pause after a failed fetch or exhausted probe, in milliseconds.
    pub fn recovery_interval_ms(mut self, ms: u64) -> Self {
        self.config.recovery_interval_ms = ms;
        self
    }

    /// Set the backend request rate (requests per second).
    pub fn rate_limit(mut self, per_second: f64) -> Self {
        self.config.rate_limit = per_second;
        self
    }

    /// Set the attempts per latest-height probe.
    pub fn max_height_probe_attempts(mut self, attempts: u32) -> Self {
        self.config.max_height_probe_attempts = attempts;
        self
    }

    /// Set the linear backoff step and cap for height probes, in milliseconds.
    pub fn retry_backoff_ms(mut self, step_ms: u64, max_ms: u64) -> Self {
        self.config.retry_backoff_ms = step_ms;
        self.config.max_retry_backoff_ms = max_ms;
        self
    }

    /// Set the event queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }
}
