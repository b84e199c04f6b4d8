//! eventindex-core: chain-agnostic engine of the event indexer.
//!
//! # Architecture
//!
//! ```text
//! Indexer<B: BackendAdapter>
//!     ├── SyncCursor     (current height + handoff flag behind one lock)
//!     ├── historical     (catch-up to the tip in batch_size ranges)
//!     ├── live poll      (tails the tip every poll_interval after handoff)
//!     ├── RetryPolicy    (linear backoff around the latest-height probe)
//!     ├── RateLimiter    (token bucket in front of every backend call)
//!     └── EventSender ──→ EventReceiver (bounded queue, consumer side)
//! ```

pub mod backend;
pub mod builder;
pub mod cursor;
pub mod error;
pub mod index_loop;
pub mod indexer;
pub mod policy;
pub mod queue;
pub mod types;

pub use backend::{BackendAdapter, CallContext};
pub use builder::IndexerBuilder;
pub use cursor::{CursorSnapshot, SyncCursor};
pub use error::IndexerError;
pub use index_loop::Indexer;
pub use indexer::{IndexerConfig, IndexerState};
pub use queue::{EventReceiver, EventSender};
pub use types::{AttributeValue, Event, EventFilter};
