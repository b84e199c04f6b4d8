//! Error types for the eventindex pipeline.

use thiserror::Error;

/// Errors that can occur while indexing.
///
/// The variants fall into four groups that the index loop treats differently:
/// transient node faults are retried, cancellation and a closed consumer end
/// the phase cleanly, decode errors never leave the adapter, and configuration
/// errors are only ever returned from `Indexer::run`.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Node or transport fault (timeout, connection reset, bad response).
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The latest-height probe failed on every attempt.
    #[error("latest height probe failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<IndexerError>,
    },

    /// A single chain entry could not be decoded against the known schema.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid indexer or backend configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The driving cancellation token fired.
    #[error("Indexer cancelled")]
    Cancelled,

    /// The consumer dropped its end of the event queue.
    #[error("Event consumer closed the queue")]
    ConsumerClosed,

    /// Attempt to move the sync cursor backwards or in place.
    #[error("Cursor regression: current height {current}, requested {requested}")]
    CursorRegression { current: u64, requested: u64 },
}

impl IndexerError {
    /// Returns `true` for faults that are expected to clear on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::RetriesExhausted { .. })
    }

    /// Returns `true` if the error means the current task must stop.
    ///
    /// Terminal errors are never retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::ConsumerClosed | Self::CursorRegression { .. }
        )
    }

    /// Returns `true` if the error is a clean shutdown signal rather than a fault.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Cancelled | Self::ConsumerClosed)
    }
}
