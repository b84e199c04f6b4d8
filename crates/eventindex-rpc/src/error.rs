//! Transport-level error types.

use eventindex_core::IndexerError;
use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur during an RPC transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, bad status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

/// Every transport failure is a backend failure to the index loop.
/// A response that does not match the expected shape is a decode failure.
impl From<TransportError> for IndexerError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Deserialization(e) => IndexerError::Decode(e.to_string()),
            other => IndexerError::Rpc(other.to_string()),
        }
    }
}
