//! eventindex-rpc: JSON-RPC plumbing shared by the EventIndex backends.
//!
//! - [`RpcTransport`]: async trait every transport implements
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`]: wire types (positional or named params)
//! - [`HttpTransport`]: `reqwest`-backed HTTP transport
//! - [`TransportError`]: structured error type, convertible into `IndexerError`
//! - `MockTransport`: scripted transport (feature `test-utils`)

pub mod error;
pub mod http;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod request;
pub mod transport;

pub use error::TransportError;
pub use http::{HttpTransport, HttpTransportConfig};
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockTransport;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::RpcTransport;
