//! The `RpcTransport` trait: what every backend talks to.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// An async JSON-RPC transport.
///
/// Implementations must be `Send + Sync` for use across Tokio tasks.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Return the transport's identifier (URL or name).
    fn url(&self) -> &str;

    /// Send `req` and deserialize its result.
    async fn request<T>(&self, req: JsonRpcRequest) -> Result<T, TransportError>
    where
        T: DeserializeOwned + Send,
        Self: Sized,
    {
        let method = req.method.clone();
        let resp = self.send(req).await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        tracing::trace!(url = self.url(), method = %method, "RPC response received");
        serde_json::from_value(result).map_err(TransportError::Deserialization)
    }

    /// Call a method with positional parameters and deserialize the result.
    async fn call<T>(&self, id: u64, method: &str, params: Vec<Value>) -> Result<T, TransportError>
    where
        T: DeserializeOwned + Send,
        Self: Sized,
    {
        self.request(JsonRpcRequest::new(id, method, params)).await
    }
}
