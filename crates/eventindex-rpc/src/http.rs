//! HTTP JSON-RPC transport backed by `reqwest`.
//!
//! One POST per request. Retry and rate limiting live in the index loop,
//! so this client only maps failures onto [`TransportError`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP JSON-RPC client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create a client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpTransportConfig) -> Result<Self, TransportError> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TransportError::Other(format!(
                "endpoint must be an http(s) URL, got '{url}'"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url,
            http,
            request_timeout: config.request_timeout,
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, HttpTransportConfig::default())
    }

    fn map_reqwest(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        tracing::debug!(url = %self.url, method = %req.method, id = %req.id, "RPC request");

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let body = resp.bytes().await.map_err(|e| self.map_reqwest(e))?;
        Ok(serde_json::from_slice::<JsonRpcResponse>(&body)?)
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_urls() {
        assert!(HttpTransport::default_for("ws://localhost:26657").is_err());
        assert!(HttpTransport::default_for("localhost:8545").is_err());
    }

    #[test]
    fn builds_for_http_url() {
        let t = HttpTransport::default_for("http://127.0.0.1:26657").unwrap();
        assert_eq!(t.url(), "http://127.0.0.1:26657");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transient_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let t = HttpTransport::new(
            "http://127.0.0.1:9",
            HttpTransportConfig {
                request_timeout: Duration::from_secs(2),
                connect_timeout: Duration::from_secs(1),
            },
        )
        .unwrap();
        let err = t
            .send(JsonRpcRequest::new(1, "eth_blockNumber", vec![]))
            .await
            .unwrap_err();
        assert!(
            matches!(err, TransportError::Http(_) | TransportError::Timeout { .. }),
            "{err}"
        );
        assert!(eventindex_core::IndexerError::from(err).is_transient());
    }
}
