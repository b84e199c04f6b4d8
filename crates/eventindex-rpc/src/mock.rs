//! In-memory transport with scripted responses.
//!
//! Responses are keyed by method name. A method can carry one standing
//! result plus a queue of one-shot results that are served first; queued
//! entries can also key on a single named parameter (e.g. `height`).

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

type Scripted = Result<Value, TransportError>;

#[derive(Default)]
struct Script {
    standing: HashMap<String, Value>,
    by_param: HashMap<(String, String), Value>,
    queued: HashMap<String, VecDeque<Scripted>>,
    calls: Vec<JsonRpcRequest>,
}

/// Scripted [`RpcTransport`] for tests.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<Script>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `method` call with `result`.
    pub fn respond(&self, method: &str, result: Value) -> &Self {
        self.lock().standing.insert(method.into(), result);
        self
    }

    /// Answer `method` calls whose named parameter `key` equals `value`.
    ///
    /// Parameter values are compared by their JSON text.
    pub fn respond_when(&self, method: &str, key: &str, value: &Value, result: Value) -> &Self {
        self.lock()
            .by_param
            .insert((method.into(), param_key(key, value)), result);
        self
    }

    /// Answer the next `method` call with `result`, ahead of standing responses.
    pub fn push(&self, method: &str, result: Scripted) -> &Self {
        self.lock()
            .queued
            .entry(method.into())
            .or_default()
            .push_back(result);
        self
    }

    /// Fail the next `count` calls to `method` with an HTTP error.
    pub fn fail_next(&self, method: &str, count: usize) -> &Self {
        for _ in 0..count {
            self.push(method, Err(TransportError::Http("HTTP 503: unavailable".into())));
        }
        self
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<JsonRpcRequest> {
        self.lock().calls.clone()
    }

    /// Requests received for `method`.
    pub fn calls_to(&self, method: &str) -> Vec<JsonRpcRequest> {
        self.lock()
            .calls
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn answer(&self, req: &JsonRpcRequest) -> Scripted {
        let mut script = self.lock();
        script.calls.push(req.clone());

        if let Some(next) = script.queued.get_mut(&req.method).and_then(VecDeque::pop_front) {
            return next;
        }
        if let Some(params) = req.params.as_object() {
            for (key, value) in params {
                let lookup = (req.method.clone(), param_key(key, value));
                if let Some(result) = script.by_param.get(&lookup) {
                    return Ok(result.clone());
                }
            }
        }
        script.standing.get(&req.method).cloned().ok_or_else(|| {
            TransportError::Rpc(JsonRpcError {
                code: -32601,
                message: format!("Method not found: {}", req.method),
                data: None,
            })
        })
    }
}

fn param_key(key: &str, value: &Value) -> String {
    format!("{key}={value}")
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        match self.answer(&req) {
            Ok(result) => Ok(JsonRpcResponse::success(req.id, result)),
            Err(TransportError::Rpc(error)) => Ok(JsonRpcResponse::failure(req.id, error)),
            Err(e) => Err(e),
        }
    }

    fn url(&self) -> &str {
        "mock://"
    }
}
