//! `CosmosBackend`: log-walk adapter over CometBFT `block_results`.
//!
//! For each height in the range the backend reads every transaction result,
//! keeps events whose type is allowed and whose contract attribute names the
//! target contract, and resolves transaction hashes from `block` only for
//! heights that produced a match.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use eventindex_core::{BackendAdapter, CallContext, Event, EventFilter, IndexerError};
use eventindex_rpc::{JsonRpcRequest, RpcTransport};

use crate::attributes::{self, AttributeEncoding};
use crate::types::{parse_height, AbciEvent, BlockResult, BlockResultsResult, StatusResult};

/// Attribute CosmWasm attaches to every contract event.
pub const DEFAULT_CONTRACT_ATTRIBUTE: &str = "_contract_address";

/// Cosmos backend.
pub struct CosmosBackend<T> {
    transport: T,
    contract_attribute: String,
    encoding: AttributeEncoding,
    next_id: AtomicU64,
}

/// An event matched in `block_results`, waiting for its transaction hash.
struct Matched {
    tx_index: u32,
    event: Event,
}

impl<T: RpcTransport> CosmosBackend<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            contract_attribute: DEFAULT_CONTRACT_ATTRIBUTE.into(),
            encoding: AttributeEncoding::Plain,
            next_id: AtomicU64::new(1),
        }
    }

    /// Attribute that carries the emitting contract's address.
    pub fn with_contract_attribute(mut self, key: impl Into<String>) -> Self {
        self.contract_attribute = key.into();
        self
    }

    pub fn with_attribute_encoding(mut self, encoding: AttributeEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn contract_attribute(&self) -> &str {
        &self.contract_attribute
    }

    pub fn attribute_encoding(&self) -> AttributeEncoding {
        self.encoding
    }

    fn request(&self, method: &str, height: Option<u64>) -> JsonRpcRequest {
        let mut params = Map::new();
        if let Some(h) = height {
            params.insert("height".into(), Value::String(h.to_string()));
        }
        JsonRpcRequest::named(self.next_id.fetch_add(1, Ordering::Relaxed), method, params)
    }

    /// Turn one ABCI event into an `Event` if it passes the filter.
    ///
    /// Events whose attributes cannot be decoded are logged and dropped.
    fn match_event(
        &self,
        height: u64,
        tx_index: u32,
        event_index: u32,
        abci: &AbciEvent,
        filter: &EventFilter,
    ) -> Option<Event> {
        if !filter.allows_type(&abci.kind) {
            return None;
        }
        let attributes = match attributes::decode_attributes(&abci.attributes, self.encoding) {
            Ok(attrs) => attrs,
            Err(e) => {
                warn!(height, tx_index, event_type = %abci.kind, error = %e, "Dropping malformed event");
                return None;
            }
        };
        let contract = attributes
            .get(&self.contract_attribute)
            .and_then(|v| v.as_str())
            .filter(|c| filter.matches_contract(c))?
            .to_string();

        Some(Event {
            block_height: height,
            tx_hash: String::new(),
            tx_index,
            event_index,
            event_type: abci.kind.clone(),
            contract,
            attributes,
        })
    }

    /// Matching events of one height, in (tx, event) order, with tx hashes set.
    async fn scan_height(
        &self,
        cx: &CallContext,
        height: u64,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, IndexerError> {
        let results: BlockResultsResult = cx
            .call(async {
                self.transport
                    .request(self.request("block_results", Some(height)))
                    .await
                    .map_err(IndexerError::from)
            })
            .await?;

        let mut matched = Vec::new();
        for (tx_index, tx) in results.txs_results.unwrap_or_default().iter().enumerate() {
            if !tx.is_ok() {
                continue;
            }
            for (event_index, abci) in tx.events.iter().enumerate() {
                if let Some(event) =
                    self.match_event(height, tx_index as u32, event_index as u32, abci, filter)
                {
                    matched.push(Matched {
                        tx_index: tx_index as u32,
                        event,
                    });
                }
            }
        }
        if matched.is_empty() {
            return Ok(Vec::new());
        }

        let block: BlockResult = cx
            .call(async {
                self.transport
                    .request(self.request("block", Some(height)))
                    .await
                    .map_err(IndexerError::from)
            })
            .await?;
        let txs = block.block.data.txs.unwrap_or_default();

        let mut events = Vec::with_capacity(matched.len());
        for Matched { tx_index, mut event } in matched {
            let Some(raw) = txs.get(tx_index as usize) else {
                warn!(
                    height,
                    tx_index,
                    txs = txs.len(),
                    event_type = %event.event_type,
                    "Dropping event whose transaction is missing from the block"
                );
                continue;
            };
            match attributes::tx_hash(raw) {
                Ok(hash) => {
                    event.tx_hash = hash;
                    events.push(event);
                }
                Err(e) => {
                    warn!(height, tx_index, event_type = %event.event_type, error = %e, "Dropping event with undecodable transaction");
                }
            }
        }
        Ok(events)
    }
}

/// Loose bech32 shape check: `<hrp>1<data>`, one case, bech32 alphabet.
///
/// The checksum is not verified, so a mistyped address passes and then
/// matches no events.
fn looks_like_bech32(addr: &str) -> bool {
    const CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";
    if !(8..=90).contains(&addr.len()) {
        return false;
    }
    if addr.chars().any(|c| c.is_ascii_lowercase()) && addr.chars().any(|c| c.is_ascii_uppercase()) {
        return false;
    }
    let lower = addr.to_ascii_lowercase();
    let Some((hrp, data)) = lower.rsplit_once('1') else {
        return false;
    };
    !hrp.is_empty() && data.len() >= 6 && data.chars().all(|c| CHARSET.contains(c))
}

#[async_trait]
impl<T: RpcTransport> BackendAdapter for CosmosBackend<T> {
    fn name(&self) -> &str {
        "cosmos"
    }

    fn validate_filter(&self, filter: &EventFilter) -> Result<(), IndexerError> {
        if !looks_like_bech32(&filter.contract) {
            return Err(IndexerError::Config(format!(
                "'{}' is not a bech32 contract address",
                filter.contract
            )));
        }
        Ok(())
    }

    async fn latest_height(&self, cx: &CallContext) -> Result<u64, IndexerError> {
        let status: StatusResult = cx
            .call(async {
                self.transport
                    .request(self.request("status", None))
                    .await
                    .map_err(IndexerError::from)
            })
            .await?;
        parse_height(&status.sync_info.latest_block_height)
    }

    async fn fetch_events(
        &self,
        cx: &CallContext,
        from: u64,
        to: u64,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, IndexerError> {
        let mut events = Vec::new();
        for height in from..=to {
            cx.ensure_active()?;
            events.extend(self.scan_height(cx, height, filter).await?);
        }
        debug!(from, to, events = events.len(), "block_results range scanned");
        Ok(events)
    }
}
