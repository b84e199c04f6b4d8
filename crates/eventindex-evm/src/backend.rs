//! `EvmBackend`: log-filter adapter over `eth_getLogs`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace, warn};

use eventindex_core::{BackendAdapter, CallContext, Event, EventFilter, IndexerError};
use eventindex_rpc::RpcTransport;

use crate::fetcher::{self, RawLog};
use crate::fingerprint;
use crate::schema::SchemaSet;

/// EVM backend: the node filters by address and topic0, this side decodes.
pub struct EvmBackend<T> {
    transport: T,
    schemas: SchemaSet,
    confirmations: u64,
    next_id: AtomicU64,
}

impl<T: RpcTransport> EvmBackend<T> {
    pub fn new(transport: T, schemas: SchemaSet) -> Self {
        Self {
            transport,
            schemas,
            confirmations: 0,
            next_id: AtomicU64::new(1),
        }
    }

    /// Report `eth_blockNumber - confirmations` as the latest height.
    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn schemas(&self) -> &SchemaSet {
        &self.schemas
    }

    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Turn one raw log into an event. `Ok(None)` means "not ours, skip".
    fn decode_log(&self, log: RawLog, filter: &EventFilter) -> Result<Option<Event>, IndexerError> {
        if log.is_removed() {
            trace!(tx = %log.tx_hash, "Skipping removed log");
            return Ok(None);
        }
        if !filter.matches_contract(&log.address) {
            return Ok(None);
        }
        let Some(schema) = fingerprint::from_topics(&log.topics).and_then(|t| self.schemas.get(&t))
        else {
            trace!(tx = %log.tx_hash, "Skipping log with unknown signature");
            return Ok(None);
        };
        if !filter.allows_type(&schema.name) {
            return Ok(None);
        }

        let data = log.data_bytes()?;
        let attributes: BTreeMap<_, _> = schema.decode(&log.topics, &data)?.into_iter().collect();
        Ok(Some(Event {
            block_height: log.block_number_u64()?,
            tx_index: log.tx_index_u32()?,
            event_index: log.log_index_u32()?,
            event_type: schema.name.clone(),
            contract: log.address,
            tx_hash: log.tx_hash,
            attributes,
        }))
    }
}

#[async_trait]
impl<T: RpcTransport> BackendAdapter for EvmBackend<T> {
    fn name(&self) -> &str {
        "evm"
    }

    fn validate_filter(&self, filter: &EventFilter) -> Result<(), IndexerError> {
        filter.contract.parse::<Address>().map_err(|e| {
            IndexerError::Config(format!("invalid EVM address '{}': {e}", filter.contract))
        })?;
        if let Some(missing) = filter.event_types.iter().find(|t| !self.schemas.has_name(t)) {
            return Err(IndexerError::Config(format!(
                "no ABI definition for event type '{missing}'"
            )));
        }
        Ok(())
    }

    async fn latest_height(&self, cx: &CallContext) -> Result<u64, IndexerError> {
        let head: String = cx
            .call(async {
                self.transport
                    .call(self.id(), "eth_blockNumber", vec![])
                    .await
                    .map_err(IndexerError::from)
            })
            .await?;
        Ok(fetcher::parse_hex_u64(&head)?.saturating_sub(self.confirmations))
    }

    async fn fetch_events(
        &self,
        cx: &CallContext,
        from: u64,
        to: u64,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, IndexerError> {
        let topics = self.schemas.topics_for(&filter.event_types);
        let params = fetcher::get_logs_params(from, to, &filter.contract, &topics);
        // Parsed per entry: a malformed log is dropped on its own.
        let entries: Vec<Value> = cx
            .call(async {
                self.transport
                    .call(self.id(), "eth_getLogs", vec![params])
                    .await
                    .map_err(IndexerError::from)
            })
            .await?;

        let fetched = entries.len();
        let mut events = Vec::with_capacity(fetched);
        for entry in entries {
            let log = match RawLog::from_value(entry) {
                Ok(log) => log,
                Err(e) => {
                    warn!(from, to, error = %e, "Dropping log entry that failed to parse");
                    continue;
                }
            };
            let tx = log.tx_hash.clone();
            match self.decode_log(log, filter) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => warn!(tx = %tx, error = %e, "Dropping log that failed to decode"),
            }
        }
        debug!(from, to, logs = fetched, events = events.len(), "eth_getLogs range decoded");
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use alloy_dyn_abi::DynSolValue;
    use alloy_primitives::U256;
    use eventindex_core::policy::{RateLimiter, RateLimiterConfig};
    use eventindex_core::AttributeValue;
    use eventindex_rpc::MockTransport;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

    fn backend() -> EvmBackend<MockTransport> {
        let schemas = SchemaSet::from_declarations([
            "event NewTaskCreated(uint32 indexed taskIndex, string name)",
            "event TaskResponded(uint32 indexed taskIndex, bool ok)",
        ])
        .unwrap();
        EvmBackend::new(MockTransport::new(), schemas)
    }

    fn cx() -> CallContext {
        CallContext::new(
            CancellationToken::new(),
            Arc::new(RateLimiter::new(RateLimiterConfig::per_second(1_000.0))),
        )
    }

    fn filter() -> EventFilter {
        EventFilter::contract(CONTRACT).event_type("NewTaskCreated")
    }

    fn log(b: &EvmBackend<MockTransport>, height: u64, log_index: u64, task: u64, name: &str) -> Value {
        let topic0 = b.schemas.topics_for(&["NewTaskCreated".to_string()])[0].clone();
        let data = DynSolValue::Tuple(vec![DynSolValue::String(name.into())]).abi_encode_params();
        json!({
            "address": CONTRACT,
            "topics": [topic0, format!("0x{task:064x}")],
            "data": format!("0x{}", hex::encode(data)),
            "blockNumber": format!("0x{height:x}"),
            "blockHash": "0x00",
            "transactionHash": format!("0x{height:064x}"),
            "transactionIndex": "0x0",
            "logIndex": format!("0x{log_index:x}"),
            "removed": false
        })
    }

    #[test]
    fn validate_filter_checks_address_and_schema() {
        let b = backend();
        assert!(b.validate_filter(&filter()).is_ok());
        assert!(b
            .validate_filter(&EventFilter::contract("layer1abc").event_type("NewTaskCreated"))
            .is_err());
        assert!(b
            .validate_filter(&EventFilter::contract(CONTRACT).event_type("Unknown"))
            .is_err());
    }

    #[tokio::test]
    async fn latest_height_subtracts_confirmations() {
        let b = backend().with_confirmations(12);
        b.transport.respond("eth_blockNumber", json!("0x64"));
        assert_eq!(b.latest_height(&cx()).await.unwrap(), 88);

        let shallow = backend().with_confirmations(500);
        shallow.transport.respond("eth_blockNumber", json!("0x64"));
        assert_eq!(shallow.latest_height(&cx()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn fetch_decodes_logs_and_builds_filter() {
        let b = backend();
        b.transport
            .respond("eth_getLogs", json!([log(&b, 10, 2, 7, "resize"), log(&b, 11, 0, 8, "crop")]));

        let events = b.fetch_events(&cx(), 10, 20, &filter()).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].block_height, 10);
        assert_eq!(events[0].event_index, 2);
        assert_eq!(events[0].event_type, "NewTaskCreated");
        assert_eq!(events[0].attribute("taskIndex"), Some(&AttributeValue::Uint(7)));
        assert_eq!(events[1].attribute("name"), Some(&AttributeValue::Str("crop".into())));

        let call = &b.transport.calls_to("eth_getLogs")[0];
        let params = &call.params[0];
        assert_eq!(params["fromBlock"], "0xa");
        assert_eq!(params["toBlock"], "0x14");
        assert_eq!(params["address"], CONTRACT);
        assert_eq!(params["topics"][0].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drops_removed_unknown_and_undecodable_logs() {
        let b = backend();
        let mut removed = log(&b, 10, 0, 1, "a");
        removed["removed"] = json!(true);
        let mut unknown = log(&b, 10, 1, 1, "b");
        unknown["topics"][0] = json!(format!("0x{:064x}", 0xdead));
        let mut garbled = log(&b, 10, 2, 1, "c");
        garbled["data"] = json!("0x1234");
        let good = log(&b, 10, 3, 1, "d");
        b.transport
            .respond("eth_getLogs", json!([removed, unknown, garbled, good]));

        let events = b.fetch_events(&cx(), 10, 10, &filter()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_index, 3);
    }

    #[tokio::test]
    async fn malformed_log_entry_does_not_fail_the_range() {
        let b = backend();
        let mut no_index = log(&b, 10, 0, 1, "a");
        no_index.as_object_mut().unwrap().remove("logIndex");
        let mut bad_height = log(&b, 10, 1, 1, "b");
        bad_height["blockNumber"] = json!(42);
        let good = log(&b, 10, 2, 1, "c");
        b.transport
            .respond("eth_getLogs", json!([no_index, bad_height, "junk", good]));

        let events = b.fetch_events(&cx(), 10, 10, &filter()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_index, 2);
        assert_eq!(events[0].attribute("name"), Some(&AttributeValue::Str("c".into())));
    }

    #[tokio::test]
    async fn rpc_failure_is_transient() {
        let b = backend();
        b.transport.fail_next("eth_getLogs", 1);
        let err = b.fetch_events(&cx(), 1, 2, &filter()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn wide_uint_attribute() {
        let schemas = SchemaSet::from_declarations(["event Paid(uint256 amount)"]).unwrap();
        let b = EvmBackend::new(MockTransport::new(), schemas);
        let topic0 = b.schemas.topics_for(&["Paid".to_string()])[0].clone();
        let data = DynSolValue::Tuple(vec![DynSolValue::Uint(U256::MAX, 256)]).abi_encode_params();
        b.transport.respond(
            "eth_getLogs",
            json!([{
                "address": CONTRACT,
                "topics": [topic0],
                "data": format!("0x{}", hex::encode(data)),
                "blockNumber": "0x1",
                "transactionHash": "0x01",
                "transactionIndex": "0x0",
                "logIndex": "0x0"
            }]),
        );
        let events = b
            .fetch_events(&cx(), 1, 1, &EventFilter::contract(CONTRACT).event_type("Paid"))
            .await
            .unwrap();
        assert!(matches!(events[0].attribute("amount"), Some(AttributeValue::BigUint(_))));
    }
}
