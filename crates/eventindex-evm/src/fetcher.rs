//! Raw `eth_getLogs` types and request building.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use eventindex_core::IndexerError;

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "blockHash", default)]
    pub block_hash: Option<String>,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "transactionIndex")]
    pub tx_index: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    /// Parse one entry of an `eth_getLogs` result array.
    pub fn from_value(value: Value) -> Result<Self, IndexerError> {
        serde_json::from_value(value)
            .map_err(|e| IndexerError::Decode(format!("malformed log entry: {e}")))
    }

    pub fn block_number_u64(&self) -> Result<u64, IndexerError> {
        parse_hex_u64(&self.block_number)
    }

    pub fn tx_index_u32(&self) -> Result<u32, IndexerError> {
        parse_hex_u32(&self.tx_index)
    }

    pub fn log_index_u32(&self) -> Result<u32, IndexerError> {
        parse_hex_u32(&self.log_index)
    }

    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }

    /// The `data` payload as bytes.
    pub fn data_bytes(&self) -> Result<Vec<u8>, IndexerError> {
        hex::decode(self.data.strip_prefix("0x").unwrap_or(&self.data))
            .map_err(|e| IndexerError::Decode(format!("log data is not hex: {e}")))
    }
}

/// Parse a hex-encoded quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, IndexerError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|e| IndexerError::Decode(format!("invalid hex quantity '{s}': {e}")))
}

fn parse_hex_u32(s: &str) -> Result<u32, IndexerError> {
    let v = parse_hex_u64(s)?;
    u32::try_from(v).map_err(|_| IndexerError::Decode(format!("quantity '{s}' exceeds u32")))
}

/// The single filter-object parameter of `eth_getLogs`.
///
/// Topic position 0 is an OR-list of the selected event fingerprints.
pub fn get_logs_params(from: u64, to: u64, address: &str, topic0s: &[String]) -> Value {
    json!({
        "fromBlock": format!("0x{from:x}"),
        "toBlock": format!("0x{to:x}"),
        "address": address,
        "topics": [topic0s],
    })
}
