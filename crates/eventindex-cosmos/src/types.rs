//! CometBFT JSON-RPC response shapes (only the fields the log walk reads).
//!
//! Heights and codes arrive as decimal strings or numbers depending on the
//! node version; [`parse_height`] accepts both.

use serde::{Deserialize, Serialize};

use eventindex_core::IndexerError;

/// `status` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    pub sync_info: SyncInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncInfo {
    pub latest_block_height: String,
    #[serde(default)]
    pub catching_up: bool,
}

/// `block` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResult {
    pub block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub data: BlockData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockData {
    /// Base64-encoded raw transactions; `null` for empty blocks.
    #[serde(default)]
    pub txs: Option<Vec<String>>,
}

/// `block_results` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResultsResult {
    pub height: String,
    /// One entry per transaction, in block order; `null` for empty blocks.
    #[serde(default)]
    pub txs_results: Option<Vec<TxResult>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxResult {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub events: Vec<AbciEvent>,
}

impl TxResult {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// An ABCI event: a type string and a list of key/value attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbciEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<AbciAttribute>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbciAttribute {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub index: bool,
}

/// Parse a decimal height string.
pub fn parse_height(s: &str) -> Result<u64, IndexerError> {
    s.trim()
        .parse::<u64>()
        .map_err(|e| IndexerError::Decode(format!("invalid height '{s}': {e}")))
}
