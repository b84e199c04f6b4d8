//! YAML configuration file for the `eventindex` binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use eventindex_core::IndexerConfig;
use eventindex_cosmos::{AttributeEncoding, DEFAULT_CONTRACT_ATTRIBUTE};
use eventindex_evm::SchemaSet;
use eventindex_rpc::HttpTransportConfig;

/// Top-level config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub backend: BackendConfig,
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub log: crate::logging::LogConfig,
}

/// Which chain family to talk to, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Evm {
        rpc_url: String,
        /// Blocks subtracted from `eth_blockNumber`.
        #[serde(default)]
        confirmations: u64,
        /// Human-readable event declarations.
        #[serde(default)]
        events: Vec<String>,
        /// Path to a JSON ABI file; its events are added to `events`.
        #[serde(default)]
        abi: Option<PathBuf>,
        #[serde(default = "default_request_timeout_ms")]
        request_timeout_ms: u64,
    },
    Cosmos {
        rpc_url: String,
        #[serde(default = "default_contract_attribute")]
        contract_attribute: String,
        #[serde(default)]
        attribute_encoding: AttributeEncoding,
        #[serde(default = "default_request_timeout_ms")]
        request_timeout_ms: u64,
    },
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_contract_attribute() -> String {
    DEFAULT_CONTRACT_ATTRIBUTE.into()
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Evm { .. } => "evm",
            Self::Cosmos { .. } => "cosmos",
        }
    }

    pub fn rpc_url(&self) -> &str {
        match self {
            Self::Evm { rpc_url, .. } | Self::Cosmos { rpc_url, .. } => rpc_url,
        }
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        let ms = match self {
            Self::Evm { request_timeout_ms, .. } | Self::Cosmos { request_timeout_ms, .. } => {
                *request_timeout_ms
            }
        };
        HttpTransportConfig {
            request_timeout: Duration::from_millis(ms),
            ..Default::default()
        }
    }

    /// Event schemas for the EVM backend: declarations plus the ABI file, if any.
    pub fn evm_schemas(&self) -> Result<SchemaSet> {
        let Self::Evm { events, abi, .. } = self else {
            anyhow::bail!("event schemas only apply to the evm backend");
        };
        let mut set = SchemaSet::from_declarations(events)?;
        if let Some(path) = abi {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading ABI file {}", path.display()))?;
            let from_file = SchemaSet::from_json_abi(&json)
                .with_context(|| format!("parsing ABI file {}", path.display()))?;
            for schema in from_file.into_schemas() {
                set.insert(schema);
            }
        }
        Ok(set)
    }
}

impl FileConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("invalid config YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("in {}", path.display()))
    }
}
