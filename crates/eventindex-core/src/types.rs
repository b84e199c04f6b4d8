//! Shared types for the indexing pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

// ─── AttributeValue ───────────────────────────────────────────────────────────

/// A decoded attribute value.
///
/// Log-walk backends only produce `Str`; ABI-decoding backends map each
/// chain-native type onto the closest variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttributeValue {
    Str(String),
    Uint(u128),
    /// Unsigned integers wider than 128 bits, as a decimal string.
    BigUint(String),
    Int(i128),
    /// Signed integers wider than 128 bits, as a decimal string.
    BigInt(String),
    Bool(bool),
    /// Hex address with `0x` prefix.
    Address(String),
    Bytes(Vec<u8>),
    Array(Vec<AttributeValue>),
    Tuple(Vec<(String, AttributeValue)>),
}

impl AttributeValue {
    /// Returns the inner string for `Str` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the value as `u128` when it is a small unsigned integer.
    pub fn as_u128(&self) -> Option<u128> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) | Self::BigUint(s) | Self::BigInt(s) | Self::Address(s) => {
                write!(f, "{s}")
            }
            Self::Uint(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Bytes(b) => write!(f, "0x{}", to_hex(b)),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Tuple(fields) => {
                write!(f, "(")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{name}:{value}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ─── Event ────────────────────────────────────────────────────────────────────

/// A normalized application-level event extracted from chain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Height of the block that contains the event.
    pub block_height: u64,
    /// Hash of the originating transaction.
    pub tx_hash: String,
    /// Position of the transaction within its block.
    pub tx_index: u32,
    /// Position of the event within the block (EVM log index) or the
    /// transaction result (Cosmos).
    pub event_index: u32,
    /// Chain-specific event name (e.g. `"wasm-NewTaskCreated"`).
    pub event_type: String,
    /// Identity of the emitting contract.
    pub contract: String,
    /// Decoded attributes, keyed by attribute name.
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Event {
    /// Ordering key used when pushing a range onto the queue.
    pub fn sort_key(&self) -> (u64, u32, u32) {
        (self.block_height, self.tx_index, self.event_index)
    }

    /// Identity a consumer can use to drop re-delivered events.
    pub fn dedup_key(&self) -> (u64, &str, &str, u32) {
        (
            self.block_height,
            self.tx_hash.as_str(),
            self.event_type.as_str(),
            self.event_index,
        )
    }

    /// Look up an attribute by key.
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

// ─── EventFilter ──────────────────────────────────────────────────────────────

/// Which contract and which event types an indexer instance delivers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Target contract identity (bech32 address on Cosmos, hex on EVM).
    pub contract: String,
    /// Allow-list of event type names. Must not be empty.
    pub event_types: BTreeSet<String>,
}

impl EventFilter {
    /// Create a filter for a single contract.
    pub fn contract(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            event_types: BTreeSet::new(),
        }
    }

    /// Add an event type to the allow-list.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types.insert(event_type.into());
        self
    }

    /// Returns `true` if `event_type` is on the allow-list.
    pub fn allows_type(&self, event_type: &str) -> bool {
        self.event_types.contains(event_type)
    }

    /// Returns `true` if `contract` is the target contract.
    ///
    /// Comparison is ASCII case-insensitive so checksummed and lowercase hex
    /// addresses match.
    pub fn matches_contract(&self, contract: &str) -> bool {
        self.contract.eq_ignore_ascii_case(contract)
    }

    /// Returns `true` if an event with this type and contract should be emitted.
    pub fn matches(&self, event_type: &str, contract: &str) -> bool {
        self.allows_type(event_type) && self.matches_contract(contract)
    }

    /// Chain-independent validation: a contract and at least one event type.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.contract.trim().is_empty() {
            return Err(IndexerError::Config("contract identity is empty".into()));
        }
        if self.event_types.is_empty() {
            return Err(IndexerError::Config("event type allow-list is empty".into()));
        }
        if self.event_types.iter().any(|t| t.trim().is_empty()) {
            return Err(IndexerError::Config("event type names must not be blank".into()));
        }
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
