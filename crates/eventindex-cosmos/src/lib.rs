//! eventindex-cosmos: Cosmos / CometBFT backend for EventIndex.
//!
//! CosmWasm contracts emit `wasm-<name>` events carrying a
//! `_contract_address` attribute. The node cannot filter these server-side,
//! so this backend walks `block_results` height by height and matches the
//! event type and contract attribute locally.

pub mod attributes;
pub mod backend;
pub mod types;

pub use attributes::AttributeEncoding;
pub use backend::{CosmosBackend, DEFAULT_CONTRACT_ATTRIBUTE};
