//! eventindex-evm: EVM backend for EventIndex.
//!
//! One `eth_getLogs` call per range with the contract address and the topic0
//! set of the allowed events; the node does the filtering, this crate
//! ABI-decodes each log into an [`Event`](eventindex_core::Event).
//!
//! # Example
//!
//! ```rust,no_run
//! use eventindex_core::{IndexerBuilder, Indexer};
//! use eventindex_evm::{EvmBackend, SchemaSet};
//! use eventindex_rpc::HttpTransport;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let schemas = SchemaSet::from_declarations([
//!     "event NewTaskCreated(uint32 indexed taskIndex, string name)",
//! ])?;
//! let transport = HttpTransport::default_for("http://localhost:8545")?;
//! let backend = EvmBackend::new(transport, schemas).with_confirmations(2);
//!
//! let config = IndexerBuilder::new()
//!     .contract("0x5fbdb2315678afecb367f032d93f642f64180aa3")
//!     .event_type("NewTaskCreated")
//!     .build_config();
//! let mut events = Indexer::new(config, backend).run(CancellationToken::new())?;
//! while let Some(event) = events.recv().await {
//!     println!("{} {}", event.block_height, event.event_type);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod fetcher;
pub mod fingerprint;
pub mod normalizer;
pub mod schema;

pub use backend::EvmBackend;
pub use fetcher::RawLog;
pub use schema::{EventSchema, SchemaSet};
