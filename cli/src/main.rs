//! eventindex CLI: tail contract events from a chain as JSON lines.
//!
//! Usage:
//! ```bash
//! eventindex tail  --config eventindex.yaml
//! eventindex check --config eventindex.yaml
//! eventindex info
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use eventindex_core::{BackendAdapter, Indexer, IndexerConfig};
use eventindex_cosmos::CosmosBackend;
use eventindex_evm::EvmBackend;
use eventindex_rpc::HttpTransport;

mod config;
mod logging;

use config::{BackendConfig, FileConfig};

#[derive(Parser)]
#[command(
    name = "eventindex",
    about = "Index contract events from EVM and Cosmos chains",
    long_about = "
EventIndex CLI: catch up on a contract's events from a start height, then
follow the chain tip. Events are written to stdout as JSON lines, logs to
stderr.

ENVIRONMENT VARIABLES:
  RUST_LOG    Overrides the `log` section of the config file
",
    version
)]
struct Cli {
    /// Enable debug logging (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the indexer and print every event as one JSON line
    Tail {
        /// Path to the YAML config file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Validate a config file and the backend filter without connecting
    Check {
        /// Path to the YAML config file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show defaults and supported backends
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Tail { config } => cmd_tail(&config, cli.verbose).await,
        Commands::Check { config } => cmd_check(&config),
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_tail(path: &Path, verbose: bool) -> Result<()> {
    let mut file = FileConfig::load(path)?;
    if verbose {
        file.log.level = "debug".into();
    }
    logging::init_tracing(&file.log)?;

    let transport = HttpTransport::new(file.backend.rpc_url(), file.backend.transport_config())?;
    match &file.backend {
        BackendConfig::Evm { confirmations, .. } => {
            let backend = EvmBackend::new(transport, file.backend.evm_schemas()?)
                .with_confirmations(*confirmations);
            tail(file.indexer, backend).await
        }
        BackendConfig::Cosmos {
            contract_attribute,
            attribute_encoding,
            ..
        } => {
            let backend = CosmosBackend::new(transport)
                .with_contract_attribute(contract_attribute.clone())
                .with_attribute_encoding(*attribute_encoding);
            tail(file.indexer, backend).await
        }
    }
}

async fn tail<B: BackendAdapter>(config: IndexerConfig, backend: B) -> Result<()> {
    let indexer = Indexer::new(config, backend);
    let cancel = CancellationToken::new();
    let mut events = indexer.run(cancel.clone()).context("starting indexer")?;

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received, shutting down"),
                Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C, shutting down"),
            }
            cancel.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    let mut delivered = 0u64;
    while let Some(event) = events.recv().await {
        let line = serde_json::to_string(&event)?;
        if let Err(e) = writeln!(stdout, "{line}").and_then(|()| stdout.flush()) {
            cancel.cancel();
            return Err(e).context("writing event to stdout");
        }
        delivered += 1;
    }

    let snap = indexer.snapshot();
    info!(
        delivered,
        next_height = snap.current_height,
        up_to_date = snap.is_up_to_date,
        "Event stream closed"
    );
    Ok(())
}

fn cmd_check(path: &Path) -> Result<()> {
    let file = FileConfig::load(path)?;
    file.indexer.validate().context("indexer section")?;

    let transport = HttpTransport::new(file.backend.rpc_url(), file.backend.transport_config())?;
    match &file.backend {
        BackendConfig::Evm { .. } => {
            let schemas = file.backend.evm_schemas()?;
            println!("  Event schemas: {}", schemas.len());
            check_filter(&file.indexer, &EvmBackend::new(transport, schemas))?;
        }
        BackendConfig::Cosmos { .. } => {
            check_filter(&file.indexer, &CosmosBackend::new(transport))?;
        }
    }

    println!("OK: {} ({} backend, {})", path.display(), file.backend.kind(), file.backend.rpc_url());
    println!("  Contract:    {}", file.indexer.filter.contract);
    println!(
        "  Event types: {}",
        file.indexer
            .filter
            .event_types
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Start:       {}", file.indexer.start_height);
    Ok(())
}

fn check_filter<B: BackendAdapter>(config: &IndexerConfig, backend: &B) -> Result<()> {
    backend
        .validate_filter(&config.filter)
        .with_context(|| format!("{} backend rejected the filter", backend.name()))
}

fn cmd_info() {
    let defaults = IndexerConfig::default();
    println!("EventIndex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Backends: evm (eth_getLogs), cosmos (CometBFT block_results)");
    println!("  Default batch size: {} heights/fetch", defaults.batch_size);
    println!("  Default poll interval: {}ms", defaults.poll_interval_ms);
    println!("  Default recovery interval: {}ms", defaults.recovery_interval_ms);
    println!("  Default rate limit: {} req/s", defaults.rate_limit);
    println!(
        "  Default height probe: {} attempts, {}ms linear backoff (max {}ms)",
        defaults.max_height_probe_attempts, defaults.retry_backoff_ms, defaults.max_retry_backoff_ms
    );
    println!(
        "  Worst-case stall between probe rounds: {}ms",
        defaults.probe_recovery_bound().as_millis()
    );
    println!("  Default queue capacity: {} events", defaults.queue_capacity);
}
