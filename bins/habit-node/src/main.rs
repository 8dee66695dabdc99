//! Habit Stake service binary.
//!
//! Opens the RocksDB ledger, starts the JSON-RPC server, and serves until
//! Ctrl+C.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use habit_core::epoch::epoch_to_date;
use habit_node_lib::{start_rpc_server, Node, NodeConfig};
use tracing::{error, info};

/// Habit Stake: stake funds on your daily habits.
#[derive(Parser, Debug)]
#[command(
    name = "habit-node",
    version,
    about = "Habit Stake service with RocksDB storage and JSON-RPC server"
)]
struct Args {
    /// Data directory for the ledger, payout journal, and habitstake.toml
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// RPC server bind address
    #[arg(long)]
    rpc_bind: Option<String>,

    /// RPC server port
    #[arg(long)]
    rpc_port: Option<u16>,

    /// Treasury account receiving forfeited stakes (64 hex characters)
    #[arg(long)]
    treasury: Option<String>,

    /// Per-habit daily stake in whole units
    #[arg(long)]
    stake_units: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

impl Args {
    /// Apply CLI overrides on top of the layered configuration.
    fn apply(self, mut config: NodeConfig) -> (NodeConfig, String) {
        if let Some(bind) = self.rpc_bind {
            config.rpc_bind = bind;
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if let Some(treasury) = self.treasury {
            config.treasury = Some(treasury);
        }
        if let Some(stake) = self.stake_units {
            config.stake_units = stake;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        (config, self.log_format)
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logging is not up yet, so configuration errors go to stderr.
    let config = match NodeConfig::load(args.data_dir.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            process::exit(1);
        }
    };
    let (config, log_format) = args.apply(config);

    init_logging(&config.log_level, &log_format);

    info!("Habit Stake node v{}", env!("CARGO_PKG_VERSION"));
    info!("data_dir: {:?}", config.data_dir);
    info!("rpc_addr: {}", config.rpc_addr());
    info!("stake_units: {}", config.stake_units);

    let node = match Node::open(config.clone()) {
        Ok(n) => n,
        Err(e) => {
            error!("failed to open node: {}", e);
            process::exit(1);
        }
    };

    let epoch = node.epoch_now();
    match epoch_to_date(epoch) {
        Some(date) => info!("current epoch: {} ({})", epoch, date),
        None => info!("current epoch: {}", epoch),
    }
    info!("treasury: {}", node.treasury());

    let rpc_handle = match start_rpc_server(&config.rpc_addr(), node.clone()).await {
        Ok(handle) => {
            info!("RPC server listening on {}", config.rpc_addr());
            handle
        }
        Err(e) => {
            error!("failed to start RPC server: {}", e);
            process::exit(1);
        }
    };

    info!("Habit Stake node running (Ctrl+C to stop)");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("received Ctrl+C, shutting down..."),
                Err(e) => error!("failed to listen for Ctrl+C: {}", e),
            }
        }
        _ = rpc_handle.clone().stopped() => {
            info!("RPC server exited");
        }
    }

    rpc_handle.stop().ok();
    info!("RPC server stopped");

    if let Err(e) = node.flush() {
        error!("failed to flush ledger: {}", e);
    }
    info!("Habit Stake node shutdown complete");
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text. `RUST_LOG` takes precedence over the
/// configured level.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
