//! Service configuration for the Habit Stake node.
//!
//! [`NodeConfig`] is assembled in layers, later layers winning:
//!
//! 1. built-in defaults ([`NodeConfig::default`])
//! 2. `habitstake.toml` in the data directory, if present
//! 3. `HABITSTAKE_*` environment variables (e.g. `HABITSTAKE_RPC_PORT`)
//!
//! Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use habit_core::constants::{DEFAULT_RPC_PORT, UNIT};
use habit_core::types::AccountId;
use habit_engine::TrackerConfig;

use crate::error::NodeError;

/// Name of the optional config file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "habitstake.toml";

/// Prefix of the environment variables read by [`NodeConfig::load`].
pub const ENV_PREFIX: &str = "HABITSTAKE";

/// Configuration for a service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// IP address for the JSON-RPC server to bind to.
    pub rpc_bind: String,
    /// Port for the JSON-RPC server.
    pub rpc_port: u16,
    /// Log level filter string (e.g. "info", "debug", "habit_engine=trace").
    pub log_level: String,
    /// Treasury account, 64 hex characters. Required to start the service.
    pub treasury: Option<String>,
    /// Per-habit daily stake in whole units.
    pub stake_units: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("habitstake");

        Self {
            data_dir,
            rpc_bind: "127.0.0.1".to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            log_level: "info".to_string(),
            treasury: None,
            stake_units: 10,
        }
    }
}

impl NodeConfig {
    /// Load the layered configuration.
    ///
    /// `data_dir` overrides the default data directory and decides where the
    /// config file is looked up.
    pub fn load(data_dir: Option<&Path>) -> Result<Self, NodeError> {
        let data_dir = data_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::default().data_dir);
        let file = data_dir.join(CONFIG_FILE_NAME);

        let mut config: Self = ::config::Config::builder()
            .set_default("data_dir", data_dir.to_string_lossy().into_owned())?
            .add_source(::config::File::from(file).required(false))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;

        // An explicit directory always wins over file and environment.
        config.data_dir = data_dir;
        Ok(config)
    }

    /// Path to the RocksDB ledger directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("ledger")
    }

    /// Path to the payout journal.
    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("payouts.jsonl")
    }

    /// Socket address string for the RPC server.
    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_bind, self.rpc_port)
    }

    /// Parse the configured treasury account.
    pub fn treasury_account(&self) -> Result<AccountId, NodeError> {
        let hex = self
            .treasury
            .as_deref()
            .ok_or_else(|| NodeError::Config("treasury account is not set".into()))?;
        hex.parse()
            .map_err(|e| NodeError::Config(format!("treasury account: {e}")))
    }

    /// Engine configuration derived from this service configuration.
    pub fn tracker_config(&self) -> Result<TrackerConfig, NodeError> {
        let stake = u128::from(self.stake_units)
            .checked_mul(UNIT)
            .ok_or_else(|| NodeError::Config("stake_units overflow".into()))?;
        Ok(TrackerConfig::with_stake(self.treasury_account()?, stake)?)
    }
}
