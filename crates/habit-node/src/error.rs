//! Service-level errors.
use thiserror::Error;

use habit_core::error::TrackerError;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)] Tracker(#[from] TrackerError),
    #[error("configuration: {0}")] Config(String),
    #[error("I/O: {0}")] Io(#[from] std::io::Error),
    #[error("payout journal: {0}")] Journal(String),
    #[error("RPC server: {0}")] Rpc(String),
}

impl From<::config::ConfigError> for NodeError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
