//! # habit-node
//! The Habit Stake service over RocksDB and JSON-RPC.
//!
//! Composes the tracker into a running service:
//! - [`storage::RocksStore`]: persistent ledger, status table, and habits backed by RocksDB
//! - [`journal::PayoutJournal`]: payment sink appending payouts to a JSON-lines file
//! - [`node::Node`]: serialized access to the tracker plus an event broadcast
//! - [`rpc`]: JSON-RPC server for external access
//! - [`config::NodeConfig`]: layered service configuration

pub mod config;
pub mod error;
pub mod journal;
pub mod node;
pub mod rpc;
pub mod storage;

pub use config::NodeConfig;
pub use error::NodeError;
pub use journal::PayoutJournal;
pub use node::Node;
pub use rpc::start_rpc_server;
pub use storage::RocksStore;
