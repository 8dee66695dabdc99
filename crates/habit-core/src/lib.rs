//! # habit-core
//! Foundation types, the balance ledger, and the daily status table for Habit Stake.

pub mod constants;
pub mod epoch;
pub mod error;
pub mod events;
pub mod ledger;
pub mod overlay;
pub mod registry;
pub mod state;
pub mod status;
pub mod types;
