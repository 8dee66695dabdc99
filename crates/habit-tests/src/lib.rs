//! Scenario and invariant test suite for Habit Stake.
//!
//! The integration tests in `tests/` drive the tracker through whole days
//! with a manual clock and check the accounting invariants after every
//! step, in memory and against the RocksDB-backed service.

pub mod helpers;
