//! # habit-engine
//! Day-cycle engine for Habit Stake.
//!
//! - [`engine::HabitTracker`]: the public entry points, from deposits to
//!   the prepare / check-in / settle life cycle
//! - [`payment`]: the external payment primitive used by withdraw and claim
//! - [`config::TrackerConfig`]: immutable configuration fixed at creation

pub mod config;
pub mod engine;
pub mod payment;

pub use config::TrackerConfig;
pub use engine::{BatchSummary, HabitTracker, PrepareSummary, SettleOutcome};
pub use payment::{PaymentError, PaymentSink, Payout, PayoutKind, RecordingPaymentSink};
