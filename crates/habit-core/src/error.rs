//! Error types for Habit Stake.
use thiserror::Error;

use crate::types::{Amount, Epoch};

/// Every condition that aborts a tracker call.
///
/// A call that returns any of these leaves balances and status records
/// exactly as they were before the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("treasury account must be non-null")] InvalidTreasury,
    #[error("stake per day {configured} differs from recorded {recorded}")] StakeMismatch { recorded: Amount, configured: Amount },
    #[error("amount must be greater than zero")] InvalidAmount,
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: Amount, need: Amount },
    #[error("habit text too short: {len} characters")] HabitTextTooShort { len: usize },
    #[error("habit text too long: {len} characters")] HabitTextTooLong { len: usize },
    #[error("caller does not own habit {0}")] NotHabitOwner(u64),
    #[error("habit {0} already archived")] HabitAlreadyArchived(u64),
    #[error("invalid epoch {epoch} (current {current})")] InvalidEpoch { epoch: Epoch, current: Epoch },
    #[error("day not funded: epoch {epoch}, habit {habit_id}")] DayNotFunded { epoch: Epoch, habit_id: u64 },
    #[error("already checked in: epoch {epoch}, habit {habit_id}")] AlreadyCheckedIn { epoch: Epoch, habit_id: u64 },
    #[error("cannot settle the current epoch {0}")] CannotSettleCurrentDay(Epoch),
    #[error("already settled: epoch {epoch}, habit {habit_id}")] AlreadySettled { epoch: Epoch, habit_id: u64 },
    #[error("invalid batch size: {0}")] InvalidBatchSize(u32),
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("invariant violation: {0}")] InvariantViolation(String),
    #[error("payment failed: {0}")] PaymentFailed(String),
    #[error("storage: {0}")] Storage(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountIdError {
    #[error("invalid length: expected 64 hex characters, got {0}")] InvalidLength(usize),
    #[error("invalid hex: {0}")] InvalidHex(String),
}
