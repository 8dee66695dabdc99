//! Per-user balance ledger.
//!
//! A [`UserBalance`] splits a user's funds into three buckets:
//!
//! - `free`: unencumbered, withdrawable
//! - `blocked`: locked against funded, unsettled days
//! - `claimable`: won back from checked-in days
//!
//! The lifetime counters make the conservation invariant checkable from the
//! record alone: `free + blocked + claimable == total_deposited -
//! total_withdrawn - total_forfeited`.
//!
//! Every operation computes all new values before writing any of them, so a
//! failing operation leaves the record untouched. Arithmetic is checked;
//! overflow surfaces as [`TrackerError::ArithmeticOverflow`].

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;
use crate::types::Amount;

/// Balance record for one user. Created on first touch, never destroyed.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct UserBalance {
    /// Unencumbered funds.
    pub free: Amount,
    /// Funds locked against funded, unsettled days.
    pub blocked: Amount,
    /// Funds released from successful days, awaiting claim or redeposit.
    pub claimable: Amount,
    /// Lifetime sum of deposits.
    pub total_deposited: Amount,
    /// Lifetime sum of withdrawals and claims paid out.
    pub total_withdrawn: Amount,
    /// Lifetime sum of stakes forfeited to the treasury.
    pub total_forfeited: Amount,
}

fn add(a: Amount, b: Amount) -> Result<Amount, TrackerError> {
    a.checked_add(b).ok_or(TrackerError::ArithmeticOverflow)
}

/// Subtract a user-requested amount from a bucket.
fn take(have: Amount, need: Amount) -> Result<Amount, TrackerError> {
    have.checked_sub(need)
        .ok_or(TrackerError::InsufficientBalance { have, need })
}

/// Subtract an engine-computed amount; a shortfall means broken bookkeeping.
fn take_internal(bucket: &str, have: Amount, need: Amount) -> Result<Amount, TrackerError> {
    have.checked_sub(need).ok_or_else(|| {
        TrackerError::InvariantViolation(format!("{bucket} bucket holds {have}, need {need}"))
    })
}

impl UserBalance {
    /// `free + blocked + claimable`.
    pub fn total_funds(&self) -> Result<Amount, TrackerError> {
        add(add(self.free, self.blocked)?, self.claimable)
    }

    /// Whether the conservation invariant holds for this record.
    pub fn is_conserved(&self) -> bool {
        let Ok(held) = self.total_funds() else {
            return false;
        };
        self.total_deposited
            .checked_sub(self.total_withdrawn)
            .and_then(|v| v.checked_sub(self.total_forfeited))
            == Some(held)
    }

    /// Whether `amount` could be blocked from the free bucket.
    pub fn can_block(&self, amount: Amount) -> bool {
        self.free >= amount
    }

    /// `free += amount`. Rejects zero.
    pub fn deposit(&mut self, amount: Amount) -> Result<(), TrackerError> {
        if amount == 0 {
            return Err(TrackerError::InvalidAmount);
        }
        let free = add(self.free, amount)?;
        let total_deposited = add(self.total_deposited, amount)?;
        self.free = free;
        self.total_deposited = total_deposited;
        Ok(())
    }

    /// `free -= amount`; the caller pays `amount` out afterwards.
    pub fn withdraw(&mut self, amount: Amount) -> Result<(), TrackerError> {
        if amount == 0 {
            return Err(TrackerError::InvalidAmount);
        }
        let free = take(self.free, amount)?;
        let total_withdrawn = add(self.total_withdrawn, amount)?;
        self.free = free;
        self.total_withdrawn = total_withdrawn;
        Ok(())
    }

    /// `claimable -= amount`; the caller pays `amount` out afterwards.
    pub fn claim(&mut self, amount: Amount) -> Result<(), TrackerError> {
        if amount == 0 {
            return Err(TrackerError::InvalidAmount);
        }
        let claimable = take(self.claimable, amount)?;
        let total_withdrawn = add(self.total_withdrawn, amount)?;
        self.claimable = claimable;
        self.total_withdrawn = total_withdrawn;
        Ok(())
    }

    /// Move `amount` from claimable back to free. No funds leave the system.
    pub fn redeposit_from_claimable(&mut self, amount: Amount) -> Result<(), TrackerError> {
        if amount == 0 {
            return Err(TrackerError::InvalidAmount);
        }
        let claimable = take(self.claimable, amount)?;
        let free = add(self.free, amount)?;
        self.claimable = claimable;
        self.free = free;
        Ok(())
    }

    /// Lock `amount` of free funds against a day's stake.
    pub fn block(&mut self, amount: Amount) -> Result<(), TrackerError> {
        let free = take_internal("free", self.free, amount)?;
        let blocked = add(self.blocked, amount)?;
        self.free = free;
        self.blocked = blocked;
        Ok(())
    }

    /// Release a successful day's stake into claimable.
    pub fn unblock_to_claimable(&mut self, amount: Amount) -> Result<(), TrackerError> {
        let blocked = take_internal("blocked", self.blocked, amount)?;
        let claimable = add(self.claimable, amount)?;
        self.blocked = blocked;
        self.claimable = claimable;
        Ok(())
    }

    /// Remove a failed day's stake; the caller credits the treasury.
    pub fn forfeit_blocked(&mut self, amount: Amount) -> Result<(), TrackerError> {
        let blocked = take_internal("blocked", self.blocked, amount)?;
        let total_forfeited = add(self.total_forfeited, amount)?;
        self.blocked = blocked;
        self.total_forfeited = total_forfeited;
        Ok(())
    }
}
