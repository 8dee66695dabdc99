//! Immutable tracker configuration.

use habit_core::constants::STAKE_PER_DAY;
use habit_core::error::TrackerError;
use habit_core::types::{AccountId, Amount};

/// Fixed at tracker creation; there is no way to change it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    treasury: AccountId,
    stake_per_day: Amount,
}

impl TrackerConfig {
    /// Configuration with the default stake.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::InvalidTreasury`] if `treasury` is the null account
    pub fn new(treasury: AccountId) -> Result<Self, TrackerError> {
        Self::with_stake(treasury, STAKE_PER_DAY)
    }

    /// Configuration with a custom per-habit daily stake.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::InvalidTreasury`] if `treasury` is the null account
    /// - [`TrackerError::InvalidAmount`] if `stake_per_day` is zero
    pub fn with_stake(treasury: AccountId, stake_per_day: Amount) -> Result<Self, TrackerError> {
        if treasury.is_zero() {
            return Err(TrackerError::InvalidTreasury);
        }
        if stake_per_day == 0 {
            return Err(TrackerError::InvalidAmount);
        }
        Ok(Self { treasury, stake_per_day })
    }

    /// Account credited with forfeited stakes.
    pub fn treasury(&self) -> AccountId {
        self.treasury
    }

    /// Amount blocked per active habit per day.
    pub fn stake_per_day(&self) -> Amount {
        self.stake_per_day
    }
}
