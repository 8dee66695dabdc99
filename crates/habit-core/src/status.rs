//! Daily status table: one tri-state record per (user, epoch, habit).
//!
//! Life cycle: `unfunded -> funded -> [checked] -> settled`. The `mark_*`
//! primitives assert their own precondition and report a breach as
//! [`TrackerError::InvariantViolation`]; user-facing errors such as
//! `DayNotFunded` are raised by the engine before it marks anything.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;
use crate::types::{AccountId, Amount, Epoch, HabitId};

/// Key of a daily status record.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct DayKey {
    pub user: AccountId,
    pub epoch: Epoch,
    pub habit_id: HabitId,
}

impl DayKey {
    /// Encoded length of [`to_bytes`](Self::to_bytes).
    pub const LEN: usize = 48;

    pub fn new(user: AccountId, epoch: Epoch, habit_id: HabitId) -> Self {
        Self { user, epoch, habit_id }
    }

    /// `user || epoch(BE) || habit_id(BE)`, ordered the same way as `Ord`.
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut key = [0u8; Self::LEN];
        key[0..32].copy_from_slice(self.user.as_bytes());
        key[32..40].copy_from_slice(&self.epoch.to_be_bytes());
        key[40..48].copy_from_slice(&self.habit_id.to_be_bytes());
        key
    }

    /// Inverse of [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::LEN {
            return None;
        }
        let mut user = [0u8; 32];
        user.copy_from_slice(&bytes[0..32]);
        let epoch = u64::from_be_bytes(bytes[32..40].try_into().ok()?);
        let habit_id = u64::from_be_bytes(bytes[40..48].try_into().ok()?);
        Some(Self::new(AccountId(user), epoch, habit_id))
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user, self.epoch, self.habit_id)
    }
}

/// Outcome flags for one habit on one day, plus the stake blocked for it.
/// Absent records read as all-false with a zero stake.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct DailyStatus {
    /// The day's stake has been blocked.
    pub funded: bool,
    /// The user checked in during the day.
    pub checked: bool,
    /// The outcome has been finalized. Terminal.
    pub settled: bool,
    /// Amount blocked when the day was funded; settlement releases exactly this.
    pub stake: Amount,
}

impl DailyStatus {
    /// Funded and not yet settled.
    pub fn is_pending(&self) -> bool {
        self.funded && !self.settled
    }

    pub fn mark_funded(&mut self, stake: Amount) -> Result<(), TrackerError> {
        if self.funded || self.settled || stake == 0 {
            return Err(TrackerError::InvariantViolation(format!(
                "mark_funded({stake}) on {self:?}"
            )));
        }
        self.funded = true;
        self.stake = stake;
        Ok(())
    }

    pub fn mark_checked(&mut self) -> Result<(), TrackerError> {
        if !self.funded || self.checked || self.settled {
            return Err(TrackerError::InvariantViolation(format!(
                "mark_checked on {self:?}"
            )));
        }
        self.checked = true;
        Ok(())
    }

    pub fn mark_settled(&mut self) -> Result<(), TrackerError> {
        if !self.is_pending() {
            return Err(TrackerError::InvariantViolation(format!(
                "mark_settled on {self:?}"
            )));
        }
        self.settled = true;
        Ok(())
    }
}
