//! Core protocol types: accounts, habits, and user state views.
//!
//! All monetary values are in base units (see [`UNIT`](crate::constants::UNIT)).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AccountIdError;

/// Monetary amount in base units.
pub type Amount = u128;

/// Integer day index: `floor(unix_seconds / SECONDS_PER_DAY)`.
pub type Epoch = u64;

/// Per-owner sequential habit identifier, starting at 1.
pub type HabitId = u64;

/// A 32-byte account identifier.
///
/// Identifies users and the treasury. The all-zero id is the null account
/// and is never a valid treasury.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// The null account.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create an AccountId from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the null account.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != 64 {
            return Err(AccountIdError::InvalidLength(s.len()));
        }
        let bytes = hex::decode(s).map_err(|e| AccountIdError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AccountIdError::InvalidLength(s.len()))?;
        Ok(Self(arr))
    }
}

impl From<[u8; 32]> for AccountId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for AccountId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A user-owned habit record.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Habit {
    /// Sequential id within the owner's habits, starting at 1.
    pub id: HabitId,
    /// Account that created the habit.
    pub owner: AccountId,
    /// Free-form description, 3 to 100 characters.
    pub text: String,
    /// Epoch in which the habit was created.
    pub created_at_epoch: Epoch,
    /// Whether the habit has been archived.
    pub archived: bool,
    /// Epoch in which the habit was archived, if it was.
    pub archived_at_epoch: Option<Epoch>,
}

impl Habit {
    /// Whether the habit is currently active (not archived).
    pub fn is_active(&self) -> bool {
        !self.archived
    }

    /// Whether `prepare_day` may fund this habit for `epoch`.
    ///
    /// A habit counts for an epoch if it exists by then and is not archived
    /// at the time the day is prepared.
    pub fn is_active_at(&self, epoch: Epoch) -> bool {
        self.is_active() && self.created_at_epoch <= epoch
    }
}

/// Snapshot of a user's balances and active habit count.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct UserState {
    /// Unencumbered, withdrawable funds.
    pub free: Amount,
    /// Funds locked against funded, unsettled days.
    pub blocked: Amount,
    /// Funds won back from checked-in days.
    pub claimable: Amount,
    /// Number of habits that are not archived.
    pub active_habit_count: u64,
}

impl UserState {
    /// `free + blocked + claimable`, or `None` on overflow.
    pub fn total_funds(&self) -> Option<Amount> {
        self.free.checked_add(self.blocked)?.checked_add(self.claimable)
    }
}
