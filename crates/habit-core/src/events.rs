//! Events recorded for every committed tracker call.

use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Amount, Epoch, HabitId};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackerEvent {
    Deposited { user: AccountId, amount: Amount },
    Withdrawn { user: AccountId, amount: Amount },
    Claimed { user: AccountId, amount: Amount },
    RedepositedFromClaimable { user: AccountId, amount: Amount },
    HabitCreated { user: AccountId, habit_id: HabitId, text: String },
    HabitArchived { user: AccountId, habit_id: HabitId },
    DayPrepared { user: AccountId, epoch: Epoch, prepared: u32, skipped: u32 },
    CheckedIn { user: AccountId, habit_id: HabitId, epoch: Epoch },
    /// Stake released to the user's claimable bucket.
    SettledSuccess { user: AccountId, habit_id: HabitId, epoch: Epoch, reward: Amount },
    /// Stake forfeited to the treasury.
    SettledFail { user: AccountId, habit_id: HabitId, epoch: Epoch, slashed: Amount },
    /// Summary emitted once per `settle_all` call, after the per-habit events.
    BatchSettled { user: AccountId, epoch: Epoch, settled: u32 },
}

impl TrackerEvent {
    /// The user the event concerns.
    pub fn user(&self) -> &AccountId {
        match self {
            Self::Deposited { user, .. }
            | Self::Withdrawn { user, .. }
            | Self::Claimed { user, .. }
            | Self::RedepositedFromClaimable { user, .. }
            | Self::HabitCreated { user, .. }
            | Self::HabitArchived { user, .. }
            | Self::DayPrepared { user, .. }
            | Self::CheckedIn { user, .. }
            | Self::SettledSuccess { user, .. }
            | Self::SettledFail { user, .. }
            | Self::BatchSettled { user, .. } => user,
        }
    }

    /// Short snake_case name, matching the serialized variant key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deposited { .. } => "deposited",
            Self::Withdrawn { .. } => "withdrawn",
            Self::Claimed { .. } => "claimed",
            Self::RedepositedFromClaimable { .. } => "redeposited_from_claimable",
            Self::HabitCreated { .. } => "habit_created",
            Self::HabitArchived { .. } => "habit_archived",
            Self::DayPrepared { .. } => "day_prepared",
            Self::CheckedIn { .. } => "checked_in",
            Self::SettledSuccess { .. } => "settled_success",
            Self::SettledFail { .. } => "settled_fail",
            Self::BatchSettled { .. } => "batch_settled",
        }
    }
}
