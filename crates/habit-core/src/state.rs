//! Ledger storage interface and in-memory implementation.
//!
//! Provides the [`LedgerStore`] trait for balances, daily status records, and
//! the treasury/holdings aggregates. All writes go through
//! [`LedgerStore::apply`], which must commit a whole [`ChangeSet`] or nothing.
//! The [`MemoryStore`] is suitable for testing; the service uses RocksDB
//! (habit-node-lib).

use std::collections::{BTreeMap, HashMap};

use crate::error::TrackerError;
use crate::ledger::UserBalance;
use crate::registry::HabitRegistry;
use crate::status::{DailyStatus, DayKey};
use crate::types::{AccountId, Amount, Habit, HabitId};

/// A set of absolute record values to write in one atomic step.
///
/// Produced by [`StateOverlay::into_changes`](crate::overlay::StateOverlay::into_changes).
/// Records not mentioned are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// New balance records by user.
    pub balances: BTreeMap<AccountId, UserBalance>,
    /// New daily status records by key.
    pub statuses: BTreeMap<DayKey, DailyStatus>,
    /// New treasury balance, if it changed.
    pub treasury_balance: Option<Amount>,
    /// New total holdings, if they changed.
    pub holdings: Option<Amount>,
}

impl ChangeSet {
    /// Whether applying this change set would write nothing.
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
            && self.statuses.is_empty()
            && self.treasury_balance.is_none()
            && self.holdings.is_none()
    }
}

/// Mutable ledger storage.
///
/// Reads of absent records return the zero value: an untouched user has an
/// empty [`UserBalance`], an unprepared day has an all-false [`DailyStatus`].
///
/// Not thread-safe. Callers serialize access (the service wraps the
/// tracker in a `Mutex`).
pub trait LedgerStore: Send + Sync {
    /// Balance record of `user`.
    fn balance(&self, user: &AccountId) -> Result<UserBalance, TrackerError>;

    /// Daily status record for `key`.
    fn daily_status(&self, key: &DayKey) -> Result<DailyStatus, TrackerError>;

    /// Total forfeited to the treasury so far.
    fn treasury_balance(&self) -> Result<Amount, TrackerError>;

    /// Sum of every user's `free + blocked + claimable`.
    fn holdings(&self) -> Result<Amount, TrackerError>;

    /// Write every record in `changes`, all or nothing.
    fn apply(&mut self, changes: &ChangeSet) -> Result<(), TrackerError>;
}

/// In-memory ledger and habit storage for testing.
///
/// Stores everything in maps with no persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    balances: HashMap<AccountId, UserBalance>,
    statuses: HashMap<DayKey, DailyStatus>,
    /// Habits ordered by `(owner, id)` so per-owner scans come out sorted.
    habits: BTreeMap<(AccountId, HabitId), Habit>,
    treasury_balance: Amount,
    holdings: Amount,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a balance record.
    pub fn user_count(&self) -> usize {
        self.balances.len()
    }

    /// Number of daily status records.
    pub fn status_count(&self) -> usize {
        self.statuses.len()
    }

    /// Every user with a balance record.
    pub fn users(&self) -> Vec<AccountId> {
        let mut users: Vec<_> = self.balances.keys().copied().collect();
        users.sort();
        users
    }
}

impl LedgerStore for MemoryStore {
    fn balance(&self, user: &AccountId) -> Result<UserBalance, TrackerError> {
        Ok(self.balances.get(user).copied().unwrap_or_default())
    }

    fn daily_status(&self, key: &DayKey) -> Result<DailyStatus, TrackerError> {
        Ok(self.statuses.get(key).copied().unwrap_or_default())
    }

    fn treasury_balance(&self) -> Result<Amount, TrackerError> {
        Ok(self.treasury_balance)
    }

    fn holdings(&self) -> Result<Amount, TrackerError> {
        Ok(self.holdings)
    }

    fn apply(&mut self, changes: &ChangeSet) -> Result<(), TrackerError> {
        // Nothing below can fail, so the whole set lands or none of it does.
        for (user, balance) in &changes.balances {
            self.balances.insert(*user, *balance);
        }
        for (key, status) in &changes.statuses {
            self.statuses.insert(*key, *status);
        }
        if let Some(treasury) = changes.treasury_balance {
            self.treasury_balance = treasury;
        }
        if let Some(holdings) = changes.holdings {
            self.holdings = holdings;
        }
        Ok(())
    }
}

impl HabitRegistry for MemoryStore {
    fn habit(&self, owner: &AccountId, id: HabitId) -> Result<Option<Habit>, TrackerError> {
        Ok(self.habits.get(&(*owner, id)).cloned())
    }

    fn habits(&self, owner: &AccountId) -> Result<Vec<Habit>, TrackerError> {
        Ok(self
            .habits
            .range((*owner, HabitId::MIN)..=(*owner, HabitId::MAX))
            .map(|(_, h)| h.clone())
            .collect())
    }

    fn put_habit(&mut self, habit: &Habit) -> Result<(), TrackerError> {
        self.habits.insert((habit.owner, habit.id), habit.clone());
        Ok(())
    }

    fn habit_count(&self, owner: &AccountId) -> Result<u64, TrackerError> {
        Ok(self
            .habits
            .range((*owner, HabitId::MIN)..=(*owner, HabitId::MAX))
            .count() as u64)
    }
}
