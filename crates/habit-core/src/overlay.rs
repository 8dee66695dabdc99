//! Staging layer that makes each tracker call all-or-nothing.
//!
//! A [`StateOverlay`] reads through to a [`LedgerStore`] and keeps every
//! write in memory. A successful call turns the overlay into a single
//! [`ChangeSet`]; a failing call simply drops it, so the store never sees a
//! partial update.
//!
//! The overlay also exposes the daily status table primitives
//! (`mark_funded`, `mark_checked`, `mark_settled`) keyed by [`DayKey`].

use std::collections::BTreeMap;

use crate::error::TrackerError;
use crate::ledger::UserBalance;
use crate::state::{ChangeSet, LedgerStore};
use crate::status::{DailyStatus, DayKey};
use crate::types::{AccountId, Amount};

/// Copy-on-write view over a ledger store for the duration of one call.
pub struct StateOverlay<'a, S: LedgerStore + ?Sized> {
    store: &'a S,
    balances: BTreeMap<AccountId, UserBalance>,
    statuses: BTreeMap<DayKey, DailyStatus>,
    treasury_balance: Option<Amount>,
    holdings: Option<Amount>,
}

impl<'a, S: LedgerStore + ?Sized> StateOverlay<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            balances: BTreeMap::new(),
            statuses: BTreeMap::new(),
            treasury_balance: None,
            holdings: None,
        }
    }

    /// Current (staged or stored) balance of `user`.
    pub fn balance(&self, user: &AccountId) -> Result<UserBalance, TrackerError> {
        match self.balances.get(user) {
            Some(b) => Ok(*b),
            None => self.store.balance(user),
        }
    }

    /// Run `f` on a copy of `user`'s balance and stage the result only if
    /// `f` succeeds.
    pub fn update_balance<T>(
        &mut self,
        user: &AccountId,
        f: impl FnOnce(&mut UserBalance) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        let mut balance = self.balance(user)?;
        let out = f(&mut balance)?;
        self.balances.insert(*user, balance);
        Ok(out)
    }

    /// Current (staged or stored) daily status for `key`.
    pub fn status(&self, key: &DayKey) -> Result<DailyStatus, TrackerError> {
        match self.statuses.get(key) {
            Some(s) => Ok(*s),
            None => self.store.daily_status(key),
        }
    }

    pub fn mark_funded(&mut self, key: &DayKey, stake: Amount) -> Result<(), TrackerError> {
        self.update_status(key, |s| s.mark_funded(stake))
    }

    pub fn mark_checked(&mut self, key: &DayKey) -> Result<(), TrackerError> {
        self.update_status(key, DailyStatus::mark_checked)
    }

    pub fn mark_settled(&mut self, key: &DayKey) -> Result<(), TrackerError> {
        self.update_status(key, DailyStatus::mark_settled)
    }

    fn update_status(
        &mut self,
        key: &DayKey,
        f: impl FnOnce(&mut DailyStatus) -> Result<(), TrackerError>,
    ) -> Result<(), TrackerError> {
        let mut status = self.status(key)?;
        f(&mut status)?;
        self.statuses.insert(*key, status);
        Ok(())
    }

    pub fn treasury_balance(&self) -> Result<Amount, TrackerError> {
        match self.treasury_balance {
            Some(t) => Ok(t),
            None => self.store.treasury_balance(),
        }
    }

    pub fn credit_treasury(&mut self, amount: Amount) -> Result<(), TrackerError> {
        let treasury = self
            .treasury_balance()?
            .checked_add(amount)
            .ok_or(TrackerError::ArithmeticOverflow)?;
        self.treasury_balance = Some(treasury);
        Ok(())
    }

    pub fn holdings(&self) -> Result<Amount, TrackerError> {
        match self.holdings {
            Some(h) => Ok(h),
            None => self.store.holdings(),
        }
    }

    /// Funds entered the system.
    pub fn add_holdings(&mut self, amount: Amount) -> Result<(), TrackerError> {
        let holdings = self
            .holdings()?
            .checked_add(amount)
            .ok_or(TrackerError::ArithmeticOverflow)?;
        self.holdings = Some(holdings);
        Ok(())
    }

    /// Funds left the system (payout or forfeiture).
    pub fn sub_holdings(&mut self, amount: Amount) -> Result<(), TrackerError> {
        let have = self.holdings()?;
        let holdings = have.checked_sub(amount).ok_or_else(|| {
            TrackerError::InvariantViolation(format!("holdings {have} below outflow {amount}"))
        })?;
        self.holdings = Some(holdings);
        Ok(())
    }

    /// Whether nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
            && self.statuses.is_empty()
            && self.treasury_balance.is_none()
            && self.holdings.is_none()
    }

    /// The stored values of every record this overlay would overwrite.
    ///
    /// Applying the result after [`into_changes`](Self::into_changes) has
    /// been applied restores the store to its prior state.
    pub fn revert_changes(&self) -> Result<ChangeSet, TrackerError> {
        let mut revert = ChangeSet::default();
        for user in self.balances.keys() {
            revert.balances.insert(*user, self.store.balance(user)?);
        }
        for key in self.statuses.keys() {
            revert.statuses.insert(*key, self.store.daily_status(key)?);
        }
        if self.treasury_balance.is_some() {
            revert.treasury_balance = Some(self.store.treasury_balance()?);
        }
        if self.holdings.is_some() {
            revert.holdings = Some(self.store.holdings()?);
        }
        Ok(revert)
    }

    /// Consume the overlay, yielding everything it staged.
    pub fn into_changes(self) -> ChangeSet {
        ChangeSet {
            balances: self.balances,
            statuses: self.statuses,
            treasury_balance: self.treasury_balance,
            holdings: self.holdings,
        }
    }
}
