//! The day-cycle engine.
//!
//! [`HabitTracker`] owns a store, a clock, and a payment sink, and exposes
//! every public entry point. Each mutating call stages its reads and writes
//! in a [`StateOverlay`] and commits them with a single
//! [`LedgerStore::apply`], so a call that returns `Err` has changed nothing.
//!
//! Per (user, epoch, habit) the life cycle is
//! `unfunded -> funded -> [checked] -> settled`:
//!
//! - `prepare_day` funds any epoch up to and including the current one
//! - `check_in` only applies to the current epoch
//! - `settle` / `settle_all` only apply to epochs strictly in the past
//!
//! Withdrawals and claims commit the balance decrement before invoking the
//! payment sink. A failed payment is undone with a compensating change set.

use std::cmp::Ordering;

use tracing::{debug, info, warn};

use habit_core::constants::MAX_SETTLE_BATCH;
use habit_core::epoch::Clock;
use habit_core::error::TrackerError;
use habit_core::events::TrackerEvent;
use habit_core::ledger::UserBalance;
use habit_core::overlay::StateOverlay;
use habit_core::registry::{validate_habit_text, HabitRegistry};
use habit_core::state::{ChangeSet, LedgerStore};
use habit_core::status::{DailyStatus, DayKey};
use habit_core::types::{AccountId, Amount, Epoch, Habit, HabitId, UserState};

use crate::config::TrackerConfig;
use crate::payment::{PaymentSink, Payout, PayoutKind};

/// Result of [`HabitTracker::prepare_day`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrepareSummary {
    /// Habits newly funded by this call.
    pub prepared: u32,
    /// Active, unfunded habits left unfunded for lack of free balance.
    pub skipped: u32,
}

/// How a single day was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Checked in: the stake moved to claimable.
    Success { reward: Amount },
    /// Not checked in: the stake went to the treasury.
    Fail { slashed: Amount },
}

impl SettleOutcome {
    fn event(&self, key: &DayKey) -> TrackerEvent {
        match *self {
            Self::Success { reward } => TrackerEvent::SettledSuccess {
                user: key.user,
                habit_id: key.habit_id,
                epoch: key.epoch,
                reward,
            },
            Self::Fail { slashed } => TrackerEvent::SettledFail {
                user: key.user,
                habit_id: key.habit_id,
                epoch: key.epoch,
                slashed,
            },
        }
    }
}

/// Result of [`HabitTracker::settle_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub succeeded: u32,
    pub failed: u32,
}

impl BatchSummary {
    /// Days finalized by the batch.
    pub fn settled(&self) -> u32 {
        self.succeeded + self.failed
    }
}

/// Finalize one funded, unsettled day inside an overlay.
///
/// Releases the stake recorded when the day was funded, whatever the
/// tracker's stake is now.
fn settle_day<S: LedgerStore + ?Sized>(
    overlay: &mut StateOverlay<'_, S>,
    key: &DayKey,
) -> Result<SettleOutcome, TrackerError> {
    let status = overlay.status(key)?;
    if !status.funded {
        return Err(TrackerError::DayNotFunded { epoch: key.epoch, habit_id: key.habit_id });
    }
    if status.settled {
        return Err(TrackerError::AlreadySettled { epoch: key.epoch, habit_id: key.habit_id });
    }
    let stake = status.stake;

    let outcome = if status.checked {
        overlay.update_balance(&key.user, |b| b.unblock_to_claimable(stake))?;
        SettleOutcome::Success { reward: stake }
    } else {
        overlay.update_balance(&key.user, |b| b.forfeit_blocked(stake))?;
        overlay.credit_treasury(stake)?;
        overlay.sub_holdings(stake)?;
        SettleOutcome::Fail { slashed: stake }
    };
    overlay.mark_settled(key)?;
    Ok(outcome)
}

/// Habit staking tracker: balance ledger, habit registry access, and the
/// daily prepare / check-in / settle cycle.
///
/// Methods take `&mut self`, so calls on one tracker are strictly
/// serialized; wrap it in a mutex to share it.
pub struct HabitTracker<S, C, P> {
    store: S,
    clock: C,
    payments: P,
    config: TrackerConfig,
    /// Events of committed calls not yet drained.
    events: Vec<TrackerEvent>,
}

impl<S, C, P> HabitTracker<S, C, P>
where
    S: LedgerStore + HabitRegistry,
    C: Clock,
    P: PaymentSink,
{
    /// Create a tracker over existing storage.
    pub fn new(store: S, clock: C, payments: P, config: TrackerConfig) -> Self {
        info!(treasury = %config.treasury(), stake = %config.stake_per_day(), "habit tracker initialized");
        Self { store, clock, payments, config, events: Vec::new() }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give the store back, dropping the tracker.
    pub fn into_store(self) -> S {
        self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn payments(&self) -> &P {
        &self.payments
    }

    pub fn payments_mut(&mut self) -> &mut P {
        &mut self.payments
    }

    /// Current epoch according to the tracker's clock.
    pub fn epoch_now(&self) -> Epoch {
        self.clock.epoch_now()
    }

    /// Take every event recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<TrackerEvent> {
        std::mem::take(&mut self.events)
    }

    fn record(&mut self, events: impl IntoIterator<Item = TrackerEvent>) {
        for event in events {
            info!(kind = event.name(), user = %event.user(), ?event, "committed");
            self.events.push(event);
        }
    }

    fn commit(
        &mut self,
        changes: ChangeSet,
        events: impl IntoIterator<Item = TrackerEvent>,
    ) -> Result<(), TrackerError> {
        if !changes.is_empty() {
            self.store.apply(&changes)?;
        }
        self.record(events);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Balance ledger
    // ------------------------------------------------------------------

    /// Add `amount` to the caller's free balance.
    pub fn deposit(&mut self, caller: &AccountId, amount: Amount) -> Result<UserBalance, TrackerError> {
        let (changes, balance) = {
            let mut overlay = StateOverlay::new(&self.store);
            let balance = overlay.update_balance(caller, |b| {
                b.deposit(amount)?;
                Ok(*b)
            })?;
            overlay.add_holdings(amount)?;
            (overlay.into_changes(), balance)
        };
        self.commit(changes, [TrackerEvent::Deposited { user: *caller, amount }])?;
        Ok(balance)
    }

    /// Pay `amount` of free balance out to the caller.
    pub fn withdraw(&mut self, caller: &AccountId, amount: Amount) -> Result<UserBalance, TrackerError> {
        self.pay_out(caller, amount, PayoutKind::Withdrawal)
    }

    /// Pay `amount` of claimable balance out to the caller.
    pub fn claim(&mut self, caller: &AccountId, amount: Amount) -> Result<UserBalance, TrackerError> {
        self.pay_out(caller, amount, PayoutKind::Claim)
    }

    /// Move `amount` from claimable back to free without paying anything out.
    pub fn redeposit_from_claimable(
        &mut self,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<UserBalance, TrackerError> {
        let (changes, balance) = {
            let mut overlay = StateOverlay::new(&self.store);
            let balance = overlay.update_balance(caller, |b| {
                b.redeposit_from_claimable(amount)?;
                Ok(*b)
            })?;
            (overlay.into_changes(), balance)
        };
        self.commit(changes, [TrackerEvent::RedepositedFromClaimable { user: *caller, amount }])?;
        Ok(balance)
    }

    fn pay_out(
        &mut self,
        caller: &AccountId,
        amount: Amount,
        kind: PayoutKind,
    ) -> Result<UserBalance, TrackerError> {
        let (changes, revert, balance) = {
            let mut overlay = StateOverlay::new(&self.store);
            let balance = overlay.update_balance(caller, |b| {
                match kind {
                    PayoutKind::Withdrawal => b.withdraw(amount)?,
                    PayoutKind::Claim => b.claim(amount)?,
                }
                Ok(*b)
            })?;
            overlay.sub_holdings(amount)?;
            let revert = overlay.revert_changes()?;
            (overlay.into_changes(), revert, balance)
        };

        // The decrement is durable before any funds move.
        self.store.apply(&changes)?;

        let payout = Payout { to: *caller, amount, kind };
        if let Err(e) = self.payments.pay(&payout) {
            warn!(user = %caller, amount = %amount, ?kind, error = %e, "payout failed, reverting");
            self.store.apply(&revert)?;
            return Err(TrackerError::PaymentFailed(e.to_string()));
        }

        let event = match kind {
            PayoutKind::Withdrawal => TrackerEvent::Withdrawn { user: *caller, amount },
            PayoutKind::Claim => TrackerEvent::Claimed { user: *caller, amount },
        };
        self.record([event]);
        Ok(balance)
    }

    // ------------------------------------------------------------------
    // Habit registry
    // ------------------------------------------------------------------

    /// Create a habit with the next sequential id for the caller.
    pub fn create_habit(&mut self, caller: &AccountId, text: &str) -> Result<Habit, TrackerError> {
        validate_habit_text(text)?;
        let id = self
            .store
            .habit_count(caller)?
            .checked_add(1)
            .ok_or(TrackerError::ArithmeticOverflow)?;
        let habit = Habit {
            id,
            owner: *caller,
            text: text.to_string(),
            created_at_epoch: self.epoch_now(),
            archived: false,
            archived_at_epoch: None,
        };
        self.store.put_habit(&habit)?;
        self.record([TrackerEvent::HabitCreated {
            user: *caller,
            habit_id: id,
            text: habit.text.clone(),
        }]);
        Ok(habit)
    }

    /// Archive one of the caller's habits. Already-funded days stay funded.
    pub fn archive_habit(&mut self, caller: &AccountId, habit_id: HabitId) -> Result<Habit, TrackerError> {
        let mut habit = self
            .store
            .habit(caller, habit_id)?
            .ok_or(TrackerError::NotHabitOwner(habit_id))?;
        if habit.archived {
            return Err(TrackerError::HabitAlreadyArchived(habit_id));
        }
        habit.archived = true;
        habit.archived_at_epoch = Some(self.epoch_now());
        self.store.put_habit(&habit)?;
        self.record([TrackerEvent::HabitArchived { user: *caller, habit_id }]);
        Ok(habit)
    }

    // ------------------------------------------------------------------
    // Day cycle
    // ------------------------------------------------------------------

    /// Block the stake for every active, unfunded habit of the caller on
    /// `epoch`, in increasing id order, as far as free balance allows.
    ///
    /// Habits that cannot be funded are counted as skipped; the call still
    /// succeeds. Repeating the call is a no-op for habits already funded.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::InvalidEpoch`] if `epoch` is in the future
    pub fn prepare_day(&mut self, caller: &AccountId, epoch: Epoch) -> Result<PrepareSummary, TrackerError> {
        let current = self.epoch_now();
        if epoch > current {
            return Err(TrackerError::InvalidEpoch { epoch, current });
        }
        let stake = self.config.stake_per_day();
        let habits = self.store.habits(caller)?;

        let (changes, summary) = {
            let mut overlay = StateOverlay::new(&self.store);
            let mut summary = PrepareSummary::default();
            for habit in habits.iter().filter(|h| h.is_active_at(epoch)) {
                let key = DayKey::new(*caller, epoch, habit.id);
                if overlay.status(&key)?.funded {
                    continue;
                }
                if !overlay.balance(caller)?.can_block(stake) {
                    debug!(user = %caller, epoch, habit_id = habit.id, "insufficient free balance, habit left unfunded");
                    summary.skipped += 1;
                    continue;
                }
                overlay.update_balance(caller, |b| b.block(stake))?;
                overlay.mark_funded(&key, stake)?;
                summary.prepared += 1;
            }
            (overlay.into_changes(), summary)
        };

        self.commit(changes, [TrackerEvent::DayPrepared {
            user: *caller,
            epoch,
            prepared: summary.prepared,
            skipped: summary.skipped,
        }])?;
        Ok(summary)
    }

    /// Confirm completion of a habit for the live epoch. Moves no funds.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::NotHabitOwner`] if the caller has no such habit
    /// - [`TrackerError::InvalidEpoch`] unless `epoch` is the current epoch
    /// - [`TrackerError::DayNotFunded`] if the day was never funded
    /// - [`TrackerError::AlreadyCheckedIn`] on a repeat check-in
    pub fn check_in(&mut self, caller: &AccountId, habit_id: HabitId, epoch: Epoch) -> Result<(), TrackerError> {
        if self.store.habit(caller, habit_id)?.is_none() {
            return Err(TrackerError::NotHabitOwner(habit_id));
        }
        let current = self.epoch_now();
        if epoch != current {
            return Err(TrackerError::InvalidEpoch { epoch, current });
        }
        let key = DayKey::new(*caller, epoch, habit_id);

        let changes = {
            let mut overlay = StateOverlay::new(&self.store);
            let status = overlay.status(&key)?;
            if !status.funded {
                return Err(TrackerError::DayNotFunded { epoch, habit_id });
            }
            if status.checked {
                return Err(TrackerError::AlreadyCheckedIn { epoch, habit_id });
            }
            overlay.mark_checked(&key)?;
            overlay.into_changes()
        };
        self.commit(changes, [TrackerEvent::CheckedIn { user: *caller, habit_id, epoch }])
    }

    /// Finalize one past day of one habit of `user`. Any caller may do this.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::CannotSettleCurrentDay`] if `epoch` is the current epoch
    /// - [`TrackerError::InvalidEpoch`] if `epoch` is in the future
    /// - [`TrackerError::DayNotFunded`] if the day was never funded
    /// - [`TrackerError::AlreadySettled`] on a repeat settlement
    pub fn settle(&mut self, user: &AccountId, epoch: Epoch, habit_id: HabitId) -> Result<SettleOutcome, TrackerError> {
        self.ensure_settleable(epoch)?;
        let key = DayKey::new(*user, epoch, habit_id);

        let (changes, outcome) = {
            let mut overlay = StateOverlay::new(&self.store);
            let outcome = settle_day(&mut overlay, &key)?;
            (overlay.into_changes(), outcome)
        };
        self.commit(changes, [outcome.event(&key)])?;
        Ok(outcome)
    }

    /// Finalize up to `max_count` pending days of `user` on `epoch`, in
    /// increasing habit id order. Any caller may do this.
    ///
    /// Archived, unfunded, and already-settled habits are skipped without
    /// error and do not count towards `max_count`, so repeated calls drain
    /// a backlog.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::InvalidBatchSize`] unless `1 <= max_count <= MAX_SETTLE_BATCH`
    /// - the epoch errors of [`settle`](Self::settle)
    pub fn settle_all(&mut self, user: &AccountId, epoch: Epoch, max_count: u32) -> Result<BatchSummary, TrackerError> {
        if max_count == 0 || max_count > MAX_SETTLE_BATCH {
            return Err(TrackerError::InvalidBatchSize(max_count));
        }
        self.ensure_settleable(epoch)?;
        let habits = self.store.habits(user)?;

        let (changes, summary, events) = {
            let mut overlay = StateOverlay::new(&self.store);
            let mut summary = BatchSummary::default();
            let mut events = Vec::new();
            for habit in &habits {
                if summary.settled() >= max_count {
                    break;
                }
                if !habit.is_active() {
                    continue;
                }
                let key = DayKey::new(*user, epoch, habit.id);
                if !overlay.status(&key)?.is_pending() {
                    continue;
                }
                let outcome = settle_day(&mut overlay, &key)?;
                match outcome {
                    SettleOutcome::Success { .. } => summary.succeeded += 1,
                    SettleOutcome::Fail { .. } => summary.failed += 1,
                }
                events.push(outcome.event(&key));
            }
            events.push(TrackerEvent::BatchSettled { user: *user, epoch, settled: summary.settled() });
            (overlay.into_changes(), summary, events)
        };
        self.commit(changes, events)?;
        Ok(summary)
    }

    fn ensure_settleable(&self, epoch: Epoch) -> Result<(), TrackerError> {
        let current = self.epoch_now();
        match epoch.cmp(&current) {
            Ordering::Less => Ok(()),
            Ordering::Equal => Err(TrackerError::CannotSettleCurrentDay(epoch)),
            Ordering::Greater => Err(TrackerError::InvalidEpoch { epoch, current }),
        }
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub fn balance(&self, user: &AccountId) -> Result<UserBalance, TrackerError> {
        self.store.balance(user)
    }

    pub fn user_state(&self, user: &AccountId) -> Result<UserState, TrackerError> {
        let balance = self.store.balance(user)?;
        Ok(UserState {
            free: balance.free,
            blocked: balance.blocked,
            claimable: balance.claimable,
            active_habit_count: self.store.active_habit_count(user)?,
        })
    }

    pub fn daily_status(&self, user: &AccountId, epoch: Epoch, habit_id: HabitId) -> Result<DailyStatus, TrackerError> {
        self.store.daily_status(&DayKey::new(*user, epoch, habit_id))
    }

    /// `free + blocked + claimable` of `user`.
    pub fn total_user_funds(&self, user: &AccountId) -> Result<Amount, TrackerError> {
        self.store.balance(user)?.total_funds()
    }

    pub fn habit(&self, user: &AccountId, habit_id: HabitId) -> Result<Option<Habit>, TrackerError> {
        self.store.habit(user, habit_id)
    }

    /// Every habit of `user`, archived included.
    pub fn all_habits(&self, user: &AccountId) -> Result<Vec<Habit>, TrackerError> {
        self.store.habits(user)
    }

    pub fn active_habits(&self, user: &AccountId) -> Result<Vec<Habit>, TrackerError> {
        Ok(self.store.habits(user)?.into_iter().filter(Habit::is_active).collect())
    }

    pub fn treasury(&self) -> AccountId {
        self.config.treasury()
    }

    /// Total forfeited to the treasury.
    pub fn treasury_balance(&self) -> Result<Amount, TrackerError> {
        self.store.treasury_balance()
    }

    /// Funds currently held on behalf of all users.
    pub fn contract_balance(&self) -> Result<Amount, TrackerError> {
        self.store.holdings()
    }
}
