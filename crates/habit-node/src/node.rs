//! Service composition.
//!
//! The [`Node`] owns one [`HabitTracker`] over [`RocksStore`] and a
//! [`PayoutJournal`], behind a mutex so that every entry point runs as one
//! serialized step. Events of committed calls are re-published on a
//! `tokio::sync::broadcast` channel.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use habit_core::epoch::{Clock, SystemClock};
use habit_core::error::TrackerError;
use habit_core::events::TrackerEvent;
use habit_core::ledger::UserBalance;
use habit_core::status::DailyStatus;
use habit_core::types::{AccountId, Amount, Epoch, Habit, HabitId, UserState};
use habit_engine::{BatchSummary, HabitTracker, PrepareSummary, SettleOutcome};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::journal::PayoutJournal;
use crate::storage::RocksStore;

/// Capacity of the event broadcast channel. Slow subscribers lag.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

type NodeTracker = HabitTracker<RocksStore, Arc<dyn Clock>, PayoutJournal>;

/// A running Habit Stake service.
pub struct Node {
    tracker: Mutex<NodeTracker>,
    events: broadcast::Sender<TrackerEvent>,
    config: NodeConfig,
}

impl Node {
    /// Open the service with the system clock.
    pub fn open(config: NodeConfig) -> Result<Arc<Self>, NodeError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open the service with an injected clock.
    ///
    /// Creates the data directory, opens the ledger, and checks the
    /// configured treasury and stake against the ones recorded in the ledger.
    pub fn open_with_clock(config: NodeConfig, clock: Arc<dyn Clock>) -> Result<Arc<Self>, NodeError> {
        let tracker_config = config.tracker_config()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let store = RocksStore::open(config.db_path())?;
        store.bind_config(&tracker_config)?;
        let journal = PayoutJournal::open(config.journal_path())?;

        let tracker = HabitTracker::new(store, clock, journal, tracker_config);
        info!(epoch = tracker.epoch_now(), data_dir = ?config.data_dir, "node opened");

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Arc::new(Self { tracker: Mutex::new(tracker), events, config }))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Receive events of every call committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Run a mutating call under the lock and publish whatever it committed.
    fn with_tracker<T>(
        &self,
        f: impl FnOnce(&mut NodeTracker) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        let mut tracker = self.tracker.lock();
        let result = f(&mut tracker);
        for event in tracker.drain_events() {
            // No subscribers is not an error.
            let _ = self.events.send(event);
        }
        result
    }

    // --- Balance ledger ---

    pub fn deposit(&self, caller: &AccountId, amount: Amount) -> Result<UserBalance, TrackerError> {
        self.with_tracker(|t| t.deposit(caller, amount))
    }

    pub fn withdraw(&self, caller: &AccountId, amount: Amount) -> Result<UserBalance, TrackerError> {
        self.with_tracker(|t| t.withdraw(caller, amount))
    }

    pub fn claim(&self, caller: &AccountId, amount: Amount) -> Result<UserBalance, TrackerError> {
        self.with_tracker(|t| t.claim(caller, amount))
    }

    pub fn redeposit_from_claimable(&self, caller: &AccountId, amount: Amount) -> Result<UserBalance, TrackerError> {
        self.with_tracker(|t| t.redeposit_from_claimable(caller, amount))
    }

    // --- Habits ---

    pub fn create_habit(&self, caller: &AccountId, text: &str) -> Result<Habit, TrackerError> {
        self.with_tracker(|t| t.create_habit(caller, text))
    }

    pub fn archive_habit(&self, caller: &AccountId, habit_id: HabitId) -> Result<Habit, TrackerError> {
        self.with_tracker(|t| t.archive_habit(caller, habit_id))
    }

    // --- Day cycle ---

    pub fn prepare_day(&self, caller: &AccountId, epoch: Epoch) -> Result<PrepareSummary, TrackerError> {
        self.with_tracker(|t| t.prepare_day(caller, epoch))
    }

    pub fn check_in(&self, caller: &AccountId, habit_id: HabitId, epoch: Epoch) -> Result<(), TrackerError> {
        self.with_tracker(|t| t.check_in(caller, habit_id, epoch))
    }

    pub fn settle(&self, user: &AccountId, epoch: Epoch, habit_id: HabitId) -> Result<SettleOutcome, TrackerError> {
        self.with_tracker(|t| t.settle(user, epoch, habit_id))
    }

    pub fn settle_all(&self, user: &AccountId, epoch: Epoch, max_count: u32) -> Result<BatchSummary, TrackerError> {
        self.with_tracker(|t| t.settle_all(user, epoch, max_count))
    }

    // --- Views ---

    pub fn epoch_now(&self) -> Epoch {
        self.tracker.lock().epoch_now()
    }

    /// Current unix time according to the node's clock.
    pub fn now_secs(&self) -> u64 {
        self.tracker.lock().clock().now_secs()
    }

    pub fn balance(&self, user: &AccountId) -> Result<UserBalance, TrackerError> {
        self.tracker.lock().balance(user)
    }

    pub fn user_state(&self, user: &AccountId) -> Result<UserState, TrackerError> {
        self.tracker.lock().user_state(user)
    }

    pub fn daily_status(&self, user: &AccountId, epoch: Epoch, habit_id: HabitId) -> Result<DailyStatus, TrackerError> {
        self.tracker.lock().daily_status(user, epoch, habit_id)
    }

    pub fn total_user_funds(&self, user: &AccountId) -> Result<Amount, TrackerError> {
        self.tracker.lock().total_user_funds(user)
    }

    pub fn habit(&self, user: &AccountId, habit_id: HabitId) -> Result<Option<Habit>, TrackerError> {
        self.tracker.lock().habit(user, habit_id)
    }

    pub fn all_habits(&self, user: &AccountId) -> Result<Vec<Habit>, TrackerError> {
        self.tracker.lock().all_habits(user)
    }

    pub fn active_habits(&self, user: &AccountId) -> Result<Vec<Habit>, TrackerError> {
        self.tracker.lock().active_habits(user)
    }

    pub fn treasury(&self) -> AccountId {
        self.tracker.lock().treasury()
    }

    pub fn treasury_balance(&self) -> Result<Amount, TrackerError> {
        self.tracker.lock().treasury_balance()
    }

    pub fn contract_balance(&self) -> Result<Amount, TrackerError> {
        self.tracker.lock().contract_balance()
    }

    /// Flush the ledger to disk.
    pub fn flush(&self) -> Result<(), TrackerError> {
        self.tracker.lock().store().flush()
    }
}
