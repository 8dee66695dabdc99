//! Shared test helpers for scenario, invariant, and service tests.

use habit_core::constants::UNIT;
use habit_core::epoch::ManualClock;
use habit_core::state::{LedgerStore, MemoryStore};
use habit_core::types::{AccountId, Amount, Epoch};
use habit_engine::{HabitTracker, RecordingPaymentSink, TrackerConfig};

/// Tracker over in-memory storage with a controllable clock.
pub type TestTracker = HabitTracker<MemoryStore, ManualClock, RecordingPaymentSink>;

/// Epoch the test clock starts in (2024-10-04).
pub const START_EPOCH: Epoch = 20_000;

/// Simple account id from a seed byte.
pub fn user(seed: u8) -> AccountId {
    AccountId([seed; 32])
}

/// Treasury account used by every test tracker.
pub fn treasury() -> AccountId {
    AccountId([0x7E; 32])
}

/// `n` whole units in base units.
pub fn units(n: u128) -> Amount {
    n * UNIT
}

/// Fresh tracker one hour into [`START_EPOCH`], with the default stake.
pub fn tracker() -> (TestTracker, ManualClock) {
    let clock = ManualClock::at_epoch(START_EPOCH, 3_600);
    let config = TrackerConfig::new(treasury()).expect("non-null treasury");
    let tracker = HabitTracker::new(MemoryStore::new(), clock.clone(), RecordingPaymentSink::new(), config);
    (tracker, clock)
}

/// Tracker where `who` has deposited `deposit` units and created `habits`.
pub fn tracker_with_habits(who: &AccountId, deposit: u128, habits: &[&str]) -> (TestTracker, ManualClock) {
    let (mut t, clock) = tracker();
    if deposit > 0 {
        t.deposit(who, units(deposit)).expect("deposit");
    }
    for text in habits {
        t.create_habit(who, text).expect("create habit");
    }
    (t, clock)
}

/// Global accounting snapshot of a tracker's store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub balances: Vec<(AccountId, habit_core::ledger::UserBalance)>,
    pub treasury_balance: Amount,
    pub holdings: Amount,
    pub status_count: usize,
}

/// Capture every balance record and the aggregates.
pub fn snapshot(t: &TestTracker) -> Snapshot {
    let store = t.store();
    Snapshot {
        balances: store
            .users()
            .into_iter()
            .map(|u| (u, store.balance(&u).expect("memory store read")))
            .collect(),
        treasury_balance: store.treasury_balance().expect("memory store read"),
        holdings: store.holdings().expect("memory store read"),
        status_count: store.status_count(),
    }
}

/// Check every accounting invariant that must hold between calls.
///
/// - each user's buckets equal deposits minus withdrawals minus forfeits
/// - the treasury holds exactly what users forfeited
/// - holdings equal the sum of every user's funds
/// - the payment sink paid out exactly what users withdrew or claimed
pub fn assert_invariants(t: &TestTracker) {
    let snap = snapshot(t);
    let mut forfeited: Amount = 0;
    let mut funds: Amount = 0;
    let mut withdrawn: Amount = 0;
    for (u, b) in &snap.balances {
        assert!(b.is_conserved(), "conservation broken for {u}: {b:?}");
        forfeited += b.total_forfeited;
        funds += b.total_funds().expect("no overflow in tests");
        withdrawn += b.total_withdrawn;
    }
    assert_eq!(snap.treasury_balance, forfeited, "treasury != sum of forfeits");
    assert_eq!(snap.holdings, funds, "holdings != sum of user funds");
    let paid: Amount = t.payments().payouts().iter().map(|p| p.amount).sum();
    assert_eq!(paid, withdrawn, "payouts != sum of withdrawals and claims");
}
