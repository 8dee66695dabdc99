//! Standalone tests for the RocksDB store driven through the tracker.

use habit_core::constants::{STAKE_PER_DAY, UNIT};
use habit_core::error::TrackerError;
use habit_core::epoch::ManualClock;
use habit_core::overlay::StateOverlay;
use habit_core::registry::HabitRegistry;
use habit_core::state::LedgerStore;
use habit_core::status::DayKey;
use habit_core::types::AccountId;
use habit_engine::{HabitTracker, RecordingPaymentSink, TrackerConfig};
use habit_node_lib::storage::RocksStore;

const EPOCH: u64 = 20_000;

fn user(seed: u8) -> AccountId {
    AccountId([seed; 32])
}

fn tracker(
    path: &std::path::Path,
    clock: &ManualClock,
) -> HabitTracker<RocksStore, ManualClock, RecordingPaymentSink> {
    let store = RocksStore::open(path).unwrap();
    let config = TrackerConfig::new(user(0x7E)).unwrap();
    HabitTracker::new(store, clock.clone(), RecordingPaymentSink::new(), config)
}

#[test]
fn overlay_changes_land_in_one_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RocksStore::open(dir.path()).unwrap();
    let key = DayKey::new(user(1), EPOCH, 1);

    let changes = {
        let mut overlay = StateOverlay::new(&store);
        overlay.update_balance(&user(1), |b| b.deposit(30 * UNIT)).unwrap();
        overlay.add_holdings(30 * UNIT).unwrap();
        overlay.update_balance(&user(1), |b| b.block(STAKE_PER_DAY)).unwrap();
        overlay.mark_funded(&key, STAKE_PER_DAY).unwrap();
        // Nothing reaches the store before apply.
        assert_eq!(store.balance(&user(1)).unwrap().free, 0);
        overlay.into_changes()
    };
    store.apply(&changes).unwrap();

    let balance = store.balance(&user(1)).unwrap();
    assert_eq!(balance.free, 20 * UNIT);
    assert_eq!(balance.blocked, STAKE_PER_DAY);
    assert_eq!(store.holdings().unwrap(), 30 * UNIT);
    let status = store.daily_status(&key).unwrap();
    assert!(status.funded);
    assert_eq!(status.stake, STAKE_PER_DAY);
    assert_eq!(store.statuses_of(&user(1)).unwrap().len(), 1);
}

#[test]
fn tracker_over_rocksdb_reopens_consistently() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::at_epoch(EPOCH, 10);
    let (alice, bob) = (user(1), user(2));
    {
        let mut t = tracker(dir.path(), &clock);
        t.deposit(&alice, 50 * UNIT).unwrap();
        t.deposit(&bob, 15 * UNIT).unwrap();
        t.create_habit(&alice, "Swim").unwrap();
        t.create_habit(&bob, "Draw").unwrap();
        t.prepare_day(&alice, EPOCH).unwrap();
        t.prepare_day(&bob, EPOCH).unwrap();
        t.check_in(&alice, 1, EPOCH).unwrap();
        clock.advance_days(1);
        t.settle_all(&alice, EPOCH, 5).unwrap();
        t.settle_all(&bob, EPOCH, 5).unwrap();
        t.store().flush().unwrap();
    }

    let t = tracker(dir.path(), &clock);
    assert_eq!(t.store().users().unwrap(), vec![alice, bob]);
    assert_eq!(t.user_state(&alice).unwrap().claimable, STAKE_PER_DAY);
    assert_eq!(t.user_state(&bob).unwrap().free, 5 * UNIT);
    assert_eq!(t.treasury_balance().unwrap(), STAKE_PER_DAY);
    assert_eq!(t.contract_balance().unwrap(), 55 * UNIT);
    assert_eq!(t.store().habit_count(&alice).unwrap(), 1);
    for user in [alice, bob] {
        let b = t.balance(&user).unwrap();
        assert!(b.is_conserved());
    }
}

#[test]
fn rejected_payout_is_rolled_back_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::at_epoch(EPOCH, 10);
    let alice = user(1);
    {
        let mut t = tracker(dir.path(), &clock);
        t.deposit(&alice, 8 * UNIT).unwrap();
        t.payments_mut().set_reject(true);
        assert!(t.withdraw(&alice, 3 * UNIT).is_err());
        t.store().flush().unwrap();
    }

    let t = tracker(dir.path(), &clock);
    let balance = t.balance(&alice).unwrap();
    assert_eq!(balance.free, 8 * UNIT);
    assert_eq!(balance.total_withdrawn, 0);
    assert_eq!(t.contract_balance().unwrap(), 8 * UNIT);
}

#[test]
fn reopen_with_different_stake_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let treasury = user(0x7E);
    {
        let store = RocksStore::open(dir.path()).unwrap();
        store.bind_config(&TrackerConfig::new(treasury).unwrap()).unwrap();
        store.flush().unwrap();
    }

    let store = RocksStore::open(dir.path()).unwrap();
    let larger = TrackerConfig::with_stake(treasury, 2 * STAKE_PER_DAY).unwrap();
    assert_eq!(
        store.bind_config(&larger),
        Err(TrackerError::StakeMismatch { recorded: STAKE_PER_DAY, configured: 2 * STAKE_PER_DAY })
    );
    let smaller = TrackerConfig::with_stake(treasury, STAKE_PER_DAY / 2).unwrap();
    assert!(matches!(store.bind_config(&smaller), Err(TrackerError::StakeMismatch { .. })));
    store.bind_config(&TrackerConfig::new(treasury).unwrap()).unwrap();
}

#[test]
fn funded_days_settle_their_recorded_stake_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::at_epoch(EPOCH, 10);
    let alice = user(1);
    {
        let mut t = tracker(dir.path(), &clock);
        t.deposit(&alice, 30 * UNIT).unwrap();
        t.create_habit(&alice, "Swim").unwrap();
        t.create_habit(&alice, "Read").unwrap();
        t.prepare_day(&alice, EPOCH).unwrap();
        t.check_in(&alice, 1, EPOCH).unwrap();
        t.store().flush().unwrap();
    }
    clock.advance_days(1);

    // Bypass the metadata guard to drive the tracker with another stake.
    let store = RocksStore::open(dir.path()).unwrap();
    let config = TrackerConfig::with_stake(user(0x7E), 3 * STAKE_PER_DAY).unwrap();
    let mut t = HabitTracker::new(store, clock.clone(), RecordingPaymentSink::new(), config);
    let summary = t.settle_all(&alice, EPOCH, 5).unwrap();
    assert_eq!((summary.succeeded, summary.failed), (1, 1));

    let state = t.user_state(&alice).unwrap();
    assert_eq!(state.blocked, 0);
    assert_eq!(state.claimable, STAKE_PER_DAY);
    assert_eq!(state.free, 10 * UNIT);
    assert_eq!(t.treasury_balance().unwrap(), STAKE_PER_DAY);
    assert!(t.balance(&alice).unwrap().is_conserved());
}
