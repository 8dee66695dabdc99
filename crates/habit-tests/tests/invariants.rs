//! Property-based accounting suite for Habit Stake.
//!
//! Random sequences of calls from several users, interleaved with clock
//! movement and payment failures, are replayed against a fresh tracker.
//! After every call the global invariants must hold:
//!
//! - every user's buckets reconcile with deposits, withdrawals, and forfeits
//! - the treasury holds exactly the forfeited stakes
//! - a rejected call changes nothing and emits nothing
//! - `blocked` equals the stakes of funded, unsettled days
//! - a settled day's record never changes again
//! - every funded day carries exactly the configured stake
//! - preparing the same day twice changes nothing the second time

use std::collections::BTreeMap;

use proptest::prelude::*;

use habit_core::constants::{MAX_SETTLE_BATCH, SECONDS_PER_DAY, STAKE_PER_DAY};
use habit_core::status::{DailyStatus, DayKey};
use habit_core::types::{AccountId, Epoch};
use habit_tests::helpers::*;

const USERS: usize = 3;

#[derive(Debug, Clone)]
enum Op {
    Deposit(usize, u128),
    Withdraw(usize, u128),
    Claim(usize, u128),
    Redeposit(usize, u128),
    CreateHabit(usize),
    Archive(usize, u64),
    /// Epoch relative to now, may point into the future.
    Prepare(usize, i64),
    CheckIn(usize, u64, i64),
    Settle(usize, i64, u64),
    SettleAll(usize, i64, u32),
    Advance(u64),
    ToggleReject,
}

fn amount() -> impl Strategy<Value = u128> {
    prop_oneof![
        4 => (0u128..=40).prop_map(units),
        1 => 0u128..=1_000,
    ]
}

fn op() -> impl Strategy<Value = Op> {
    let who = 0..USERS;
    prop_oneof![
        3 => (who.clone(), amount()).prop_map(|(u, a)| Op::Deposit(u, a)),
        1 => (who.clone(), amount()).prop_map(|(u, a)| Op::Withdraw(u, a)),
        1 => (who.clone(), amount()).prop_map(|(u, a)| Op::Claim(u, a)),
        1 => (who.clone(), amount()).prop_map(|(u, a)| Op::Redeposit(u, a)),
        2 => who.clone().prop_map(Op::CreateHabit),
        1 => (who.clone(), 1u64..=4).prop_map(|(u, h)| Op::Archive(u, h)),
        3 => (who.clone(), -2i64..=1).prop_map(|(u, d)| Op::Prepare(u, d)),
        3 => (who.clone(), 1u64..=4, -1i64..=0).prop_map(|(u, h, d)| Op::CheckIn(u, h, d)),
        2 => (who.clone(), -3i64..=1, 1u64..=4).prop_map(|(u, d, h)| Op::Settle(u, d, h)),
        2 => (who, -3i64..=0, prop_oneof![0u32..=3, Just(MAX_SETTLE_BATCH + 1)])
            .prop_map(|(u, d, m)| Op::SettleAll(u, d, m)),
        2 => prop_oneof![Just(SECONDS_PER_DAY), 1u64..SECONDS_PER_DAY].prop_map(Op::Advance),
        1 => Just(Op::ToggleReject),
    ]
}

fn relative(now: Epoch, offset: i64) -> Epoch {
    now.saturating_add_signed(offset)
}

/// Lowest epoch any generated call can touch.
const FIRST_EPOCH: Epoch = START_EPOCH - 3;

/// Check that each user's `blocked` is exactly the recorded stakes of
/// funded, unsettled days, and that every funded day recorded the
/// configured stake.
fn assert_blocked_matches_statuses(t: &TestTracker, users: &[AccountId]) {
    let now = t.epoch_now();
    for u in users {
        let habits = t.all_habits(u).unwrap();
        let mut pending = 0u128;
        for epoch in FIRST_EPOCH..=now {
            for h in &habits {
                let status = t.daily_status(u, epoch, h.id).unwrap();
                assert!(!status.checked || status.funded, "checked without funding: {u} {epoch} {}", h.id);
                let expected = if status.funded { STAKE_PER_DAY } else { 0 };
                assert_eq!(status.stake, expected, "stake mismatch: {u} {epoch} {}", h.id);
                if status.is_pending() {
                    pending += status.stake;
                }
            }
        }
        assert_eq!(t.user_state(u).unwrap().blocked, pending, "blocked mismatch for {u}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn random_calls_preserve_accounting(ops in prop::collection::vec(op(), 1..60)) {
        let (mut t, clock) = tracker();
        let users: Vec<AccountId> = (1..=USERS as u8).map(user).collect();
        let mut reject = false;
        let mut settled: BTreeMap<DayKey, DailyStatus> = BTreeMap::new();

        for op in ops {
            let now = t.epoch_now();
            let before = snapshot(&t);
            t.drain_events();

            let ok = match op {
                Op::Deposit(u, a) => t.deposit(&users[u], a).is_ok(),
                Op::Withdraw(u, a) => t.withdraw(&users[u], a).is_ok(),
                Op::Claim(u, a) => t.claim(&users[u], a).is_ok(),
                Op::Redeposit(u, a) => t.redeposit_from_claimable(&users[u], a).is_ok(),
                Op::CreateHabit(u) => t.create_habit(&users[u], "Daily practice").is_ok(),
                Op::Archive(u, h) => t.archive_habit(&users[u], h).is_ok(),
                Op::Prepare(u, d) => {
                    let epoch = relative(now, d);
                    let first = t.prepare_day(&users[u], epoch);
                    if first.is_ok() {
                        let after_first = snapshot(&t);
                        let again = t.prepare_day(&users[u], epoch).unwrap();
                        prop_assert_eq!(again.prepared, 0);
                        prop_assert_eq!(snapshot(&t), after_first);
                    } else {
                        prop_assert!(epoch > now);
                    }
                    first.is_ok()
                }
                Op::CheckIn(u, h, d) => t.check_in(&users[u], h, relative(now, d)).is_ok(),
                Op::Settle(u, d, h) => {
                    let epoch = relative(now, d);
                    let result = t.settle(&users[u], epoch, h);
                    if result.is_ok() {
                        prop_assert!(epoch < now);
                        let status = t.daily_status(&users[u], epoch, h).unwrap();
                        prop_assert!(status.settled);
                        settled.insert(DayKey::new(users[u], epoch, h), status);
                    }
                    result.is_ok()
                }
                Op::SettleAll(u, d, m) => {
                    let epoch = relative(now, d);
                    match t.settle_all(&users[u], epoch, m) {
                        Ok(summary) => {
                            prop_assert!(summary.settled() <= m);
                            for h in t.all_habits(&users[u]).unwrap() {
                                let status = t.daily_status(&users[u], epoch, h.id).unwrap();
                                if status.settled {
                                    settled.entry(DayKey::new(users[u], epoch, h.id)).or_insert(status);
                                }
                            }
                            true
                        }
                        Err(_) => false,
                    }
                }
                Op::Advance(secs) => {
                    clock.advance(secs);
                    true
                }
                Op::ToggleReject => {
                    reject = !reject;
                    t.payments_mut().set_reject(reject);
                    true
                }
            };

            if !ok {
                prop_assert_eq!(snapshot(&t), before, "rejected call changed state");
                prop_assert!(t.drain_events().is_empty(), "rejected call emitted events");
            }
            assert_invariants(&t);
            assert_blocked_matches_statuses(&t, &users);
            for (key, recorded) in &settled {
                let status = t.daily_status(&key.user, key.epoch, key.habit_id).unwrap();
                prop_assert_eq!(&status, recorded, "settled day changed: {:?}", key);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prepare_funds_lowest_ids_first(deposit in 0u128..=60, habits in 1usize..=6) {
        let alice = user(1);
        let names: Vec<String> = (1..=habits).map(|i| format!("Habit {i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (mut t, _clock) = tracker_with_habits(&alice, deposit, &refs);

        let epoch = t.epoch_now();
        let summary = t.prepare_day(&alice, epoch).unwrap();
        let affordable = ((deposit / 10) as usize).min(habits);
        prop_assert_eq!(summary.prepared as usize, affordable);
        prop_assert_eq!(summary.skipped as usize, habits - affordable);
        for id in 1..=habits as u64 {
            let funded = t.daily_status(&alice, epoch, id).unwrap().funded;
            prop_assert_eq!(funded, id as usize <= affordable);
        }
        assert_invariants(&t);
    }
}
