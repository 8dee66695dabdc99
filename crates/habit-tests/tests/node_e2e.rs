//! End-to-end tests for the Habit Stake service.
//!
//! Each test opens a full node over RocksDB in a temp directory with a
//! manual clock. The RPC tests start the JSON-RPC server on a free local
//! port and drive it with the jsonrpsee HTTP client.

use std::net::TcpListener;
use std::sync::Arc;

use jsonrpsee::core::client::{ClientT, Error as ClientError};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};

use habit_core::constants::STAKE_PER_DAY;
use habit_core::epoch::ManualClock;
use habit_core::events::TrackerEvent;
use habit_core::types::AccountId;
use habit_node_lib::config::NodeConfig;
use habit_node_lib::journal::PayoutJournal;
use habit_node_lib::node::Node;
use habit_node_lib::rpc::{BalanceJson, BatchJson, DailyStatusJson, EpochJson, HabitJson, PrepareJson, SettleJson, TreasuryJson, UserStateJson};
use habit_node_lib::start_rpc_server;
use habit_tests::helpers::*;

/// Create a test node backed by a temp directory.
fn test_node() -> (Arc<Node>, ManualClock, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::at_epoch(START_EPOCH, 3_600);
    let config = NodeConfig {
        data_dir: dir.path().to_path_buf(),
        treasury: Some(treasury().to_string()),
        ..NodeConfig::default()
    };
    let node = Node::open_with_clock(config, Arc::new(clock.clone())).unwrap();
    (node, clock, dir)
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn rpc_node() -> (HttpClient, Arc<Node>, ManualClock, tempfile::TempDir, jsonrpsee::server::ServerHandle) {
    let (node, clock, dir) = test_node();
    let addr = format!("127.0.0.1:{}", free_port());
    let handle = start_rpc_server(&addr, node.clone()).await.unwrap();
    let client = HttpClientBuilder::default().build(format!("http://{addr}")).unwrap();
    (client, node, clock, dir, handle)
}

fn params(values: &[serde_json::Value]) -> ArrayParams {
    let mut params = ArrayParams::new();
    for v in values {
        params.insert(v).unwrap();
    }
    params
}

fn hex_of(account: &AccountId) -> serde_json::Value {
    serde_json::Value::String(account.to_string())
}

fn amount_str(n: u128) -> serde_json::Value {
    serde_json::Value::String(units(n).to_string())
}

fn error_code(err: ClientError) -> i32 {
    match err {
        ClientError::Call(obj) => obj.code(),
        other => panic!("expected a call error, got {other:?}"),
    }
}

// ------------------------------------------------------------------
// Node over RocksDB
// ------------------------------------------------------------------

#[test]
fn full_day_cycle_on_disk() {
    let (node, clock, _dir) = test_node();
    let alice = user(1);
    let mut events = node.subscribe();

    node.deposit(&alice, units(100)).unwrap();
    node.create_habit(&alice, "Exercise 30 minutes").unwrap();
    node.create_habit(&alice, "Read 10 pages").unwrap();

    let epoch = node.epoch_now();
    assert_eq!(node.prepare_day(&alice, epoch).unwrap().prepared, 2);
    node.check_in(&alice, 1, epoch).unwrap();
    clock.advance_days(1);

    let summary = node.settle_all(&alice, epoch, 50).unwrap();
    assert_eq!((summary.succeeded, summary.failed), (1, 1));

    let state = node.user_state(&alice).unwrap();
    assert_eq!(state.free, units(80));
    assert_eq!(state.claimable, units(10));
    assert_eq!(state.blocked, 0);
    assert_eq!(node.treasury_balance().unwrap(), STAKE_PER_DAY);
    assert_eq!(node.contract_balance().unwrap(), units(90));

    node.claim(&alice, units(10)).unwrap();
    let journal = PayoutJournal::read_entries(node.config().journal_path()).unwrap();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].payout.amount, units(10));
    assert_eq!(journal[0].payout.to, alice);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen.first(), Some(&TrackerEvent::Deposited { user: alice, amount: units(100) }));
    assert_eq!(seen.last(), Some(&TrackerEvent::Claimed { user: alice, amount: units(10) }));
    assert!(seen.contains(&TrackerEvent::BatchSettled { user: alice, epoch, settled: 2 }));
}

#[test]
fn rejected_calls_leave_disk_state_untouched() {
    let (node, _clock, _dir) = test_node();
    let alice = user(1);
    node.deposit(&alice, units(5)).unwrap();
    node.create_habit(&alice, "Meditate").unwrap();
    let before = node.balance(&alice).unwrap();

    assert!(node.withdraw(&alice, units(6)).is_err());
    assert!(node.create_habit(&alice, "ab").is_err());
    let epoch = node.epoch_now();
    assert_eq!(node.prepare_day(&alice, epoch).unwrap().skipped, 1);
    assert!(node.check_in(&alice, 1, epoch).is_err());

    assert_eq!(node.balance(&alice).unwrap(), before);
    assert_eq!(node.all_habits(&alice).unwrap().len(), 1);
    assert!(!node.daily_status(&alice, epoch, 1).unwrap().funded);
}

#[test]
fn habits_and_balances_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let alice = user(1);
    let config = NodeConfig {
        data_dir: dir.path().to_path_buf(),
        treasury: Some(treasury().to_string()),
        ..NodeConfig::default()
    };
    let clock = ManualClock::at_epoch(START_EPOCH, 60);
    {
        let node = Node::open_with_clock(config.clone(), Arc::new(clock.clone())).unwrap();
        node.deposit(&alice, units(40)).unwrap();
        node.create_habit(&alice, "Run").unwrap();
        node.create_habit(&alice, "Write").unwrap();
        node.archive_habit(&alice, 1).unwrap();
        node.prepare_day(&alice, START_EPOCH).unwrap();
        node.withdraw(&alice, units(5)).unwrap();
        node.flush().unwrap();
    }

    clock.advance_days(1);
    let node = Node::open_with_clock(config, Arc::new(clock)).unwrap();
    let active = node.active_habits(&alice).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, 2);
    assert_eq!(node.habit(&alice, 1).unwrap().unwrap().archived_at_epoch, Some(START_EPOCH));

    // The day prepared before the restart can be settled after it.
    assert!(node.daily_status(&alice, START_EPOCH, 2).unwrap().funded);
    node.settle(&alice, START_EPOCH, 2).unwrap();
    assert_eq!(node.total_user_funds(&alice).unwrap(), units(25));

    // Habit ids continue from the persisted count.
    assert_eq!(node.create_habit(&alice, "Cook").unwrap().id, 3);

    // Payout journal numbering continues as well.
    node.withdraw(&alice, units(1)).unwrap();
    let journal = PayoutJournal::read_entries(node.config().journal_path()).unwrap();
    assert_eq!(journal.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);
}

// ------------------------------------------------------------------
// JSON-RPC
// ------------------------------------------------------------------

#[tokio::test]
async fn rpc_day_cycle() {
    let (client, _node, clock, _dir, handle) = rpc_node().await;
    let alice = user(1);

    let balance: BalanceJson = client
        .request("deposit", params(&[hex_of(&alice), amount_str(100)]))
        .await
        .unwrap();
    assert_eq!(balance.free, units(100).to_string());

    let habit: HabitJson = client
        .request("createhabit", params(&[hex_of(&alice), "Exercise 30 minutes".into()]))
        .await
        .unwrap();
    assert_eq!(habit.id, 1);
    assert_eq!(habit.owner, alice.to_string());

    let prepared: PrepareJson = client.request("prepareday", params(&[hex_of(&alice)])).await.unwrap();
    assert_eq!((prepared.epoch, prepared.prepared, prepared.skipped), (START_EPOCH, 1, 0));

    let checked: bool = client.request("checkin", params(&[hex_of(&alice), 1.into()])).await.unwrap();
    assert!(checked);

    let status: DailyStatusJson = client
        .request("getdailystatus", params(&[hex_of(&alice), START_EPOCH.into(), 1.into()]))
        .await
        .unwrap();
    assert!(status.funded && status.checked && !status.settled);
    assert_eq!(status.stake, STAKE_PER_DAY.to_string());

    clock.advance_days(1);
    let epoch: EpochJson = client.request("epochnow", ArrayParams::new()).await.unwrap();
    assert_eq!(epoch.epoch, START_EPOCH + 1);

    let settled: SettleJson = client
        .request("settle", params(&[hex_of(&alice), START_EPOCH.into(), 1.into()]))
        .await
        .unwrap();
    assert_eq!(settled.outcome, "success");
    assert_eq!(settled.amount, STAKE_PER_DAY.to_string());

    let state: UserStateJson = client.request("getuserstate", params(&[hex_of(&alice)])).await.unwrap();
    assert_eq!(state.claimable, units(10).to_string());
    assert_eq!(state.free, units(90).to_string());
    assert_eq!(state.active_habit_count, 1);

    let funds: String = client.request("gettotaluserfunds", params(&[hex_of(&alice)])).await.unwrap();
    assert_eq!(funds, units(100).to_string());

    handle.stop().unwrap();
}

#[tokio::test]
async fn rpc_settle_all_and_treasury() {
    let (client, _node, clock, _dir, handle) = rpc_node().await;
    let alice = user(1);

    let _: BalanceJson = client
        .request("deposit", params(&[hex_of(&alice), amount_str(30)]))
        .await
        .unwrap();
    for text in ["Habit 1", "Habit 2", "Habit 3"] {
        let _: HabitJson = client.request("createhabit", params(&[hex_of(&alice), text.into()])).await.unwrap();
    }
    let _: PrepareJson = client
        .request("prepareday", params(&[hex_of(&alice), START_EPOCH.into()]))
        .await
        .unwrap();
    clock.advance_days(1);

    let batch: BatchJson = client
        .request("settleall", params(&[hex_of(&alice), START_EPOCH.into(), 2.into()]))
        .await
        .unwrap();
    assert_eq!((batch.settled, batch.failed), (2, 2));

    // Default batch size drains the rest.
    let batch: BatchJson = client
        .request("settleall", params(&[hex_of(&alice), START_EPOCH.into()]))
        .await
        .unwrap();
    assert_eq!(batch.settled, 1);

    let info: TreasuryJson = client.request("gettreasury", ArrayParams::new()).await.unwrap();
    assert_eq!(info.treasury, treasury().to_string());
    assert_eq!(info.balance, units(30).to_string());
    assert_eq!(info.contract_balance, "0");

    let active: Vec<HabitJson> = client.request("getactivehabits", params(&[hex_of(&alice)])).await.unwrap();
    assert_eq!(active.len(), 3);

    handle.stop().unwrap();
}

#[tokio::test]
async fn rpc_errors_carry_codes() {
    let (client, _node, _clock, _dir, handle) = rpc_node().await;
    let alice = user(1);

    // Malformed account.
    let err = client
        .request::<BalanceJson, _>("deposit", params(&["abcd".into(), amount_str(1)]))
        .await
        .unwrap_err();
    assert_eq!(error_code(err), -5);

    // Zero and malformed amounts.
    let err = client
        .request::<BalanceJson, _>("deposit", params(&[hex_of(&alice), "0".into()]))
        .await
        .unwrap_err();
    assert_eq!(error_code(err), -8);
    let err = client
        .request::<BalanceJson, _>("deposit", params(&[hex_of(&alice), "1.5".into()]))
        .await
        .unwrap_err();
    assert_eq!(error_code(err), -8);

    // Insufficient balance.
    let err = client
        .request::<BalanceJson, _>("withdraw", params(&[hex_of(&alice), amount_str(1)]))
        .await
        .unwrap_err();
    assert_eq!(error_code(err), -6);

    // Foreign habit.
    let err = client
        .request::<HabitJson, _>("archivehabit", params(&[hex_of(&alice), 7.into()]))
        .await
        .unwrap_err();
    assert_eq!(error_code(err), -10);

    // Current day cannot be settled.
    let err = client
        .request::<SettleJson, _>("settle", params(&[hex_of(&alice), START_EPOCH.into(), 1.into()]))
        .await
        .unwrap_err();
    assert_eq!(error_code(err), -25);

    // Batch size out of range.
    let err = client
        .request::<BatchJson, _>("settleall", params(&[hex_of(&alice), (START_EPOCH - 1).into(), 51.into()]))
        .await
        .unwrap_err();
    assert_eq!(error_code(err), -8);

    // Unknown habit reads as null.
    let missing: Option<HabitJson> = client
        .request("gethabit", params(&[hex_of(&alice), 1.into()]))
        .await
        .unwrap();
    assert!(missing.is_none());

    handle.stop().unwrap();
}
