//! JSON-RPC server for the Habit Stake service.
//!
//! Uses jsonrpsee 0.24. Accounts are 64-character hex strings. Amounts are
//! decimal strings of base units, since `u128` values do not survive a
//! round trip through JSON numbers in most clients.

use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};

use habit_core::constants::MAX_SETTLE_BATCH;
use habit_core::epoch::{epoch_to_date, seconds_until_next_epoch};
use habit_core::error::TrackerError;
use habit_core::ledger::UserBalance;
use habit_core::status::DailyStatus;
use habit_core::types::{AccountId, Amount, Habit, UserState};
use habit_engine::{BatchSummary, PrepareSummary, SettleOutcome};

use crate::error::NodeError;
use crate::node::Node;

// --- Error codes ---

const RPC_MISC_ERROR: i32 = -1;
const RPC_INVALID_ADDRESS: i32 = -5;
const RPC_INSUFFICIENT_FUNDS: i32 = -6;
const RPC_INVALID_PARAMETER: i32 = -8;
const RPC_NOT_OWNER: i32 = -10;
const RPC_STATE_REJECTED: i32 = -25;
const RPC_PAYMENT_FAILED: i32 = -30;

/// JSON representation of a user's balance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceJson {
    pub free: String,
    pub blocked: String,
    pub claimable: String,
    pub total_deposited: String,
    pub total_withdrawn: String,
    pub total_forfeited: String,
}

impl From<UserBalance> for BalanceJson {
    fn from(b: UserBalance) -> Self {
        Self {
            free: b.free.to_string(),
            blocked: b.blocked.to_string(),
            claimable: b.claimable.to_string(),
            total_deposited: b.total_deposited.to_string(),
            total_withdrawn: b.total_withdrawn.to_string(),
            total_forfeited: b.total_forfeited.to_string(),
        }
    }
}

/// JSON representation of [`UserState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStateJson {
    pub free: String,
    pub blocked: String,
    pub claimable: String,
    pub active_habit_count: u64,
}

impl From<UserState> for UserStateJson {
    fn from(s: UserState) -> Self {
        Self {
            free: s.free.to_string(),
            blocked: s.blocked.to_string(),
            claimable: s.claimable.to_string(),
            active_habit_count: s.active_habit_count,
        }
    }
}

/// JSON representation of [`DailyStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStatusJson {
    pub funded: bool,
    pub checked: bool,
    pub settled: bool,
    pub stake: String,
}

impl From<DailyStatus> for DailyStatusJson {
    fn from(s: DailyStatus) -> Self {
        Self { funded: s.funded, checked: s.checked, settled: s.settled, stake: s.stake.to_string() }
    }
}

/// JSON representation of a habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitJson {
    pub id: u64,
    /// Owner account as hex.
    pub owner: String,
    pub text: String,
    pub created_at_epoch: u64,
    pub archived: bool,
    pub archived_at_epoch: Option<u64>,
}

impl From<Habit> for HabitJson {
    fn from(h: Habit) -> Self {
        Self {
            id: h.id,
            owner: h.owner.to_string(),
            text: h.text,
            created_at_epoch: h.created_at_epoch,
            archived: h.archived,
            archived_at_epoch: h.archived_at_epoch,
        }
    }
}

/// JSON representation of a `prepareday` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareJson {
    pub epoch: u64,
    pub prepared: u32,
    pub skipped: u32,
}

/// JSON representation of a `settle` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleJson {
    /// "success" or "fail".
    pub outcome: String,
    /// Stake released to claimable, or forfeited to the treasury.
    pub amount: String,
}

impl From<SettleOutcome> for SettleJson {
    fn from(o: SettleOutcome) -> Self {
        match o {
            SettleOutcome::Success { reward } => Self { outcome: "success".into(), amount: reward.to_string() },
            SettleOutcome::Fail { slashed } => Self { outcome: "fail".into(), amount: slashed.to_string() },
        }
    }
}

/// JSON representation of a `settleall` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJson {
    pub settled: u32,
    pub succeeded: u32,
    pub failed: u32,
}

impl From<BatchSummary> for BatchJson {
    fn from(b: BatchSummary) -> Self {
        Self { settled: b.settled(), succeeded: b.succeeded, failed: b.failed }
    }
}

/// JSON representation of the current epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochJson {
    pub epoch: u64,
    /// UTC calendar date of the epoch (YYYY-MM-DD).
    pub date: Option<String>,
    pub seconds_until_next: u64,
}

/// JSON representation of the treasury and holdings views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryJson {
    /// Treasury account as hex.
    pub treasury: String,
    /// Total forfeited to the treasury.
    pub balance: String,
    /// Funds held on behalf of all users.
    pub contract_balance: String,
}

/// Parse a 64-character hex string into an AccountId.
pub fn parse_account(hex_str: &str) -> Result<AccountId, ErrorObjectOwned> {
    hex_str
        .parse()
        .map_err(|e| rpc_error(RPC_INVALID_ADDRESS, &format!("invalid account: {e}")))
}

/// Parse a decimal amount in base units.
pub fn parse_amount(s: &str) -> Result<Amount, ErrorObjectOwned> {
    s.trim()
        .parse::<Amount>()
        .map_err(|_| rpc_error(RPC_INVALID_PARAMETER, "amount must be a decimal integer of base units"))
}

/// Create a JSON-RPC error.
fn rpc_error(code: i32, msg: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, msg.to_string(), None::<()>)
}

/// Map a tracker error to a JSON-RPC error.
pub fn tracker_error(e: TrackerError) -> ErrorObjectOwned {
    let code = match &e {
        TrackerError::InvalidAmount
        | TrackerError::InvalidTreasury
        | TrackerError::HabitTextTooShort { .. }
        | TrackerError::HabitTextTooLong { .. }
        | TrackerError::InvalidEpoch { .. }
        | TrackerError::InvalidBatchSize(_) => RPC_INVALID_PARAMETER,
        TrackerError::InsufficientBalance { .. } => RPC_INSUFFICIENT_FUNDS,
        TrackerError::NotHabitOwner(_) => RPC_NOT_OWNER,
        TrackerError::HabitAlreadyArchived(_)
        | TrackerError::DayNotFunded { .. }
        | TrackerError::AlreadyCheckedIn { .. }
        | TrackerError::CannotSettleCurrentDay(_)
        | TrackerError::AlreadySettled { .. } => RPC_STATE_REJECTED,
        TrackerError::PaymentFailed(_) => RPC_PAYMENT_FAILED,
        TrackerError::ArithmeticOverflow
        | TrackerError::StakeMismatch { .. }
        | TrackerError::InvariantViolation(_)
        | TrackerError::Storage(_) => RPC_MISC_ERROR,
    };
    rpc_error(code, &e.to_string())
}

/// The Habit Stake JSON-RPC interface.
///
/// `caller` parameters name the acting user; authentication is left to the
/// deployment in front of this server.
#[rpc(server)]
pub trait HabitRpc {
    /// Adds funds to the caller's free balance.
    #[method(name = "deposit")]
    async fn deposit(&self, caller: String, amount: String) -> Result<BalanceJson, ErrorObjectOwned>;

    /// Pays out free balance to the caller.
    #[method(name = "withdraw")]
    async fn withdraw(&self, caller: String, amount: String) -> Result<BalanceJson, ErrorObjectOwned>;

    /// Pays out claimable balance to the caller.
    #[method(name = "claim")]
    async fn claim(&self, caller: String, amount: String) -> Result<BalanceJson, ErrorObjectOwned>;

    /// Moves claimable balance back to free.
    #[method(name = "redeposit")]
    async fn redeposit(&self, caller: String, amount: String) -> Result<BalanceJson, ErrorObjectOwned>;

    /// Creates a habit and returns it.
    #[method(name = "createhabit")]
    async fn create_habit(&self, caller: String, text: String) -> Result<HabitJson, ErrorObjectOwned>;

    /// Archives one of the caller's habits.
    #[method(name = "archivehabit")]
    async fn archive_habit(&self, caller: String, habit_id: u64) -> Result<HabitJson, ErrorObjectOwned>;

    /// Funds the caller's active habits for an epoch (default: current).
    #[method(name = "prepareday")]
    async fn prepare_day(&self, caller: String, epoch: Option<u64>) -> Result<PrepareJson, ErrorObjectOwned>;

    /// Checks in a habit for an epoch (default: current).
    #[method(name = "checkin")]
    async fn check_in(&self, caller: String, habit_id: u64, epoch: Option<u64>) -> Result<bool, ErrorObjectOwned>;

    /// Finalizes one past day of one habit.
    #[method(name = "settle")]
    async fn settle(&self, user: String, epoch: u64, habit_id: u64) -> Result<SettleJson, ErrorObjectOwned>;

    /// Finalizes up to `max_count` pending habits of a past day.
    #[method(name = "settleall")]
    async fn settle_all(&self, user: String, epoch: u64, max_count: Option<u32>) -> Result<BatchJson, ErrorObjectOwned>;

    /// Returns free/blocked/claimable and the active habit count.
    #[method(name = "getuserstate")]
    async fn get_user_state(&self, user: String) -> Result<UserStateJson, ErrorObjectOwned>;

    /// Returns the full balance record, lifetime counters included.
    #[method(name = "getbalance")]
    async fn get_balance(&self, user: String) -> Result<BalanceJson, ErrorObjectOwned>;

    /// Returns the funded/checked/settled flags of one day.
    #[method(name = "getdailystatus")]
    async fn get_daily_status(&self, user: String, epoch: u64, habit_id: u64) -> Result<DailyStatusJson, ErrorObjectOwned>;

    /// Returns free + blocked + claimable.
    #[method(name = "gettotaluserfunds")]
    async fn get_total_user_funds(&self, user: String) -> Result<String, ErrorObjectOwned>;

    /// Returns the current epoch.
    #[method(name = "epochnow")]
    async fn epoch_now(&self) -> Result<EpochJson, ErrorObjectOwned>;

    /// Returns one habit, or null.
    #[method(name = "gethabit")]
    async fn get_habit(&self, user: String, habit_id: u64) -> Result<Option<HabitJson>, ErrorObjectOwned>;

    /// Returns every habit, archived included.
    #[method(name = "getallhabits")]
    async fn get_all_habits(&self, user: String) -> Result<Vec<HabitJson>, ErrorObjectOwned>;

    /// Returns the habits that are not archived.
    #[method(name = "getactivehabits")]
    async fn get_active_habits(&self, user: String) -> Result<Vec<HabitJson>, ErrorObjectOwned>;

    /// Returns the treasury account, its balance, and total holdings.
    #[method(name = "gettreasury")]
    async fn get_treasury(&self) -> Result<TreasuryJson, ErrorObjectOwned>;
}

/// Implementation of the Habit Stake JSON-RPC server.
pub struct RpcServerImpl {
    node: Arc<Node>,
}

impl RpcServerImpl {
    /// Create a new RPC server implementation wrapping the given node.
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl HabitRpcServer for RpcServerImpl {
    async fn deposit(&self, caller: String, amount: String) -> Result<BalanceJson, ErrorObjectOwned> {
        let caller = parse_account(&caller)?;
        let amount = parse_amount(&amount)?;
        let balance = self.node.deposit(&caller, amount).map_err(tracker_error)?;
        Ok(balance.into())
    }

    async fn withdraw(&self, caller: String, amount: String) -> Result<BalanceJson, ErrorObjectOwned> {
        let caller = parse_account(&caller)?;
        let amount = parse_amount(&amount)?;
        let balance = self.node.withdraw(&caller, amount).map_err(tracker_error)?;
        Ok(balance.into())
    }

    async fn claim(&self, caller: String, amount: String) -> Result<BalanceJson, ErrorObjectOwned> {
        let caller = parse_account(&caller)?;
        let amount = parse_amount(&amount)?;
        let balance = self.node.claim(&caller, amount).map_err(tracker_error)?;
        Ok(balance.into())
    }

    async fn redeposit(&self, caller: String, amount: String) -> Result<BalanceJson, ErrorObjectOwned> {
        let caller = parse_account(&caller)?;
        let amount = parse_amount(&amount)?;
        let balance = self
            .node
            .redeposit_from_claimable(&caller, amount)
            .map_err(tracker_error)?;
        Ok(balance.into())
    }

    async fn create_habit(&self, caller: String, text: String) -> Result<HabitJson, ErrorObjectOwned> {
        let caller = parse_account(&caller)?;
        let habit = self.node.create_habit(&caller, &text).map_err(tracker_error)?;
        Ok(habit.into())
    }

    async fn archive_habit(&self, caller: String, habit_id: u64) -> Result<HabitJson, ErrorObjectOwned> {
        let caller = parse_account(&caller)?;
        let habit = self.node.archive_habit(&caller, habit_id).map_err(tracker_error)?;
        Ok(habit.into())
    }

    async fn prepare_day(&self, caller: String, epoch: Option<u64>) -> Result<PrepareJson, ErrorObjectOwned> {
        let caller = parse_account(&caller)?;
        let epoch = epoch.unwrap_or_else(|| self.node.epoch_now());
        let PrepareSummary { prepared, skipped } =
            self.node.prepare_day(&caller, epoch).map_err(tracker_error)?;
        Ok(PrepareJson { epoch, prepared, skipped })
    }

    async fn check_in(&self, caller: String, habit_id: u64, epoch: Option<u64>) -> Result<bool, ErrorObjectOwned> {
        let caller = parse_account(&caller)?;
        let epoch = epoch.unwrap_or_else(|| self.node.epoch_now());
        self.node.check_in(&caller, habit_id, epoch).map_err(tracker_error)?;
        Ok(true)
    }

    async fn settle(&self, user: String, epoch: u64, habit_id: u64) -> Result<SettleJson, ErrorObjectOwned> {
        let user = parse_account(&user)?;
        let outcome = self.node.settle(&user, epoch, habit_id).map_err(tracker_error)?;
        Ok(outcome.into())
    }

    async fn settle_all(&self, user: String, epoch: u64, max_count: Option<u32>) -> Result<BatchJson, ErrorObjectOwned> {
        let user = parse_account(&user)?;
        let max_count = max_count.unwrap_or(MAX_SETTLE_BATCH);
        let summary = self.node.settle_all(&user, epoch, max_count).map_err(tracker_error)?;
        Ok(summary.into())
    }

    async fn get_user_state(&self, user: String) -> Result<UserStateJson, ErrorObjectOwned> {
        let user = parse_account(&user)?;
        let state = self.node.user_state(&user).map_err(tracker_error)?;
        Ok(state.into())
    }

    async fn get_balance(&self, user: String) -> Result<BalanceJson, ErrorObjectOwned> {
        let user = parse_account(&user)?;
        let balance = self.node.balance(&user).map_err(tracker_error)?;
        Ok(balance.into())
    }

    async fn get_daily_status(&self, user: String, epoch: u64, habit_id: u64) -> Result<DailyStatusJson, ErrorObjectOwned> {
        let user = parse_account(&user)?;
        let status = self.node.daily_status(&user, epoch, habit_id).map_err(tracker_error)?;
        Ok(status.into())
    }

    async fn get_total_user_funds(&self, user: String) -> Result<String, ErrorObjectOwned> {
        let user = parse_account(&user)?;
        let total = self.node.total_user_funds(&user).map_err(tracker_error)?;
        Ok(total.to_string())
    }

    async fn epoch_now(&self) -> Result<EpochJson, ErrorObjectOwned> {
        let now = self.node.now_secs();
        let epoch = self.node.epoch_now();
        Ok(EpochJson {
            epoch,
            date: epoch_to_date(epoch).map(|d| d.format("%Y-%m-%d").to_string()),
            seconds_until_next: seconds_until_next_epoch(now),
        })
    }

    async fn get_habit(&self, user: String, habit_id: u64) -> Result<Option<HabitJson>, ErrorObjectOwned> {
        let user = parse_account(&user)?;
        let habit = self.node.habit(&user, habit_id).map_err(tracker_error)?;
        Ok(habit.map(HabitJson::from))
    }

    async fn get_all_habits(&self, user: String) -> Result<Vec<HabitJson>, ErrorObjectOwned> {
        let user = parse_account(&user)?;
        let habits = self.node.all_habits(&user).map_err(tracker_error)?;
        Ok(habits.into_iter().map(HabitJson::from).collect())
    }

    async fn get_active_habits(&self, user: String) -> Result<Vec<HabitJson>, ErrorObjectOwned> {
        let user = parse_account(&user)?;
        let habits = self.node.active_habits(&user).map_err(tracker_error)?;
        Ok(habits.into_iter().map(HabitJson::from).collect())
    }

    async fn get_treasury(&self) -> Result<TreasuryJson, ErrorObjectOwned> {
        let balance = self.node.treasury_balance().map_err(tracker_error)?;
        let held = self.node.contract_balance().map_err(tracker_error)?;
        Ok(TreasuryJson {
            treasury: self.node.treasury().to_string(),
            balance: balance.to_string(),
            contract_balance: held.to_string(),
        })
    }
}

/// Start the JSON-RPC server on the given address.
///
/// Returns a [`ServerHandle`] that can be used to stop the server.
pub async fn start_rpc_server(addr: &str, node: Arc<Node>) -> Result<ServerHandle, NodeError> {
    let server = Server::builder()
        .build(addr)
        .await
        .map_err(|e| NodeError::Rpc(e.to_string()))?;

    let rpc_impl = RpcServerImpl::new(node);
    let handle = server.start(rpc_impl.into_rpc());

    Ok(handle)
}
