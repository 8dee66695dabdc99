//! RocksDB-backed persistent ledger storage.
//!
//! Implements [`LedgerStore`] and [`HabitRegistry`] using RocksDB column
//! families for balances, daily status records, habits, and metadata. Every
//! [`LedgerStore::apply`] is a single atomic [`WriteBatch`].
//!
//! Keys are fixed-width big-endian composites so that RocksDB's byte order
//! matches the logical order:
//!
//! | Column family | Key | Value |
//! |---|---|---|
//! | `balances` | `user` | bincode [`UserBalance`] |
//! | `daily_status` | `user \|\| epoch \|\| habit_id` | bincode [`DailyStatus`] |
//! | `habits` | `owner \|\| habit_id` | bincode [`Habit`] |
//! | `metadata` | name | little-endian integer or raw bytes |

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, SliceTransform, WriteBatch, DB};

use habit_core::error::TrackerError;
use habit_core::ledger::UserBalance;
use habit_core::registry::HabitRegistry;
use habit_core::state::{ChangeSet, LedgerStore};
use habit_core::status::{DailyStatus, DayKey};
use habit_core::types::{AccountId, Amount, Habit, HabitId};
use habit_engine::TrackerConfig;

// --- Column family names ---

const CF_BALANCES: &str = "balances";
const CF_DAILY_STATUS: &str = "daily_status";
const CF_HABITS: &str = "habits";
const CF_METADATA: &str = "metadata";

/// All column family names.
const ALL_CFS: &[&str] = &[CF_BALANCES, CF_DAILY_STATUS, CF_HABITS, CF_METADATA];

// --- Metadata keys ---

const META_TREASURY_BALANCE: &[u8] = b"treasury_balance";
const META_HOLDINGS: &[u8] = b"holdings";
const META_TREASURY_ACCOUNT: &[u8] = b"treasury_account";
const META_STAKE_PER_DAY: &[u8] = b"stake_per_day";

/// Length of a habit key: owner (32) || id (8).
const HABIT_KEY_LEN: usize = 40;

fn storage_err(e: impl std::fmt::Display) -> TrackerError {
    TrackerError::Storage(e.to_string())
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, TrackerError> {
    bincode::encode_to_vec(value, bincode::config::standard()).map_err(storage_err)
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, TrackerError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard()).map_err(storage_err)?;
    Ok(value)
}

/// Persistent ledger, daily status table, and habit registry.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates all column families if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| {
                let mut opts = Options::default();
                // Per-owner prefix scans over habits and status records.
                if *name == CF_HABITS || *name == CF_DAILY_STATUS {
                    opts.set_prefix_extractor(SliceTransform::create_fixed_prefix(32));
                }
                ColumnFamilyDescriptor::new(*name, opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors).map_err(storage_err)?;
        Ok(Self { db })
    }

    /// Record the tracker configuration on first use, or check it against
    /// the one recorded earlier.
    ///
    /// Treasury and stake are fixed for the lifetime of a ledger. Reopening
    /// with a different treasury fails with [`TrackerError::InvalidTreasury`],
    /// with a different stake with [`TrackerError::StakeMismatch`].
    pub fn bind_config(&self, config: &TrackerConfig) -> Result<(), TrackerError> {
        let cf = self.cf_handle(CF_METADATA)?;
        let treasury = config.treasury();
        let stake = config.stake_per_day();
        let mut batch = WriteBatch::default();

        match self.db.get_cf(cf, META_TREASURY_ACCOUNT).map_err(storage_err)? {
            Some(bytes) if bytes.as_slice() == treasury.as_bytes() => {}
            Some(bytes) => {
                tracing::error!(
                    recorded = %hex::encode(&bytes),
                    configured = %treasury,
                    "treasury differs from the one this ledger was created with"
                );
                return Err(TrackerError::InvalidTreasury);
            }
            None => batch.put_cf(cf, META_TREASURY_ACCOUNT, treasury.as_bytes()),
        }

        match self.db.get_cf(cf, META_STAKE_PER_DAY).map_err(storage_err)? {
            Some(_) => {
                let recorded = self.get_meta_u128(META_STAKE_PER_DAY)?;
                if recorded != stake {
                    tracing::error!(recorded, configured = stake, "stake differs from the one this ledger was created with");
                    return Err(TrackerError::StakeMismatch { recorded, configured: stake });
                }
            }
            None => batch.put_cf(cf, META_STAKE_PER_DAY, stake.to_le_bytes()),
        }

        if !batch.is_empty() {
            self.db.write(batch).map_err(storage_err)?;
        }
        Ok(())
    }

    /// Every user with a balance record, in key order.
    pub fn users(&self) -> Result<Vec<AccountId>, TrackerError> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let mut users = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item.map_err(storage_err)?;
            let bytes: [u8; 32] = key
                .as_ref()
                .try_into()
                .map_err(|_| TrackerError::Storage("invalid balance key length".into()))?;
            users.push(AccountId(bytes));
        }
        Ok(users)
    }

    /// Every daily status record of `user`, ordered by epoch then habit.
    pub fn statuses_of(&self, user: &AccountId) -> Result<Vec<(DayKey, DailyStatus)>, TrackerError> {
        let cf = self.cf_handle(CF_DAILY_STATUS)?;
        let prefix = user.as_bytes();
        let mut out = Vec::new();
        for item in self.db.prefix_iterator_cf(cf, prefix) {
            let (key, value) = item.map_err(storage_err)?;
            // prefix_iterator may overshoot into the next user.
            if !key.starts_with(prefix) {
                break;
            }
            let day = DayKey::from_bytes(&key)
                .ok_or_else(|| TrackerError::Storage("invalid daily status key".into()))?;
            out.push((day, decode(&value)?));
        }
        Ok(out)
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), TrackerError> {
        self.db.flush().map_err(storage_err)
    }

    // --- Internal helpers ---

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, TrackerError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| TrackerError::Storage(format!("missing column family: {name}")))
    }

    fn get_meta_u128(&self, key: &[u8]) -> Result<Amount, TrackerError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self.db.get_cf(cf, key).map_err(storage_err)? {
            Some(bytes) => {
                let arr: [u8; 16] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| TrackerError::Storage("invalid metadata value length".into()))?;
                Ok(u128::from_le_bytes(arr))
            }
            None => Ok(0),
        }
    }

    fn habit_key(owner: &AccountId, id: HabitId) -> [u8; HABIT_KEY_LEN] {
        let mut key = [0u8; HABIT_KEY_LEN];
        key[0..32].copy_from_slice(owner.as_bytes());
        key[32..40].copy_from_slice(&id.to_be_bytes());
        key
    }
}

impl LedgerStore for RocksStore {
    fn balance(&self, user: &AccountId) -> Result<UserBalance, TrackerError> {
        let cf = self.cf_handle(CF_BALANCES)?;
        match self.db.get_cf(cf, user.as_bytes()).map_err(storage_err)? {
            Some(bytes) => decode(&bytes),
            None => Ok(UserBalance::default()),
        }
    }

    fn daily_status(&self, key: &DayKey) -> Result<DailyStatus, TrackerError> {
        let cf = self.cf_handle(CF_DAILY_STATUS)?;
        match self.db.get_cf(cf, key.to_bytes()).map_err(storage_err)? {
            Some(bytes) => decode(&bytes),
            None => Ok(DailyStatus::default()),
        }
    }

    fn treasury_balance(&self) -> Result<Amount, TrackerError> {
        self.get_meta_u128(META_TREASURY_BALANCE)
    }

    fn holdings(&self) -> Result<Amount, TrackerError> {
        self.get_meta_u128(META_HOLDINGS)
    }

    fn apply(&mut self, changes: &ChangeSet) -> Result<(), TrackerError> {
        let cf_balances = self.cf_handle(CF_BALANCES)?;
        let cf_status = self.cf_handle(CF_DAILY_STATUS)?;
        let cf_meta = self.cf_handle(CF_METADATA)?;

        let mut batch = WriteBatch::default();
        for (user, balance) in &changes.balances {
            batch.put_cf(cf_balances, user.as_bytes(), encode(balance)?);
        }
        for (key, status) in &changes.statuses {
            batch.put_cf(cf_status, key.to_bytes(), encode(status)?);
        }
        if let Some(treasury) = changes.treasury_balance {
            batch.put_cf(cf_meta, META_TREASURY_BALANCE, treasury.to_le_bytes());
        }
        if let Some(holdings) = changes.holdings {
            batch.put_cf(cf_meta, META_HOLDINGS, holdings.to_le_bytes());
        }

        self.db.write(batch).map_err(storage_err)
    }
}

impl HabitRegistry for RocksStore {
    fn habit(&self, owner: &AccountId, id: HabitId) -> Result<Option<Habit>, TrackerError> {
        let cf = self.cf_handle(CF_HABITS)?;
        match self.db.get_cf(cf, Self::habit_key(owner, id)).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn habits(&self, owner: &AccountId) -> Result<Vec<Habit>, TrackerError> {
        let cf = self.cf_handle(CF_HABITS)?;
        let prefix = owner.as_bytes();
        let mut habits = Vec::new();
        for item in self.db.prefix_iterator_cf(cf, prefix) {
            let (key, value) = item.map_err(storage_err)?;
            if key.len() != HABIT_KEY_LEN || !key.starts_with(prefix) {
                break;
            }
            habits.push(decode(&value)?);
        }
        Ok(habits)
    }

    fn put_habit(&mut self, habit: &Habit) -> Result<(), TrackerError> {
        let cf = self.cf_handle(CF_HABITS)?;
        self.db
            .put_cf(cf, Self::habit_key(&habit.owner, habit.id), encode(habit)?)
            .map_err(storage_err)
    }
}
