//! Protocol constants. All monetary values in base units (1 unit = 10^18 base units).

use crate::types::Amount;

/// Base units per whole currency unit.
pub const UNIT: Amount = 1_000_000_000_000_000_000;

/// Amount blocked per active habit per day.
pub const STAKE_PER_DAY: Amount = 10 * UNIT;

/// Length of one epoch in seconds.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Upper bound on `max_count` for batch settlement.
pub const MAX_SETTLE_BATCH: u32 = 50;

/// Minimum habit text length, in characters (inclusive).
pub const HABIT_TEXT_MIN_LEN: usize = 3;

/// Maximum habit text length, in characters (inclusive).
pub const HABIT_TEXT_MAX_LEN: usize = 100;

/// Default JSON-RPC port for the service.
pub const DEFAULT_RPC_PORT: u16 = 17450;
