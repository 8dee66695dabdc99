//! Epoch resolution: wall-clock seconds to integer day indices.
//!
//! An epoch is `floor(unix_seconds / SECONDS_PER_DAY)`, so every boundary
//! falls on UTC midnight. The [`Clock`] trait is the only source of "now";
//! everything else here is pure arithmetic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};

use crate::constants::SECONDS_PER_DAY;
use crate::types::Epoch;

/// Source of the current time in whole Unix seconds.
pub trait Clock: Send + Sync {
    /// Current time as seconds since the Unix epoch.
    fn now_secs(&self) -> u64;

    /// Current epoch.
    ///
    /// Default implementation: [`epoch_at`]`(self.now_secs())`.
    fn epoch_now(&self) -> Epoch {
        epoch_at(self.now_secs())
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now_secs(&self) -> u64 {
        (**self).now_secs()
    }
}

/// Wall clock backed by `chrono::Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        // Pre-1970 system time maps to epoch 0.
        u64::try_from(Utc::now().timestamp()).unwrap_or(0)
    }
}

/// Manually driven clock for tests and simulations.
///
/// Clones share the same underlying time, so a test can keep one handle
/// while the tracker owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock frozen at `now_secs`.
    pub fn new(now_secs: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(now_secs)) }
    }

    /// Create a clock at `offset_secs` into the given epoch.
    pub fn at_epoch(epoch: Epoch, offset_secs: u64) -> Self {
        Self::new(epoch * SECONDS_PER_DAY + offset_secs)
    }

    /// Set the current time. Moving backwards is ignored.
    pub fn set(&self, now_secs: u64) {
        self.now.fetch_max(now_secs, Ordering::SeqCst);
    }

    /// Advance the clock by `secs`.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Advance the clock by whole days.
    pub fn advance_days(&self, days: u64) {
        self.advance(days * SECONDS_PER_DAY);
    }

    /// Jump to the first second of the next epoch.
    pub fn advance_to_next_epoch(&self) {
        let now = self.now_secs();
        self.set(epoch_start(epoch_at(now) + 1));
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Epoch containing the given Unix timestamp.
pub fn epoch_at(unix_secs: u64) -> Epoch {
    unix_secs / SECONDS_PER_DAY
}

/// First second of `epoch`, saturating at `u64::MAX`.
pub fn epoch_start(epoch: Epoch) -> u64 {
    epoch.saturating_mul(SECONDS_PER_DAY)
}

/// Seconds remaining until the next epoch boundary (UTC midnight).
///
/// Always in `1..=SECONDS_PER_DAY`.
pub fn seconds_until_next_epoch(unix_secs: u64) -> u64 {
    SECONDS_PER_DAY - unix_secs % SECONDS_PER_DAY
}

/// Calendar date (UTC) on which `epoch` falls, if representable.
pub fn epoch_to_date(epoch: Epoch) -> Option<NaiveDate> {
    let secs = epoch.checked_mul(SECONDS_PER_DAY)?;
    DateTime::from_timestamp(i64::try_from(secs).ok()?, 0).map(|dt| dt.date_naive())
}

/// Epoch of a calendar date (UTC). Dates before 1970-01-01 return `None`.
pub fn date_to_epoch(date: NaiveDate) -> Option<Epoch> {
    let secs = date.and_hms_opt(0, 0, 0)?.and_utc().timestamp();
    u64::try_from(secs).ok().map(epoch_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_zero_starts_at_unix_epoch() {
        assert_eq!(epoch_at(0), 0);
        assert_eq!(epoch_at(SECONDS_PER_DAY - 1), 0);
        assert_eq!(epoch_at(SECONDS_PER_DAY), 1);
    }

    #[test]
    fn epoch_start_inverts_epoch_at() {
        for epoch in [0u64, 1, 19_000, 20_377] {
            assert_eq!(epoch_at(epoch_start(epoch)), epoch);
            assert_eq!(epoch_at(epoch_start(epoch + 1) - 1), epoch);
        }
    }

    #[test]
    fn epoch_start_saturates() {
        assert_eq!(epoch_start(u64::MAX), u64::MAX);
    }

    #[test]
    fn seconds_until_next_epoch_bounds() {
        assert_eq!(seconds_until_next_epoch(0), SECONDS_PER_DAY);
        assert_eq!(seconds_until_next_epoch(SECONDS_PER_DAY - 1), 1);
        assert_eq!(seconds_until_next_epoch(SECONDS_PER_DAY + 60), SECONDS_PER_DAY - 60);
    }

    #[test]
    fn epoch_to_date_known_values() {
        assert_eq!(epoch_to_date(0), NaiveDate::from_ymd_opt(1970, 1, 1));
        // 2024-01-01T00:00:00Z = 1_704_067_200
        assert_eq!(epoch_to_date(19_723), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(epoch_to_date(u64::MAX), None);
    }

    #[test]
    fn date_to_epoch_roundtrip() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let epoch = date_to_epoch(date).unwrap();
        assert_eq!(epoch_to_date(epoch), Some(date));
    }

    #[test]
    fn date_before_1970_has_no_epoch() {
        let date = NaiveDate::from_ymd_opt(1969, 12, 31).unwrap();
        assert_eq!(date_to_epoch(date), None);
    }

    #[test]
    fn manual_clock_shares_time_across_clones() {
        let clock = ManualClock::at_epoch(100, 10);
        let handle = clock.clone();
        assert_eq!(clock.epoch_now(), 100);
        handle.advance_days(1);
        assert_eq!(clock.epoch_now(), 101);
    }

    #[test]
    fn manual_clock_never_moves_backwards() {
        let clock = ManualClock::new(1_000);
        clock.set(10);
        assert_eq!(clock.now_secs(), 1_000);
    }

    #[test]
    fn advance_to_next_epoch_lands_on_boundary() {
        let clock = ManualClock::at_epoch(42, 12_345);
        clock.advance_to_next_epoch();
        assert_eq!(clock.now_secs(), epoch_start(43));
        assert_eq!(clock.epoch_now(), 43);
    }

    #[test]
    fn arc_clock_delegates() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_epoch(7, 0));
        assert_eq!(clock.epoch_now(), 7);
    }

    #[test]
    fn system_clock_is_after_2020() {
        // 2020-01-01 is epoch 18_262.
        assert!(SystemClock.epoch_now() > 18_262);
    }
}
