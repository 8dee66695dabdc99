//! Habit registry interface.
//!
//! The registry owns habit identity, text, and the archived flag. The
//! day-cycle engine only asks it which habits a user owns and whether they
//! are active.

use crate::constants::{HABIT_TEXT_MAX_LEN, HABIT_TEXT_MIN_LEN};
use crate::error::TrackerError;
use crate::types::{AccountId, Habit, HabitId};

/// Storage for habit records, keyed by `(owner, id)`.
pub trait HabitRegistry: Send + Sync {
    /// Look up a habit. Returns `None` if `owner` has no habit with this id.
    fn habit(&self, owner: &AccountId, id: HabitId) -> Result<Option<Habit>, TrackerError>;

    /// All habits of `owner`, archived included, in increasing id order.
    fn habits(&self, owner: &AccountId) -> Result<Vec<Habit>, TrackerError>;

    /// Insert or overwrite a habit record.
    fn put_habit(&mut self, habit: &Habit) -> Result<(), TrackerError>;

    /// Number of habits ever created by `owner`. Ids are never reused, so
    /// this is also the highest id.
    ///
    /// Default implementation counts [`habits`](Self::habits).
    fn habit_count(&self, owner: &AccountId) -> Result<u64, TrackerError> {
        Ok(self.habits(owner)?.len() as u64)
    }

    /// Number of habits of `owner` that are not archived.
    fn active_habit_count(&self, owner: &AccountId) -> Result<u64, TrackerError> {
        Ok(self.habits(owner)?.iter().filter(|h| h.is_active()).count() as u64)
    }
}

/// Check habit text length (in characters) against the inclusive bounds.
pub fn validate_habit_text(text: &str) -> Result<(), TrackerError> {
    let len = text.chars().count();
    if len < HABIT_TEXT_MIN_LEN {
        return Err(TrackerError::HabitTextTooShort { len });
    }
    if len > HABIT_TEXT_MAX_LEN {
        return Err(TrackerError::HabitTextTooLong { len });
    }
    Ok(())
}
