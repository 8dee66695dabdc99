//! External payment primitive.
//!
//! The tracker never moves native currency itself. Withdrawals and claims
//! hand a [`Payout`] to a [`PaymentSink`] after the balance decrement has
//! been committed. Sinks are expected to be idempotent per payout.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use habit_core::types::{AccountId, Amount};

/// Which bucket a payout was drawn from.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayoutKind {
    Withdrawal,
    Claim,
}

/// An instruction to pay `amount` to `to`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Payout {
    pub to: AccountId,
    pub amount: Amount,
    pub kind: PayoutKind,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment rejected: {0}")] Rejected(String),
    #[error("payment I/O: {0}")] Io(String),
}

/// Sends funds out of the system.
pub trait PaymentSink: Send + Sync {
    /// Deliver `payout`. An error makes the tracker roll back the call.
    fn pay(&mut self, payout: &Payout) -> Result<(), PaymentError>;
}

/// Payment sink that records payouts in memory.
///
/// Used by tests and simulations. Can be switched into a rejecting mode to
/// exercise the rollback path.
#[derive(Debug, Default, Clone)]
pub struct RecordingPaymentSink {
    payouts: Vec<Payout>,
    reject: bool,
}

impl RecordingPaymentSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent payment fail (or succeed again).
    pub fn set_reject(&mut self, reject: bool) {
        self.reject = reject;
    }

    /// Payouts delivered so far, oldest first.
    pub fn payouts(&self) -> &[Payout] {
        &self.payouts
    }

    /// Sum delivered to `to`.
    pub fn total_paid_to(&self, to: &AccountId) -> Amount {
        self.payouts.iter().filter(|p| &p.to == to).map(|p| p.amount).sum()
    }
}

impl PaymentSink for RecordingPaymentSink {
    fn pay(&mut self, payout: &Payout) -> Result<(), PaymentError> {
        if self.reject {
            return Err(PaymentError::Rejected(format!("{} to {}", payout.amount, payout.to)));
        }
        self.payouts.push(payout.clone());
        Ok(())
    }
}
