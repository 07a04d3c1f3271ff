//! Withdrawal receipts and epoch summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account's queued withdrawal.
///
/// `amount` accumulates across initiations; `epoch` is always the epoch of
/// the most recent initiation. The whole amount is payable only once the
/// ledger's epoch is strictly greater than `epoch`, so a second initiation
/// restarts the clock for the first tranche too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    pub amount: u64,
    pub epoch: u32,
}

impl WithdrawalReceipt {
    pub fn is_empty(&self) -> bool {
        self.amount == 0
    }

    /// Whether the receipt can be paid out in `current_epoch`.
    pub fn is_mature(&self, current_epoch: u32) -> bool {
        !self.is_empty() && self.epoch < current_epoch
    }
}

/// Outcome of a successful `process_withdrawals` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// The epoch that just closed.
    pub closed_epoch: u32,
    /// The epoch now in effect.
    pub epoch: u32,
    /// Underlying recalled from custody for this batch.
    pub recalled: u64,
    /// Reserve available to matured receipts after the recall.
    pub reserve: u64,
    pub processed_at: DateTime<Utc>,
}
