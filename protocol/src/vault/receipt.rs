//! Stake and unstake receipts, the global round state, and roll summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::INITIAL_ROUND;
use crate::share_math::{assets_to_shares, MathError};

// ---------------------------------------------------------------------------
// VaultState
// ---------------------------------------------------------------------------

/// Global round counters.
///
/// `total_pending` always equals the sum of `StakeReceipt::amount` over the
/// receipts stamped with the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    pub round: u16,
    pub total_pending: u64,
}

impl Default for VaultState {
    fn default() -> Self {
        Self {
            round: INITIAL_ROUND,
            total_pending: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// StakeReceipt
// ---------------------------------------------------------------------------

/// Where a stake receipt stands relative to the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakePhase {
    /// Nothing pending. Unredeemed shares may still be present.
    Empty,
    /// Assets staked this round, still cancellable through instant unstake.
    PendingThisRound { amount: u64 },
    /// Assets staked in a round that has since closed. They convert at that
    /// round's recorded price on the next touch.
    Settled { round: u16 },
}

/// An account's pending stake and its not-yet-redeemed shares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeReceipt {
    /// Round in which `amount` was staked.
    pub round: u16,
    /// Pending asset value, not yet converted to shares.
    pub amount: u64,
    /// Shares converted from earlier rounds, owed to the account.
    pub unredeemed_shares: u64,
}

impl StakeReceipt {
    pub fn phase(&self, current_round: u16) -> StakePhase {
        if self.amount == 0 {
            StakePhase::Empty
        } else if self.round == current_round {
            StakePhase::PendingThisRound {
                amount: self.amount,
            }
        } else {
            StakePhase::Settled { round: self.round }
        }
    }

    /// Converts the pending amount into unredeemed shares at `price`.
    ///
    /// Returns the shares credited. The receipt keeps its round stamp.
    pub fn settle(&mut self, price: u128, decimals: u8) -> Result<u64, MathError> {
        let shares = assets_to_shares(self.amount, price, decimals)?;
        let unredeemed = self
            .unredeemed_shares
            .checked_add(shares)
            .ok_or(MathError::Overflow)?;
        self.amount = 0;
        self.unredeemed_shares = unredeemed;
        Ok(shares)
    }

    pub fn is_empty(&self) -> bool {
        self.amount == 0 && self.unredeemed_shares == 0
    }
}

// ---------------------------------------------------------------------------
// UnstakeReceipt
// ---------------------------------------------------------------------------

/// Shares queued to leave the vault at the next roll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeReceipt {
    pub round: u16,
    pub shares: u64,
}

impl UnstakeReceipt {
    pub fn is_empty(&self) -> bool {
        self.shares == 0
    }

    /// Whether the queued shares were converted by a roll already.
    pub fn is_ready(&self, current_round: u16) -> bool {
        !self.is_empty() && self.round < current_round
    }
}

// ---------------------------------------------------------------------------
// RollSummary
// ---------------------------------------------------------------------------

/// Outcome of a successful round roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollSummary {
    /// The round that closed; `price_per_share` is recorded under it.
    pub closed_round: u16,
    /// The round now open.
    pub round: u16,
    pub price_per_share: u128,
    /// Shares created for the closed round's pending stakes.
    pub minted_shares: u64,
    /// Shares removed for the closed round's unstakes.
    pub burned_shares: u64,
    /// Wrapped units moved into the unstake reserve.
    pub released_assets: u64,
    pub yield_delta: i128,
    pub rolled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: u128 = 100_000_000;

    #[test]
    fn phase_tracks_round() {
        let receipt = StakeReceipt {
            round: 3,
            amount: 50,
            unredeemed_shares: 0,
        };
        assert_eq!(
            receipt.phase(3),
            StakePhase::PendingThisRound { amount: 50 }
        );
        assert_eq!(receipt.phase(4), StakePhase::Settled { round: 3 });
        assert_eq!(StakeReceipt::default().phase(9), StakePhase::Empty);
    }

    #[test]
    fn settle_accumulates_shares() {
        let mut receipt = StakeReceipt {
            round: 1,
            amount: 1_100,
            unredeemed_shares: 7,
        };
        let minted = receipt.settle(110_000_000, 8).unwrap();
        assert_eq!(minted, 1_000);
        assert_eq!(receipt.unredeemed_shares, 1_007);
        assert_eq!(receipt.amount, 0);
        assert_eq!(receipt.round, 1);
    }

    #[test]
    fn settle_with_missing_price_fails() {
        let mut receipt = StakeReceipt {
            round: 0,
            amount: 10,
            unredeemed_shares: 0,
        };
        assert_eq!(receipt.settle(0, 8), Err(MathError::DivisionByZero));
        assert_eq!(receipt.amount, 10);
        assert_eq!(receipt.settle(ONE, 8), Ok(10));
    }

    #[test]
    fn unstake_ready_after_round_passes() {
        let receipt = UnstakeReceipt {
            round: 2,
            shares: 5,
        };
        assert!(!receipt.is_ready(2));
        assert!(receipt.is_ready(3));
        assert!(!UnstakeReceipt::default().is_ready(10));
    }
}
