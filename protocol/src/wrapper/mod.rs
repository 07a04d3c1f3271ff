//! # Wrapper Module — Wrapped Balances & Epoch-Delayed Withdrawals
//!
//! The wrapper is where the underlying asset turns into wrapped units and
//! back. It owns three things nobody else may touch:
//!
//! ```text
//! ledger.rs   — wrapped balances, deposit gating, withdrawal queue, epoch
//! receipt.rs  — per-account WithdrawalReceipt and EpochSummary
//! ```
//!
//! ## Withdrawal Lifecycle
//!
//! 1. `initiate_withdrawal` burns wrapped units and opens (or extends) the
//!    account's receipt at the current epoch.
//! 2. The owner calls `process_withdrawals`, which recalls the batch from
//!    external custody and advances the epoch.
//! 3. `complete_withdrawal` pays the receipt out once its epoch has passed.
//!
//! Epochs only move in step 2, so every receipt opened before that call
//! matures at the same boundary.

pub mod ledger;
pub mod receipt;

pub use ledger::WrapperLedger;
pub use receipt::{EpochSummary, WithdrawalReceipt};
