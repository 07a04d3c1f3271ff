//! # Vault Module — Round-Based Share Accounting
//!
//! The vault turns wrapped units into shares, one round at a time. Stakes
//! wait as pending amounts until a keeper rolls the round; at that moment
//! the round's closing price-per-share is fixed and every pending stake of
//! the round converts at it.
//!
//! ## Architecture
//!
//! ```text
//! receipt.rs  — StakeReceipt / UnstakeReceipt, VaultState, RollSummary
//! ledger.rs   — VaultLedger: staking, unstaking, redemption, round rolls
//! ```
//!
//! ## Design Principles
//!
//! 1. **Conversion is lazy.** A roll records one price and mints the
//!    round's shares in aggregate. Individual receipts are converted the
//!    next time anyone touches them, at the price recorded for the round
//!    they were staked in.
//!
//! 2. **Prices are append-only.** `round_price_per_share[r]` is written once
//!    when round `r` closes and never again.
//!
//! 3. **The wrapper is owned, not shared.** The vault reaches wrapped
//!    balances only through [`WrapperLedger`](crate::wrapper::WrapperLedger)
//!    operations, acting as its keeper.

pub mod ledger;
pub mod receipt;

pub use ledger::VaultLedger;
pub use receipt::{RollSummary, StakePhase, StakeReceipt, UnstakeReceipt, VaultState};
