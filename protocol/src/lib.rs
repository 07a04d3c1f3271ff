// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Harbor Protocol — Core Library
//!
//! Accounting engine for a round-based yield vault sitting on top of a
//! wrapped asset with epoch-delayed withdrawals.
//!
//! ## Architecture
//!
//! Leaf-first:
//!
//! - **share_math** — Pure asset/share conversions. Always rounds down.
//! - **wrapper** — Wrapped balances, deposit gating, the withdrawal queue.
//! - **vault** — Stake/unstake receipts, round rolls, the price history.
//! - **capability** — Traits for the asset ledger and access control the
//!   core consumes, plus in-memory implementations.
//! - **engine** — `VaultService`: serialized, all-or-nothing transitions
//!   with snapshot persistence.
//! - **storage** — sled-backed snapshots and round prices.
//! - **config** — Protocol constants and the TOML vault config.
//! - **error** — The ledger error taxonomy.
//!
//! ## Design Philosophy
//!
//! 1. Integers only. Amounts are `u64`, prices `u128` fixed-point.
//! 2. Every conversion rounds towards the vault.
//! 3. A rejected operation changes nothing, anywhere.
//! 4. If it touches money, it has tests. Plural.

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod share_math;
pub mod storage;
pub mod vault;
pub mod wrapper;

pub use capability::{AccessControl, AccessList, AssetLedger, Capabilities, InMemoryAssetLedger};
pub use config::VaultConfig;
pub use engine::{AccountView, ServiceError, ServiceResult, VaultService, VaultSummary};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use vault::VaultLedger;
pub use wrapper::WrapperLedger;
