//! # Ledger Errors
//!
//! One error enum for every transition on the wrapper and vault ledgers,
//! grouped into five kinds so callers can react by category:
//!
//! | Kind            | Meaning                                              |
//! |-----------------|------------------------------------------------------|
//! | `Authorization` | caller lacks whitelist / keeper / owner capability   |
//! | `Validation`    | zero, below minimum, above cap, above balance/shares |
//! | `Timing`        | epoch or round has not advanced far enough           |
//! | `Arithmetic`    | fixed-width overflow in a conversion                 |
//! | `Solvency`      | custody or reserve cannot cover the movement         |
//!
//! A transition that returns any of these has changed nothing.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capability::AssetError;
use crate::share_math::MathError;

/// Coarse classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Authorization,
    Validation,
    Timing,
    Arithmetic,
    Solvency,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Authorization => write!(f, "authorization"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Timing => write!(f, "timing"),
            ErrorKind::Arithmetic => write!(f, "arithmetic"),
            ErrorKind::Solvency => write!(f, "solvency"),
        }
    }
}

/// The privileged role a caller was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// The wrapper's registered keeper (normally the vault).
    WrapperKeeper,
    /// A round-rolling keeper.
    Keeper,
    Owner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::WrapperKeeper => write!(f, "wrapper keeper"),
            Role::Keeper => write!(f, "keeper"),
            Role::Owner => write!(f, "owner"),
        }
    }
}

/// Errors returned by ledger transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // -- Authorization ------------------------------------------------------
    #[error("account {0} is not whitelisted")]
    NotWhitelisted(String),

    #[error("unauthorized: {caller} is not the {role}")]
    Unauthorized { caller: String, role: Role },

    // -- Validation ---------------------------------------------------------
    #[error("zero-amount operations are not permitted")]
    ZeroAmount,

    #[error("vault total {total} would be below the minimum supply {minimum}")]
    BelowMinimumSupply { total: u64, minimum: u64 },

    #[error("vault total {total} would exceed the cap {cap}")]
    ExceedsCap { total: u64, cap: u64 },

    #[error("insufficient balance for {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        account: String,
        available: u64,
        requested: u64,
    },

    #[error("insufficient shares: available {available}, requested {requested}")]
    InsufficientShares { available: u64, requested: u64 },

    #[error("{amount} converts to nothing at the current price")]
    BelowConvertibleMinimum { amount: u64 },

    #[error("no withdrawal pending for {0}")]
    NoWithdrawalPending(String),

    #[error("no unstake pending for {0}")]
    NoUnstakePending(String),

    #[error("the underlying asset is not the native currency")]
    NativeUnsupported,

    // -- Timing -------------------------------------------------------------
    #[error("withdrawal opened in epoch {receipt_epoch} is not payable in epoch {current_epoch}")]
    WithdrawalNotReady {
        receipt_epoch: u32,
        current_epoch: u32,
    },

    #[error("unstake queued in round {receipt_round} has not settled (current round {current_round})")]
    UnstakeNotReady {
        receipt_round: u16,
        current_round: u16,
    },

    #[error("epoch counter exhausted")]
    EpochOverflow,

    #[error("round counter exhausted")]
    RoundOverflow,

    // -- Arithmetic ---------------------------------------------------------
    #[error("math error: {0}")]
    Math(#[from] MathError),

    // -- Solvency -----------------------------------------------------------
    #[error("insufficient vault balance: available {available}, requested {requested}")]
    InsufficientVaultBalance { available: u64, requested: u64 },

    #[error("insufficient reserve: available {available}, requested {requested}")]
    InsufficientReserve { available: u64, requested: u64 },

    // -- Collaborators ------------------------------------------------------
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),
}

impl LedgerError {
    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotWhitelisted(_) | LedgerError::Unauthorized { .. } => {
                ErrorKind::Authorization
            }
            LedgerError::ZeroAmount
            | LedgerError::BelowMinimumSupply { .. }
            | LedgerError::ExceedsCap { .. }
            | LedgerError::InsufficientBalance { .. }
            | LedgerError::InsufficientShares { .. }
            | LedgerError::BelowConvertibleMinimum { .. }
            | LedgerError::NoWithdrawalPending(_)
            | LedgerError::NoUnstakePending(_)
            | LedgerError::NativeUnsupported => ErrorKind::Validation,
            LedgerError::WithdrawalNotReady { .. }
            | LedgerError::UnstakeNotReady { .. }
            | LedgerError::EpochOverflow
            | LedgerError::RoundOverflow => ErrorKind::Timing,
            LedgerError::Math(_) => ErrorKind::Arithmetic,
            LedgerError::InsufficientVaultBalance { .. }
            | LedgerError::InsufficientReserve { .. } => ErrorKind::Solvency,
            LedgerError::Asset(asset) => match asset {
                AssetError::InsufficientAllowance { .. } | AssetError::InsufficientFunds { .. } => {
                    ErrorKind::Validation
                }
                AssetError::CustodyShortfall { .. } | AssetError::TransferFailed(_) => {
                    ErrorKind::Solvency
                }
            },
        }
    }
}

/// Shorthand for ledger results.
pub type LedgerResult<T> = Result<T, LedgerError>;
