//! # Capabilities — External Collaborators
//!
//! The ledgers never move the underlying asset or decide who is allowed to
//! do what on their own. They consume two capabilities:
//!
//! - [`AssetLedger`] — moves the underlying asset between users, the
//!   wrapper's withdrawal reserve, and external custody.
//! - [`AccessControl`] — answers "is this account whitelisted / a keeper /
//!   the owner".
//!
//! Both are injected per call through [`Capabilities`], so the accounting
//! core can be driven by a live asset ledger in production and by the
//! in-memory implementations below in tests and on devnet.
//!
//! ## Custody Model
//!
//! ```text
//!  user ──transfer_in──▶ external custody ──recall_from_custody──▶ reserve ──transfer_out──▶ user
//! ```
//!
//! Deposits are forwarded to external custody immediately, and yield the
//! custodian earns is booked there when a round rolls. Only an epoch
//! advance recalls funds into the wrapper's reserve, which is what matured
//! withdrawal receipts are paid from.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by an [`AssetLedger`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    /// The account has not approved the wrapper for enough of the asset.
    #[error("insufficient allowance for {owner}: allowed {allowance}, requested {requested}")]
    InsufficientAllowance {
        owner: String,
        allowance: u64,
        requested: u64,
    },

    /// The account does not hold enough of the asset.
    #[error("insufficient funds for {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        account: String,
        available: u64,
        requested: u64,
    },

    /// External custody (or the wrapper's reserve) cannot cover the movement.
    #[error("custody shortfall: available {available}, requested {requested}")]
    CustodyShortfall { available: u64, requested: u64 },

    /// Any other failure reported by the underlying ledger.
    #[error("asset transfer failed: {0}")]
    TransferFailed(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Movement of the underlying (unwrapped) asset.
///
/// Every method is all-or-nothing: on `Err` no balance has changed.
pub trait AssetLedger: Send {
    /// Pulls `amount` from `from` (under a prior approval) into custody.
    fn transfer_in(&mut self, from: &str, amount: u64) -> Result<(), AssetError>;

    /// Accepts `amount` of native currency attached by `from`. No approval
    /// is involved; the value travels with the call.
    fn accept_native(&mut self, from: &str, amount: u64) -> Result<(), AssetError>;

    /// Pays `amount` out of the wrapper's reserve to `to`.
    fn transfer_out(&mut self, to: &str, amount: u64) -> Result<(), AssetError>;

    /// Moves `amount` from external custody into the wrapper's reserve.
    fn recall_from_custody(&mut self, amount: u64) -> Result<(), AssetError>;

    /// Books `amount` of yield earned by the custodian into custody. Called
    /// by a roll with positive yield, alongside the matching wrapped mint.
    fn realize_yield(&mut self, amount: u64) -> Result<(), AssetError>;
}

/// Authorization predicates.
pub trait AccessControl: Send + Sync {
    /// Whether `account` may transact. Only consulted in whitelist mode.
    fn is_whitelisted(&self, account: &str) -> bool;

    /// Whether `account` may roll rounds.
    fn is_keeper(&self, account: &str) -> bool;

    /// Whether `account` may advance epochs and change settings.
    fn is_owner(&self, account: &str) -> bool;
}

/// The capabilities handed to a single ledger transition.
pub struct Capabilities<'a> {
    pub assets: &'a mut dyn AssetLedger,
    pub access: &'a dyn AccessControl,
}

impl<'a> Capabilities<'a> {
    pub fn new(assets: &'a mut dyn AssetLedger, access: &'a dyn AccessControl) -> Self {
        Self { assets, access }
    }
}

// ---------------------------------------------------------------------------
// InMemoryAssetLedger
// ---------------------------------------------------------------------------

/// A self-contained underlying-asset ledger.
///
/// Tracks user balances, the approvals users have granted the wrapper, the
/// amount sitting in external custody, and the wrapper's withdrawal reserve.
/// Serializable so a devnet node can snapshot it next to the ledgers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryAssetLedger {
    balances: HashMap<String, u64>,
    allowances: HashMap<String, u64>,
    custody: u64,
    reserve: u64,
}

impl InMemoryAssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `amount` of the underlying to `account` out of thin air.
    /// Devnet faucet and test setup only.
    pub fn fund(&mut self, account: &str, amount: u64) -> Result<u64, AssetError> {
        let balance = self.balances.entry(account.to_string()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| AssetError::TransferFailed("balance overflow".into()))?;
        Ok(*balance)
    }

    /// Sets the wrapper's allowance over `owner`'s balance.
    pub fn approve(&mut self, owner: &str, amount: u64) {
        self.allowances.insert(owner.to_string(), amount);
    }

    pub fn balance_of(&self, account: &str) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn allowance_of(&self, owner: &str) -> u64 {
        self.allowances.get(owner).copied().unwrap_or(0)
    }

    /// Underlying held by the external custodian.
    pub fn custody(&self) -> u64 {
        self.custody
    }

    /// Underlying held by the wrapper for matured withdrawals.
    pub fn reserve(&self) -> u64 {
        self.reserve
    }

    fn debit(&mut self, account: &str, amount: u64) -> Result<(), AssetError> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(AssetError::InsufficientFunds {
                account: account.to_string(),
                available,
                requested: amount,
            });
        }
        self.custody
            .checked_add(amount)
            .ok_or_else(|| AssetError::TransferFailed("custody overflow".into()))?;
        self.balances.insert(account.to_string(), available - amount);
        self.custody += amount;
        Ok(())
    }
}

impl AssetLedger for InMemoryAssetLedger {
    fn transfer_in(&mut self, from: &str, amount: u64) -> Result<(), AssetError> {
        let allowance = self.allowance_of(from);
        if allowance < amount {
            return Err(AssetError::InsufficientAllowance {
                owner: from.to_string(),
                allowance,
                requested: amount,
            });
        }
        self.debit(from, amount)?;
        self.allowances.insert(from.to_string(), allowance - amount);
        Ok(())
    }

    fn accept_native(&mut self, from: &str, amount: u64) -> Result<(), AssetError> {
        self.debit(from, amount)
    }

    fn transfer_out(&mut self, to: &str, amount: u64) -> Result<(), AssetError> {
        if self.reserve < amount {
            return Err(AssetError::CustodyShortfall {
                available: self.reserve,
                requested: amount,
            });
        }
        let balance = self.balance_of(to);
        let credited = balance
            .checked_add(amount)
            .ok_or_else(|| AssetError::TransferFailed("balance overflow".into()))?;
        self.reserve -= amount;
        self.balances.insert(to.to_string(), credited);
        Ok(())
    }

    fn recall_from_custody(&mut self, amount: u64) -> Result<(), AssetError> {
        if self.custody < amount {
            return Err(AssetError::CustodyShortfall {
                available: self.custody,
                requested: amount,
            });
        }
        self.custody -= amount;
        self.reserve += amount;
        Ok(())
    }

    fn realize_yield(&mut self, amount: u64) -> Result<(), AssetError> {
        self.custody = self
            .custody
            .checked_add(amount)
            .ok_or_else(|| AssetError::TransferFailed("custody overflow".into()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AccessList
// ---------------------------------------------------------------------------

/// A static owner, a keeper set, and a whitelist.
///
/// Mutation is plain `&mut self`; gating who may mutate it is the service's
/// concern (see [`VaultService::set_whitelisted`](crate::engine::VaultService::set_whitelisted)).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessList {
    owner: String,
    keepers: BTreeSet<String>,
    whitelist: BTreeSet<String>,
}

impl AccessList {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            ..Default::default()
        }
    }

    /// Builds an access list from the owner, keeper and whitelist entries of
    /// a [`VaultConfig`](crate::config::VaultConfig).
    pub fn from_config(config: &crate::config::VaultConfig) -> Self {
        Self {
            owner: config.owner.clone(),
            keepers: config.keepers.clone(),
            whitelist: config.whitelist.clone(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn add_keeper(&mut self, account: &str) {
        self.keepers.insert(account.to_string());
    }

    pub fn remove_keeper(&mut self, account: &str) -> bool {
        self.keepers.remove(account)
    }

    pub fn whitelist(&mut self, account: &str) {
        self.whitelist.insert(account.to_string());
    }

    pub fn unwhitelist(&mut self, account: &str) -> bool {
        self.whitelist.remove(account)
    }

    pub fn whitelisted_count(&self) -> usize {
        self.whitelist.len()
    }
}

impl AccessControl for AccessList {
    fn is_whitelisted(&self, account: &str) -> bool {
        self.whitelist.contains(account)
    }

    fn is_keeper(&self, account: &str) -> bool {
        self.keepers.contains(account)
    }

    fn is_owner(&self, account: &str) -> bool {
        self.owner == account
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_in_requires_allowance() {
        let mut assets = InMemoryAssetLedger::new();
        assets.fund("alice", 1_000).unwrap();

        let err = assets.transfer_in("alice", 100).unwrap_err();
        assert!(matches!(
            err,
            AssetError::InsufficientAllowance {
                allowance: 0,
                requested: 100,
                ..
            }
        ));

        assets.approve("alice", 100);
        assets.transfer_in("alice", 100).unwrap();
        assert_eq!(assets.balance_of("alice"), 900);
        assert_eq!(assets.allowance_of("alice"), 0);
        assert_eq!(assets.custody(), 100);
    }

    #[test]
    fn transfer_in_failure_changes_nothing() {
        let mut assets = InMemoryAssetLedger::new();
        assets.fund("alice", 50).unwrap();
        assets.approve("alice", 500);

        let err = assets.transfer_in("alice", 100).unwrap_err();
        assert!(matches!(err, AssetError::InsufficientFunds { .. }));
        assert_eq!(assets.balance_of("alice"), 50);
        assert_eq!(assets.allowance_of("alice"), 500);
        assert_eq!(assets.custody(), 0);
    }

    #[test]
    fn native_deposit_skips_allowance() {
        let mut assets = InMemoryAssetLedger::new();
        assets.fund("bob", 10).unwrap();
        assets.accept_native("bob", 10).unwrap();
        assert_eq!(assets.balance_of("bob"), 0);
        assert_eq!(assets.custody(), 10);
    }

    #[test]
    fn recall_then_pay_out() {
        let mut assets = InMemoryAssetLedger::new();
        assets.fund("alice", 300).unwrap();
        assets.approve("alice", 300);
        assets.transfer_in("alice", 300).unwrap();

        assert!(assets.transfer_out("alice", 1).is_err());
        assets.recall_from_custody(200).unwrap();
        assert_eq!(assets.custody(), 100);
        assert_eq!(assets.reserve(), 200);

        assets.transfer_out("alice", 200).unwrap();
        assert_eq!(assets.balance_of("alice"), 200);
        assert_eq!(assets.reserve(), 0);
    }

    #[test]
    fn recall_beyond_custody_fails() {
        let mut assets = InMemoryAssetLedger::new();
        let err = assets.recall_from_custody(1).unwrap_err();
        assert_eq!(
            err,
            AssetError::CustodyShortfall {
                available: 0,
                requested: 1
            }
        );
    }

    #[test]
    fn realized_yield_is_recallable() {
        let mut assets = InMemoryAssetLedger::new();
        assets.fund("alice", 1_000).unwrap();
        assets.approve("alice", 1_000);
        assets.transfer_in("alice", 1_000).unwrap();

        assets.realize_yield(100).unwrap();
        assert_eq!(assets.custody(), 1_100);
        assets.recall_from_custody(1_100).unwrap();
        assert_eq!(assets.reserve(), 1_100);
    }

    #[test]
    fn access_list_predicates() {
        let mut access = AccessList::new("owner");
        access.add_keeper("keeper");
        access.whitelist("alice");

        assert!(access.is_owner("owner"));
        assert!(!access.is_owner("alice"));
        assert!(access.is_keeper("keeper"));
        assert!(access.is_whitelisted("alice"));
        assert!(!access.is_whitelisted("bob"));

        assert!(access.unwhitelist("alice"));
        assert!(!access.is_whitelisted("alice"));
    }
}
