//! # Wrapper Ledger
//!
//! Custody of wrapped balances, gating of deposits, and the epoch-delayed
//! withdrawal queue.
//!
//! ## Deposit Gating
//!
//! | Caller                     | Independence | Credited to     |
//! |----------------------------|--------------|-----------------|
//! | the registered keeper      | any          | the keeper      |
//! | the depositor themselves   | enabled      | the depositor   |
//! | the depositor themselves   | disabled     | `Unauthorized`  |
//!
//! The keeper is normally the vault: with independence disabled every
//! wrapped unit lives in the vault's custody as a stake, and nobody holds
//! wrapped units on their own.
//!
//! On top of that, when whitelist mode is on the depositor must pass the
//! whitelist predicate.
//!
//! ## Atomicity
//!
//! Each transition validates first, then makes at most one capability call,
//! then writes. A failing capability call therefore leaves the ledger as it
//! was.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::receipt::{EpochSummary, WithdrawalReceipt};
use crate::capability::{AccessControl, Capabilities};
use crate::config::{VaultConfig, INITIAL_EPOCH};
use crate::error::{LedgerError, LedgerResult, Role};
use crate::share_math::MathError;

/// Wrapped-asset ledger with an epoch-delayed withdrawal queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapperLedger {
    /// The only caller allowed to deposit when independence is disabled.
    keeper: String,
    /// Current withdrawal epoch. Starts at [`INITIAL_EPOCH`].
    epoch: u32,
    /// Wrapped balances by account.
    balances: HashMap<String, u64>,
    /// Sum of all wrapped balances.
    total_supply: u64,
    /// Open withdrawal receipts by account.
    receipts: HashMap<String, WithdrawalReceipt>,
    /// Amount initiated since the last epoch advance, not yet recalled.
    queued_withdrawals: u64,
    /// Underlying recalled from custody and owed to open receipts.
    withdrawal_reserve: u64,
    independent: bool,
    whitelist_enabled: bool,
    native_asset: bool,
}

impl WrapperLedger {
    /// Creates an empty ledger at [`INITIAL_EPOCH`].
    pub fn new(keeper: &str, independent: bool, whitelist_enabled: bool, native_asset: bool) -> Self {
        Self {
            keeper: keeper.to_string(),
            epoch: INITIAL_EPOCH,
            balances: HashMap::new(),
            total_supply: 0,
            receipts: HashMap::new(),
            queued_withdrawals: 0,
            withdrawal_reserve: 0,
            independent,
            whitelist_enabled,
            native_asset,
        }
    }

    /// Creates a ledger whose keeper is the configured vault.
    pub fn from_config(config: &VaultConfig) -> Self {
        Self::new(
            &config.vault_address,
            config.independent,
            config.whitelist_enabled,
            config.native_asset,
        )
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn keeper(&self) -> &str {
        &self.keeper
    }

    pub fn balance_of(&self, account: &str) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// The account's withdrawal receipt; the zero receipt if none is open.
    pub fn withdrawal_receipt(&self, account: &str) -> WithdrawalReceipt {
        self.receipts.get(account).copied().unwrap_or_default()
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    pub fn queued_withdrawals(&self) -> u64 {
        self.queued_withdrawals
    }

    pub fn withdrawal_reserve(&self) -> u64 {
        self.withdrawal_reserve
    }

    pub fn is_independent(&self) -> bool {
        self.independent
    }

    pub fn whitelist_enabled(&self) -> bool {
        self.whitelist_enabled
    }

    pub fn native_asset(&self) -> bool {
        self.native_asset
    }

    /// Whether `account` may transact right now. Always `true` when
    /// whitelist mode is off.
    pub fn is_permitted(&self, access: &dyn AccessControl, account: &str) -> bool {
        !self.whitelist_enabled || access.is_whitelisted(account)
    }

    // -----------------------------------------------------------------------
    // Deposits
    // -----------------------------------------------------------------------

    /// Wraps `amount` of the underlying pulled from `depositor`.
    ///
    /// Returns the credited account's new wrapped balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotWhitelisted`], [`LedgerError::Unauthorized`] (see the
    /// gating table in the module docs), [`LedgerError::ZeroAmount`], or the
    /// asset ledger's allowance/funds error.
    pub fn deposit(
        &mut self,
        caps: &mut Capabilities<'_>,
        caller: &str,
        depositor: &str,
        amount: u64,
    ) -> LedgerResult<u64> {
        self.wrap(caps, caller, depositor, amount, false)
    }

    /// Wraps `amount` of native currency attached by `depositor`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NativeUnsupported`] unless the ledger wraps the native
    /// currency, otherwise as [`deposit`](Self::deposit).
    pub fn deposit_native(
        &mut self,
        caps: &mut Capabilities<'_>,
        caller: &str,
        depositor: &str,
        amount: u64,
    ) -> LedgerResult<u64> {
        if !self.native_asset {
            return Err(LedgerError::NativeUnsupported);
        }
        self.wrap(caps, caller, depositor, amount, true)
    }

    fn wrap(
        &mut self,
        caps: &mut Capabilities<'_>,
        caller: &str,
        depositor: &str,
        amount: u64,
        native: bool,
    ) -> LedgerResult<u64> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        self.require_permitted(caps.access, depositor)?;
        let beneficiary = self.beneficiary(caller, depositor)?;

        let balance = self
            .balance_of(beneficiary)
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;

        if native {
            caps.assets.accept_native(depositor, amount)?;
        } else {
            caps.assets.transfer_in(depositor, amount)?;
        }

        self.balances.insert(beneficiary.to_string(), balance);
        self.total_supply = supply;
        debug!(depositor, beneficiary, amount, native, "wrapped deposit");
        Ok(balance)
    }

    fn beneficiary<'a>(&self, caller: &'a str, depositor: &'a str) -> LedgerResult<&'a str> {
        if caller == self.keeper {
            Ok(caller)
        } else if self.independent && caller == depositor {
            Ok(depositor)
        } else {
            Err(LedgerError::Unauthorized {
                caller: caller.to_string(),
                role: Role::WrapperKeeper,
            })
        }
    }

    // -----------------------------------------------------------------------
    // Withdrawals
    // -----------------------------------------------------------------------

    /// Burns `amount` wrapped units from `depositor` and queues them for
    /// payout after the current epoch.
    ///
    /// Returns the updated receipt. A receipt opened in an earlier epoch is
    /// extended and re-stamped with the current epoch.
    pub fn initiate_withdrawal(
        &mut self,
        caps: &mut Capabilities<'_>,
        depositor: &str,
        amount: u64,
    ) -> LedgerResult<WithdrawalReceipt> {
        self.require_permitted(caps.access, depositor)?;
        self.queue_withdrawal(depositor, amount)
    }

    /// Ungated withdrawal initiation. The vault uses this to forward
    /// released stake into the queue on an account's behalf.
    pub(crate) fn queue_withdrawal(
        &mut self,
        depositor: &str,
        amount: u64,
    ) -> LedgerResult<WithdrawalReceipt> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let available = self.balance_of(depositor);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: depositor.to_string(),
                available,
                requested: amount,
            });
        }

        let previous = self.withdrawal_receipt(depositor);
        let receipt = WithdrawalReceipt {
            amount: previous
                .amount
                .checked_add(amount)
                .ok_or(MathError::Overflow)?,
            epoch: self.epoch,
        };
        let queued = self
            .queued_withdrawals
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;

        self.balances
            .insert(depositor.to_string(), available - amount);
        self.total_supply -= amount;
        self.receipts.insert(depositor.to_string(), receipt);
        self.queued_withdrawals = queued;

        debug!(
            depositor,
            amount,
            total = receipt.amount,
            epoch = receipt.epoch,
            "withdrawal initiated"
        );
        Ok(receipt)
    }

    /// Pays out `depositor`'s matured receipt and closes it.
    ///
    /// Returns the amount paid.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NoWithdrawalPending`] on an empty receipt,
    /// [`LedgerError::WithdrawalNotReady`] while the receipt's epoch has not
    /// passed, [`LedgerError::InsufficientReserve`] if the recalled reserve
    /// cannot cover it.
    pub fn complete_withdrawal(
        &mut self,
        caps: &mut Capabilities<'_>,
        depositor: &str,
    ) -> LedgerResult<u64> {
        self.require_permitted(caps.access, depositor)?;

        let receipt = self.withdrawal_receipt(depositor);
        if receipt.is_empty() {
            return Err(LedgerError::NoWithdrawalPending(depositor.to_string()));
        }
        if !receipt.is_mature(self.epoch) {
            return Err(LedgerError::WithdrawalNotReady {
                receipt_epoch: receipt.epoch,
                current_epoch: self.epoch,
            });
        }
        if self.withdrawal_reserve < receipt.amount {
            return Err(LedgerError::InsufficientReserve {
                available: self.withdrawal_reserve,
                requested: receipt.amount,
            });
        }

        caps.assets.transfer_out(depositor, receipt.amount)?;

        self.receipts.remove(depositor);
        self.withdrawal_reserve -= receipt.amount;
        debug!(depositor, amount = receipt.amount, "withdrawal completed");
        Ok(receipt.amount)
    }

    /// Recalls the queued batch from external custody and advances the epoch.
    ///
    /// Owner-only. This is the sole way the epoch moves.
    pub fn process_withdrawals(
        &mut self,
        caps: &mut Capabilities<'_>,
        caller: &str,
    ) -> LedgerResult<EpochSummary> {
        require_owner(caps.access, caller)?;

        let next_epoch = self
            .epoch
            .checked_add(1)
            .ok_or(LedgerError::EpochOverflow)?;
        let recalled = self.queued_withdrawals;
        let reserve = self
            .withdrawal_reserve
            .checked_add(recalled)
            .ok_or(MathError::Overflow)?;

        if recalled > 0 {
            caps.assets.recall_from_custody(recalled)?;
        }

        let closed_epoch = self.epoch;
        self.epoch = next_epoch;
        self.queued_withdrawals = 0;
        self.withdrawal_reserve = reserve;

        info!(
            closed_epoch,
            epoch = next_epoch,
            recalled,
            reserve,
            "withdrawals processed"
        );
        Ok(EpochSummary {
            closed_epoch,
            epoch: next_epoch,
            recalled,
            reserve,
            processed_at: Utc::now(),
        })
    }

    // -----------------------------------------------------------------------
    // Vault-facing movements
    // -----------------------------------------------------------------------

    /// Creates wrapped units (positive yield). Returns the new balance.
    pub(crate) fn mint(&mut self, to: &str, amount: u64) -> LedgerResult<u64> {
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        self.balances.insert(to.to_string(), balance);
        self.total_supply = supply;
        Ok(balance)
    }

    /// Destroys wrapped units (negative yield). Returns the new balance.
    pub(crate) fn burn(&mut self, from: &str, amount: u64) -> LedgerResult<u64> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientVaultBalance {
                available,
                requested: amount,
            });
        }
        self.balances.insert(from.to_string(), available - amount);
        self.total_supply -= amount;
        Ok(available - amount)
    }

    /// Moves wrapped units between accounts.
    pub(crate) fn transfer(&mut self, from: &str, to: &str, amount: u64) -> LedgerResult<()> {
        if from == to {
            return Ok(());
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from.to_string(),
                available,
                requested: amount,
            });
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        self.balances.insert(from.to_string(), available - amount);
        self.balances.insert(to.to_string(), credited);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Owner-only toggle for independence mode.
    pub fn set_independent(
        &mut self,
        access: &dyn AccessControl,
        caller: &str,
        independent: bool,
    ) -> LedgerResult<()> {
        require_owner(access, caller)?;
        self.independent = independent;
        info!(independent, "independence mode updated");
        Ok(())
    }

    /// Owner-only toggle for whitelist mode.
    pub fn set_whitelist_enabled(
        &mut self,
        access: &dyn AccessControl,
        caller: &str,
        enabled: bool,
    ) -> LedgerResult<()> {
        require_owner(access, caller)?;
        self.whitelist_enabled = enabled;
        info!(enabled, "whitelist mode updated");
        Ok(())
    }

    fn require_permitted(&self, access: &dyn AccessControl, account: &str) -> LedgerResult<()> {
        if self.is_permitted(access, account) {
            Ok(())
        } else {
            Err(LedgerError::NotWhitelisted(account.to_string()))
        }
    }
}

/// Rejects anyone but the owner.
pub(crate) fn require_owner(access: &dyn AccessControl, caller: &str) -> LedgerResult<()> {
    if access.is_owner(caller) {
        Ok(())
    } else {
        Err(LedgerError::Unauthorized {
            caller: caller.to_string(),
            role: Role::Owner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{AccessList, InMemoryAssetLedger};
    use crate::error::ErrorKind;

    const KEEPER: &str = "vault";
    const OWNER: &str = "owner";

    struct Harness {
        wrapper: WrapperLedger,
        assets: InMemoryAssetLedger,
        access: AccessList,
    }

    impl Harness {
        fn new(independent: bool) -> Self {
            let mut access = AccessList::new(OWNER);
            access.whitelist("alice");
            access.whitelist("bob");
            let mut assets = InMemoryAssetLedger::new();
            for account in ["alice", "bob", "carol"] {
                assets.fund(account, 10_000).unwrap();
                assets.approve(account, 10_000);
            }
            Self {
                wrapper: WrapperLedger::new(KEEPER, independent, true, false),
                assets,
                access,
            }
        }

        fn split(&mut self) -> (&mut WrapperLedger, Capabilities<'_>) {
            (
                &mut self.wrapper,
                Capabilities::new(&mut self.assets, &self.access),
            )
        }

        fn deposit(&mut self, caller: &str, depositor: &str, amount: u64) -> LedgerResult<u64> {
            let (wrapper, mut caps) = self.split();
            wrapper.deposit(&mut caps, caller, depositor, amount)
        }

        fn initiate(&mut self, depositor: &str, amount: u64) -> LedgerResult<WithdrawalReceipt> {
            let (wrapper, mut caps) = self.split();
            wrapper.initiate_withdrawal(&mut caps, depositor, amount)
        }

        fn complete(&mut self, depositor: &str) -> LedgerResult<u64> {
            let (wrapper, mut caps) = self.split();
            wrapper.complete_withdrawal(&mut caps, depositor)
        }

        fn process(&mut self) -> EpochSummary {
            let (wrapper, mut caps) = self.split();
            wrapper.process_withdrawals(&mut caps, OWNER).unwrap()
        }
    }

    #[test]
    fn independent_deposit_credits_depositor() {
        let mut h = Harness::new(true);
        assert_eq!(h.deposit("alice", "alice", 1_000).unwrap(), 1_000);
        assert_eq!(h.wrapper.balance_of("alice"), 1_000);
        assert_eq!(h.wrapper.total_supply(), 1_000);
        assert_eq!(h.assets.balance_of("alice"), 9_000);
        assert_eq!(h.assets.custody(), 1_000);
    }

    #[test]
    fn keeper_deposit_credits_keeper() {
        let mut h = Harness::new(false);
        h.deposit(KEEPER, "alice", 700).unwrap();
        assert_eq!(h.wrapper.balance_of(KEEPER), 700);
        assert_eq!(h.wrapper.balance_of("alice"), 0);
        assert_eq!(h.assets.balance_of("alice"), 9_300);
    }

    #[test]
    fn direct_deposit_requires_independence() {
        let mut h = Harness::new(false);
        let err = h.deposit("alice", "alice", 100).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Unauthorized {
                caller: "alice".into(),
                role: Role::WrapperKeeper
            }
        );
        assert_eq!(h.assets.balance_of("alice"), 10_000);
    }

    #[test]
    fn cannot_deposit_on_behalf_of_others() {
        let mut h = Harness::new(true);
        let err = h.deposit("bob", "alice", 100).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn non_whitelisted_deposit_rejected_until_whitelisted() {
        let mut h = Harness::new(true);
        let err = h.deposit("carol", "carol", 100).unwrap_err();
        assert_eq!(err, LedgerError::NotWhitelisted("carol".into()));
        assert_eq!(err.kind(), ErrorKind::Authorization);

        h.access.whitelist("carol");
        assert_eq!(h.deposit("carol", "carol", 100).unwrap(), 100);
    }

    #[test]
    fn whitelist_mode_off_bypasses_predicate() {
        let mut h = Harness::new(true);
        let access = h.access.clone();
        h.wrapper
            .set_whitelist_enabled(&access, OWNER, false)
            .unwrap();
        h.deposit("carol", "carol", 100).unwrap();
    }

    #[test]
    fn allowance_failure_leaves_ledger_untouched() {
        let mut h = Harness::new(true);
        h.assets.approve("alice", 50);
        let err = h.deposit("alice", "alice", 100).unwrap_err();
        assert!(matches!(err, LedgerError::Asset(_)));
        assert_eq!(h.wrapper.balance_of("alice"), 0);
        assert_eq!(h.wrapper.total_supply(), 0);
    }

    #[test]
    fn native_deposit_requires_native_asset() {
        let mut h = Harness::new(true);
        let (wrapper, mut caps) = h.split();
        let err = wrapper
            .deposit_native(&mut caps, "alice", "alice", 10)
            .unwrap_err();
        assert_eq!(err, LedgerError::NativeUnsupported);

        h.wrapper = WrapperLedger::new(KEEPER, true, true, true);
        h.assets.approve("alice", 0);
        let (wrapper, mut caps) = h.split();
        assert_eq!(
            wrapper
                .deposit_native(&mut caps, "alice", "alice", 10)
                .unwrap(),
            10
        );
    }

    #[test]
    fn initiate_withdrawal_earmarks_immediately() {
        let mut h = Harness::new(true);
        h.deposit("alice", "alice", 1_000).unwrap();

        let receipt = h.initiate("alice", 400).unwrap();
        assert_eq!(
            receipt,
            WithdrawalReceipt {
                amount: 400,
                epoch: INITIAL_EPOCH
            }
        );
        assert_eq!(h.wrapper.balance_of("alice"), 600);
        assert_eq!(h.wrapper.total_supply(), 600);
        assert_eq!(h.wrapper.queued_withdrawals(), 400);
    }

    #[test]
    fn initiate_beyond_balance_rejected() {
        let mut h = Harness::new(true);
        h.deposit("alice", "alice", 100).unwrap();
        let err = h.initiate("alice", 101).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                account: "alice".into(),
                available: 100,
                requested: 101
            }
        );
        assert!(h.wrapper.withdrawal_receipt("alice").is_empty());
    }

    #[test]
    fn complete_waits_for_epoch_to_pass() {
        let mut h = Harness::new(true);
        h.deposit("alice", "alice", 1_000).unwrap();
        h.initiate("alice", 1_000).unwrap();

        let err = h.complete("alice").unwrap_err();
        assert_eq!(
            err,
            LedgerError::WithdrawalNotReady {
                receipt_epoch: 1,
                current_epoch: 1
            }
        );
        assert_eq!(err.kind(), ErrorKind::Timing);

        let summary = h.process();
        assert_eq!(summary.closed_epoch, 1);
        assert_eq!(summary.epoch, 2);
        assert_eq!(summary.recalled, 1_000);

        assert_eq!(h.complete("alice").unwrap(), 1_000);
        assert_eq!(h.assets.balance_of("alice"), 10_000);
        assert!(h.wrapper.withdrawal_receipt("alice").is_empty());
        assert_eq!(h.wrapper.withdrawal_reserve(), 0);
    }

    #[test]
    fn later_initiation_restarts_the_clock() {
        let mut h = Harness::new(true);
        h.deposit("alice", "alice", 1_000).unwrap();

        h.initiate("alice", 500).unwrap();
        h.process(); // epoch 2
        let receipt = h.initiate("alice", 300).unwrap();
        assert_eq!(
            receipt,
            WithdrawalReceipt {
                amount: 800,
                epoch: 2
            }
        );

        // The first tranche matured in epoch 2, but the receipt now says 2.
        assert!(matches!(
            h.complete("alice"),
            Err(LedgerError::WithdrawalNotReady { .. })
        ));

        h.process(); // epoch 3
        assert_eq!(h.complete("alice").unwrap(), 800);
    }

    #[test]
    fn completing_empty_receipt_is_an_error() {
        let mut h = Harness::new(true);
        assert_eq!(
            h.complete("alice").unwrap_err(),
            LedgerError::NoWithdrawalPending("alice".into())
        );

        h.deposit("alice", "alice", 10).unwrap();
        h.initiate("alice", 10).unwrap();
        h.process();
        h.complete("alice").unwrap();
        assert_eq!(
            h.complete("alice").unwrap_err(),
            LedgerError::NoWithdrawalPending("alice".into())
        );
    }

    #[test]
    fn process_requires_owner() {
        let mut h = Harness::new(true);
        let (wrapper, mut caps) = h.split();
        let err = wrapper.process_withdrawals(&mut caps, "alice").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(h.wrapper.epoch(), INITIAL_EPOCH);
    }

    #[test]
    fn process_only_recalls_the_new_batch() {
        let mut h = Harness::new(true);
        h.deposit("alice", "alice", 1_000).unwrap();
        h.deposit("bob", "bob", 1_000).unwrap();

        h.initiate("alice", 200).unwrap();
        assert_eq!(h.process().recalled, 200);
        h.initiate("bob", 300).unwrap();
        let summary = h.process();
        assert_eq!(summary.recalled, 300);
        assert_eq!(summary.reserve, 500);
        assert_eq!(h.assets.reserve(), 500);
        assert_eq!(h.assets.custody(), 1_500);
    }

    #[test]
    fn empty_epoch_still_advances() {
        let mut h = Harness::new(true);
        let summary = h.process();
        assert_eq!(summary.recalled, 0);
        assert_eq!(h.wrapper.epoch(), INITIAL_EPOCH + 1);
    }

    #[test]
    fn mint_burn_and_transfer() {
        let mut h = Harness::new(false);
        h.wrapper.mint(KEEPER, 100).unwrap();
        assert_eq!(h.wrapper.total_supply(), 100);

        let err = h.wrapper.burn(KEEPER, 101).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Solvency);
        assert_eq!(h.wrapper.burn(KEEPER, 40).unwrap(), 60);

        h.wrapper.transfer(KEEPER, "alice", 60).unwrap();
        assert_eq!(h.wrapper.balance_of("alice"), 60);
        assert_eq!(h.wrapper.balance_of(KEEPER), 0);
        assert_eq!(h.wrapper.total_supply(), 60);
    }

    #[test]
    fn settings_are_owner_gated() {
        let mut h = Harness::new(false);
        let access = h.access.clone();
        assert!(h.wrapper.set_independent(&access, "alice", true).is_err());
        h.wrapper.set_independent(&access, OWNER, true).unwrap();
        assert!(h.wrapper.is_independent());
    }
}
