//! # Vault Ledger
//!
//! Stake and unstake receipts, share supply, and the per-round price history.
//! Holds its [`WrapperLedger`] by composition: every wrapped unit the vault
//! owns sits in the wrapper under the vault's own address.
//!
//! ## Round Timeline
//!
//! ```text
//!              round N                          round N+1
//!  ───────────────────────────────┬────────────────────────────────
//!   stake ──▶ pending             │ roll    pending ──▶ shares @ price[N]
//!   unstake ──▶ queued shares     │ ──────▶ queued ──▶ assets @ start(N)
//!   instant_unstake ◀── pending   │         price[N] recorded
//! ```
//!
//! `start(N)` is `price[N-1]`, or 1.0 for round 0. An unstake therefore
//! forfeits the yield of the round it was queued in.
//!
//! ## Backing
//!
//! The vault's wrapped custody splits three ways:
//!
//! | Slice             | Belongs to                                 |
//! |-------------------|--------------------------------------------|
//! | `total_pending`   | this round's stakers, not yet in shares    |
//! | `unstake_reserve` | settled unstakes not yet completed         |
//! | backing           | everything else: the share holders         |
//!
//! Only the backing prices shares.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::receipt::{RollSummary, StakePhase, StakeReceipt, UnstakeReceipt, VaultState};
use crate::capability::{AccessControl, Capabilities};
use crate::config::VaultConfig;
use crate::error::{LedgerError, LedgerResult, Role};
use crate::share_math::{
    assets_to_shares, price_per_share, shares_to_assets, unit_price, MathError,
};
use crate::wrapper::ledger::require_owner;
use crate::wrapper::WrapperLedger;

/// Round-based share vault on top of a wrapper ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultLedger {
    /// The vault's identity, also the wrapper's keeper.
    address: String,
    cap: u64,
    minimum_supply: u64,
    decimals: u8,
    state: VaultState,
    /// Closing price of every finished round. Written once per round.
    round_price_per_share: BTreeMap<u16, u128>,
    stake_receipts: HashMap<String, StakeReceipt>,
    unstake_receipts: HashMap<String, UnstakeReceipt>,
    /// Shares redeemed into an account's own balance.
    share_balances: HashMap<String, u64>,
    total_shares: u64,
    /// Shares in current-round unstake receipts.
    queued_shares: u64,
    /// Wrapped units set aside for settled unstakes.
    unstake_reserve: u64,
    wrapper: WrapperLedger,
}

impl VaultLedger {
    /// Builds a fresh vault and its wrapper from `config`.
    pub fn from_config(config: &VaultConfig) -> LedgerResult<Self> {
        unit_price(config.decimals)?;
        Ok(Self {
            address: config.vault_address.clone(),
            cap: config.cap,
            minimum_supply: config.minimum_supply,
            decimals: config.decimals,
            state: VaultState::default(),
            round_price_per_share: BTreeMap::new(),
            stake_receipts: HashMap::new(),
            unstake_receipts: HashMap::new(),
            share_balances: HashMap::new(),
            total_shares: 0,
            queued_shares: 0,
            unstake_reserve: 0,
            wrapper: WrapperLedger::from_config(config),
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn round(&self) -> u16 {
        self.state.round
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }

    pub fn minimum_supply(&self) -> u64 {
        self.minimum_supply
    }

    pub fn total_pending(&self) -> u64 {
        self.state.total_pending
    }

    pub fn total_shares(&self) -> u64 {
        self.total_shares
    }

    pub fn queued_shares(&self) -> u64 {
        self.queued_shares
    }

    pub fn unstake_reserve(&self) -> u64 {
        self.unstake_reserve
    }

    /// The closing price recorded for `round`, if it has closed.
    pub fn round_price_per_share(&self, round: u16) -> Option<u128> {
        self.round_price_per_share.get(&round).copied()
    }

    /// Every recorded closing price, oldest first.
    pub fn price_history(&self) -> impl Iterator<Item = (u16, u128)> + '_ {
        self.round_price_per_share.iter().map(|(r, p)| (*r, *p))
    }

    /// The price the current round started at.
    pub fn current_price_per_share(&self) -> LedgerResult<u128> {
        self.start_price(self.state.round)
    }

    /// Wrapped custody minus the unstake reserve. Pending stakes count.
    pub fn vault_total_balance(&self) -> u64 {
        self.wrapper
            .balance_of(&self.address)
            .saturating_sub(self.unstake_reserve)
    }

    /// The account's stake receipt with any closed-round amount converted.
    pub fn stake_receipt(&self, account: &str) -> LedgerResult<StakeReceipt> {
        self.reconciled(account)
    }

    pub fn unstake_receipt(&self, account: &str) -> UnstakeReceipt {
        self.unstake_receipts
            .get(account)
            .copied()
            .unwrap_or_default()
    }

    /// Shares redeemed into the account's own balance.
    pub fn share_balance(&self, account: &str) -> u64 {
        self.share_balances.get(account).copied().unwrap_or(0)
    }

    /// Held plus unredeemed shares.
    pub fn account_shares(&self, account: &str) -> LedgerResult<u64> {
        let receipt = self.reconciled(account)?;
        Ok(self
            .share_balance(account)
            .checked_add(receipt.unredeemed_shares)
            .ok_or(MathError::Overflow)?)
    }

    /// Asset value of the account's shares at the current start price, plus
    /// anything it has pending this round.
    pub fn account_vault_balance(&self, account: &str) -> LedgerResult<u64> {
        let receipt = self.reconciled(account)?;
        let shares = self
            .share_balance(account)
            .checked_add(receipt.unredeemed_shares)
            .ok_or(MathError::Overflow)?;
        let price = self.current_price_per_share()?;
        let value = shares_to_assets(shares, price, self.decimals)?;
        Ok(value
            .checked_add(receipt.amount)
            .ok_or(MathError::Overflow)?)
    }

    pub fn wrapper(&self) -> &WrapperLedger {
        &self.wrapper
    }

    pub fn wrapper_mut(&mut self) -> &mut WrapperLedger {
        &mut self.wrapper
    }

    // -----------------------------------------------------------------------
    // Staking
    // -----------------------------------------------------------------------

    /// Pulls `amount` of the underlying from `caller`, wraps it into the
    /// vault's custody, and records it as `creditor`'s pending stake.
    ///
    /// Returns the creditor's updated receipt.
    ///
    /// # Errors
    ///
    /// [`LedgerError::ZeroAmount`], [`LedgerError::NotWhitelisted`],
    /// [`LedgerError::ExceedsCap`], [`LedgerError::BelowMinimumSupply`], or
    /// the asset ledger's allowance/funds error.
    pub fn deposit_and_stake(
        &mut self,
        caps: &mut Capabilities<'_>,
        caller: &str,
        amount: u64,
        creditor: &str,
    ) -> LedgerResult<StakeReceipt> {
        let (receipt, total_pending) = self.prepare_stake(caps.access, caller, amount, creditor)?;

        self.wrapper.deposit(caps, &self.address, caller, amount)?;

        self.commit_stake(creditor, receipt, total_pending);
        debug!(caller, creditor, amount, round = self.state.round, "deposit staked");
        Ok(receipt)
    }

    /// Moves `amount` wrapped units the caller already holds into the vault
    /// as `creditor`'s pending stake. Only independent wrappers leave
    /// wrapped balances with users.
    pub fn stake(
        &mut self,
        caps: &mut Capabilities<'_>,
        caller: &str,
        amount: u64,
        creditor: &str,
    ) -> LedgerResult<StakeReceipt> {
        let (receipt, total_pending) = self.prepare_stake(caps.access, caller, amount, creditor)?;

        self.wrapper.transfer(caller, &self.address, amount)?;

        self.commit_stake(creditor, receipt, total_pending);
        debug!(caller, creditor, amount, round = self.state.round, "wrapped balance staked");
        Ok(receipt)
    }

    fn prepare_stake(
        &self,
        access: &dyn AccessControl,
        caller: &str,
        amount: u64,
        creditor: &str,
    ) -> LedgerResult<(StakeReceipt, u64)> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        self.require_permitted(access, caller)?;

        let total = self
            .vault_total_balance()
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        if total > self.cap {
            return Err(LedgerError::ExceedsCap {
                total,
                cap: self.cap,
            });
        }
        if total < self.minimum_supply {
            return Err(LedgerError::BelowMinimumSupply {
                total,
                minimum: self.minimum_supply,
            });
        }

        let start = self.start_price(self.state.round)?;
        if assets_to_shares(amount, start, self.decimals)? == 0 {
            return Err(LedgerError::BelowConvertibleMinimum { amount });
        }

        let mut receipt = self.reconciled(creditor)?;
        receipt.round = self.state.round;
        receipt.amount = receipt
            .amount
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        let total_pending = self
            .state
            .total_pending
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        Ok((receipt, total_pending))
    }

    fn commit_stake(&mut self, creditor: &str, receipt: StakeReceipt, total_pending: u64) {
        self.stake_receipts.insert(creditor.to_string(), receipt);
        self.state.total_pending = total_pending;
    }

    /// Cancels `amount` of the caller's same-round pending stake and releases
    /// it immediately.
    ///
    /// Only the portion staked this round qualifies; anything beyond it is
    /// rejected with [`LedgerError::InsufficientShares`] rather than split
    /// into a regular unstake.
    pub fn instant_unstake(
        &mut self,
        caps: &mut Capabilities<'_>,
        caller: &str,
        amount: u64,
    ) -> LedgerResult<StakeReceipt> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        self.require_permitted(caps.access, caller)?;

        let mut receipt = self.reconciled(caller)?;
        let pending = match receipt.phase(self.state.round) {
            StakePhase::PendingThisRound { amount } => amount,
            StakePhase::Empty | StakePhase::Settled { .. } => 0,
        };
        if amount > pending {
            return Err(LedgerError::InsufficientShares {
                available: pending,
                requested: amount,
            });
        }
        receipt.amount -= amount;

        self.release(caller, amount)?;
        self.stake_receipts.insert(caller.to_string(), receipt);
        self.state.total_pending -= amount;

        debug!(caller, amount, round = self.state.round, "instant unstake");
        Ok(receipt)
    }

    // -----------------------------------------------------------------------
    // Unstaking
    // -----------------------------------------------------------------------

    /// Queues `shares` for conversion at the next roll.
    ///
    /// Held shares are spent before unredeemed ones. A receipt from an
    /// earlier round is completed first, so the account never carries two
    /// unstakes.
    pub fn unstake(
        &mut self,
        caps: &mut Capabilities<'_>,
        caller: &str,
        shares: u64,
    ) -> LedgerResult<UnstakeReceipt> {
        if shares == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        self.require_permitted(caps.access, caller)?;

        let mut stake = self.reconciled(caller)?;
        let held = self.share_balance(caller);
        let available = held
            .checked_add(stake.unredeemed_shares)
            .ok_or(MathError::Overflow)?;
        if shares > available {
            return Err(LedgerError::InsufficientShares {
                available,
                requested: shares,
            });
        }

        let round = self.state.round;
        let start = self.start_price(round)?;
        if shares_to_assets(shares, start, self.decimals)? == 0 {
            return Err(LedgerError::BelowConvertibleMinimum { amount: shares });
        }

        let previous = self.unstake_receipt(caller);
        let stale = previous.is_ready(round);
        let carried = if stale { 0 } else { previous.shares };
        let receipt = UnstakeReceipt {
            round,
            shares: carried.checked_add(shares).ok_or(MathError::Overflow)?,
        };
        let queued = self
            .queued_shares
            .checked_add(shares)
            .ok_or(MathError::Overflow)?;

        if stale {
            self.settle_unstake(caller, previous)?;
        }

        let from_held = shares.min(held);
        stake.unredeemed_shares -= shares - from_held;
        self.share_balances
            .insert(caller.to_string(), held - from_held);
        self.stake_receipts.insert(caller.to_string(), stake);
        self.unstake_receipts.insert(caller.to_string(), receipt);
        self.queued_shares = queued;

        debug!(caller, shares, round, "unstake queued");
        Ok(receipt)
    }

    /// Releases the assets behind a settled unstake receipt.
    ///
    /// Returns the wrapped units released.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NoUnstakePending`] without a receipt,
    /// [`LedgerError::UnstakeNotReady`] until the receipt's round has closed.
    pub fn complete_unstake(
        &mut self,
        caps: &mut Capabilities<'_>,
        caller: &str,
    ) -> LedgerResult<u64> {
        self.require_permitted(caps.access, caller)?;

        let receipt = self.unstake_receipt(caller);
        if receipt.is_empty() {
            return Err(LedgerError::NoUnstakePending(caller.to_string()));
        }
        if !receipt.is_ready(self.state.round) {
            return Err(LedgerError::UnstakeNotReady {
                receipt_round: receipt.round,
                current_round: self.state.round,
            });
        }
        self.settle_unstake(caller, receipt)
    }

    fn settle_unstake(&mut self, account: &str, receipt: UnstakeReceipt) -> LedgerResult<u64> {
        let price = self.start_price(receipt.round)?;
        let amount = shares_to_assets(receipt.shares, price, self.decimals)?;
        if amount > self.unstake_reserve {
            return Err(LedgerError::InsufficientReserve {
                available: self.unstake_reserve,
                requested: amount,
            });
        }

        if amount > 0 {
            self.release(account, amount)?;
        }
        self.unstake_receipts.remove(account);
        self.unstake_reserve -= amount;

        debug!(account, shares = receipt.shares, amount, "unstake completed");
        Ok(amount)
    }

    /// Hands `amount` wrapped units from the vault to `account`. Without
    /// independence they go straight into the withdrawal queue.
    fn release(&mut self, account: &str, amount: u64) -> LedgerResult<()> {
        self.wrapper.transfer(&self.address, account, amount)?;
        if !self.wrapper.is_independent() {
            self.wrapper.queue_withdrawal(account, amount)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Redemption
    // -----------------------------------------------------------------------

    /// Moves `shares` from the caller's unredeemed shares into its balance.
    ///
    /// Returns the new share balance.
    pub fn redeem(
        &mut self,
        caps: &mut Capabilities<'_>,
        caller: &str,
        shares: u64,
    ) -> LedgerResult<u64> {
        if shares == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        self.require_permitted(caps.access, caller)?;

        let mut receipt = self.reconciled(caller)?;
        if shares > receipt.unredeemed_shares {
            return Err(LedgerError::InsufficientShares {
                available: receipt.unredeemed_shares,
                requested: shares,
            });
        }
        let balance = self
            .share_balance(caller)
            .checked_add(shares)
            .ok_or(MathError::Overflow)?;
        receipt.unredeemed_shares -= shares;

        self.stake_receipts.insert(caller.to_string(), receipt);
        self.share_balances.insert(caller.to_string(), balance);
        debug!(caller, shares, balance, "shares redeemed");
        Ok(balance)
    }

    /// Redeems every unredeemed share the caller has.
    pub fn max_redeem(&mut self, caps: &mut Capabilities<'_>, caller: &str) -> LedgerResult<u64> {
        let receipt = self.reconciled(caller)?;
        self.redeem(caps, caller, receipt.unredeemed_shares)
    }

    // -----------------------------------------------------------------------
    // Round Roll
    // -----------------------------------------------------------------------

    /// Closes the current round.
    ///
    /// Settles queued unstakes at the round's start price, applies
    /// `yield_delta` to the vault's wrapped custody, records the closing
    /// price, and converts the round's pending stakes into shares at it.
    /// Keeper-only.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] for non-keepers,
    /// [`LedgerError::RoundOverflow`] at the last round,
    /// [`LedgerError::InsufficientVaultBalance`] when the backing cannot
    /// cover the unstakes or a loss.
    pub fn roll_to_next_round(
        &mut self,
        caps: &mut Capabilities<'_>,
        caller: &str,
        yield_delta: i128,
    ) -> LedgerResult<RollSummary> {
        if !caps.access.is_keeper(caller) {
            return Err(LedgerError::Unauthorized {
                caller: caller.to_string(),
                role: Role::Keeper,
            });
        }

        let closed_round = self.state.round;
        let next_round = closed_round
            .checked_add(1)
            .ok_or(LedgerError::RoundOverflow)?;

        // 1. Unstakes leave at the price this round started at.
        let burned = self.queued_shares;
        let start = self.start_price(closed_round)?;
        let released = shares_to_assets(burned, start, self.decimals)?;
        let backing = self.backing();
        if released > backing {
            return Err(LedgerError::InsufficientVaultBalance {
                available: backing,
                requested: released,
            });
        }
        let remaining_shares = self
            .total_shares
            .checked_sub(burned)
            .ok_or(MathError::Overflow)?;
        let reserve = self
            .unstake_reserve
            .checked_add(released)
            .ok_or(MathError::Overflow)?;

        // 2. Yield lands on whoever is still in.
        let magnitude =
            u64::try_from(yield_delta.unsigned_abs()).map_err(|_| MathError::Overflow)?;
        let remaining_backing = backing - released;
        let new_backing = if yield_delta >= 0 {
            remaining_backing
                .checked_add(magnitude)
                .ok_or(MathError::Overflow)?
        } else if magnitude > remaining_backing {
            return Err(LedgerError::InsufficientVaultBalance {
                available: remaining_backing,
                requested: magnitude,
            });
        } else {
            remaining_backing - magnitude
        };

        // 3. Closing price, then this round's stakers buy in at it.
        let price = price_per_share(new_backing, remaining_shares, self.decimals)?;
        let minted = assets_to_shares(self.state.total_pending, price, self.decimals)?;
        let total_shares = remaining_shares
            .checked_add(minted)
            .ok_or(MathError::Overflow)?;

        if yield_delta > 0 {
            caps.assets.realize_yield(magnitude)?;
            self.wrapper.mint(&self.address, magnitude)?;
        } else if yield_delta < 0 {
            self.wrapper.burn(&self.address, magnitude)?;
        }

        self.round_price_per_share.insert(closed_round, price);
        self.total_shares = total_shares;
        self.queued_shares = 0;
        self.unstake_reserve = reserve;
        self.state = VaultState {
            round: next_round,
            total_pending: 0,
        };

        info!(
            closed_round,
            round = next_round,
            price = %price,
            minted,
            burned,
            released,
            yield_delta = %yield_delta,
            "round rolled"
        );
        Ok(RollSummary {
            closed_round,
            round: next_round,
            price_per_share: price,
            minted_shares: minted,
            burned_shares: burned,
            released_assets: released,
            yield_delta,
            rolled_at: Utc::now(),
        })
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Owner-only. The cap may not drop below the minimum supply.
    pub fn set_cap(&mut self, access: &dyn AccessControl, caller: &str, cap: u64) -> LedgerResult<()> {
        require_owner(access, caller)?;
        if cap < self.minimum_supply {
            return Err(LedgerError::BelowMinimumSupply {
                total: cap,
                minimum: self.minimum_supply,
            });
        }
        self.cap = cap;
        info!(cap, "vault cap updated");
        Ok(())
    }

    /// Owner-only. The minimum supply may not exceed the cap.
    pub fn set_minimum_supply(
        &mut self,
        access: &dyn AccessControl,
        caller: &str,
        minimum_supply: u64,
    ) -> LedgerResult<()> {
        require_owner(access, caller)?;
        if minimum_supply > self.cap {
            return Err(LedgerError::ExceedsCap {
                total: minimum_supply,
                cap: self.cap,
            });
        }
        self.minimum_supply = minimum_supply;
        info!(minimum_supply, "vault minimum supply updated");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Price round `round` opened at.
    fn start_price(&self, round: u16) -> LedgerResult<u128> {
        let previous = match round.checked_sub(1) {
            Some(previous) => previous,
            None => return Ok(unit_price(self.decimals)?),
        };
        match self.round_price_per_share(previous) {
            Some(price) => Ok(price),
            None => Ok(unit_price(self.decimals)?),
        }
    }

    /// Custody owned by share holders.
    fn backing(&self) -> u64 {
        self.wrapper
            .balance_of(&self.address)
            .saturating_sub(self.state.total_pending)
            .saturating_sub(self.unstake_reserve)
    }

    /// The account's stake receipt, with a closed round's pending amount
    /// converted at that round's closing price.
    fn reconciled(&self, account: &str) -> LedgerResult<StakeReceipt> {
        let mut receipt = self
            .stake_receipts
            .get(account)
            .copied()
            .unwrap_or_default();
        if let StakePhase::Settled { round } = receipt.phase(self.state.round) {
            // Every closed round has a price; a gap surfaces as DivisionByZero.
            let price = self.round_price_per_share(round).unwrap_or(0);
            receipt.settle(price, self.decimals)?;
        }
        Ok(receipt)
    }

    fn require_permitted(&self, access: &dyn AccessControl, account: &str) -> LedgerResult<()> {
        if self.wrapper.is_permitted(access, account) {
            Ok(())
        } else {
            Err(LedgerError::NotWhitelisted(account.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{AccessList, InMemoryAssetLedger};
    use crate::error::ErrorKind;

    const ONE: u128 = 100_000_000;
    const VAULT: &str = "vault";
    const OWNER: &str = "owner";
    const KEEPER: &str = "keeper";

    struct Harness {
        vault: VaultLedger,
        assets: InMemoryAssetLedger,
        access: AccessList,
    }

    impl Harness {
        fn with(config: VaultConfig) -> Self {
            let mut access = AccessList::from_config(&config);
            access.whitelist("alice");
            access.whitelist("bob");
            let mut assets = InMemoryAssetLedger::new();
            for account in ["alice", "bob"] {
                assets.fund(account, 1_000_000).unwrap();
                assets.approve(account, 1_000_000);
            }
            Self {
                vault: VaultLedger::from_config(&config).unwrap(),
                assets,
                access,
            }
        }

        fn new() -> Self {
            Self::with(config())
        }

        fn split(&mut self) -> (&mut VaultLedger, Capabilities<'_>) {
            (
                &mut self.vault,
                Capabilities::new(&mut self.assets, &self.access),
            )
        }

        fn deposit(&mut self, who: &str, amount: u64) -> LedgerResult<StakeReceipt> {
            let (vault, mut caps) = self.split();
            vault.deposit_and_stake(&mut caps, who, amount, who)
        }

        fn roll(&mut self, yield_delta: i128) -> LedgerResult<RollSummary> {
            let (vault, mut caps) = self.split();
            vault.roll_to_next_round(&mut caps, KEEPER, yield_delta)
        }

        fn unstake(&mut self, who: &str, shares: u64) -> LedgerResult<UnstakeReceipt> {
            let (vault, mut caps) = self.split();
            vault.unstake(&mut caps, who, shares)
        }

        fn complete(&mut self, who: &str) -> LedgerResult<u64> {
            let (vault, mut caps) = self.split();
            vault.complete_unstake(&mut caps, who)
        }

        fn instant(&mut self, who: &str, amount: u64) -> LedgerResult<StakeReceipt> {
            let (vault, mut caps) = self.split();
            vault.instant_unstake(&mut caps, who, amount)
        }

        fn redeem(&mut self, who: &str, shares: u64) -> LedgerResult<u64> {
            let (vault, mut caps) = self.split();
            vault.redeem(&mut caps, who, shares)
        }
    }

    fn config() -> VaultConfig {
        VaultConfig {
            vault_address: VAULT.into(),
            owner: OWNER.into(),
            keepers: [KEEPER.to_string()].into(),
            ..VaultConfig::default()
        }
    }

    #[test]
    fn deposit_then_rolls_accrue_yield() {
        let mut h = Harness::new();

        let receipt = h.deposit("alice", 1_000).unwrap();
        assert_eq!(
            receipt,
            StakeReceipt {
                round: 0,
                amount: 1_000,
                unredeemed_shares: 0
            }
        );
        assert_eq!(h.vault.total_pending(), 1_000);
        assert_eq!(h.vault.wrapper().balance_of(VAULT), 1_000);

        let summary = h.roll(0).unwrap();
        assert_eq!(summary.closed_round, 0);
        assert_eq!(summary.price_per_share, ONE);
        assert_eq!(summary.minted_shares, 1_000);
        assert_eq!(
            h.vault.stake_receipt("alice").unwrap(),
            StakeReceipt {
                round: 0,
                amount: 0,
                unredeemed_shares: 1_000
            }
        );
        assert_eq!(h.vault.total_pending(), 0);

        let summary = h.roll(100).unwrap();
        assert_eq!(summary.price_per_share, 110_000_000);
        assert_eq!(h.vault.round_price_per_share(1), Some(110_000_000));
        assert_eq!(h.vault.account_shares("alice").unwrap(), 1_000);
        assert_eq!(h.vault.account_vault_balance("alice").unwrap(), 1_100);
    }

    #[test]
    fn later_stakers_buy_in_at_closing_price() {
        let mut h = Harness::new();
        h.deposit("alice", 1_000).unwrap();
        h.roll(0).unwrap();

        h.deposit("bob", 1_100).unwrap();
        let summary = h.roll(100).unwrap();
        assert_eq!(summary.price_per_share, 110_000_000);
        assert_eq!(summary.minted_shares, 1_000);
        assert_eq!(h.vault.account_shares("bob").unwrap(), 1_000);
        assert_eq!(h.vault.total_shares(), 2_000);
    }

    #[test]
    fn total_pending_tracks_current_round_receipts() {
        let mut h = Harness::new();
        h.deposit("alice", 300).unwrap();
        h.deposit("bob", 200).unwrap();
        h.deposit("alice", 50).unwrap();
        assert_eq!(h.vault.total_pending(), 550);

        h.instant("bob", 20).unwrap();
        assert_eq!(h.vault.total_pending(), 530);

        h.roll(0).unwrap();
        assert_eq!(h.vault.total_pending(), 0);
        h.deposit("bob", 10).unwrap();
        assert_eq!(h.vault.total_pending(), 10);
        assert_eq!(h.vault.stake_receipt("bob").unwrap().amount, 10);
        assert_eq!(h.vault.stake_receipt("alice").unwrap().amount, 0);
    }

    #[test]
    fn restaking_reconciles_the_old_round_first() {
        let mut h = Harness::new();
        h.deposit("alice", 1_000).unwrap();
        h.roll(0).unwrap();
        h.roll(100).unwrap();

        let receipt = h.deposit("alice", 500).unwrap();
        assert_eq!(
            receipt,
            StakeReceipt {
                round: 2,
                amount: 500,
                unredeemed_shares: 1_000
            }
        );
    }

    #[test]
    fn instant_unstake_cancels_same_round_stake() {
        let mut h = Harness::new();
        h.deposit("alice", 500).unwrap();

        let receipt = h.instant("alice", 200).unwrap();
        assert_eq!(receipt.amount, 300);
        // Not independent: released units go straight into the withdrawal queue.
        let withdrawal = h.vault.wrapper().withdrawal_receipt("alice");
        assert_eq!(withdrawal.amount, 200);
        assert_eq!(h.vault.wrapper().balance_of("alice"), 0);
        assert_eq!(h.vault.wrapper().balance_of(VAULT), 300);

        let summary = h.roll(1_000).unwrap();
        assert_eq!(summary.minted_shares, 300);
    }

    #[test]
    fn full_instant_unstake_creates_no_shares() {
        let mut h = Harness::new();
        h.deposit("alice", 500).unwrap();
        h.instant("alice", 500).unwrap();

        let summary = h.roll(0).unwrap();
        assert_eq!(summary.minted_shares, 0);
        assert_eq!(h.vault.account_shares("alice").unwrap(), 0);
        assert_eq!(h.vault.account_vault_balance("alice").unwrap(), 0);
    }

    #[test]
    fn instant_unstake_beyond_pending_is_rejected() {
        let mut h = Harness::new();
        h.deposit("alice", 300).unwrap();
        let err = h.instant("alice", 301).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientShares {
                available: 300,
                requested: 301
            }
        );

        h.roll(0).unwrap();
        let err = h.instant("alice", 1).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientShares {
                available: 0,
                requested: 1
            }
        );
    }

    #[test]
    fn unstake_forfeits_the_round_it_was_queued_in() {
        let mut h = Harness::new();
        h.deposit("alice", 1_000).unwrap();
        h.roll(0).unwrap();

        let receipt = h.unstake("alice", 400).unwrap();
        assert_eq!(receipt, UnstakeReceipt { round: 1, shares: 400 });
        assert!(matches!(
            h.complete("alice").unwrap_err(),
            LedgerError::UnstakeNotReady {
                receipt_round: 1,
                current_round: 1
            }
        ));

        let summary = h.roll(100).unwrap();
        assert_eq!(summary.burned_shares, 400);
        assert_eq!(summary.released_assets, 400);
        // 700 backing over 600 shares.
        assert_eq!(summary.price_per_share, 116_666_666);
        assert_eq!(h.vault.unstake_reserve(), 400);

        assert_eq!(h.complete("alice").unwrap(), 400);
        assert_eq!(h.vault.unstake_reserve(), 0);
        assert_eq!(h.vault.vault_total_balance(), 700);
        assert_eq!(h.vault.wrapper().withdrawal_receipt("alice").amount, 400);
        assert_eq!(h.vault.account_vault_balance("alice").unwrap(), 699);
    }

    #[test]
    fn complete_without_unstake_fails() {
        let mut h = Harness::new();
        let err = h.complete("alice").unwrap_err();
        assert_eq!(err, LedgerError::NoUnstakePending("alice".into()));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn unstake_spends_held_shares_first() {
        let mut h = Harness::new();
        h.deposit("alice", 1_000).unwrap();
        h.roll(0).unwrap();

        assert_eq!(h.redeem("alice", 300).unwrap(), 300);
        h.unstake("alice", 500).unwrap();
        assert_eq!(h.vault.share_balance("alice"), 0);
        assert_eq!(
            h.vault.stake_receipt("alice").unwrap().unredeemed_shares,
            500
        );
        assert_eq!(h.vault.queued_shares(), 500);
    }

    #[test]
    fn unstake_beyond_shares_rejected() {
        let mut h = Harness::new();
        h.deposit("alice", 100).unwrap();
        // Pending stake is not shares yet.
        assert_eq!(
            h.unstake("alice", 1).unwrap_err(),
            LedgerError::InsufficientShares {
                available: 0,
                requested: 1
            }
        );
        h.roll(0).unwrap();
        assert!(h.unstake("alice", 101).is_err());
        h.unstake("alice", 100).unwrap();
    }

    #[test]
    fn stale_unstake_completes_before_a_new_one() {
        let mut h = Harness::new();
        h.deposit("alice", 1_000).unwrap();
        h.roll(0).unwrap();
        h.unstake("alice", 100).unwrap();
        h.roll(0).unwrap();

        let receipt = h.unstake("alice", 50).unwrap();
        assert_eq!(receipt, UnstakeReceipt { round: 2, shares: 50 });
        assert_eq!(h.vault.unstake_reserve(), 0);
        assert_eq!(h.vault.wrapper().withdrawal_receipt("alice").amount, 100);
    }

    #[test]
    fn same_round_unstakes_accumulate() {
        let mut h = Harness::new();
        h.deposit("alice", 1_000).unwrap();
        h.roll(0).unwrap();
        h.unstake("alice", 100).unwrap();
        let receipt = h.unstake("alice", 150).unwrap();
        assert_eq!(receipt, UnstakeReceipt { round: 1, shares: 250 });
    }

    #[test]
    fn max_redeem_moves_everything() {
        let mut h = Harness::new();
        h.deposit("alice", 1_000).unwrap();
        h.roll(0).unwrap();

        let (vault, mut caps) = h.split();
        assert_eq!(vault.max_redeem(&mut caps, "alice").unwrap(), 1_000);
        assert_eq!(
            vault.max_redeem(&mut caps, "alice").unwrap_err(),
            LedgerError::ZeroAmount
        );
        assert_eq!(vault.account_shares("alice").unwrap(), 1_000);
    }

    #[test]
    fn price_moves_with_yield_sign() {
        let mut h = Harness::new();
        h.deposit("alice", 10_000).unwrap();
        let base = h.roll(0).unwrap().price_per_share;

        let up = h.roll(250).unwrap().price_per_share;
        assert!(up >= base);
        let flat = h.roll(0).unwrap().price_per_share;
        assert_eq!(flat, up);
        let down = h.roll(-1_000).unwrap().price_per_share;
        assert!(down <= flat);
        assert_eq!(down, 92_500_000);
    }

    #[test]
    fn loss_beyond_backing_rejected_atomically() {
        let mut h = Harness::new();
        h.deposit("alice", 1_000).unwrap();
        h.roll(0).unwrap();
        h.deposit("bob", 500).unwrap();

        let err = h.roll(-1_001).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientVaultBalance {
                available: 1_000,
                requested: 1_001
            }
        );
        assert_eq!(err.kind(), ErrorKind::Solvency);
        assert_eq!(h.vault.round(), 1);
        assert_eq!(h.vault.total_pending(), 500);
        assert_eq!(h.vault.wrapper().balance_of(VAULT), 1_500);
    }

    #[test]
    fn yield_overflowing_u64_is_arithmetic() {
        let mut h = Harness::new();
        let err = h.roll(i128::from(u64::MAX) + 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Arithmetic);
    }

    #[test]
    fn only_keepers_roll() {
        let mut h = Harness::new();
        let (vault, mut caps) = h.split();
        let err = vault.roll_to_next_round(&mut caps, "alice", 0).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Unauthorized {
                caller: "alice".into(),
                role: Role::Keeper
            }
        );
        assert_eq!(vault.round(), 0);
    }

    #[test]
    fn cap_and_minimum_enforced() {
        let mut h = Harness::with(VaultConfig {
            cap: 1_000,
            minimum_supply: 100,
            ..config()
        });

        assert!(matches!(
            h.deposit("alice", 50).unwrap_err(),
            LedgerError::BelowMinimumSupply { total: 50, minimum: 100 }
        ));
        h.deposit("alice", 900).unwrap();
        assert!(matches!(
            h.deposit("bob", 101).unwrap_err(),
            LedgerError::ExceedsCap { total: 1_001, cap: 1_000 }
        ));
        h.deposit("bob", 100).unwrap();
    }

    #[test]
    fn non_whitelisted_caller_rejected() {
        let mut h = Harness::new();
        h.assets.fund("carol", 100).unwrap();
        h.assets.approve("carol", 100);
        let err = h.deposit("carol", 100).unwrap_err();
        assert_eq!(err, LedgerError::NotWhitelisted("carol".into()));
        assert_eq!(h.vault.total_pending(), 0);
    }

    #[test]
    fn failed_pull_leaves_vault_untouched() {
        let mut h = Harness::new();
        h.assets.approve("alice", 10);
        let err = h.deposit("alice", 100).unwrap_err();
        assert!(matches!(err, LedgerError::Asset(_)));
        assert_eq!(h.vault.total_pending(), 0);
        assert_eq!(h.vault.stake_receipt("alice").unwrap(), StakeReceipt::default());
    }

    #[test]
    fn independent_holders_stake_wrapped_balance() {
        let mut h = Harness::with(VaultConfig {
            independent: true,
            ..config()
        });
        {
            let (vault, mut caps) = h.split();
            vault
                .wrapper_mut()
                .deposit(&mut caps, "alice", "alice", 400)
                .unwrap();
            vault.stake(&mut caps, "alice", 300, "alice").unwrap();
        }
        assert_eq!(h.vault.wrapper().balance_of("alice"), 100);
        assert_eq!(h.vault.total_pending(), 300);

        // Independent release keeps the units wrapped with the holder.
        h.instant("alice", 300).unwrap();
        assert_eq!(h.vault.wrapper().balance_of("alice"), 400);
        assert!(h.vault.wrapper().withdrawal_receipt("alice").is_empty());
    }

    #[test]
    fn setters_are_owner_gated() {
        let mut h = Harness::new();
        let access = h.access.clone();
        assert!(h.vault.set_cap(&access, "alice", 5).is_err());
        h.vault.set_cap(&access, OWNER, 5_000).unwrap();
        assert_eq!(h.vault.cap(), 5_000);
        assert!(h.vault.set_minimum_supply(&access, OWNER, 5_001).is_err());
        h.vault.set_minimum_supply(&access, OWNER, 10).unwrap();
        assert!(h.vault.set_cap(&access, OWNER, 9).is_err());
    }

    #[test]
    fn yield_survives_full_exit_through_the_queue() {
        let mut h = Harness::new();
        h.deposit("alice", 1_000).unwrap();
        h.roll(0).unwrap();
        h.roll(100).unwrap();
        assert_eq!(h.assets.custody(), 1_100);

        h.unstake("alice", 1_000).unwrap();
        h.roll(0).unwrap();
        assert_eq!(h.complete("alice").unwrap(), 1_100);

        let (vault, mut caps) = h.split();
        let summary = vault
            .wrapper_mut()
            .process_withdrawals(&mut caps, OWNER)
            .unwrap();
        assert_eq!(summary.recalled, 1_100);
        assert_eq!(summary.epoch, 2);
        assert_eq!(
            vault
                .wrapper_mut()
                .complete_withdrawal(&mut caps, "alice")
                .unwrap(),
            1_100
        );
        assert_eq!(h.assets.balance_of("alice"), 1_000_100);
        assert_eq!(h.assets.custody(), 0);
    }

    #[test]
    fn unstake_worth_nothing_is_rejected() {
        let mut h = Harness::new();
        h.deposit("alice", 10).unwrap();
        h.roll(0).unwrap();
        h.roll(-9).unwrap();
        assert_eq!(h.vault.current_price_per_share().unwrap(), ONE / 10);

        let err = h.unstake("alice", 5).unwrap_err();
        assert_eq!(err, LedgerError::BelowConvertibleMinimum { amount: 5 });
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.vault.queued_shares(), 0);
        assert_eq!(h.vault.account_shares("alice").unwrap(), 10);

        h.unstake("alice", 10).unwrap();
        h.roll(0).unwrap();
        assert_eq!(h.complete("alice").unwrap(), 1);
    }

    #[test]
    fn stake_below_one_share_is_rejected() {
        let mut h = Harness::new();
        h.deposit("alice", 1_000).unwrap();
        h.roll(0).unwrap();
        h.roll(1_000).unwrap();
        assert_eq!(h.vault.current_price_per_share().unwrap(), 2 * ONE);

        let err = h.deposit("bob", 1).unwrap_err();
        assert_eq!(err, LedgerError::BelowConvertibleMinimum { amount: 1 });
        assert_eq!(h.vault.total_pending(), 0);
        assert_eq!(h.assets.balance_of("bob"), 1_000_000);

        h.deposit("bob", 2).unwrap();
        h.roll(0).unwrap();
        assert_eq!(h.vault.account_shares("bob").unwrap(), 1);
        assert_eq!(h.vault.account_vault_balance("bob").unwrap(), 2);
    }
}
