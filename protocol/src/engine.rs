//! # Vault Service — Transactional Engine
//!
//! [`VaultService`] is the only way the outside world touches a vault. It
//! owns the [`VaultLedger`] (and through it the wrapper), the asset ledger,
//! and the access list, and runs every mutation as one transaction:
//!
//! ```text
//!   lock ──▶ clone state ──▶ apply transition ──▶ persist snapshot ──▶ swap in
//!                                  │                     │
//!                                  └── Err ──────────────┴──▶ drop clone, state unchanged
//! ```
//!
//! A rejected transition or a failed snapshot write leaves both the in-memory
//! state and the database exactly as they were. Rejections are logged at
//! `warn` with the operation name and error kind, and handed back unchanged.
//! Nothing is retried here.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capability::{
    AccessControl, AccessList, AssetLedger, Capabilities, InMemoryAssetLedger,
};
use crate::config::{ConfigError, VaultConfig};
use crate::error::{ErrorKind, LedgerError, LedgerResult};
use crate::storage::{DbError, HarborDB};
use crate::vault::{RollSummary, StakeReceipt, UnstakeReceipt, VaultLedger};
use crate::wrapper::ledger::require_owner;
use crate::wrapper::{EpochSummary, WithdrawalReceipt};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by [`VaultService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl ServiceError {
    /// The ledger error kind, if this is a ledger rejection.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ServiceError::Ledger(err) => Some(err.kind()),
            ServiceError::Storage(_) | ServiceError::Config(_) => None,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Global counters of a vault and its wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSummary {
    pub round: u16,
    pub epoch: u32,
    /// Start price of the current round.
    pub price_per_share: u128,
    pub decimals: u8,
    pub total_pending: u64,
    pub total_shares: u64,
    pub queued_shares: u64,
    pub unstake_reserve: u64,
    pub vault_total_balance: u64,
    pub cap: u64,
    pub minimum_supply: u64,
    pub wrapped_supply: u64,
    pub queued_withdrawals: u64,
    pub withdrawal_reserve: u64,
    pub independent: bool,
    pub whitelist_enabled: bool,
}

/// Everything the engine knows about one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub address: String,
    pub whitelisted: bool,
    pub wrapped_balance: u64,
    pub withdrawal_receipt: WithdrawalReceipt,
    pub stake_receipt: StakeReceipt,
    pub unstake_receipt: UnstakeReceipt,
    pub share_balance: u64,
    /// Held plus unredeemed shares.
    pub shares: u64,
    /// Share value at the current start price plus pending stake.
    pub vault_balance: u64,
}

// ---------------------------------------------------------------------------
// VaultService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServiceState<A, C> {
    ledger: VaultLedger,
    assets: A,
    access: C,
}

/// Serialized, persisted access to one vault.
pub struct VaultService<A = InMemoryAssetLedger, C = AccessList> {
    state: Mutex<ServiceState<A, C>>,
    db: Option<HarborDB>,
}

impl<A, C> VaultService<A, C>
where
    A: AssetLedger + Clone + Serialize + DeserializeOwned,
    C: AccessControl + Clone + Serialize + DeserializeOwned,
{
    /// Creates a vault with no durable storage.
    pub fn new(config: &VaultConfig, assets: A, access: C) -> ServiceResult<Self> {
        config.validate()?;
        let ledger = VaultLedger::from_config(config)?;
        Ok(Self {
            state: Mutex::new(ServiceState {
                ledger,
                assets,
                access,
            }),
            db: None,
        })
    }

    /// Restores the vault stored in `db`, or creates and persists a fresh one
    /// from `config` if the database is empty.
    pub fn open(config: &VaultConfig, assets: A, access: C, db: HarborDB) -> ServiceResult<Self> {
        if let Some(state) = db.get_snapshot::<ServiceState<A, C>>()? {
            info!(
                round = state.ledger.round(),
                epoch = state.ledger.wrapper().epoch(),
                commits = db.commit_count()?,
                "vault restored from snapshot"
            );
            return Ok(Self {
                state: Mutex::new(state),
                db: Some(db),
            });
        }

        let service = Self::new(config, assets, access)?;
        db.put_snapshot(&*service.state.lock())?;
        info!(vault = %config.vault_address, "initialized fresh vault");
        Ok(Self {
            db: Some(db),
            ..service
        })
    }

    // -- Transactions -------------------------------------------------------

    fn commit<T>(
        &self,
        op: &'static str,
        apply: impl FnOnce(&mut ServiceState<A, C>) -> LedgerResult<T>,
    ) -> ServiceResult<T> {
        let mut guard = self.state.lock();
        let mut next = guard.clone();

        let value = match apply(&mut next) {
            Ok(value) => value,
            Err(err) => {
                warn!(op, kind = %err.kind(), error = %err, "transition rejected");
                return Err(err.into());
            }
        };

        if let Err(err) = self.persist(&next) {
            warn!(op, error = %err, "snapshot write failed, transition discarded");
            return Err(err.into());
        }

        *guard = next;
        debug!(op, "transition committed");
        Ok(value)
    }

    fn transact<T>(
        &self,
        op: &'static str,
        apply: impl FnOnce(&mut VaultLedger, &mut Capabilities<'_>) -> LedgerResult<T>,
    ) -> ServiceResult<T> {
        self.commit(op, |state| {
            let mut caps = Capabilities::new(&mut state.assets, &state.access);
            apply(&mut state.ledger, &mut caps)
        })
    }

    fn persist(&self, state: &ServiceState<A, C>) -> Result<(), DbError> {
        let Some(db) = &self.db else {
            return Ok(());
        };
        let closed = state.ledger.round().checked_sub(1).and_then(|round| {
            state
                .ledger
                .round_price_per_share(round)
                .map(|price| (round, price))
        });
        db.put_snapshot_with_price(state, closed)
    }

    // -- Wrapper ------------------------------------------------------------

    pub fn deposit(&self, caller: &str, depositor: &str, amount: u64) -> ServiceResult<u64> {
        self.transact("deposit", |ledger, caps| {
            ledger.wrapper_mut().deposit(caps, caller, depositor, amount)
        })
    }

    pub fn deposit_native(&self, caller: &str, depositor: &str, amount: u64) -> ServiceResult<u64> {
        self.transact("deposit_native", |ledger, caps| {
            ledger
                .wrapper_mut()
                .deposit_native(caps, caller, depositor, amount)
        })
    }

    pub fn initiate_withdrawal(
        &self,
        depositor: &str,
        amount: u64,
    ) -> ServiceResult<WithdrawalReceipt> {
        self.transact("initiate_withdrawal", |ledger, caps| {
            ledger.wrapper_mut().initiate_withdrawal(caps, depositor, amount)
        })
    }

    pub fn complete_withdrawal(&self, depositor: &str) -> ServiceResult<u64> {
        self.transact("complete_withdrawal", |ledger, caps| {
            ledger.wrapper_mut().complete_withdrawal(caps, depositor)
        })
    }

    pub fn process_withdrawals(&self, caller: &str) -> ServiceResult<EpochSummary> {
        self.transact("process_withdrawals", |ledger, caps| {
            ledger.wrapper_mut().process_withdrawals(caps, caller)
        })
    }

    pub fn set_independent(&self, caller: &str, independent: bool) -> ServiceResult<()> {
        self.transact("set_independent", |ledger, caps| {
            ledger
                .wrapper_mut()
                .set_independent(caps.access, caller, independent)
        })
    }

    pub fn set_whitelist_enabled(&self, caller: &str, enabled: bool) -> ServiceResult<()> {
        self.transact("set_whitelist_enabled", |ledger, caps| {
            ledger
                .wrapper_mut()
                .set_whitelist_enabled(caps.access, caller, enabled)
        })
    }

    // -- Vault --------------------------------------------------------------

    pub fn deposit_and_stake(
        &self,
        caller: &str,
        amount: u64,
        creditor: &str,
    ) -> ServiceResult<StakeReceipt> {
        self.transact("deposit_and_stake", |ledger, caps| {
            ledger.deposit_and_stake(caps, caller, amount, creditor)
        })
    }

    pub fn stake(&self, caller: &str, amount: u64, creditor: &str) -> ServiceResult<StakeReceipt> {
        self.transact("stake", |ledger, caps| {
            ledger.stake(caps, caller, amount, creditor)
        })
    }

    pub fn unstake(&self, caller: &str, shares: u64) -> ServiceResult<UnstakeReceipt> {
        self.transact("unstake", |ledger, caps| ledger.unstake(caps, caller, shares))
    }

    pub fn instant_unstake(&self, caller: &str, amount: u64) -> ServiceResult<StakeReceipt> {
        self.transact("instant_unstake", |ledger, caps| {
            ledger.instant_unstake(caps, caller, amount)
        })
    }

    pub fn complete_unstake(&self, caller: &str) -> ServiceResult<u64> {
        self.transact("complete_unstake", |ledger, caps| {
            ledger.complete_unstake(caps, caller)
        })
    }

    pub fn redeem(&self, caller: &str, shares: u64) -> ServiceResult<u64> {
        self.transact("redeem", |ledger, caps| ledger.redeem(caps, caller, shares))
    }

    pub fn max_redeem(&self, caller: &str) -> ServiceResult<u64> {
        self.transact("max_redeem", |ledger, caps| ledger.max_redeem(caps, caller))
    }

    pub fn roll_to_next_round(&self, caller: &str, yield_delta: i128) -> ServiceResult<RollSummary> {
        let summary = self.transact("roll_to_next_round", |ledger, caps| {
            ledger.roll_to_next_round(caps, caller, yield_delta)
        })?;
        info!(
            round = summary.round,
            price = %summary.price_per_share,
            "round committed"
        );
        Ok(summary)
    }

    pub fn set_cap(&self, caller: &str, cap: u64) -> ServiceResult<()> {
        self.transact("set_cap", |ledger, caps| ledger.set_cap(caps.access, caller, cap))
    }

    pub fn set_minimum_supply(&self, caller: &str, minimum_supply: u64) -> ServiceResult<()> {
        self.transact("set_minimum_supply", |ledger, caps| {
            ledger.set_minimum_supply(caps.access, caller, minimum_supply)
        })
    }

    // -- Reads --------------------------------------------------------------

    /// Runs `read` against the committed ledger.
    pub fn with_ledger<R>(&self, read: impl FnOnce(&VaultLedger) -> R) -> R {
        read(&self.state.lock().ledger)
    }

    pub fn epoch(&self) -> u32 {
        self.with_ledger(|ledger| ledger.wrapper().epoch())
    }

    pub fn round(&self) -> u16 {
        self.with_ledger(VaultLedger::round)
    }

    /// Closing price of a finished round.
    pub fn price_per_share(&self, round: u16) -> Option<u128> {
        self.with_ledger(|ledger| ledger.round_price_per_share(round))
    }

    pub fn price_history(&self) -> Vec<(u16, u128)> {
        self.with_ledger(|ledger| ledger.price_history().collect())
    }

    pub fn wrapped_balance(&self, account: &str) -> u64 {
        self.with_ledger(|ledger| ledger.wrapper().balance_of(account))
    }

    pub fn withdrawal_receipt(&self, account: &str) -> WithdrawalReceipt {
        self.with_ledger(|ledger| ledger.wrapper().withdrawal_receipt(account))
    }

    pub fn stake_receipt(&self, account: &str) -> ServiceResult<StakeReceipt> {
        Ok(self.with_ledger(|ledger| ledger.stake_receipt(account))?)
    }

    pub fn unstake_receipt(&self, account: &str) -> UnstakeReceipt {
        self.with_ledger(|ledger| ledger.unstake_receipt(account))
    }

    pub fn share_balance(&self, account: &str) -> u64 {
        self.with_ledger(|ledger| ledger.share_balance(account))
    }

    pub fn total_pending(&self) -> u64 {
        self.with_ledger(VaultLedger::total_pending)
    }

    pub fn is_whitelisted(&self, account: &str) -> bool {
        self.state.lock().access.is_whitelisted(account)
    }

    pub fn summary(&self) -> ServiceResult<VaultSummary> {
        let state = self.state.lock();
        let ledger = &state.ledger;
        let wrapper = ledger.wrapper();
        Ok(VaultSummary {
            round: ledger.round(),
            epoch: wrapper.epoch(),
            price_per_share: ledger.current_price_per_share()?,
            decimals: ledger.decimals(),
            total_pending: ledger.total_pending(),
            total_shares: ledger.total_shares(),
            queued_shares: ledger.queued_shares(),
            unstake_reserve: ledger.unstake_reserve(),
            vault_total_balance: ledger.vault_total_balance(),
            cap: ledger.cap(),
            minimum_supply: ledger.minimum_supply(),
            wrapped_supply: wrapper.total_supply(),
            queued_withdrawals: wrapper.queued_withdrawals(),
            withdrawal_reserve: wrapper.withdrawal_reserve(),
            independent: wrapper.is_independent(),
            whitelist_enabled: wrapper.whitelist_enabled(),
        })
    }

    pub fn account(&self, address: &str) -> ServiceResult<AccountView> {
        let state = self.state.lock();
        let ledger = &state.ledger;
        Ok(AccountView {
            address: address.to_string(),
            whitelisted: state.access.is_whitelisted(address),
            wrapped_balance: ledger.wrapper().balance_of(address),
            withdrawal_receipt: ledger.wrapper().withdrawal_receipt(address),
            stake_receipt: ledger.stake_receipt(address)?,
            unstake_receipt: ledger.unstake_receipt(address),
            share_balance: ledger.share_balance(address),
            shares: ledger.account_shares(address)?,
            vault_balance: ledger.account_vault_balance(address)?,
        })
    }

    /// Whether the service writes snapshots.
    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }
}

// ---------------------------------------------------------------------------
// Access-list administration
// ---------------------------------------------------------------------------

impl<A> VaultService<A, AccessList>
where
    A: AssetLedger + Clone + Serialize + DeserializeOwned,
{
    /// Adds or removes `account` from the whitelist. Owner-only.
    pub fn set_whitelisted(&self, caller: &str, account: &str, whitelisted: bool) -> ServiceResult<()> {
        self.commit("set_whitelisted", |state| {
            require_owner(&state.access, caller)?;
            if whitelisted {
                state.access.whitelist(account);
            } else {
                state.access.unwhitelist(account);
            }
            info!(account, whitelisted, "whitelist updated");
            Ok(())
        })
    }

    /// Grants or revokes the keeper role. Owner-only.
    pub fn set_keeper(&self, caller: &str, account: &str, keeper: bool) -> ServiceResult<()> {
        self.commit("set_keeper", |state| {
            require_owner(&state.access, caller)?;
            if keeper {
                state.access.add_keeper(account);
            } else {
                state.access.remove_keeper(account);
            }
            info!(account, keeper, "keeper set updated");
            Ok(())
        })
    }

    pub fn whitelisted_count(&self) -> usize {
        self.state.lock().access.whitelisted_count()
    }
}

// ---------------------------------------------------------------------------
// In-memory asset ledger (devnet)
// ---------------------------------------------------------------------------

impl<C> VaultService<InMemoryAssetLedger, C>
where
    C: AccessControl + Clone + Serialize + DeserializeOwned,
{
    /// Credits `amount` of the underlying to `account`. Owner-only faucet.
    pub fn fund(&self, caller: &str, account: &str, amount: u64) -> ServiceResult<u64> {
        self.commit("fund", |state| {
            require_owner(&state.access, caller)?;
            Ok(state.assets.fund(account, amount)?)
        })
    }

    /// Sets `account`'s allowance for the wrapper. Owner-only devnet
    /// faucet companion to [`fund`](Self::fund); a live asset ledger takes
    /// approvals from the account holder instead.
    pub fn approve(&self, caller: &str, account: &str, amount: u64) -> ServiceResult<()> {
        self.commit("approve", |state| {
            require_owner(&state.access, caller)?;
            state.assets.approve(account, amount);
            Ok(())
        })
    }

    pub fn underlying_balance(&self, account: &str) -> u64 {
        self.state.lock().assets.balance_of(account)
    }

    pub fn custody(&self) -> u64 {
        self.state.lock().assets.custody()
    }
}

impl VaultService {
    /// A non-persistent vault with an in-memory asset ledger and the
    /// config's access list.
    pub fn from_config(config: &VaultConfig) -> ServiceResult<Self> {
        Self::new(config, InMemoryAssetLedger::new(), AccessList::from_config(config))
    }

    /// Opens (or initializes) a devnet vault stored in `db`.
    pub fn open_devnet(config: &VaultConfig, db: HarborDB) -> ServiceResult<Self> {
        Self::open(
            config,
            InMemoryAssetLedger::new(),
            AccessList::from_config(config),
            db,
        )
    }
}
