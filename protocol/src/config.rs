//! # Protocol Configuration & Constants
//!
//! Every magic number in Harbor lives here, together with [`VaultConfig`],
//! the runtime configuration a vault instance is built from. If you're
//! hardcoding a cap or a precision somewhere else, move it here.
//!
//! Configuration is read-only to the ledgers once constructed. Changing a
//! cap or the minimum supply afterwards goes through the owner-gated setters
//! on [`VaultLedger`](crate::vault::VaultLedger), never through this file.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string of the accounting rules.
///
/// Bump the minor component whenever snapshot layout changes, because an
/// old snapshot will no longer decode.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Fixed-Point Parameters
// ---------------------------------------------------------------------------

/// Default number of fractional digits in a price-per-share.
/// 8 decimals, same as Bitcoin. `10^8` represents a price of 1.0.
pub const DEFAULT_DECIMALS: u8 = 8;

/// Largest supported precision. `10^18` still fits in a `u64`, and
/// `u64::MAX * 10^18` still fits in the `u128` intermediate.
pub const MAX_DECIMALS: u8 = 18;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// The epoch a fresh wrapper ledger starts in. Starting at 1 keeps the
/// zero-valued default receipt distinguishable from a real one.
pub const INITIAL_EPOCH: u32 = 1;

/// The round a fresh vault starts in.
pub const INITIAL_ROUND: u16 = 0;

// ---------------------------------------------------------------------------
// Vault Limits
// ---------------------------------------------------------------------------

/// Default vault capacity in smallest units.
pub const DEFAULT_CAP: u64 = 1_000_000_000_000;

/// Default minimum total balance the vault must hold after a deposit.
pub const DEFAULT_MINIMUM_SUPPLY: u64 = 1;

/// Default identity of the vault itself. The vault is the wrapper's keeper,
/// so this is also the account that holds the vault's wrapped custody.
pub const DEFAULT_VAULT_ADDRESS: &str = "harbor:vault";

// ---------------------------------------------------------------------------
// Keeper Cadence
// ---------------------------------------------------------------------------

/// Expected interval between round rolls. The engine never schedules rolls
/// itself; this is advisory for keepers and dashboards.
pub const ROUND_CADENCE: Duration = Duration::from_secs(24 * 60 * 60);

/// Expected interval between epoch advances (`process_withdrawals`).
pub const EPOCH_CADENCE: Duration = Duration::from_secs(24 * 60 * 60);

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a [`VaultConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Runtime configuration for one vault instance and its wrapper ledger.
///
/// Serialized as TOML on disk:
///
/// ```toml
/// vault_address = "harbor:vault"
/// owner = "harbor:owner"
/// keepers = ["harbor:keeper"]
/// cap = 1000000000000
/// minimum_supply = 1
/// decimals = 8
/// independent = false
/// whitelist_enabled = true
/// native_asset = false
/// whitelist = ["alice"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Identity of the vault; registered as the wrapper's keeper.
    pub vault_address: String,
    /// Identity allowed to advance epochs and change settings.
    pub owner: String,
    /// Identities allowed to roll rounds.
    pub keepers: BTreeSet<String>,
    /// Maximum total vault balance in smallest units.
    pub cap: u64,
    /// Minimum total vault balance a deposit must leave behind.
    pub minimum_supply: u64,
    /// Fractional digits of the price-per-share.
    pub decimals: u8,
    /// When `true`, users may hold wrapped balances outside the vault.
    pub independent: bool,
    /// When `false`, the whitelist predicate is bypassed entirely.
    pub whitelist_enabled: bool,
    /// When `true`, the underlying is the native currency wrapped 1:1.
    pub native_asset: bool,
    /// Initial whitelist membership.
    pub whitelist: BTreeSet<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            vault_address: DEFAULT_VAULT_ADDRESS.to_string(),
            owner: "harbor:owner".to_string(),
            keepers: BTreeSet::from(["harbor:keeper".to_string()]),
            cap: DEFAULT_CAP,
            minimum_supply: DEFAULT_MINIMUM_SUPPLY,
            decimals: DEFAULT_DECIMALS,
            independent: false,
            whitelist_enabled: true,
            native_asset: false,
            whitelist: BTreeSet::new(),
        }
    }
}

impl VaultConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Renders the config as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Rejects configurations the ledgers cannot operate under.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vault_address.is_empty() {
            return Err(ConfigError::Invalid("vault_address must not be empty".into()));
        }
        if self.owner.is_empty() {
            return Err(ConfigError::Invalid("owner must not be empty".into()));
        }
        if self.decimals > MAX_DECIMALS {
            return Err(ConfigError::Invalid(format!(
                "decimals must be at most {}, got {}",
                MAX_DECIMALS, self.decimals
            )));
        }
        if self.minimum_supply > self.cap {
            return Err(ConfigError::Invalid(format!(
                "minimum_supply {} exceeds cap {}",
                self.minimum_supply, self.cap
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        VaultConfig::default().validate().unwrap();
    }

    #[test]
    fn counters_start_where_receipts_expect() {
        // An empty receipt has epoch 0; it must never look "initiated now".
        assert!(INITIAL_EPOCH > 0);
        assert_eq!(INITIAL_ROUND, 0);
    }

    #[test]
    fn max_decimals_fits_intermediate() {
        let unit = 10u128.pow(MAX_DECIMALS as u32);
        assert!(unit <= u64::MAX as u128);
        assert!((u64::MAX as u128).checked_mul(unit).is_some());
    }

    #[test]
    fn toml_roundtrip_preserves_fields() {
        let mut config = VaultConfig::default();
        config.whitelist.insert("alice".into());
        config.independent = true;

        let rendered = config.to_toml_string().unwrap();
        let parsed = VaultConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed = VaultConfig::from_toml_str("cap = 5000\n").unwrap();
        assert_eq!(parsed.cap, 5000);
        assert_eq!(parsed.decimals, DEFAULT_DECIMALS);
        assert_eq!(parsed.vault_address, DEFAULT_VAULT_ADDRESS);
    }

    #[test]
    fn rejects_excessive_decimals() {
        let err = VaultConfig::from_toml_str("decimals = 19\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_minimum_above_cap() {
        let err = VaultConfig::from_toml_str("cap = 10\nminimum_supply = 11\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn cadence_sanity() {
        assert!(ROUND_CADENCE.as_secs() > 0);
        assert!(EPOCH_CADENCE.as_secs() > 0);
    }
}
