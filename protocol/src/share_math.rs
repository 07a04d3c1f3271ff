//! # Share Math
//!
//! Pure conversions between asset amounts and vault shares at a fixed-point
//! price-per-share. No state, no I/O.
//!
//! ## Rounding
//!
//! | Conversion        | Formula                                  | Rounding |
//! |-------------------|------------------------------------------|----------|
//! | assets → shares   | `assets * 10^decimals / price`           | DOWN     |
//! | shares → assets   | `shares * price / 10^decimals`           | DOWN     |
//! | price-per-share   | `total_assets * 10^decimals / shares`    | DOWN     |
//!
//! There is no rounding-up path. A deposit never receives more shares than
//! its assets buy, and a withdrawal never receives more assets than its
//! shares are worth, so repeated conversions can only leak dust towards the
//! vault, never away from it.
//!
//! Amounts and shares are `u64`; every product is formed in `u128` and
//! narrowed back with a checked conversion.

use thiserror::Error;

use crate::config::MAX_DECIMALS;

/// Errors produced by share conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    /// An intermediate product or a narrowed result does not fit.
    #[error("arithmetic overflow in share conversion")]
    Overflow,

    /// Conversion attempted against a zero price or an empty share supply.
    #[error("division by zero in share conversion")]
    DivisionByZero,

    /// The requested precision exceeds [`MAX_DECIMALS`].
    #[error("unsupported precision: {0} decimals")]
    InvalidDecimals(u8),
}

/// The fixed-point representation of a price of exactly 1.0.
pub fn unit_price(decimals: u8) -> Result<u128, MathError> {
    if decimals > MAX_DECIMALS {
        return Err(MathError::InvalidDecimals(decimals));
    }
    Ok(10u128.pow(decimals as u32))
}

/// Computes `value * numerator / denominator`, truncated.
///
/// The single rounding helper every conversion goes through.
pub fn mul_div_down(value: u128, numerator: u128, denominator: u128) -> Result<u128, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = value.checked_mul(numerator).ok_or(MathError::Overflow)?;
    Ok(product / denominator)
}

fn narrow(value: u128) -> Result<u64, MathError> {
    u64::try_from(value).map_err(|_| MathError::Overflow)
}

/// Converts an asset amount into shares at `price_per_share`.
///
/// Amounts smaller than one share's worth convert to zero; rejecting such
/// deposits is the caller's job.
pub fn assets_to_shares(assets: u64, price_per_share: u128, decimals: u8) -> Result<u64, MathError> {
    let unit = unit_price(decimals)?;
    narrow(mul_div_down(assets as u128, unit, price_per_share)?)
}

/// Converts shares into the asset amount they are worth at `price_per_share`.
pub fn shares_to_assets(shares: u64, price_per_share: u128, decimals: u8) -> Result<u64, MathError> {
    let unit = unit_price(decimals)?;
    narrow(mul_div_down(shares as u128, price_per_share, unit)?)
}

/// Price of one share given the vault's backing assets and share supply.
///
/// With no shares outstanding the price is pinned to 1.0, whatever the
/// backing.
pub fn price_per_share(total_assets: u64, total_shares: u64, decimals: u8) -> Result<u128, MathError> {
    let unit = unit_price(decimals)?;
    if total_shares == 0 {
        return Ok(unit);
    }
    mul_div_down(total_assets as u128, unit, total_shares as u128)
}
