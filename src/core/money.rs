//! Conversion between public `Decimal` amounts and persisted minor units.
//!
//! Amounts are stored as whole hundredths in `i64` columns so sums are exact in every backend.
//! Inputs with more than two decimal places are rounded half-to-even (banker's rounding).
//! Balances and totals fold those rows in `i128`, so any number of stored amounts can be added
//! without overflow.

use crate::errors::{Error, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Number of decimal places kept for every amount.
pub const SCALE: u32 = 2;

/// Converts a decimal amount to minor units.
///
/// # Errors
/// Returns `Error::InvalidAmount` if the value does not fit in an `i64` of hundredths.
pub fn to_minor(field: &'static str, amount: Decimal) -> Result<i64> {
    amount
        .round_dp(SCALE)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.trunc().to_i64())
        .ok_or(Error::InvalidAmount { field, amount })
}

/// Converts minor units back to a decimal amount with two decimal places.
#[must_use]
pub fn from_minor(minor: i64) -> Decimal {
    Decimal::new(minor, SCALE)
}

/// Converts a folded `i128` total of minor units back to a decimal amount.
///
/// # Errors
/// Returns `Error::AmountOverflow` if the total exceeds the 96-bit range of `Decimal`.
pub fn from_total(field: &'static str, minor: i128) -> Result<Decimal> {
    Decimal::try_from_i128_with_scale(minor, SCALE).map_err(|_| Error::AmountOverflow { field })
}

/// Converts a strictly positive amount to minor units.
///
/// # Errors
/// Returns `Error::InvalidAmount` for zero, negative, or out-of-range amounts, including values
/// that round to zero at two decimal places.
pub fn positive_minor(field: &'static str, amount: Decimal) -> Result<i64> {
    let minor = to_minor(field, amount)?;
    if minor <= 0 {
        return Err(Error::InvalidAmount { field, amount });
    }
    Ok(minor)
}
