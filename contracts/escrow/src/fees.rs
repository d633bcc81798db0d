//! Fee arithmetic.
//!
//! Rates are expressed in basis points (1 bp = 0.01%, 10_000 bp = 100%) and
//! results are rounded half-up to the asset's smallest unit.

use crate::types::Error;

pub const BASIS_POINTS_DIVISOR: i128 = 10_000;

/// Highest fee rate the admin may configure: 10%.
pub const MAX_FEE_RATE: u32 = 1_000;

/// Returns `round_half_up(amount * fee_rate / 10_000)`.
///
/// # Errors
/// - InvalidAmount: negative `amount`, or an amount large enough to overflow
///   the intermediate product
pub fn compute_fee(amount: i128, fee_rate: u32) -> Result<i128, Error> {
    if amount < 0 {
        return Err(Error::InvalidAmount);
    }

    amount
        .checked_mul(fee_rate as i128)
        .and_then(|scaled| scaled.checked_add(BASIS_POINTS_DIVISOR / 2))
        .map(|scaled| scaled / BASIS_POINTS_DIVISOR)
        .ok_or(Error::InvalidAmount)
}

/// Value a seller must deposit to fund a trade of `amount`: the amount plus
/// its fee.
pub fn funding_amount(amount: i128, fee_rate: u32) -> Result<i128, Error> {
    let fee = compute_fee(amount, fee_rate)?;
    amount.checked_add(fee).ok_or(Error::InvalidAmount)
}
