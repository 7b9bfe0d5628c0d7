//! Conversion between ledger amounts (decimal major units) and the integer
//! minor units the gateway speaks.

use rust_decimal::{Decimal, prelude::ToPrimitive};

use crate::app_error::{AppError, AppResult};

/// Digits after the decimal point a ledger amount may carry.
const MINOR_UNIT_DIGITS: u32 = 2;

/// Exact conversion. Negative amounts and fractions of a minor unit are
/// refused rather than rounded.
pub fn to_minor_units(amount: Decimal) -> AppResult<i64> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AppError::InvalidAmount(format!("Amount {amount} is negative")));
    }
    if amount.normalize().scale() > MINOR_UNIT_DIGITS {
        return Err(AppError::InvalidAmount(format!(
            "Amount {amount} is finer than one minor unit"
        )));
    }
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| AppError::InvalidAmount(format!("Amount {amount} is out of range")))
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, MINOR_UNIT_DIGITS)
}
