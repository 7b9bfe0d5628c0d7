//! Period arithmetic and upgrade proration.
//!
//! Both functions are pure so they can be tested without a ledger.

use chrono::{DateTime, Months, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::domain::entities::catalog::BillingInterval;

/// Returns the end of a billing period that starts at `start`.
///
/// Month ends are clamped the way calendars do (Jan 31 + 1 month = Feb 28/29).
pub fn advance_period(start: DateTime<Utc>, interval: BillingInterval) -> DateTime<Utc> {
    start
        .checked_add_months(Months::new(interval.months()))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpgradeCharge {
    /// Value of the unused part of the current period.
    pub credit: Decimal,
    pub amount_to_pay: Decimal,
}

impl UpgradeCharge {
    pub fn is_free(&self) -> bool {
        self.amount_to_pay.is_zero()
    }
}

/// Prorates an upgrade from `current_price` to `new_price` at `now`.
///
/// credit = current_price / total_days * remaining_days, measured in fractional days,
/// amount_to_pay = max(0, new_price - credit). Both are rounded to two decimals.
pub fn compute_upgrade_charge(
    current_price: Decimal,
    new_price: Decimal,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> UpgradeCharge {
    let total_secs = (period_end - period_start).num_seconds();
    let credit = if total_secs <= 0 {
        Decimal::ZERO
    } else {
        let remaining_secs = (period_end - now).num_seconds().clamp(0, total_secs);
        current_price * Decimal::from(remaining_secs) / Decimal::from(total_secs)
    };
    let credit = round_money(credit.max(Decimal::ZERO));
    let amount_to_pay = round_money((new_price - credit).max(Decimal::ZERO));

    UpgradeCharge {
        credit,
        amount_to_pay,
    }
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
