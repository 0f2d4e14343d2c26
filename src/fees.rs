//! Late-fee computation and rental rate parsing.
//!
//! Everything here is pure: dates and amounts go in, a [`Decimal`] comes out.
//! Display formatting of currency lives with the receipts, not here.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::RentalError;

/// Currency markers stripped before a rate is parsed. `Â` shows up in rates
/// that were stored as mis-decoded UTF-8 (`Â£10/day`).
const CURRENCY_MARKERS: [char; 4] = ['£', 'Â', '$', '€'];

/// Parameters of the late-fee rule
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FeePolicy {
    /// Days a rental may last before late fees apply
    pub allowed_days: u32,
    /// Flat charge added to the daily rate for each late day
    pub late_fee_per_day: Decimal,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self { allowed_days: 7, late_fee_per_day: Decimal::from(5) }
    }
}

/// A parsed rental rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalRate {
    /// Amount charged per period
    pub amount: Decimal,
    /// Period suffix as written (`day`), if one was given
    pub period: Option<String>,
}

/// Parse a rate such as `£10/day`, `Â£7.50/day` or a bare `15`
///
/// # Errors
///
/// Returns `RentalError::InvalidFormat` when no non-negative decimal amount
/// remains after stripping currency markers and the `/period` suffix.
pub fn parse_rental_rate(raw: &str) -> Result<RentalRate, RentalError> {
    let cleaned: String = raw.chars().filter(|c| !CURRENCY_MARKERS.contains(c)).collect();
    let (amount_part, period) = match cleaned.split_once('/') {
        Some((amount, period)) => {
            let period = period.trim();
            (amount, (!period.is_empty()).then(|| period.to_string()))
        }
        None => (cleaned.as_str(), None),
    };

    let amount = Decimal::from_str(amount_part.trim())
        .map_err(|_| RentalError::InvalidFormat(raw.to_string()))?;
    if amount.is_sign_negative() {
        return Err(RentalError::InvalidFormat(raw.to_string()));
    }
    Ok(RentalRate { amount, period })
}

/// How a returned rental's charge was made up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    /// Whole days between rental and return
    pub days_rented: u32,
    /// Days beyond the allowance
    pub late_days: u32,
    /// `late_days * (daily_rate + late_fee_per_day)`
    pub late_fee: Decimal,
    /// Flat damage charge
    pub damage_charge: Decimal,
}

impl FeeBreakdown {
    /// Late fee plus damage charge
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.late_fee.saturating_add(self.damage_charge)
    }
}

/// Work out the charge for a rental returned on `return_date`
///
/// # Errors
///
/// Returns `RentalError::InvalidArgument` if `return_date` precedes
/// `rental_date`, if a rate or charge is negative, or if the fee overflows.
pub fn fee_breakdown(
    rental_date: NaiveDate,
    return_date: NaiveDate,
    daily_rate: Decimal,
    policy: &FeePolicy,
    damage_charge: Decimal,
) -> Result<FeeBreakdown, RentalError> {
    if return_date < rental_date {
        return Err(RentalError::InvalidArgument(format!(
            "return date {return_date} precedes rental date {rental_date}"
        )));
    }
    if daily_rate.is_sign_negative() || damage_charge.is_sign_negative() {
        return Err(RentalError::InvalidArgument(
            "rates and charges must not be negative".to_string(),
        ));
    }

    let days_rented = u32::try_from(return_date.signed_duration_since(rental_date).num_days())
        .map_err(|_| RentalError::InvalidArgument("rental period is too long".to_string()))?;
    let late_days = days_rented.saturating_sub(policy.allowed_days);

    let late_fee = if late_days > 0 {
        daily_rate
            .checked_add(policy.late_fee_per_day)
            .and_then(|per_day| per_day.checked_mul(Decimal::from(late_days)))
            .ok_or_else(|| RentalError::InvalidArgument("late fee overflows".to_string()))?
    } else {
        Decimal::ZERO
    };

    Ok(FeeBreakdown { days_rented, late_days, late_fee, damage_charge })
}

/// Total charge for a rental: late fee plus `damage_charge`
///
/// # Errors
///
/// See [`fee_breakdown`].
pub fn compute_fees(
    rental_date: NaiveDate,
    return_date: NaiveDate,
    daily_rate: Decimal,
    policy: &FeePolicy,
    damage_charge: Decimal,
) -> Result<Decimal, RentalError> {
    fee_breakdown(rental_date, return_date, daily_rate, policy, damage_charge).map(|b| b.total())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    /// Helper to build a calendar date in tests
    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
    }

    #[test]
    fn test_no_fee_within_allowance() {
        let fee = compute_fees(date(2024, 1, 1), date(2024, 1, 5), dec!(10), &FeePolicy::default(), dec!(0));
        assert_eq!(fee, Ok(dec!(0)));
    }

    #[test]
    fn test_late_fee_charges_rate_plus_flat_fee_per_late_day() {
        let fee = compute_fees(date(2024, 1, 1), date(2024, 1, 12), dec!(10), &FeePolicy::default(), dec!(0));
        assert_eq!(fee, Ok(dec!(60)));
    }

    #[test]
    fn test_exactly_allowed_days_is_not_late() {
        let breakdown =
            fee_breakdown(date(2024, 1, 1), date(2024, 1, 8), dec!(10), &FeePolicy::default(), dec!(0));
        assert_eq!(breakdown.map(|b| (b.days_rented, b.late_days, b.late_fee)), Ok((7, 0, dec!(0))));
    }

    #[test]
    fn test_damage_charge_is_added() {
        let fee = compute_fees(date(2024, 1, 1), date(2024, 1, 9), dec!(8), &FeePolicy::default(), dec!(15));
        // one late day at 8 + 5, plus 15 damage
        assert_eq!(fee, Ok(dec!(28)));
    }

    #[test]
    fn test_custom_policy() {
        let policy = FeePolicy { allowed_days: 3, late_fee_per_day: dec!(2.5) };
        let fee = compute_fees(date(2024, 3, 1), date(2024, 3, 6), dec!(4), &policy, dec!(0));
        assert_eq!(fee, Ok(dec!(13)));
    }

    #[test]
    fn test_return_before_rental_is_rejected() {
        let fee = compute_fees(date(2024, 1, 5), date(2024, 1, 1), dec!(10), &FeePolicy::default(), dec!(0));
        assert!(matches!(fee, Err(RentalError::InvalidArgument(_))));
    }

    #[test]
    fn test_parse_rate_with_currency_and_period() {
        let rate = parse_rental_rate("£10/day");
        assert_eq!(rate, Ok(RentalRate { amount: dec!(10), period: Some("day".to_string()) }));
        assert_eq!(parse_rental_rate("Â£7.50/day").map(|r| r.amount), Ok(dec!(7.50)));
        assert_eq!(parse_rental_rate(" $12 / week ").map(|r| r.period), Ok(Some("week".to_string())));
    }

    #[test]
    fn test_parse_bare_rate() {
        assert_eq!(parse_rental_rate("15"), Ok(RentalRate { amount: dec!(15), period: None }));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(
            parse_rental_rate("bad-rate"),
            Err(RentalError::InvalidFormat("bad-rate".to_string()))
        );
        assert!(parse_rental_rate("").is_err());
        assert!(parse_rental_rate("£/day").is_err());
        assert!(parse_rental_rate("-3/day").is_err());
    }
}
