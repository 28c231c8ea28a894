//! Discounts

use rust_decimal::{
    Decimal, RoundingStrategy,
    prelude::{FromPrimitive, ToPrimitive},
};
use rusty_money::{Money, iso::Currency};
use thiserror::Error;

use crate::voucher::{DiscountKind, DiscountTerms};

/// Errors specific to discount calculations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscountError {
    /// Percentage calculation could not be safely converted.
    #[error("percentage conversion overflowed or was not finite")]
    PercentConversion,

    /// Configured amount does not fit in the currency's minor units.
    #[error("discount amount {0} is out of range")]
    AmountOutOfRange(u64),
}

/// Result of applying a voucher's discount to a subtotal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedDiscount<'a> {
    /// Deducted from the order at checkout.
    pub amount: Money<'a, Currency>,

    /// Whether the benefit is paid out after fulfilment instead.
    pub deferred: bool,

    /// Credit owed after fulfilment. Zero unless `deferred`.
    pub deferred_credit: Money<'a, Currency>,
}

impl<'a> AppliedDiscount<'a> {
    fn immediate(amount: Money<'a, Currency>) -> Self {
        Self {
            amount,
            deferred: false,
            deferred_credit: Money::from_minor(0, amount.currency()),
        }
    }

    fn deferred(credit: Money<'a, Currency>) -> Self {
        Self {
            amount: Money::from_minor(0, credit.currency()),
            deferred: true,
            deferred_credit: credit,
        }
    }
}

/// Calculate the discount `terms` give on `subtotal`.
///
/// Percentages are truncated toward zero in minor units before the cap is
/// applied. Fixed amounts never exceed the subtotal. Cash-back is reported as a
/// deferred credit and deducts nothing.
///
/// # Errors
///
/// Returns [`DiscountError`] if the configured value does not fit the currency's
/// minor units or percentage arithmetic overflows.
pub fn calculate_discount<'a>(
    terms: &DiscountTerms,
    subtotal: Money<'a, Currency>,
) -> Result<AppliedDiscount<'a>, DiscountError> {
    let currency = subtotal.currency();
    let subtotal_minor = subtotal.to_minor_units().max(0);

    let minor = match (terms.kind, terms.max_discount_amount) {
        (DiscountKind::Percentage, cap) | (DiscountKind::CashBack, cap @ Some(_)) => {
            capped_percent_of_minor(terms.value, cap, subtotal_minor)?
        }
        (DiscountKind::Fixed, _) | (DiscountKind::CashBack, None) => {
            to_minor(terms.value)?.min(subtotal_minor)
        }
    };

    let money = Money::from_minor(minor, currency);

    Ok(match terms.kind {
        DiscountKind::CashBack => AppliedDiscount::deferred(money),
        DiscountKind::Percentage | DiscountKind::Fixed => AppliedDiscount::immediate(money),
    })
}

fn capped_percent_of_minor(
    percent: u64,
    cap: Option<u64>,
    minor: i64,
) -> Result<i64, DiscountError> {
    let raw = percent_of_minor(percent, minor)?;

    Ok(match cap {
        Some(cap) => raw.min(to_minor(cap)?),
        None => raw,
    })
}

/// `percent`% of `minor`, truncated toward zero.
///
/// # Errors
///
/// Returns [`DiscountError::PercentConversion`] when the product overflows.
pub fn percent_of_minor(percent: u64, minor: i64) -> Result<i64, DiscountError> {
    let percent = Decimal::from_u64(percent).ok_or(DiscountError::PercentConversion)?;
    let minor = Decimal::from_i64(minor).ok_or(DiscountError::PercentConversion)?;

    minor
        .checked_mul(percent)
        .and_then(|product| product.checked_div(Decimal::ONE_HUNDRED))
        .ok_or(DiscountError::PercentConversion)?
        .round_dp_with_strategy(0, RoundingStrategy::ToZero)
        .to_i64()
        .ok_or(DiscountError::PercentConversion)
}

fn to_minor(amount: u64) -> Result<i64, DiscountError> {
    i64::try_from(amount).map_err(|_err| DiscountError::AmountOutOfRange(amount))
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::{USD, VND};
    use testresult::TestResult;

    use super::*;

    fn terms(kind: DiscountKind, value: u64, cap: Option<u64>) -> DiscountTerms {
        DiscountTerms {
            kind,
            value,
            max_discount_amount: cap,
        }
    }

    #[test]
    fn percentage_is_capped() -> TestResult {
        let applied = calculate_discount(
            &terms(DiscountKind::Percentage, 10, Some(5_000)),
            Money::from_minor(100_000, VND),
        )?;

        assert_eq!(applied.amount, Money::from_minor(5_000, VND));
        assert!(!applied.deferred);

        Ok(())
    }

    #[test]
    fn percentage_without_cap_uses_raw_amount() -> TestResult {
        let applied = calculate_discount(
            &terms(DiscountKind::Percentage, 10, None),
            Money::from_minor(100_000, VND),
        )?;

        assert_eq!(applied.amount, Money::from_minor(10_000, VND));

        Ok(())
    }

    #[test]
    fn percentage_truncates_toward_zero() -> TestResult {
        let applied = calculate_discount(
            &terms(DiscountKind::Percentage, 15, None),
            Money::from_minor(999, USD),
        )?;

        // 15% of 9.99 is 1.4985
        assert_eq!(applied.amount, Money::from_minor(149, USD));

        Ok(())
    }

    #[test]
    fn fixed_is_clamped_to_subtotal() -> TestResult {
        let small = calculate_discount(
            &terms(DiscountKind::Fixed, 30_000, None),
            Money::from_minor(20_000, VND),
        )?;
        let large = calculate_discount(
            &terms(DiscountKind::Fixed, 30_000, None),
            Money::from_minor(80_000, VND),
        )?;

        assert_eq!(small.amount, Money::from_minor(20_000, VND));
        assert_eq!(large.amount, Money::from_minor(30_000, VND));

        Ok(())
    }

    #[test]
    fn fixed_ignores_cap_and_stays_clamped() -> TestResult {
        let small = calculate_discount(
            &terms(DiscountKind::Fixed, 30_000, Some(5_000)),
            Money::from_minor(20_000, VND),
        )?;
        let large = calculate_discount(
            &terms(DiscountKind::Fixed, 30_000, Some(5_000)),
            Money::from_minor(80_000, VND),
        )?;

        assert_eq!(small.amount, Money::from_minor(20_000, VND));
        assert_eq!(large.amount, Money::from_minor(30_000, VND));
        assert!(!large.deferred, "fixed discounts apply immediately");

        Ok(())
    }

    #[test]
    fn cash_back_defers_a_capped_percentage_credit() -> TestResult {
        let applied = calculate_discount(
            &terms(DiscountKind::CashBack, 5, Some(2_000)),
            Money::from_minor(100_000, VND),
        )?;

        assert_eq!(applied.amount, Money::from_minor(0, VND));
        assert!(applied.deferred);
        assert_eq!(applied.deferred_credit, Money::from_minor(2_000, VND));

        Ok(())
    }

    #[test]
    fn cash_back_without_cap_is_a_fixed_credit() -> TestResult {
        let applied = calculate_discount(
            &terms(DiscountKind::CashBack, 15_000, None),
            Money::from_minor(10_000, VND),
        )?;

        assert_eq!(applied.amount, Money::from_minor(0, VND));
        assert_eq!(applied.deferred_credit, Money::from_minor(10_000, VND));

        Ok(())
    }

    #[test]
    fn percent_of_minor_overflow_returns_error() {
        assert_eq!(percent_of_minor(100, i64::MAX), Ok(i64::MAX));
        assert_eq!(
            percent_of_minor(200, i64::MAX),
            Err(DiscountError::PercentConversion)
        );
    }

    #[test]
    fn oversized_fixed_value_is_rejected() {
        assert_eq!(
            calculate_discount(
                &terms(DiscountKind::Fixed, u64::MAX, None),
                Money::from_minor(100, VND),
            ),
            Err(DiscountError::AmountOutOfRange(u64::MAX))
        );
    }
}
