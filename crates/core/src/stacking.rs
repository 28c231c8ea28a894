//! Stacking
//!
//! Composition of several eligible vouchers on one order. Vouchers are
//! considered in descending priority, ties broken by code. A non-stackable
//! voucher takes the order on its own; otherwise every stackable voucher applies
//! and the combined deduction never exceeds the subtotal.

use rusty_money::{Money, iso::Currency};
use smallvec::{SmallVec, smallvec};

use crate::{
    discounts::{AppliedDiscount, DiscountError, calculate_discount},
    ids::VoucherUuid,
    voucher::Voucher,
};

/// A voucher's share of a composed discount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackedDiscount<'a> {
    /// Voucher that produced the discount.
    pub voucher: VoucherUuid,

    /// Amount after clamping to what was left of the subtotal.
    pub discount: AppliedDiscount<'a>,
}

/// Outcome of [`compose`].
#[derive(Debug, Clone, PartialEq)]
pub struct Composition<'a> {
    /// Applied vouchers in the order they were considered.
    pub applied: SmallVec<[StackedDiscount<'a>; 2]>,

    /// Vouchers left out because another took precedence.
    pub excluded: SmallVec<[VoucherUuid; 2]>,

    /// Sum of the immediate deductions.
    pub total: Money<'a, Currency>,
}

/// Combine eligible `vouchers` on an order with this `subtotal`.
///
/// Each voucher's discount is calculated against the full subtotal; later
/// vouchers are trimmed so the total does not exceed it.
///
/// # Errors
///
/// Returns [`DiscountError`] if any voucher's discount cannot be calculated.
pub fn compose<'a>(
    vouchers: &[&Voucher],
    subtotal: Money<'a, Currency>,
) -> Result<Composition<'a>, DiscountError> {
    let currency = subtotal.currency();

    let mut ordered: SmallVec<[&Voucher; 4]> = vouchers.iter().copied().collect();

    ordered.sort_by(|a, b| {
        b.terms
            .priority
            .cmp(&a.terms.priority)
            .then_with(|| a.code.cmp(&b.code))
    });

    let exclusive = ordered.iter().copied().find(|voucher| !voucher.terms.stackable);

    let (chosen, excluded): (SmallVec<[&Voucher; 4]>, SmallVec<[VoucherUuid; 2]>) =
        match exclusive {
            Some(winner) => (
                smallvec![winner],
                ordered
                    .iter()
                    .filter(|voucher| voucher.uuid != winner.uuid)
                    .map(|voucher| voucher.uuid)
                    .collect(),
            ),
            None => (ordered, SmallVec::new()),
        };

    let mut remaining = subtotal.to_minor_units().max(0);
    let mut applied = SmallVec::new();

    for voucher in chosen {
        let mut discount = calculate_discount(&voucher.terms.discount, subtotal)?;

        let minor = discount.amount.to_minor_units().min(remaining);
        remaining -= minor;
        discount.amount = Money::from_minor(minor, currency);

        applied.push(StackedDiscount {
            voucher: voucher.uuid,
            discount,
        });
    }

    let total = subtotal.to_minor_units().max(0) - remaining;

    Ok(Composition {
        applied,
        excluded,
        total: Money::from_minor(total, currency),
    })
}
