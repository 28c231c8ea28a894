//! Checkout Data

use rusty_money::{Money, iso::Currency};
use vouchers::{
    discounts::AppliedDiscount,
    eligibility::{Ineligibility, LineItem, OrderContext},
    ids::{CategoryUuid, ProductUuid, StoreUuid},
    stacking::Composition,
    voucher::Voucher,
};

use crate::domain::checkout::CheckoutError;

/// Order line as submitted by checkout, priced in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product: ProductUuid,
    pub category: Option<CategoryUuid>,
    pub quantity: u32,
    pub unit_price: u64,
}

pub(crate) fn order_context(
    store: StoreUuid,
    currency: &'static Currency,
    lines: &[OrderLine],
) -> Result<OrderContext<'static>, CheckoutError> {
    let items = lines
        .iter()
        .map(|line| {
            let unit_price = i64::try_from(line.unit_price)
                .map_err(|_err| CheckoutError::InvalidPrice(line.unit_price))?;

            Ok(LineItem {
                product: line.product,
                category: line.category,
                quantity: line.quantity,
                unit_price: Money::from_minor(unit_price, currency),
            })
        })
        .collect::<Result<Vec<_>, CheckoutError>>()?;

    Ok(OrderContext::new(store, currency, items))
}

/// Preview of one voucher on an order.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub voucher: Voucher,
    pub subtotal: Money<'static, Currency>,
    pub discount: AppliedDiscount<'static>,
}

impl Quote {
    /// What the customer pays now.
    #[must_use]
    pub fn total(&self) -> Money<'static, Currency> {
        Money::from_minor(
            self.subtotal.to_minor_units() - self.discount.amount.to_minor_units(),
            self.subtotal.currency(),
        )
    }
}

/// Preview of several vouchers combined on one order.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedQuote {
    pub subtotal: Money<'static, Currency>,
    pub composition: Composition<'static>,

    /// Vouchers that do not apply to this order.
    pub rejected: Vec<RejectedVoucher>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedVoucher {
    pub voucher: Voucher,
    pub reason: Ineligibility,
}
