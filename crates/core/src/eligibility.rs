//! Eligibility
//!
//! Pure evaluation of a voucher against an order. Rules run in a fixed order and
//! stop at the first failure, so the reported reason is deterministic.

use std::fmt;

use jiff::Timestamp;
use rustc_hash::FxHashSet;
use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;

use crate::{
    ids::{CategoryUuid, ProductUuid, StoreUuid, UserUuid},
    lifecycle::VoucherStatus,
    voucher::{Voucher, VoucherScope},
};

/// Errors computing the order subtotal.
#[derive(Debug, Error)]
pub enum EligibilityError {
    /// Quantity times price does not fit in minor units.
    #[error("order subtotal overflowed")]
    Overflow,

    /// A line item is priced in a different currency than the order.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// A single order line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem<'a> {
    /// Product on this line.
    pub product: ProductUuid,

    /// Product category, when the catalog assigns one.
    pub category: Option<CategoryUuid>,

    /// Units ordered.
    pub quantity: u32,

    /// Price per unit in the order currency.
    pub unit_price: Money<'a, Currency>,
}

/// The order a voucher is evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderContext<'a> {
    /// Selling store.
    pub store: StoreUuid,

    /// Currency every line is priced in.
    pub currency: &'a Currency,

    /// Order lines.
    pub items: Vec<LineItem<'a>>,
}

impl<'a> OrderContext<'a> {
    /// Create an order context.
    #[must_use]
    pub fn new(store: StoreUuid, currency: &'a Currency, items: Vec<LineItem<'a>>) -> Self {
        Self {
            store,
            currency,
            items,
        }
    }

    /// Sum of quantity times unit price over every line.
    pub fn subtotal(&self) -> Result<Money<'a, Currency>, EligibilityError> {
        let mut minor: i64 = 0;

        for item in &self.items {
            if item.unit_price.currency() != self.currency {
                return Err(EligibilityError::Money(MoneyError::CurrencyMismatch {
                    expected: self.currency.iso_alpha_code,
                    actual: item.unit_price.currency().iso_alpha_code,
                }));
            }

            let line = item
                .unit_price
                .to_minor_units()
                .checked_mul(i64::from(item.quantity))
                .ok_or(EligibilityError::Overflow)?;

            minor = minor.checked_add(line).ok_or(EligibilityError::Overflow)?;
        }

        Ok(Money::from_minor(minor, self.currency))
    }

    fn has_product_in(&self, products: &FxHashSet<ProductUuid>) -> bool {
        self.items.iter().any(|item| products.contains(&item.product))
    }

    fn has_category_in(&self, categories: &FxHashSet<CategoryUuid>) -> bool {
        self.items
            .iter()
            .filter_map(|item| item.category)
            .any(|category| categories.contains(&category))
    }
}

/// Facts about the requesting customer gathered by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerFacts {
    pub user: UserUuid,

    /// Redemptions of this voucher by this user so far.
    pub voucher_usage: u64,

    /// Completed orders placed before this one.
    pub prior_completed_orders: u64,

    /// Segmentation tags attached to the customer.
    pub tags: FxHashSet<String>,
}

/// Why a voucher does not apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    /// Draft or paused.
    InvalidState(VoucherStatus),
    /// Before `starts_at`.
    NotStarted,
    /// After `ends_at`.
    Expired,
    /// `total_usage_limit` used up.
    LimitReached,
    /// The customer already used it `per_user_limit` times.
    PerUserLimitReached,
    /// Restricted to customers without completed orders.
    NewUserOnly,
    /// Store-scoped voucher used at another store, or store missing from the allow list.
    StoreNotApplicable,
    /// Subtotal below `min_order_amount`.
    MinOrderNotMet,
    /// No line matches the product allow list.
    ProductsNotApplicable,
    /// No line matches the category allow list.
    CategoriesNotApplicable,
    /// A line holds an excluded product.
    ExcludedProduct,
    /// Order history or tag qualification failed.
    UserConditionsNotMet,
    /// Outside the allowed weekdays or hours.
    OutsideTimeWindow,
}

impl Ineligibility {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidState(_) => "invalid_state",
            Self::NotStarted => "not_started",
            Self::Expired => "expired",
            Self::LimitReached => "limit_reached",
            Self::PerUserLimitReached => "per_user_limit_reached",
            Self::NewUserOnly => "new_user_only",
            Self::StoreNotApplicable => "store_not_applicable",
            Self::MinOrderNotMet => "min_order_not_met",
            Self::ProductsNotApplicable => "products_not_applicable",
            Self::CategoriesNotApplicable => "categories_not_applicable",
            Self::ExcludedProduct => "excluded_product",
            Self::UserConditionsNotMet => "user_conditions_not_met",
            Self::OutsideTimeWindow => "outside_time_window",
        }
    }
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState(status) => write!(f, "voucher is {status}"),
            Self::NotStarted => f.write_str("voucher is not valid yet"),
            Self::Expired => f.write_str("voucher has expired"),
            Self::LimitReached => f.write_str("voucher usage limit reached"),
            Self::PerUserLimitReached => f.write_str("you have already used this voucher"),
            Self::NewUserOnly => f.write_str("voucher is for new customers only"),
            Self::StoreNotApplicable => f.write_str("voucher does not apply to this store"),
            Self::MinOrderNotMet => f.write_str("order does not meet the minimum amount"),
            Self::ProductsNotApplicable => {
                f.write_str("order has no products this voucher applies to")
            }
            Self::CategoriesNotApplicable => {
                f.write_str("order has no categories this voucher applies to")
            }
            Self::ExcludedProduct => f.write_str("order contains an excluded product"),
            Self::UserConditionsNotMet => f.write_str("customer does not meet voucher conditions"),
            Self::OutsideTimeWindow => f.write_str("voucher is not valid at this time"),
        }
    }
}

/// Evaluation outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Eligibility<'a> {
    /// The voucher applies.
    Eligible {
        /// Order subtotal the discount is computed from.
        subtotal: Money<'a, Currency>,
    },
    /// The first check that failed.
    Ineligible {
        /// Reason reported to the customer.
        reason: Ineligibility,
    },
}

impl Eligibility<'_> {
    /// Whether the voucher applies.
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible { .. })
    }
}

/// Evaluate `voucher` for `customer` placing `order` at `now`.
///
/// Pure: repeated calls with the same inputs give the same answer and nothing is
/// recorded.
pub fn evaluate<'a>(
    voucher: &Voucher,
    order: &OrderContext<'a>,
    customer: &CustomerFacts,
    now: Timestamp,
) -> Result<Eligibility<'a>, EligibilityError> {
    let subtotal = order.subtotal()?;

    let reason = first_violation(voucher, order, customer, subtotal.to_minor_units(), now);

    Ok(match reason {
        Some(reason) => Eligibility::Ineligible { reason },
        None => Eligibility::Eligible { subtotal },
    })
}

fn first_violation(
    voucher: &Voucher,
    order: &OrderContext<'_>,
    customer: &CustomerFacts,
    subtotal_minor: i64,
    now: Timestamp,
) -> Option<Ineligibility> {
    let terms = &voucher.terms;
    let rules = &terms.applicability;

    match voucher.effective_status(now) {
        VoucherStatus::Active => {}
        VoucherStatus::Expired => return Some(Ineligibility::Expired),
        VoucherStatus::Depleted => return Some(Ineligibility::LimitReached),
        status @ (VoucherStatus::Draft | VoucherStatus::Paused) => {
            return Some(Ineligibility::InvalidState(status));
        }
    }

    if now < terms.starts_at {
        return Some(Ineligibility::NotStarted);
    }

    if now > terms.ends_at {
        return Some(Ineligibility::Expired);
    }

    if voucher.usage_exhausted() {
        return Some(Ineligibility::LimitReached);
    }

    if customer.voucher_usage >= terms.per_user_limit {
        return Some(Ineligibility::PerUserLimitReached);
    }

    if terms.new_user_only && customer.prior_completed_orders > 0 {
        return Some(Ineligibility::NewUserOnly);
    }

    let wrong_owner = matches!(terms.scope, VoucherScope::Store(owner) if owner != order.store);
    let not_listed = !rules.stores.is_empty() && !rules.stores.contains(&order.store);

    if wrong_owner || not_listed {
        return Some(Ineligibility::StoreNotApplicable);
    }

    let min_order = terms.min_order_amount.unwrap_or(0);

    if i128::from(subtotal_minor) < i128::from(min_order) {
        return Some(Ineligibility::MinOrderNotMet);
    }

    if !rules.products.is_empty() && !order.has_product_in(&rules.products) {
        return Some(Ineligibility::ProductsNotApplicable);
    }

    if !rules.categories.is_empty() && !order.has_category_in(&rules.categories) {
        return Some(Ineligibility::CategoriesNotApplicable);
    }

    // Exclusion wins over the allow-list when a product is in both.
    if order.has_product_in(&rules.excluded_products) {
        return Some(Ineligibility::ExcludedProduct);
    }

    if let Some(conditions) = &terms.user_conditions
        && !conditions.matches(customer.prior_completed_orders, &customer.tags)
    {
        return Some(Ineligibility::UserConditionsNotMet);
    }

    if let Some(restrictions) = &terms.time_restrictions
        && !restrictions.allows(now)
    {
        return Some(Ineligibility::OutsideTimeWindow);
    }

    None
}
