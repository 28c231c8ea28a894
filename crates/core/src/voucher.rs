//! Vouchers
//!
//! A voucher is a discount instrument identified by a unique code. Its terms are
//! editable by the owner; its code, scope and counters are not.

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::{
    conditions::{TimeRestrictions, UserConditions},
    ids::{CategoryUuid, ProductUuid, StoreUuid, VoucherUuid},
    lifecycle::VoucherStatus,
};

const CODE_MIN_LEN: usize = 3;
const CODE_MAX_LEN: usize = 32;

/// Errors raised when a voucher definition is malformed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    /// Code is empty, too long or contains unsupported characters.
    #[error("voucher code must be 3-32 letters, digits, '-' or '_'")]
    InvalidCode,

    /// Percentage discounts must lie within 1..=100.
    #[error("percentage discount must be between 1 and 100")]
    PercentageOutOfRange,

    /// Fixed and cash-back discounts need a positive value.
    #[error("discount value must be positive")]
    NonPositiveValue,

    /// Fixed discounts take no cap.
    #[error("max discount amount does not apply to fixed discounts")]
    CapNotApplicable,

    /// The cap must be positive when present.
    #[error("max discount amount must be positive")]
    NonPositiveCap,

    /// The validity window ends before it starts.
    #[error("end date precedes start date")]
    InvertedWindow,

    /// Limits must allow at least one use.
    #[error("{0} must be at least 1")]
    ZeroLimit(&'static str),

    /// Hour windows use hours 0-23 and must not be empty.
    #[error("invalid hour window {start}-{end}")]
    InvalidHourWindow {
        /// Window start hour
        start: i8,
        /// Window end hour
        end: i8,
    },

    /// Unknown enum value while parsing a stored or user-supplied label.
    #[error("unknown {kind} '{value}'")]
    UnknownLabel {
        /// Label kind (status, discount kind, ...)
        kind: &'static str,
        /// Rejected value
        value: String,
    },
}

/// Normalised voucher code.
///
/// Codes are case-insensitive and stored upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoucherCode(String);

impl VoucherCode {
    /// Parse and normalise a voucher code.
    pub fn parse(raw: &str) -> Result<Self, DefinitionError> {
        let code = raw.trim().to_ascii_uppercase();

        let valid_len = (CODE_MIN_LEN..=CODE_MAX_LEN).contains(&code.len());
        let valid_chars = code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if !valid_len || !valid_chars {
            return Err(DefinitionError::InvalidCode);
        }

        Ok(Self(code))
    }

    /// Borrow the normalised code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoucherCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VoucherCode {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Who issued the voucher and where it may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoucherScope {
    /// Issued by the platform; usable in any store.
    Platform,

    /// Issued by a store owner; usable only in that store.
    Store(StoreUuid),
}

impl VoucherScope {
    /// Owning store, when store scoped.
    #[must_use]
    pub const fn store(&self) -> Option<StoreUuid> {
        match self {
            Self::Platform => None,
            Self::Store(store) => Some(*store),
        }
    }
}

/// How the discount value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountKind {
    /// `value` percent of the subtotal.
    Percentage,

    /// `value` minor units off the subtotal.
    Fixed,

    /// Credited after fulfilment rather than deducted at checkout.
    CashBack,
}

/// How a voucher reaches a user's wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionType {
    /// Applies without being claimed.
    #[default]
    Auto,

    /// User claims it explicitly.
    Manual,

    /// Offered to a targeted audience who claim it.
    Targeted,

    /// Handed out by an event.
    Event,
}

impl CollectionType {
    /// Whether users claim this voucher through the collection ledger.
    #[must_use]
    pub const fn is_collectable(self) -> bool {
        matches!(self, Self::Manual | Self::Targeted)
    }
}

macro_rules! labelled_enum {
    ($ty:ty, $kind:literal, { $($variant:path => $label:literal),+ $(,)? }) => {
        impl $ty {
            /// Storage label for this value.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $label),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = DefinitionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($variant),)+
                    other => Err(DefinitionError::UnknownLabel {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labelled_enum!(DiscountKind, "discount kind", {
    DiscountKind::Percentage => "percentage",
    DiscountKind::Fixed => "fixed",
    DiscountKind::CashBack => "cash_back",
});

labelled_enum!(CollectionType, "collection type", {
    CollectionType::Auto => "auto",
    CollectionType::Manual => "manual",
    CollectionType::Targeted => "targeted",
    CollectionType::Event => "event",
});

labelled_enum!(VoucherStatus, "status", {
    VoucherStatus::Draft => "draft",
    VoucherStatus::Active => "active",
    VoucherStatus::Paused => "paused",
    VoucherStatus::Expired => "expired",
    VoucherStatus::Depleted => "depleted",
});

/// Discount terms in the currency's minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountTerms {
    /// How `value` is interpreted.
    pub kind: DiscountKind,

    /// Percent for percentage discounts and capped cash-back, minor units for
    /// fixed discounts and uncapped cash-back.
    pub value: u64,

    /// Upper bound in minor units. Setting it on a cash-back voucher makes
    /// `value` a percent of the subtotal.
    pub max_discount_amount: Option<u64>,
}

/// Allow and deny lists. Empty sets mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applicability {
    /// Stores the voucher may be used at.
    pub stores: FxHashSet<StoreUuid>,
    /// At least one line must be in one of these categories.
    pub categories: FxHashSet<CategoryUuid>,
    /// At least one line must be one of these products.
    pub products: FxHashSet<ProductUuid>,
    /// No line may be one of these products. Wins over the allow lists.
    pub excluded_products: FxHashSet<ProductUuid>,
}

/// Owner-editable voucher terms.
#[derive(Debug, Clone, PartialEq)]
pub struct VoucherTerms {
    /// Platform-wide or tied to one store. Fixed at creation.
    pub scope: VoucherScope,

    /// What the voucher takes off the order.
    pub discount: DiscountTerms,

    /// Minimum subtotal in minor units.
    pub min_order_amount: Option<u64>,

    /// Start of the validity window, inclusive.
    pub starts_at: Timestamp,

    /// End of the validity window, inclusive.
    pub ends_at: Timestamp,

    /// Uses across all customers. `None` is unlimited.
    pub total_usage_limit: Option<u64>,

    /// Uses per customer, at least 1.
    pub per_user_limit: u64,

    /// How many customers may collect the voucher.
    pub collection_limit: Option<u64>,

    /// Whether customers must collect the voucher before using it.
    pub collection_type: CollectionType,

    /// Higher priorities are composed first.
    pub priority: i32,

    /// Whether the voucher combines with other stackable vouchers.
    pub stackable: bool,

    /// Only for customers with no completed orders.
    pub new_user_only: bool,

    /// Store, category and product lists.
    pub applicability: Applicability,

    /// Order history and tag requirements on the customer.
    pub user_conditions: Option<UserConditions>,

    /// Weekdays and hours the voucher may be used.
    pub time_restrictions: Option<TimeRestrictions>,
}

impl VoucherTerms {
    /// Terms with defaults for everything but the discount and validity window.
    #[must_use]
    pub fn new(discount: DiscountTerms, starts_at: Timestamp, ends_at: Timestamp) -> Self {
        Self {
            scope: VoucherScope::Platform,
            discount,
            min_order_amount: None,
            starts_at,
            ends_at,
            total_usage_limit: None,
            per_user_limit: 1,
            collection_limit: None,
            collection_type: CollectionType::default(),
            priority: 0,
            stackable: false,
            new_user_only: false,
            applicability: Applicability::default(),
            user_conditions: None,
            time_restrictions: None,
        }
    }

    /// Check the terms are internally consistent.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let DiscountTerms {
            kind,
            value,
            max_discount_amount,
        } = self.discount;

        match kind {
            DiscountKind::Percentage if !(1..=100).contains(&value) => {
                return Err(DefinitionError::PercentageOutOfRange);
            }
            DiscountKind::Fixed | DiscountKind::CashBack if value == 0 => {
                return Err(DefinitionError::NonPositiveValue);
            }
            DiscountKind::CashBack if max_discount_amount.is_some() && value > 100 => {
                return Err(DefinitionError::PercentageOutOfRange);
            }
            _ => {}
        }

        match (kind, max_discount_amount) {
            (DiscountKind::Fixed, Some(_)) => return Err(DefinitionError::CapNotApplicable),
            (_, Some(0)) => return Err(DefinitionError::NonPositiveCap),
            _ => {}
        }

        if self.ends_at < self.starts_at {
            return Err(DefinitionError::InvertedWindow);
        }

        if self.per_user_limit == 0 {
            return Err(DefinitionError::ZeroLimit("per_user_limit"));
        }

        if self.total_usage_limit == Some(0) {
            return Err(DefinitionError::ZeroLimit("total_usage_limit"));
        }

        if self.collection_limit == Some(0) {
            return Err(DefinitionError::ZeroLimit("collection_limit"));
        }

        if let Some(restrictions) = &self.time_restrictions {
            restrictions.validate()?;
        }

        Ok(())
    }
}

/// Voucher snapshot including its current counters.
#[derive(Debug, Clone, PartialEq)]
pub struct Voucher {
    /// Voucher id.
    pub uuid: VoucherUuid,
    /// Normalised redemption code.
    pub code: VoucherCode,
    /// Stored status. See [`Voucher::effective_status`] for the status in force.
    pub status: VoucherStatus,
    /// Reserved and confirmed uses.
    pub total_used_count: u64,
    /// Customers who collected the voucher.
    pub collected_count: u64,
    /// Owner-editable terms.
    pub terms: VoucherTerms,
}

impl Voucher {
    /// Whether the global usage limit has been reached.
    #[must_use]
    pub fn usage_exhausted(&self) -> bool {
        self.terms
            .total_usage_limit
            .is_some_and(|limit| self.total_used_count >= limit)
    }

    /// Whether the collection limit has been reached.
    #[must_use]
    pub fn collection_exhausted(&self) -> bool {
        self.terms
            .collection_limit
            .is_some_and(|limit| self.collected_count >= limit)
    }

    /// Remaining redemptions, `None` when unlimited.
    #[must_use]
    pub fn remaining_uses(&self) -> Option<u64> {
        self.terms
            .total_usage_limit
            .map(|limit| limit.saturating_sub(self.total_used_count))
    }
}
