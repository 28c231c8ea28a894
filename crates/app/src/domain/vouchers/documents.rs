//! Voucher Documents
//!
//! Serialised forms of voucher conditions. Used for the JSONB condition columns
//! and for YAML voucher imports.

use jiff::{Timestamp, civil::Weekday, tz::Offset};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;
use uuid::Uuid;
use vouchers::{
    conditions::{BoolOp, HourWindow, TagQualification, TagRule, TimeRestrictions, UserConditions},
    ids::TypedUuid,
    lifecycle::VoucherStatus,
    voucher::{
        Applicability, CollectionType, DiscountKind, DiscountTerms, VoucherScope, VoucherTerms,
    },
};

use crate::domain::vouchers::data::NewVoucher;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid utc offset of {0} seconds")]
    InvalidOffset(i32),

    #[error("invalid weekday number {0}")]
    InvalidWeekday(i8),
}

/// Boolean Operator Document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BoolOpDocument {
    And,
    Or,
}

impl From<BoolOpDocument> for BoolOp {
    fn from(document: BoolOpDocument) -> Self {
        match document {
            BoolOpDocument::And => BoolOp::And,
            BoolOpDocument::Or => BoolOp::Or,
        }
    }
}

impl From<BoolOp> for BoolOpDocument {
    fn from(op: BoolOp) -> Self {
        match op {
            BoolOp::And => BoolOpDocument::And,
            BoolOp::Or => BoolOpDocument::Or,
        }
    }
}

/// Tag Qualification Document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagQualificationDocument {
    pub op: BoolOpDocument,

    #[serde(default)]
    pub rules: Vec<TagRuleDocument>,
}

/// Tag Rule Document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TagRuleDocument {
    HasAll {
        tags: Vec<String>,
    },
    HasAny {
        tags: Vec<String>,
    },
    HasNone {
        tags: Vec<String>,
    },
    Group {
        qualification: TagQualificationDocument,
    },
}

impl From<TagQualificationDocument> for TagQualification {
    fn from(document: TagQualificationDocument) -> Self {
        TagQualification::new(
            document.op.into(),
            document.rules.into_iter().map(Into::into).collect(),
        )
    }
}

impl From<TagRuleDocument> for TagRule {
    fn from(document: TagRuleDocument) -> Self {
        match document {
            TagRuleDocument::HasAll { tags } => TagRule::HasAll {
                tags: tags.into_iter().collect(),
            },
            TagRuleDocument::HasAny { tags } => TagRule::HasAny {
                tags: tags.into_iter().collect(),
            },
            TagRuleDocument::HasNone { tags } => TagRule::HasNone {
                tags: tags.into_iter().collect(),
            },
            TagRuleDocument::Group { qualification } => {
                TagRule::Group(Box::new(qualification.into()))
            }
        }
    }
}

impl From<&TagQualification> for TagQualificationDocument {
    fn from(qualification: &TagQualification) -> Self {
        Self {
            op: qualification.op.into(),
            rules: qualification.rules.iter().map(Into::into).collect(),
        }
    }
}

impl From<&TagRule> for TagRuleDocument {
    fn from(rule: &TagRule) -> Self {
        match rule {
            TagRule::HasAll { tags } => TagRuleDocument::HasAll {
                tags: sorted(tags.iter()),
            },
            TagRule::HasAny { tags } => TagRuleDocument::HasAny {
                tags: sorted(tags.iter()),
            },
            TagRule::HasNone { tags } => TagRuleDocument::HasNone {
                tags: sorted(tags.iter()),
            },
            TagRule::Group(group) => TagRuleDocument::Group {
                qualification: group.as_ref().into(),
            },
        }
    }
}

fn sorted<'a>(tags: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut tags: Vec<String> = tags.cloned().collect();
    tags.sort_unstable();
    tags
}

/// User Conditions Document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserConditionsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_prior_orders: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagQualificationDocument>,
}

impl From<UserConditionsDocument> for UserConditions {
    fn from(document: UserConditionsDocument) -> Self {
        Self {
            min_prior_orders: document.min_prior_orders,
            tags: document.tags.map(Into::into),
        }
    }
}

impl From<&UserConditions> for UserConditionsDocument {
    fn from(conditions: &UserConditions) -> Self {
        Self {
            min_prior_orders: conditions.min_prior_orders,
            tags: conditions.tags.as_ref().map(Into::into),
        }
    }
}

/// Hour Window Document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HourWindowDocument {
    pub start: i8,
    pub end: i8,
}

/// Time Restrictions Document
///
/// Weekdays are numbered 1 (Monday) to 7 (Sunday).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRestrictionsDocument {
    #[serde(default)]
    pub weekdays: Vec<i8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<HourWindowDocument>,

    #[serde(default)]
    pub utc_offset_seconds: i32,
}

impl TryFrom<TimeRestrictionsDocument> for TimeRestrictions {
    type Error = DocumentError;

    fn try_from(document: TimeRestrictionsDocument) -> Result<Self, Self::Error> {
        let weekdays = document
            .weekdays
            .into_iter()
            .map(|day| {
                Weekday::from_monday_one_offset(day).map_err(|_err| DocumentError::InvalidWeekday(day))
            })
            .collect::<Result<SmallVec<[Weekday; 7]>, _>>()?;

        let offset = Offset::from_seconds(document.utc_offset_seconds)
            .map_err(|_err| DocumentError::InvalidOffset(document.utc_offset_seconds))?;

        Ok(Self {
            weekdays,
            hours: document.hours.map(|hours| HourWindow {
                start: hours.start,
                end: hours.end,
            }),
            offset,
        })
    }
}

impl From<&TimeRestrictions> for TimeRestrictionsDocument {
    fn from(restrictions: &TimeRestrictions) -> Self {
        Self {
            weekdays: restrictions
                .weekdays
                .iter()
                .map(|day| day.to_monday_one_offset())
                .collect(),
            hours: restrictions.hours.map(|hours| HourWindowDocument {
                start: hours.start,
                end: hours.end,
            }),
            utc_offset_seconds: restrictions.offset.seconds(),
        }
    }
}

/// Discount Kind Document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKindDocument {
    Percentage,
    Fixed,
    CashBack,
}

impl From<DiscountKindDocument> for DiscountKind {
    fn from(document: DiscountKindDocument) -> Self {
        match document {
            DiscountKindDocument::Percentage => DiscountKind::Percentage,
            DiscountKindDocument::Fixed => DiscountKind::Fixed,
            DiscountKindDocument::CashBack => DiscountKind::CashBack,
        }
    }
}

/// Collection Type Document
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectionTypeDocument {
    #[default]
    Auto,
    Manual,
    Targeted,
    Event,
}

impl From<CollectionTypeDocument> for CollectionType {
    fn from(document: CollectionTypeDocument) -> Self {
        match document {
            CollectionTypeDocument::Auto => CollectionType::Auto,
            CollectionTypeDocument::Manual => CollectionType::Manual,
            CollectionTypeDocument::Targeted => CollectionType::Targeted,
            CollectionTypeDocument::Event => CollectionType::Event,
        }
    }
}

/// Initial Status Document
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InitialStatusDocument {
    Draft,
    #[default]
    Active,
}

impl From<InitialStatusDocument> for VoucherStatus {
    fn from(document: InitialStatusDocument) -> Self {
        match document {
            InitialStatusDocument::Draft => VoucherStatus::Draft,
            InitialStatusDocument::Active => VoucherStatus::Active,
        }
    }
}

/// Discount Document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscountDocument {
    pub kind: DiscountKindDocument,
    pub value: u64,

    #[serde(default)]
    pub max_discount_amount: Option<u64>,
}

/// Platform voucher definition as written in an import file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoucherDocument {
    pub code: String,

    #[serde(default)]
    pub status: InitialStatusDocument,

    pub discount: DiscountDocument,

    #[serde(default)]
    pub min_order_amount: Option<u64>,

    pub starts_at: Timestamp,
    pub ends_at: Timestamp,

    #[serde(default)]
    pub total_usage_limit: Option<u64>,

    #[serde(default = "default_per_user_limit")]
    pub per_user_limit: u64,

    #[serde(default)]
    pub collection_limit: Option<u64>,

    #[serde(default)]
    pub collection_type: CollectionTypeDocument,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub stackable: bool,

    #[serde(default)]
    pub new_user_only: bool,

    #[serde(default)]
    pub applicable_store_uuids: Vec<Uuid>,

    #[serde(default)]
    pub applicable_category_uuids: Vec<Uuid>,

    #[serde(default)]
    pub applicable_product_uuids: Vec<Uuid>,

    #[serde(default)]
    pub excluded_product_uuids: Vec<Uuid>,

    #[serde(default)]
    pub user_conditions: Option<UserConditionsDocument>,

    #[serde(default)]
    pub time_restrictions: Option<TimeRestrictionsDocument>,
}

const fn default_per_user_limit() -> u64 {
    1
}

/// Import file: a list of voucher definitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VouchersDocument {
    pub vouchers: Vec<VoucherDocument>,
}

impl VoucherDocument {
    /// Convert into a platform-scoped voucher ready for creation.
    pub fn into_new_voucher(self) -> Result<NewVoucher, DocumentError> {
        let mut terms = VoucherTerms::new(
            DiscountTerms {
                kind: self.discount.kind.into(),
                value: self.discount.value,
                max_discount_amount: self.discount.max_discount_amount,
            },
            self.starts_at,
            self.ends_at,
        );

        terms.scope = VoucherScope::Platform;
        terms.min_order_amount = self.min_order_amount;
        terms.total_usage_limit = self.total_usage_limit;
        terms.per_user_limit = self.per_user_limit;
        terms.collection_limit = self.collection_limit;
        terms.collection_type = self.collection_type.into();
        terms.priority = self.priority;
        terms.stackable = self.stackable;
        terms.new_user_only = self.new_user_only;
        terms.applicability = Applicability {
            stores: typed(self.applicable_store_uuids),
            categories: typed(self.applicable_category_uuids),
            products: typed(self.applicable_product_uuids),
            excluded_products: typed(self.excluded_product_uuids),
        };
        terms.user_conditions = self.user_conditions.map(Into::into);
        terms.time_restrictions = self
            .time_restrictions
            .map(TimeRestrictions::try_from)
            .transpose()?;

        Ok(NewVoucher::new(self.code, self.status.into(), terms))
    }
}

pub(crate) fn typed<T>(uuids: Vec<Uuid>) -> FxHashSet<TypedUuid<T>> {
    uuids.into_iter().map(TypedUuid::from_uuid).collect()
}
