//! Usage Records

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Row, postgres::PgRow};
use vouchers::{
    ids::{OrderUuid, UserUuid, VoucherUuid},
    lifecycle::VoucherStatus,
};

/// One redemption of a voucher on an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub voucher: VoucherUuid,
    pub user: UserUuid,
    pub order: OrderUuid,
    pub used_at: Timestamp,

    /// Set once the order completes. Confirmed usage cannot be released.
    pub confirmed_at: Option<Timestamp>,
}

impl UsageRecord {
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }
}

/// Outcome of reserving a use of a voucher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// A new use was recorded.
    Reserved(UsageRecord),

    /// The order already holds a use of this voucher; nothing changed.
    AlreadyReserved(UsageRecord),

    /// No uses left.
    LimitExceeded,

    /// The user has used up their allowance.
    PerUserLimitExceeded,

    /// Draft, paused or expired.
    Unavailable { status: VoucherStatus },

    NotFound,
}

impl ReserveOutcome {
    /// The usage record held by the order, if any.
    #[must_use]
    pub fn record(&self) -> Option<&UsageRecord> {
        match self {
            Self::Reserved(record) | Self::AlreadyReserved(record) => Some(record),
            _ => None,
        }
    }
}

impl<'r> FromRow<'r, PgRow> for UsageRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            voucher: VoucherUuid::from_uuid(row.try_get("voucher_uuid")?),
            user: UserUuid::from_uuid(row.try_get("user_uuid")?),
            order: OrderUuid::from_uuid(row.try_get("order_uuid")?),
            used_at: row.try_get::<SqlxTimestamp, _>("used_at")?.to_jiff(),
            confirmed_at: row
                .try_get::<Option<SqlxTimestamp>, _>("confirmed_at")?
                .map(SqlxTimestamp::to_jiff),
        })
    }
}
