//! Collection Records

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Row, postgres::PgRow};
use vouchers::{
    ids::{UserUuid, VoucherUuid},
    lifecycle::VoucherStatus,
};

/// A voucher claimed by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRecord {
    pub voucher: VoucherUuid,
    pub user: UserUuid,
    pub collected_at: Timestamp,
}

/// Outcome of collecting a voucher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    Collected(CollectionRecord),

    /// The user already holds this voucher; nothing changed.
    AlreadyCollected(CollectionRecord),

    /// Every copy has been claimed.
    LimitExceeded,

    /// Auto and event vouchers are not claimed.
    NotCollectable,

    Unavailable { status: VoucherStatus },

    NotFound,
}

impl<'r> FromRow<'r, PgRow> for CollectionRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            voucher: VoucherUuid::from_uuid(row.try_get("voucher_uuid")?),
            user: UserUuid::from_uuid(row.try_get("user_uuid")?),
            collected_at: row.try_get::<SqlxTimestamp, _>("collected_at")?.to_jiff(),
        })
    }
}
