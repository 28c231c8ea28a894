//! Voucher Lifecycle
//!
//! Stored status records administrative intent plus the ledger-written
//! `Depleted`. Whether a voucher has expired is computed from its window at
//! evaluation time rather than written by a sweep.

use jiff::Timestamp;
use thiserror::Error;

use crate::voucher::Voucher;

/// Voucher status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoucherStatus {
    /// Not yet offered.
    Draft,

    /// Offered and evaluable.
    Active,

    /// Suspended by its owner.
    Paused,

    /// Past its end date.
    Expired,

    /// Usage limit reached.
    Depleted,
}

/// Rejected status change.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot move voucher from {from} to {to}")]
pub struct LifecycleError {
    /// Current status
    pub from: VoucherStatus,
    /// Requested status
    pub to: VoucherStatus,
}

impl VoucherStatus {
    /// Statuses an owner may create a voucher in.
    #[must_use]
    pub const fn is_initial(self) -> bool {
        matches!(self, Self::Draft | Self::Active)
    }

    /// Terminal statuses leave only through re-issue.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Depleted)
    }

    /// Validate an owner-requested status change.
    ///
    /// `Depleted` is written only by the usage ledger and `Expired` is never
    /// forced, so neither is a valid target here.
    pub fn transition(self, to: Self) -> Result<Self, LifecycleError> {
        match (self, to) {
            (Self::Draft | Self::Paused, Self::Active) | (Self::Active, Self::Paused) => Ok(to),
            (from, to) if from == to && !from.is_terminal() => Ok(to),
            (from, to) => Err(LifecycleError { from, to }),
        }
    }
}

impl Voucher {
    /// Status as seen by evaluation at `now`.
    ///
    /// An active voucher past its end date is expired and one whose usage limit
    /// is reached is depleted, regardless of the stored value.
    #[must_use]
    pub fn effective_status(&self, now: Timestamp) -> VoucherStatus {
        match self.status {
            VoucherStatus::Active if now > self.terms.ends_at => VoucherStatus::Expired,
            VoucherStatus::Active if self.usage_exhausted() => VoucherStatus::Depleted,
            status => status,
        }
    }
}

/// Status after an owner edit.
///
/// Changing the usage limit or end date of a depleted or expired voucher
/// re-issues it under the same code: it becomes active again when the new terms
/// leave capacity and time.
#[must_use]
pub fn reissued_status(
    current: VoucherStatus,
    limits_changed: bool,
    voucher_after_edit: &Voucher,
    now: Timestamp,
) -> VoucherStatus {
    if !current.is_terminal() || !limits_changed {
        return current;
    }

    let has_capacity = !voucher_after_edit.usage_exhausted();
    let has_time = now <= voucher_after_edit.terms.ends_at;

    if has_capacity && has_time {
        VoucherStatus::Active
    } else {
        current
    }
}
