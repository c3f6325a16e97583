//! Warranty window arithmetic.

use chrono::{DateTime, Months, NaiveDate};
use fieldops_core::Clock;

use crate::error::{ServiceError, ServiceResult};
use crate::storage::WarrantyStatus;

pub const WARRANTY_MONTHS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Warranty {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: WarrantyStatus,
}

/// The warranty that starts on `install_date`.
///
/// The end date is twelve calendar months later, clamped to the last day of
/// the month when the day does not exist (Feb 29 ends on Feb 28). Status is
/// `ACTIVE` while `today` is on or before the end date; it is fixed at
/// computation time.
pub fn compute(install_date: NaiveDate, today: NaiveDate) -> ServiceResult<Warranty> {
    let end = install_date
        .checked_add_months(Months::new(WARRANTY_MONTHS))
        .ok_or_else(|| ServiceError::Validation("installation date out of range".into()))?;
    let status = if end >= today {
        WarrantyStatus::Active
    } else {
        WarrantyStatus::Expired
    };

    Ok(Warranty {
        start: install_date,
        end,
        status,
    })
}

/// Today's UTC date according to `clock`.
pub fn today(clock: &dyn Clock) -> NaiveDate {
    DateTime::from_timestamp(clock.now_secs(), 0)
        .unwrap_or_default()
        .date_naive()
}
