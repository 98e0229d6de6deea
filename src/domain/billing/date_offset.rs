//! Date offset calculator.
//!
//! All due-date, deadline and trial arithmetic goes through [`offset_date`].
//!
//! # Design
//!
//! Day and week offsets are flat calendar adds. Month and year offsets keep
//! the day-of-month when the target month is long enough. When it is not, the
//! days that do not fit spill into the following month instead of clamping to
//! the month end: 2024-01-31 + 1 month is 2024-03-02, and 2023-03-31 + 1 month
//! is 2023-05-01. Billing anchored on the 31st therefore never drifts back to
//! the 28th.

use chrono::{Datelike, Duration, NaiveDate};

use super::period::{Period, PeriodUnit};

/// Adds `period` to `base`.
///
/// Pure and infallible; results beyond the supported calendar saturate at
/// [`NaiveDate::MIN`] / [`NaiveDate::MAX`].
pub fn offset_date(base: NaiveDate, period: Period) -> NaiveDate {
    let count = i64::from(period.count);
    match period.unit {
        PeriodUnit::Days => add_days(base, count),
        PeriodUnit::Weeks => add_days(base, count * 7),
        PeriodUnit::Months => add_months(base, count),
        PeriodUnit::Years => add_months(base, count * 12),
    }
}

fn saturated(direction: i64) -> NaiveDate {
    if direction < 0 {
        NaiveDate::MIN
    } else {
        NaiveDate::MAX
    }
}

fn add_days(base: NaiveDate, days: i64) -> NaiveDate {
    base.checked_add_signed(Duration::days(days))
        .unwrap_or_else(|| saturated(days))
}

fn add_months(base: NaiveDate, months: i64) -> NaiveDate {
    let index = i64::from(base.year()) * 12 + i64::from(base.month0()) + months;
    let (Ok(year), Ok(month0)) = (
        i32::try_from(index.div_euclid(12)),
        u32::try_from(index.rem_euclid(12)),
    ) else {
        return saturated(months);
    };
    let Some(first_of_month) = NaiveDate::from_ymd_opt(year, month0 + 1, 1) else {
        return saturated(months);
    };
    // Counting from the 1st lets a day that does not exist in the target
    // month roll into the next one.
    add_days(first_of_month, i64::from(base.day0()))
}
