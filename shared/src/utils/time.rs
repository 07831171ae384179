//! Calendar arithmetic over report periods

use chrono::{Duration, Months, NaiveDate, NaiveDateTime};

use crate::types::rule::PeriodKind;

/// Step `n` whole periods back from `from`.
///
/// Month steps clamp to the last day of the target month, so March 31st one
/// month back is the last day of February. Returns `None` only when the
/// result falls outside the representable calendar.
pub fn subtract_periods(from: NaiveDateTime, n: u32, period: PeriodKind) -> Option<NaiveDateTime> {
    match period {
        PeriodKind::Day => from.checked_sub_signed(Duration::days(i64::from(n))),
        PeriodKind::Week => from.checked_sub_signed(Duration::weeks(i64::from(n))),
        PeriodKind::Month => from.checked_sub_months(Months::new(n)),
    }
}

/// Whether `date` falls in a leap year.
pub fn is_leap_year(date: NaiveDate) -> bool {
    date.leap_year()
}
