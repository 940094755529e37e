//! Calendar helpers for billing periods.

use chrono::{DateTime, Duration, Months, Utc};

use crate::error::{BillingError, Result};

const SECONDS_PER_DAY: i64 = 86_400;

/// `date` plus `months` calendar months (clamped to the end of shorter months).
pub(crate) fn add_months(date: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| BillingError::validation(format!("{date} + {months} months is out of range")))
}

/// `date` minus `months` calendar months.
pub(crate) fn sub_months(date: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>> {
    date.checked_sub_months(Months::new(months))
        .ok_or_else(|| BillingError::validation(format!("{date} - {months} months is out of range")))
}

/// `date` plus `days` days.
pub(crate) fn add_days(date: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>> {
    date.checked_add_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| BillingError::validation(format!("{date} + {days} days is out of range")))
}

/// Whole days in `span`, rounding any partial day up. Negative spans give 0.
pub(crate) fn ceil_days(span: Duration) -> u64 {
    let seconds = span.num_seconds();
    if seconds <= 0 {
        return 0;
    }
    (seconds + SECONDS_PER_DAY - 1).unsigned_abs() / SECONDS_PER_DAY.unsigned_abs()
}

/// Whole days in `span`, truncating. Negative spans give 0.
pub(crate) fn whole_days(span: Duration) -> u64 {
    u64::try_from(span.num_days()).unwrap_or(0)
}

/// Ensure a period is non-empty.
pub(crate) fn ensure_ordered(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if start < end {
        Ok(())
    } else {
        Err(BillingError::validation(format!(
            "start date {start} must be before end date {end}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn add_months_clamps_to_month_end() {
        let jan31 = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();
        let feb = add_months(jan31, 1).unwrap();
        assert_eq!(feb, Utc.with_ymd_and_hms(2025, 2, 28, 12, 0, 0).unwrap());
        assert_eq!(sub_months(feb, 1).unwrap(), Utc.with_ymd_and_hms(2025, 1, 28, 12, 0, 0).unwrap());
    }

    #[test]
    fn ceil_days_rounds_partial_days_up() {
        assert_eq!(ceil_days(Duration::hours(1)), 1);
        assert_eq!(ceil_days(Duration::days(2)), 2);
        assert_eq!(ceil_days(Duration::days(2) + Duration::seconds(1)), 3);
        assert_eq!(ceil_days(Duration::days(-3)), 0);
    }

    #[test]
    fn whole_days_truncates() {
        assert_eq!(whole_days(Duration::hours(47)), 1);
        assert_eq!(whole_days(Duration::hours(-47)), 0);
    }
}
