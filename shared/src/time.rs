//! Mission time representation and calendar conversion.
//!
//! On-board UTC is carried as whole seconds since the mission epoch
//! 2000-01-01 00:00:00 plus microsecond subseconds. Subseconds are
//! microseconds everywhere in the flight software; any interface that
//! carries a different resolution converts at the boundary.

use serde::{Deserialize, Serialize};

use crate::error::{FswError, Result};

/// Seconds-plus-microseconds UTC timestamp against the 2000-01-01 epoch.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub struct UtcTime {
    /// Whole seconds since 2000-01-01 00:00:00 UTC.
    pub seconds: u32,
    /// Microseconds within the current second, `0..1_000_000`.
    pub subseconds_us: u32,
}

impl UtcTime {
    /// Create a timestamp, normalizing subsecond overflow into seconds.
    pub const fn new(seconds: u32, subseconds_us: u32) -> Self {
        Self {
            seconds: seconds.wrapping_add(subseconds_us / 1_000_000),
            subseconds_us: subseconds_us % 1_000_000,
        }
    }

    /// Signed difference `self - other` in milliseconds.
    ///
    /// Subseconds are microseconds, so the subsecond term is divided by
    /// 1000 (not 1_000_000).
    pub fn diff_ms(&self, other: &UtcTime) -> i64 {
        let diff_s = i64::from(self.seconds) - i64::from(other.seconds);
        let diff_us =
            i64::from(self.subseconds_us) - i64::from(other.subseconds_us);
        diff_s * 1000 + diff_us / 1000
    }

    /// Convert to a calendar date and time.
    pub fn to_calendar(&self) -> CalendarTime {
        let total_secs = self.seconds;
        let mut days = total_secs / 86_400;
        let secs_of_day = total_secs % 86_400;

        let mut year: u16 = 2000;
        loop {
            let year_days = if is_leap_year(year) { 366 } else { 365 };
            if days < year_days {
                break;
            }
            days -= year_days;
            year += 1;
        }

        let mut month: u8 = 1;
        loop {
            let month_days = u32::from(days_in_month(year, month));
            if days < month_days {
                break;
            }
            days -= month_days;
            month += 1;
        }

        CalendarTime {
            year,
            month,
            day: (days + 1) as u8,
            hour: (secs_of_day / 3600) as u8,
            minute: ((secs_of_day / 60) % 60) as u8,
            second: (secs_of_day % 60) as u8,
        }
    }
}

/// Broken-down UTC calendar time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarTime {
    /// Full year, 2000 or later.
    pub year: u16,
    /// Month of year, 1-12.
    pub month: u8,
    /// Day of month, 1-31.
    pub day: u8,
    /// Hour of day, 0-23.
    pub hour: u8,
    /// Minute of hour, 0-59.
    pub minute: u8,
    /// Second of minute, 0-59.
    pub second: u8,
}

impl CalendarTime {
    /// Convert to seconds since the 2000-01-01 epoch.
    pub fn to_epoch_seconds(&self) -> Result<u32> {
        if self.year < 2000
            || self.month == 0
            || self.month > 12
            || self.day == 0
            || self.day > days_in_month(self.year, self.month)
            || self.hour > 23
            || self.minute > 59
            || self.second > 59
        {
            return Err(FswError::InvalidParam);
        }

        let mut days: u32 = 0;
        let mut year = 2000u16;
        while year < self.year {
            days += if is_leap_year(year) { 366 } else { 365 };
            year += 1;
        }
        let mut month = 1u8;
        while month < self.month {
            days += u32::from(days_in_month(self.year, month));
            month += 1;
        }
        days += u32::from(self.day) - 1;

        Ok(days * 86_400
            + u32::from(self.hour) * 3600
            + u32::from(self.minute) * 60
            + u32::from(self.second))
    }
}

/// Gregorian leap year rule: divisible by 4 and not by 100, or by 400.
pub const fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Days in the given month of the given year.
pub const fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, Timelike};
    use proptest::prelude::*;

    #[test]
    fn test_leap_year_rule() {
        assert!(is_leap_year(2000)); // divisible by 400
        assert!(is_leap_year(2004));
        assert!(!is_leap_year(2001));
        assert!(!is_leap_year(2100)); // divisible by 100, not 400
        assert!(is_leap_year(2400));
    }

    #[test]
    fn test_epoch_is_calendar_origin() {
        let cal = UtcTime::new(0, 0).to_calendar();
        assert_eq!(
            cal,
            CalendarTime {
                year: 2000,
                month: 1,
                day: 1,
                hour: 0,
                minute: 0,
                second: 0,
            }
        );
    }

    #[test]
    fn test_leap_day_2000() {
        // 2000-02-29 00:00:00 is day 31 + 28 = 59 after the epoch
        let cal = UtcTime::new(59 * 86_400, 0).to_calendar();
        assert_eq!((cal.year, cal.month, cal.day), (2000, 2, 29));
    }

    #[test]
    fn test_diff_ms_uses_microsecond_subseconds() {
        let a = UtcTime::new(10, 500_000);
        let b = UtcTime::new(8, 250_000);
        assert_eq!(a.diff_ms(&b), 2250);
        assert_eq!(b.diff_ms(&a), -2250);
    }

    #[test]
    fn test_subsecond_normalization() {
        let t = UtcTime::new(5, 2_500_000);
        assert_eq!(t.seconds, 7);
        assert_eq!(t.subseconds_us, 500_000);
    }

    #[test]
    fn test_invalid_calendar_rejected() {
        let bad = CalendarTime {
            year: 2001,
            month: 2,
            day: 29,
            hour: 0,
            minute: 0,
            second: 0,
        };
        assert_eq!(bad.to_epoch_seconds(), Err(FswError::InvalidParam));
    }

    fn chrono_reference(seconds: u32) -> CalendarTime {
        let epoch = NaiveDate::from_ymd_opt(2000, 1, 1)
            .expect("valid date")
            .and_hms_opt(0, 0, 0)
            .expect("valid time");
        let t = epoch + chrono::Duration::seconds(i64::from(seconds));
        CalendarTime {
            year: t.year() as u16,
            month: t.month() as u8,
            day: t.day() as u8,
            hour: t.hour() as u8,
            minute: t.minute() as u8,
            second: t.second() as u8,
        }
    }

    proptest! {
        #[test]
        fn prop_calendar_matches_chrono(seconds in any::<u32>()) {
            let ours = UtcTime::new(seconds, 0).to_calendar();
            prop_assert_eq!(ours, chrono_reference(seconds));
        }

        #[test]
        fn prop_calendar_round_trip(seconds in any::<u32>()) {
            let cal = UtcTime::new(seconds, 0).to_calendar();
            prop_assert_eq!(cal.to_epoch_seconds().expect("valid"), seconds);
        }
    }
}
