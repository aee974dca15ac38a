//! Nominal time slots.
//!
//! Files are grouped by the start of the interval their timestamp falls in:
//! with a 15 minute interval, 10:07:31 and 10:14:59 both belong to 10:00:00.

use chrono::{NaiveDateTime, Timelike};

/// Whether `minutes` splits an hour into whole slots (1, 2, 3, 4, 5, 6, 10, 12, 15, 20, 30, 60).
pub fn is_valid_interval(minutes: u32) -> bool {
    minutes > 0 && 60 % minutes == 0
}

/// Floor `dt` to the start of its `interval`-minute slot.
pub fn nominal_time(dt: NaiveDateTime, interval: u32) -> NaiveDateTime {
    if interval == 0 {
        return dt;
    }
    let minute = dt.minute() - dt.minute() % interval;
    dt.date().and_hms_opt(dt.hour(), minute, 0).unwrap_or(dt)
}

/// `YYYYMMDD`, as passed to generation algorithms.
pub fn date_arg(dt: NaiveDateTime) -> String {
    dt.format("%Y%m%d").to_string()
}

/// `HHMMSS`, as passed to generation algorithms.
pub fn time_arg(dt: NaiveDateTime) -> String {
    dt.format("%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn floors_to_interval() {
        assert_eq!(nominal_time(at(10, 7, 31), 15), at(10, 0, 0));
        assert_eq!(nominal_time(at(10, 14, 59), 15), at(10, 0, 0));
        assert_eq!(nominal_time(at(10, 15, 0), 15), at(10, 15, 0));
        assert_eq!(nominal_time(at(10, 59, 0), 60), at(10, 0, 0));
        assert_eq!(nominal_time(at(10, 4, 10), 5), at(10, 0, 0));
    }

    #[test]
    fn interval_validation() {
        for ok in [1, 2, 3, 4, 5, 6, 10, 12, 15, 20, 30, 60] {
            assert!(is_valid_interval(ok), "{ok} should be valid");
        }
        for bad in [0, 7, 8, 25, 45, 90] {
            assert!(!is_valid_interval(bad), "{bad} should be invalid");
        }
    }

    #[test]
    fn argument_formats() {
        assert_eq!(date_arg(at(9, 5, 0)), "20240501");
        assert_eq!(time_arg(at(9, 5, 0)), "090500");
    }
}
