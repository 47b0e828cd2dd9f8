#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use wayfarer::shared::{DateTime, Time};

/// A point on the production timeline, day index plus a time literal.
pub fn dt(day: u32, hms: &str) -> DateTime {
    DateTime::new(day, Time::from_hms(hms).unwrap())
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y%m%d").unwrap()
}

pub fn datetime(s: &str, hms: &str) -> NaiveDateTime {
    let time = Time::from_hms(hms).unwrap();
    date(s).and_hms_opt(0, 0, 0).unwrap() + chrono::Duration::seconds(i64::from(time.as_seconds()))
}

/// POSIX timestamp of a date and time literal, UTC.
pub fn posix(s: &str, hms: &str) -> i64 {
    datetime(s, hms).and_utc().timestamp()
}
