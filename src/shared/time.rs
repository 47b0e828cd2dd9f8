use std::{
    fmt::Display,
    ops::{Add, AddAssign, Sub, SubAssign},
};

pub const SECONDS_PER_DAY: u32 = 86_400;

/// Seconds since midnight of a service day.
///
/// May exceed 86 400 to express a journey rolling over past midnight, as
/// timetables do for night services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Time(u32);

impl From<u32> for Time {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Sub<Time> for Time {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        Duration(self.0 - rhs.0)
    }
}

impl Add<Duration> for Time {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign<Duration> for Time {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0
    }
}

impl Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hms_string())
    }
}

impl Time {
    pub const fn from_seconds(secs: u32) -> Self {
        Self(secs)
    }

    pub const fn as_seconds(&self) -> u32 {
        self.0
    }

    /// Second-of-day with the next-day roll-over folded away.
    pub const fn normalized(&self) -> Self {
        Self(self.0 % SECONDS_PER_DAY)
    }

    pub fn to_hms_string(&self) -> String {
        let h = self.0 / 3600;
        let m = (self.0 % 3600) / 60;
        let s = self.0 % 60;
        format!("{:02}:{:02}:{:02}", h, m, s)
    }

    pub fn from_hms(time: &str) -> Option<Self> {
        const HOUR_TO_SEC: u32 = 60 * 60;
        const MINUTE_TO_SEC: u32 = 60;
        let mut split = time.split(':');
        let hours: u32 = split.next()?.parse().ok()?;
        let hours = hours * HOUR_TO_SEC;
        let minutes: u32 = split.next()?.parse().ok()?;
        let minutes = minutes * MINUTE_TO_SEC;
        let seconds: u32 = split.next()?.parse().ok()?;
        let seconds = hours + minutes + seconds;
        Some(Self(seconds))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(u32);

impl From<u32> for Duration {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Duration {
    pub const ZERO: Duration = Duration(0);
    pub const MAX: Duration = Duration(u32::MAX);

    pub const fn from_seconds(secs: u32) -> Self {
        Self(secs)
    }

    pub const fn from_minutes(minutes: u32) -> Self {
        Self(minutes * 60)
    }

    pub const fn from_hours(hours: u32) -> Self {
        Self(hours * 60 * 60)
    }

    pub const fn as_seconds(&self) -> u32 {
        self.0
    }
}

impl Sub for Duration {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0
    }
}

impl Add for Duration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0
    }
}

/// A point on the production timeline: service-day index times 86 400 plus
/// the second of that day.
///
/// The compact form keeps the RAPTOR labels word-sized; `MIN`/`MAX` act as
/// the unreached sentinels for the two search directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateTime(u32);

impl DateTime {
    pub const MIN: DateTime = DateTime(0);
    pub const MAX: DateTime = DateTime(u32::MAX);

    /// A `time` past 86 400 rolls into the following day.
    pub const fn new(day: u32, time: Time) -> Self {
        Self(day * SECONDS_PER_DAY + time.as_seconds())
    }

    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    pub const fn as_raw(&self) -> u32 {
        self.0
    }

    /// Service-day index since the production start.
    pub const fn date(&self) -> u32 {
        self.0 / SECONDS_PER_DAY
    }

    /// Second of the day.
    pub const fn hour(&self) -> Time {
        Time::from_seconds(self.0 % SECONDS_PER_DAY)
    }

    pub const fn saturating_add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs.as_seconds()))
    }

    pub const fn saturating_sub(self, rhs: Duration) -> Self {
        Self(self.0.saturating_sub(rhs.as_seconds()))
    }
}

impl Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("day {} {}", self.date(), self.hour()))
    }
}

impl Sub<DateTime> for DateTime {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        Duration(self.0 - rhs.0)
    }
}

#[test]
fn parse_unparse_1() {
    let time = "00:00:00";
    let stime = Time::from_hms(time).unwrap();
    assert_eq!(time, stime.to_hms_string())
}

#[test]
fn parse_unparse_2() {
    let time = "12:30:30";
    let stime = Time::from_hms(time).unwrap();
    assert_eq!(time, stime.to_hms_string())
}

#[test]
fn valid_time_test_1() {
    let time = "00:01:30";
    assert_eq!(Time::from_hms(time).unwrap().as_seconds(), 90);
}

#[test]
fn valid_time_test_2() {
    let time = "25:00:00";
    assert_eq!(Time::from_hms(time).unwrap().as_seconds(), 90_000);
}

#[test]
fn invalid_time_test_1() {
    let time = "00:00:0a";
    assert!(Time::from_hms(time).is_none())
}

#[test]
fn invalid_time_test_2() {
    let time = "00:00";
    assert!(Time::from_hms(time).is_none())
}

#[test]
fn datetime_roundtrip_test() {
    let dt = DateTime::new(3, Time::from_seconds(3600));
    assert_eq!(dt.date(), 3);
    assert_eq!(dt.hour().as_seconds(), 3600);
}

#[test]
fn datetime_rollover_test() {
    // 25:00 on day 2 is 01:00 on day 3.
    let dt = DateTime::new(2, Time::from_seconds(90_000));
    assert_eq!(dt.date(), 3);
    assert_eq!(dt.hour().as_seconds(), 3600);
}

#[test]
fn datetime_saturating_test() {
    let dt = DateTime::MIN.saturating_sub(Duration::from_seconds(10));
    assert_eq!(dt, DateTime::MIN);
}
