use bitvec::prelude::*;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A half-open date range `[begin, end)`.
pub type DatePeriod = (NaiveDate, NaiveDate);

/// Which weekdays a service pattern covers, Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekPattern([bool; 7]);

impl WeekPattern {
    pub const ALL: WeekPattern = WeekPattern([true; 7]);
    pub const WEEKDAYS: WeekPattern = WeekPattern([true, true, true, true, true, false, false]);

    pub const fn new(days: [bool; 7]) -> Self {
        Self(days)
    }

    /// Parses a 7-character bitstring, Monday first, e.g. `"1111100"`.
    pub fn from_bits(bits: &str) -> Option<Self> {
        if bits.len() != 7 {
            return None;
        }
        let mut days = [false; 7];
        for (i, c) in bits.chars().enumerate() {
            days[i] = match c {
                '1' => true,
                '0' => false,
                _ => return None,
            };
        }
        Some(Self(days))
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        self.0[date.weekday().num_days_from_monday() as usize]
    }
}

/// Days on which a vehicle journey circulates, as a bitset over the
/// production period.
///
/// Bit `i` stands for `beginning_date + i` days. All patterns of a dataset
/// share the same `beginning_date` so they can be intersected bitwise.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityPattern {
    beginning_date: NaiveDate,
    days: BitVec,
}

impl ValidityPattern {
    pub fn new(beginning_date: NaiveDate, num_days: usize) -> Self {
        Self {
            beginning_date,
            days: bitvec!(0; num_days),
        }
    }

    pub fn beginning_date(&self) -> NaiveDate {
        self.beginning_date
    }

    pub fn num_days(&self) -> usize {
        self.days.len()
    }

    fn day_index(&self, date: NaiveDate) -> Option<usize> {
        let offset = (date - self.beginning_date).num_days();
        if offset < 0 || offset as usize >= self.days.len() {
            return None;
        }
        Some(offset as usize)
    }

    /// Whether the pattern is active on day `day` of the production period.
    /// Out-of-range days are never active.
    pub fn check(&self, day: u32) -> bool {
        self.days.get(day as usize).map(|b| *b).unwrap_or(false)
    }

    pub fn check_date(&self, date: NaiveDate) -> bool {
        self.day_index(date).map(|i| self.days[i]).unwrap_or(false)
    }

    pub fn add_date(&mut self, date: NaiveDate) {
        if let Some(i) = self.day_index(date) {
            self.days.set(i, true);
        }
    }

    pub fn remove_date(&mut self, date: NaiveDate) {
        if let Some(i) = self.day_index(date) {
            self.days.set(i, false);
        }
    }

    /// Activates every day of `[begin, end)` whose weekday matches `week`.
    pub fn add_period(&mut self, begin: NaiveDate, end: NaiveDate, week: WeekPattern) {
        let mut date = begin;
        while date < end {
            if week.matches(date) {
                self.add_date(date);
            }
            date = date + chrono::Days::new(1);
        }
    }

    pub fn any(&self) -> bool {
        self.days.any()
    }

    pub fn none(&self) -> bool {
        !self.days.any()
    }

    /// Bitwise AND of two patterns sharing the same beginning date.
    pub fn intersection(&self, other: &Self) -> Self {
        debug_assert_eq!(self.beginning_date, other.beginning_date);
        let mut days = self.days.clone();
        days &= &other.days;
        Self {
            beginning_date: self.beginning_date,
            days,
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.intersection(other).any()
    }

    /// Collapses the bitset into maximal half-open active periods.
    pub fn active_periods(&self) -> Vec<DatePeriod> {
        let mut periods = Vec::new();
        let mut run_begin: Option<NaiveDate> = None;
        for i in 0..self.days.len() {
            let date = self.beginning_date + chrono::Days::new(i as u64);
            if self.days[i] {
                run_begin.get_or_insert(date);
            } else if let Some(begin) = run_begin.take() {
                periods.push((begin, date));
            }
        }
        if let Some(begin) = run_begin {
            let end = self.beginning_date + chrono::Days::new(self.days.len() as u64);
            periods.push((begin, end));
        }
        periods
    }

    /// Rebuilds a pattern from exported periods. Inverse of
    /// [`ValidityPattern::active_periods`].
    pub fn from_periods(beginning_date: NaiveDate, num_days: usize, periods: &[DatePeriod]) -> Self {
        let mut pattern = Self::new(beginning_date, num_days);
        for &(begin, end) in periods {
            pattern.add_period(begin, end, WeekPattern::ALL);
        }
        pattern
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionKind {
    Add,
    Sub,
}

/// A single-day amendment to a calendar's week pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionDate {
    pub date: NaiveDate,
    pub kind: ExceptionKind,
}

impl ExceptionDate {
    /// Wire identifier, `exception:` followed by the undelimited date.
    pub fn uri(&self) -> String {
        format!("exception:{}", self.date.format("%Y%m%d"))
    }
}

/// A named service calendar: base periods, a week pattern and single-day
/// exceptions.
#[derive(Debug, Clone)]
pub struct Calendar {
    pub idx: u32,
    pub uri: String,
    pub active_periods: Vec<DatePeriod>,
    pub week_pattern: WeekPattern,
    pub exceptions: Vec<ExceptionDate>,
}

impl Calendar {
    /// Materializes the calendar over the production period.
    pub fn validity_pattern(&self, beginning_date: NaiveDate, num_days: usize) -> ValidityPattern {
        let mut pattern = ValidityPattern::new(beginning_date, num_days);
        for &(begin, end) in &self.active_periods {
            pattern.add_period(begin, end, self.week_pattern);
        }
        for exception in &self.exceptions {
            match exception.kind {
                ExceptionKind::Add => pattern.add_date(exception.date),
                ExceptionKind::Sub => pattern.remove_date(exception.date),
            }
        }
        pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn week_pattern_matches() {
        // 2015-03-14 is a Saturday.
        assert!(!WeekPattern::WEEKDAYS.matches(date("2015-03-14")));
        assert!(WeekPattern::WEEKDAYS.matches(date("2015-03-16")));
    }

    #[test]
    fn add_period_respects_week_pattern() {
        let mut vp = ValidityPattern::new(date("2015-03-01"), 31);
        vp.add_period(date("2015-03-09"), date("2015-03-16"), WeekPattern::WEEKDAYS);
        assert!(vp.check_date(date("2015-03-09")));
        assert!(vp.check_date(date("2015-03-13")));
        assert!(!vp.check_date(date("2015-03-14")));
        assert!(!vp.check_date(date("2015-03-16")));
    }

    #[test]
    fn out_of_range_is_inactive() {
        let vp = ValidityPattern::new(date("2015-03-01"), 31);
        assert!(!vp.check_date(date("2015-02-28")));
        assert!(!vp.check_date(date("2015-04-01")));
        assert!(!vp.check(400));
    }

    #[test]
    fn periods_round_trip() {
        let mut vp = ValidityPattern::new(date("2015-03-01"), 31);
        vp.add_period(date("2015-03-02"), date("2015-03-06"), WeekPattern::ALL);
        vp.add_date(date("2015-03-20"));
        let periods = vp.active_periods();
        assert_eq!(periods.len(), 2);
        let rebuilt = ValidityPattern::from_periods(date("2015-03-01"), 31, &periods);
        assert_eq!(rebuilt, vp);
    }

    #[test]
    fn intersection_test() {
        let mut a = ValidityPattern::new(date("2015-03-01"), 10);
        let mut b = ValidityPattern::new(date("2015-03-01"), 10);
        a.add_date(date("2015-03-02"));
        a.add_date(date("2015-03-03"));
        b.add_date(date("2015-03-03"));
        let both = a.intersection(&b);
        assert!(!both.check_date(date("2015-03-02")));
        assert!(both.check_date(date("2015-03-03")));
        assert!(a.intersects(&b));
    }

    #[test]
    fn calendar_exceptions() {
        let calendar = Calendar {
            idx: 0,
            uri: "calendar:week".into(),
            active_periods: vec![(date("2015-03-02"), date("2015-03-30"))],
            week_pattern: WeekPattern::WEEKDAYS,
            exceptions: vec![
                ExceptionDate {
                    date: date("2015-03-14"),
                    kind: ExceptionKind::Add,
                },
                ExceptionDate {
                    date: date("2015-03-16"),
                    kind: ExceptionKind::Sub,
                },
            ],
        };
        let vp = calendar.validity_pattern(date("2015-03-01"), 31);
        assert!(vp.check_date(date("2015-03-14")));
        assert!(!vp.check_date(date("2015-03-16")));
        assert!(vp.check_date(date("2015-03-17")));
    }

    #[test]
    fn exception_uri_format() {
        let exception = ExceptionDate {
            date: date("2015-03-14"),
            kind: ExceptionKind::Add,
        };
        assert_eq!(exception.uri(), "exception:20150314");
    }
}
