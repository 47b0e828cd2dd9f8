use crate::model::calendar::{DatePeriod, ValidityPattern};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("day {0} not in production period")]
    DayOutOfProduction(String),
    #[error("no intersection with a timezone found")]
    NoTimezoneIntersection,
}

/// UTC offsets over the production period.
///
/// The offset periods must partition the production period; a day outside
/// every period is a dataset construction bug and surfaces as an error
/// rather than a wrong time.
#[derive(Debug, Clone)]
pub struct TimeZoneHandler {
    pub name: String,
    time_changes: Vec<(ValidityPattern, i32)>,
}

impl TimeZoneHandler {
    pub fn new(
        name: impl Into<String>,
        production_begin: NaiveDate,
        num_days: usize,
        offsets: &[(i32, Vec<DatePeriod>)],
    ) -> Self {
        let time_changes = offsets
            .iter()
            .map(|(offset, periods)| {
                let vp = ValidityPattern::from_periods(production_begin, num_days, periods);
                (vp, *offset)
            })
            .collect();
        Self {
            name: name.into(),
            time_changes,
        }
    }

    /// UTC offset in seconds on day `day` of the production period.
    pub fn utc_offset(&self, day: u32) -> Result<i32, Error> {
        for (vp, offset) in &self.time_changes {
            if vp.check(day) {
                return Ok(*offset);
            }
        }
        Err(Error::DayOutOfProduction(day.to_string()))
    }

    pub fn utc_offset_at(&self, date: NaiveDate) -> Result<i32, Error> {
        for (vp, offset) in &self.time_changes {
            if vp.check_date(date) {
                return Ok(*offset);
            }
        }
        Err(Error::DayOutOfProduction(date.format("%Y%m%d").to_string()))
    }

    /// Offset of the first time-change period intersecting `vp`.
    ///
    /// An empty pattern has no meaningful offset and yields 0.
    pub fn first_utc_offset(&self, vp: &ValidityPattern) -> Result<i32, Error> {
        if vp.none() {
            return Ok(0);
        }
        for (change_vp, offset) in &self.time_changes {
            if change_vp.intersects(vp) {
                return Ok(*offset);
            }
        }
        Err(Error::NoTimezoneIntersection)
    }

    /// Exports the handler as `(offset, periods)` pairs; rebuilding from the
    /// export yields the same partition.
    pub fn periods_and_shift(&self) -> Vec<(i32, Vec<DatePeriod>)> {
        self.time_changes
            .iter()
            .map(|(vp, offset)| (*offset, vp.active_periods()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn handler() -> TimeZoneHandler {
        TimeZoneHandler::new(
            "Europe/Paris",
            date("2015-03-01"),
            31,
            &[
                (3600, vec![(date("2015-03-01"), date("2015-03-29"))]),
                (7200, vec![(date("2015-03-29"), date("2015-04-01"))]),
            ],
        )
    }

    #[test]
    fn offset_lookup() {
        let tz = handler();
        assert_eq!(tz.utc_offset_at(date("2015-03-15")).unwrap(), 3600);
        assert_eq!(tz.utc_offset_at(date("2015-03-30")).unwrap(), 7200);
    }

    #[test]
    fn out_of_partition_is_an_error() {
        let tz = handler();
        assert!(tz.utc_offset_at(date("2015-04-02")).is_err());
    }

    #[test]
    fn first_offset_of_pattern() {
        let tz = handler();
        let mut vp = ValidityPattern::new(date("2015-03-01"), 31);
        assert_eq!(tz.first_utc_offset(&vp).unwrap(), 0);
        vp.add_date(date("2015-03-30"));
        assert_eq!(tz.first_utc_offset(&vp).unwrap(), 7200);
    }

    #[test]
    fn export_round_trip() {
        let tz = handler();
        let exported = tz.periods_and_shift();
        let rebuilt = TimeZoneHandler::new("Europe/Paris", date("2015-03-01"), 31, &exported);
        assert_eq!(rebuilt.periods_and_shift(), exported);
    }
}
