pub mod builder;
pub mod calendar;
mod entities;
pub mod timezone;

pub use calendar::{Calendar, DatePeriod, ExceptionDate, ExceptionKind, ValidityPattern, WeekPattern};
pub use entities::*;
pub use timezone::TimeZoneHandler;

use crate::{
    realtime::disruption::DisruptionHolder,
    shared::{DateTime, Time},
};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("date out of the production period")]
    DateOutOfBounds,
    #[error(transparent)]
    Timezone(#[from] timezone::Error),
}

/// The read-only multimodal transit dataset.
///
/// Entities live in flat arenas addressed by `u32` indices; string
/// identifiers resolve through side lookup tables. The query path never
/// mutates a dataset: the disruption engine works on a copy-on-write handle
/// published through the data manager, so a reader's snapshot stays
/// consistent for the whole request.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub networks: Vec<Network>,
    pub physical_modes: Vec<PhysicalMode>,
    pub lines: Vec<Line>,
    pub routes: Vec<Route>,
    pub journey_patterns: Vec<JourneyPattern>,
    pub journey_pattern_points: Vec<JourneyPatternPoint>,
    pub stop_areas: Vec<StopArea>,
    pub stop_points: Vec<StopPoint>,
    pub vehicle_journeys: Vec<VehicleJourney>,
    pub stop_times: Vec<StopTime>,
    pub meta_vjs: Vec<MetaVehicleJourney>,
    pub transfers: Vec<Transfer>,
    pub calendars: Vec<Calendar>,

    /// Outbound transfer indices per stop point, identity transfer excluded.
    pub transfers_from: Vec<Vec<u32>>,
    /// Inbound transfer indices per stop point, for the reverse search.
    pub transfers_to: Vec<Vec<u32>>,

    pub(crate) stop_point_lookup: HashMap<Arc<str>, u32>,
    pub(crate) stop_area_lookup: HashMap<Arc<str>, u32>,
    pub(crate) line_lookup: HashMap<Arc<str>, u32>,
    pub(crate) route_lookup: HashMap<Arc<str>, u32>,
    pub(crate) network_lookup: HashMap<Arc<str>, u32>,
    pub(crate) physical_mode_lookup: HashMap<Arc<str>, u32>,
    pub(crate) vehicle_journey_lookup: HashMap<Arc<str>, u32>,
    pub(crate) meta_vj_lookup: HashMap<Arc<str>, u32>,
    pub(crate) calendar_lookup: HashMap<Arc<str>, u32>,

    pub production_begin: NaiveDate,
    pub production_end: NaiveDate,
    pub timezone: Option<TimeZoneHandler>,
    pub disruptions: DisruptionHolder,
    /// POSIX timestamp of the dataset build.
    pub publication_timestamp: i64,
}

impl Dataset {
    pub fn num_days(&self) -> usize {
        (self.production_end - self.production_begin).num_days().max(0) as usize
    }

    /// A validity pattern aligned on the production period, all days off.
    pub fn empty_validity_pattern(&self) -> ValidityPattern {
        ValidityPattern::new(self.production_begin, self.num_days())
    }

    pub fn date_to_day(&self, date: NaiveDate) -> Option<u32> {
        let offset = (date - self.production_begin).num_days();
        if offset < 0 || offset >= self.num_days() as i64 {
            return None;
        }
        Some(offset as u32)
    }

    pub fn day_to_date(&self, day: u32) -> NaiveDate {
        self.production_begin + chrono::Days::new(u64::from(day))
    }

    // --- Lookups ---

    pub fn stop_point_by_uri(&self, uri: &str) -> Option<&StopPoint> {
        let idx = self.stop_point_lookup.get(uri)?;
        Some(&self.stop_points[*idx as usize])
    }

    pub fn stop_area_by_uri(&self, uri: &str) -> Option<&StopArea> {
        let idx = self.stop_area_lookup.get(uri)?;
        Some(&self.stop_areas[*idx as usize])
    }

    pub fn line_by_uri(&self, uri: &str) -> Option<&Line> {
        let idx = self.line_lookup.get(uri)?;
        Some(&self.lines[*idx as usize])
    }

    pub fn route_by_uri(&self, uri: &str) -> Option<&Route> {
        let idx = self.route_lookup.get(uri)?;
        Some(&self.routes[*idx as usize])
    }

    pub fn vehicle_journey_by_uri(&self, uri: &str) -> Option<&VehicleJourney> {
        let idx = self.vehicle_journey_lookup.get(uri)?;
        Some(&self.vehicle_journeys[*idx as usize])
    }

    pub fn meta_vj_by_uri(&self, uri: &str) -> Option<&MetaVehicleJourney> {
        let idx = self.meta_vj_lookup.get(uri)?;
        Some(&self.meta_vjs[*idx as usize])
    }

    pub fn calendar_by_uri(&self, uri: &str) -> Option<&Calendar> {
        let idx = self.calendar_lookup.get(uri)?;
        Some(&self.calendars[*idx as usize])
    }

    // --- Stop times ---

    /// Stop times of a journey, in stop order.
    pub fn stop_times_of(&self, vj_idx: u32) -> &[StopTime] {
        let slice = self.vehicle_journeys[vj_idx as usize].stop_time_slice;
        let start = slice.start_idx as usize;
        &self.stop_times[start..start + slice.count as usize]
    }

    /// Stop points served by a journey pattern, in stop order.
    pub fn stops_of_pattern(&self, jp_idx: u32) -> impl Iterator<Item = &StopPoint> {
        self.journey_patterns[jp_idx as usize]
            .point_idxs
            .iter()
            .map(|jpp_idx| {
                let jpp = &self.journey_pattern_points[*jpp_idx as usize];
                &self.stop_points[jpp.stop_point_idx as usize]
            })
    }

    // --- Meta vehicle journeys ---

    /// The base journey of `meta_vj_idx` if it circulates on `date` in the
    /// base schedule.
    pub fn base_vj_circulating_at(&self, meta_vj_idx: u32, date: NaiveDate) -> Option<&VehicleJourney> {
        let meta = &self.meta_vjs[meta_vj_idx as usize];
        let vj = &self.vehicle_journeys[meta.base_vj_idx? as usize];
        let day = self.date_to_day(date)?;
        vj.circulates(RtLevel::Base, day).then_some(vj)
    }

    /// Maps a realtime variant back to its base journey.
    pub fn corresponding_base(&self, vj_idx: u32) -> Option<&VehicleJourney> {
        let vj = &self.vehicle_journeys[vj_idx as usize];
        let meta = &self.meta_vjs[vj.meta_vj_idx as usize];
        let base_idx = meta.base_vj_idx?;
        if base_idx == vj_idx {
            return Some(vj);
        }
        Some(&self.vehicle_journeys[base_idx as usize])
    }

    /// First-board to last-alight window of a journey running on `date`.
    pub fn execution_period(&self, vj_idx: u32, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let stop_times = self.stop_times_of(vj_idx);
        let midnight = date.and_hms_opt(0, 0, 0).unwrap();
        match (stop_times.first(), stop_times.last()) {
            (Some(first), Some(last)) => (
                midnight + chrono::Duration::seconds(i64::from(first.departure_time.as_seconds())),
                midnight + chrono::Duration::seconds(i64::from(last.arrival_time.as_seconds())),
            ),
            // No stop time, a null period
            _ => (midnight, midnight),
        }
    }

    // --- Wall-clock conversion ---

    fn utc_offset_at(&self, date: NaiveDate) -> Result<i32, Error> {
        match &self.timezone {
            Some(tz) => Ok(tz.utc_offset_at(date)?),
            None => Ok(0),
        }
    }

    /// Converts a POSIX timestamp to a point on the production timeline.
    pub fn posix_to_datetime(&self, timestamp: i64) -> Result<DateTime, Error> {
        let utc = chrono::DateTime::from_timestamp(timestamp, 0)
            .ok_or(Error::DateOutOfBounds)?
            .naive_utc();
        let offset = self.utc_offset_at(utc.date())?;
        let local = utc + chrono::Duration::seconds(i64::from(offset));
        let day = self.date_to_day(local.date()).ok_or(Error::DateOutOfBounds)?;
        let second = local.time().num_seconds_from_midnight();
        Ok(DateTime::new(day, Time::from_seconds(second)))
    }

    pub fn datetime_to_posix(&self, dt: DateTime) -> Result<i64, Error> {
        let day = dt.date();
        if day as usize >= self.num_days() {
            return Err(Error::DateOutOfBounds);
        }
        let date = self.day_to_date(day);
        let offset = self.utc_offset_at(date)?;
        let local = date.and_hms_opt(0, 0, 0).unwrap()
            + chrono::Duration::seconds(i64::from(dt.hour().as_seconds()));
        Ok(local.and_utc().timestamp() - i64::from(offset))
    }

    // --- Realtime registration, called under the data manager write lock ---

    pub(crate) fn register_vehicle_journey(&mut self, mut vj: VehicleJourney) -> u32 {
        let idx = self.vehicle_journeys.len() as u32;
        vj.idx = idx;
        self.vehicle_journey_lookup.insert(vj.uri.clone(), idx);
        self.journey_patterns[vj.journey_pattern_idx as usize]
            .vehicle_journey_idxs
            .push(idx);
        self.meta_vjs[vj.meta_vj_idx as usize].realtime_vj_idxs.push(idx);
        self.vehicle_journeys.push(vj);
        idx
    }

    pub(crate) fn unregister_vehicle_journey(&mut self, vj_idx: u32) {
        let vj = &mut self.vehicle_journeys[vj_idx as usize];
        // The arena slot stays; the journey just stops circulating and is
        // unreachable through the pattern and meta lookups.
        vj.realtime_pattern = ValidityPattern::new(vj.realtime_pattern.beginning_date(), vj.realtime_pattern.num_days());
        let jp_idx = vj.journey_pattern_idx;
        let meta_idx = vj.meta_vj_idx;
        let uri = vj.uri.clone();
        self.vehicle_journey_lookup.remove(&uri);
        self.journey_patterns[jp_idx as usize]
            .vehicle_journey_idxs
            .retain(|idx| *idx != vj_idx);
        self.meta_vjs[meta_idx as usize]
            .realtime_vj_idxs
            .retain(|idx| *idx != vj_idx);
    }

    pub(crate) fn register_journey_pattern(
        &mut self,
        route_idx: u32,
        stop_point_idxs: &[u32],
        uri: Arc<str>,
    ) -> u32 {
        let jp_idx = self.journey_patterns.len() as u32;
        let mut point_idxs = Vec::with_capacity(stop_point_idxs.len());
        for (order, sp_idx) in stop_point_idxs.iter().enumerate() {
            let jpp_idx = self.journey_pattern_points.len() as u32;
            self.journey_pattern_points.push(JourneyPatternPoint {
                idx: jpp_idx,
                journey_pattern_idx: jp_idx,
                stop_point_idx: *sp_idx,
                order: order as u16,
            });
            self.stop_points[*sp_idx as usize]
                .journey_pattern_point_idxs
                .push(jpp_idx);
            point_idxs.push(jpp_idx);
        }
        self.journey_patterns.push(JourneyPattern {
            idx: jp_idx,
            uri,
            route_idx,
            point_idxs: point_idxs.into_boxed_slice(),
            vehicle_journey_idxs: Vec::new(),
        });
        jp_idx
    }

    pub(crate) fn push_stop_times(&mut self, stop_times: Vec<StopTime>) -> StopTimeSlice {
        let start_idx = self.stop_times.len() as u32;
        let count = stop_times.len() as u32;
        self.stop_times.extend(stop_times);
        StopTimeSlice { start_idx, count }
    }
}
