use crate::{
    model::calendar::ValidityPattern,
    shared::{Coordinate, Duration, Time},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which schedule layer a query reads.
///
/// `Base` is the published timetable. `RealTime` folds in every applied
/// disruption. `AdaptedSchedule` sits in between; this engine does not carry
/// separate adapted variants, so it reads the base layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RtLevel {
    #[default]
    Base,
    AdaptedSchedule,
    RealTime,
}

#[derive(Debug, Clone)]
pub struct Network {
    pub idx: u32,
    pub uri: Arc<str>,
    pub name: Arc<str>,
}

/// Vehicle kind of a journey, with an optional CO₂ rate in grams per
/// passenger-kilometer.
#[derive(Debug, Clone)]
pub struct PhysicalMode {
    pub idx: u32,
    pub uri: Arc<str>,
    pub name: Arc<str>,
    pub co2_emission: Option<f64>,
}

/// A commercial line (e.g. "Bus 42"), grouping routes under one name.
#[derive(Debug, Clone)]
pub struct Line {
    pub idx: u32,
    pub uri: Arc<str>,
    pub name: Arc<str>,
    pub code: Option<Arc<str>>,
    pub network_idx: u32,
}

/// One commercial direction of a line.
#[derive(Debug, Clone)]
pub struct Route {
    pub idx: u32,
    pub uri: Arc<str>,
    pub name: Arc<str>,
    pub line_idx: u32,
    /// Stop area the route is headed to, used to tell a terminus from a
    /// partial terminus on departure boards.
    pub destination_area_idx: Option<u32>,
}

/// A canonical ordered stop sequence shared by one or more vehicle journeys.
#[derive(Debug, Clone)]
pub struct JourneyPattern {
    pub idx: u32,
    pub uri: Arc<str>,
    pub route_idx: u32,
    /// Pattern points in stop order.
    pub point_idxs: Box<[u32]>,
    /// Journeys following this pattern, sorted by first departure.
    pub vehicle_journey_idxs: Vec<u32>,
}

/// One position of one stop point within one journey pattern.
#[derive(Debug, Clone)]
pub struct JourneyPatternPoint {
    pub idx: u32,
    pub journey_pattern_idx: u32,
    pub stop_point_idx: u32,
    pub order: u16,
}

#[derive(Debug, Clone)]
pub struct StopArea {
    pub idx: u32,
    pub uri: Arc<str>,
    pub name: Arc<str>,
    pub coord: Coordinate,
    pub admin_idxs: Vec<u32>,
    pub wheelchair_accessible: bool,
}

#[derive(Debug, Clone)]
pub struct StopPoint {
    pub idx: u32,
    pub uri: Arc<str>,
    pub name: Arc<str>,
    pub coord: Coordinate,
    pub stop_area_idx: u32,
    pub wheelchair_accessible: bool,
    /// Zonal on-demand-transport stop whose geometry is an area rather than
    /// a point.
    pub is_zonal: bool,
    /// Back-references into the pattern points that serve this stop.
    pub journey_pattern_point_idxs: Vec<u32>,
}

/// An (arrival, departure) pair at one stop of one vehicle journey.
#[derive(Debug, Clone, Copy)]
pub struct StopTime {
    pub arrival_time: Time,
    pub departure_time: Time,
    pub pick_up_allowed: bool,
    pub drop_off_allowed: bool,
    pub date_time_estimated: bool,
    pub odt: bool,
}

impl StopTime {
    pub fn new(arrival_time: Time, departure_time: Time) -> Self {
        Self {
            arrival_time,
            departure_time,
            pick_up_allowed: true,
            drop_off_allowed: true,
            date_time_estimated: false,
            odt: false,
        }
    }
}

/// Range of a journey's stop times within the flat stop-time arena.
#[derive(Default, Debug, Clone, Copy)]
pub struct StopTimeSlice {
    pub start_idx: u32,
    pub count: u32,
}

/// Discrete journeys run their stop times as stored; frequency journeys
/// repeat them every `headway` between `start` and `end`.
#[derive(Debug, Clone, Copy)]
pub enum VjKind {
    Discrete,
    Frequency {
        start: Time,
        end: Time,
        headway: Duration,
    },
}

#[derive(Debug, Clone)]
pub struct VehicleJourney {
    pub idx: u32,
    pub uri: Arc<str>,
    pub journey_pattern_idx: u32,
    pub meta_vj_idx: u32,
    pub physical_mode_idx: u32,
    pub stop_time_slice: StopTimeSlice,
    /// Days of circulation in the published timetable.
    pub base_pattern: ValidityPattern,
    /// Days of circulation once disruptions are applied.
    pub realtime_pattern: ValidityPattern,
    pub wheelchair_accessible: bool,
    pub kind: VjKind,
    /// Set on journeys materialized from a disruption; base journeys are
    /// never mutated.
    pub from_disruption: Option<Arc<str>>,
}

impl VehicleJourney {
    pub fn validity_pattern(&self, level: RtLevel) -> &ValidityPattern {
        match level {
            RtLevel::Base | RtLevel::AdaptedSchedule => &self.base_pattern,
            RtLevel::RealTime => &self.realtime_pattern,
        }
    }

    pub fn circulates(&self, level: RtLevel, day: u32) -> bool {
        self.validity_pattern(level).check(day)
    }
}

/// Identity grouping a base vehicle journey and its realtime variants.
#[derive(Debug, Clone)]
pub struct MetaVehicleJourney {
    pub idx: u32,
    pub uri: Arc<str>,
    pub base_vj_idx: Option<u32>,
    pub realtime_vj_idxs: Vec<u32>,
}

/// A foot path between two stop points.
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    pub from_stop_point_idx: u32,
    pub to_stop_point_idx: u32,
    pub duration: Duration,
}
