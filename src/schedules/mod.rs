use crate::{
    model::{Dataset, RtLevel, VjKind},
    shared::{DateTime, Duration, Time, paginate},
};
use std::collections::HashSet;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum Error {
    #[error("bad filter: {0}")]
    BadFilter(String),
}

/// What a departure board is asked about.
#[derive(Debug, Clone)]
pub enum Selector {
    StopPoint(String),
    StopArea(String),
    Line(String),
    Route(String),
}

#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub filter: Selector,
    pub from_datetime: DateTime,
    pub duration: Duration,
    /// Calendar mode: enumerate over a service calendar instead of a window.
    pub calendar_uri: Option<String>,
    pub rt_level: RtLevel,
    pub max_date_times: usize,
    pub count: usize,
    pub start_page: usize,
    pub forbidden_uris: Vec<String>,
}

impl ScheduleRequest {
    pub fn new(filter: Selector, from_datetime: DateTime, duration: Duration) -> Self {
        Self {
            filter,
            from_datetime,
            duration,
            calendar_uri: None,
            rt_level: RtLevel::Base,
            max_date_times: usize::MAX,
            count: 10,
            start_page: 0,
            forbidden_uris: Vec::new(),
        }
    }
}

/// Why a board row has no departures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// Last stop of its pattern and the route ends here.
    Terminus,
    /// Last stop of its pattern but the route continues further on other
    /// journeys.
    PartialTerminus,
    NoDepartureThisDay,
}

/// A single upcoming departure. Calendar mode carries no date.
#[derive(Debug, Clone, Copy)]
pub struct BoardDateTime {
    pub time: Time,
    pub date: Option<u32>,
    pub vj_idx: u32,
}

impl BoardDateTime {
    fn datetime(&self) -> Option<DateTime> {
        self.date.map(|day| DateTime::new(day, self.time))
    }
}

/// Departures of one (stop point, route) pair.
#[derive(Debug, Clone)]
pub struct StopSchedule {
    pub stop_point_idx: u32,
    pub route_idx: u32,
    pub date_times: Vec<BoardDateTime>,
    pub status: Option<ResponseStatus>,
}

#[derive(Debug, Clone)]
pub struct ScheduleResponse {
    pub schedules: Vec<StopSchedule>,
    pub total_result: usize,
    pub start_page: usize,
    pub count: usize,
}

/// Builds the departure board for a filter: departures grouped by
/// (stop point, route), classified when empty.
pub fn stop_schedules(data: &Dataset, request: &ScheduleRequest) -> Result<ScheduleResponse, Error> {
    let calendar_vp = match &request.calendar_uri {
        Some(uri) => {
            // Unknown calendars fail early.
            let calendar = data
                .calendar_by_uri(uri)
                .ok_or_else(|| Error::BadFilter(format!("calendar does not exist: {uri}")))?;
            Some(calendar.validity_pattern(data.production_begin, data.num_days()))
        }
        None => None,
    };

    let jpp_idxs = resolve_journey_pattern_points(data, &request.filter)?;
    trace!(points = jpp_idxs.len(), "resolved schedule filter");

    // Unique (stop point, route) pairs, in encounter order.
    let mut pairs: Vec<(u32, u32)> = Vec::new();
    let mut seen: HashSet<(u32, u32)> = HashSet::new();
    for &jpp_idx in &jpp_idxs {
        let jpp = &data.journey_pattern_points[jpp_idx as usize];
        let route_idx = data.journey_patterns[jpp.journey_pattern_idx as usize].route_idx;
        let key = (jpp.stop_point_idx, route_idx);
        if seen.insert(key) {
            pairs.push(key);
        }
    }
    let total_result = pairs.len();
    let pairs = paginate(pairs, request.count, request.start_page);

    let forbidden: HashSet<&str> = request.forbidden_uris.iter().map(String::as_str).collect();
    let mut schedules = Vec::with_capacity(pairs.len());
    for (sp_idx, route_idx) in pairs {
        let stop_point = &data.stop_points[sp_idx as usize];
        let route = &data.routes[route_idx as usize];
        let mut status = None;
        let mut date_times: Vec<BoardDateTime> = Vec::new();

        for &jpp_idx in &stop_point.journey_pattern_point_idxs {
            let jpp = &data.journey_pattern_points[jpp_idx as usize];
            let jp = &data.journey_patterns[jpp.journey_pattern_idx as usize];
            if jp.route_idx != route_idx {
                continue;
            }
            let found = match &calendar_vp {
                None => departures_in_window(data, request, jp.idx, jpp.order as usize, &forbidden),
                Some(vp) => departures_on_calendar(data, jp.idx, jpp.order as usize, vp, &forbidden),
            };
            if !found.is_empty() {
                date_times.extend(found);
            } else if jp.point_idxs.last() == Some(&jpp_idx) {
                // The pattern ends here; classify against the route's
                // advertised destination.
                if route.destination_area_idx == Some(stop_point.stop_area_idx) {
                    status = Some(ResponseStatus::Terminus);
                } else {
                    status = Some(ResponseStatus::PartialTerminus);
                }
            }
        }

        match &calendar_vp {
            None => {
                date_times.sort_by_key(|dt| (dt.datetime(), dt.vj_idx));
            }
            Some(_) => {
                // Times at or past the requested hour first, wrapping to the
                // next cycle, with no date attached.
                let requested = request.from_datetime.hour().normalized();
                date_times.sort_by_key(|dt| {
                    let time = dt.time.normalized();
                    (time < requested, time, dt.vj_idx)
                });
            }
        }
        date_times.truncate(request.max_date_times);

        if date_times.is_empty() && status.is_none() {
            status = Some(ResponseStatus::NoDepartureThisDay);
        }
        schedules.push(StopSchedule {
            stop_point_idx: sp_idx,
            route_idx,
            date_times,
            status,
        });
    }

    Ok(ScheduleResponse {
        schedules,
        total_result,
        start_page: request.start_page,
        count: request.count,
    })
}

/// Flat list of upcoming departures for a filter, strictly time-ordered.
pub fn next_departures(data: &Dataset, request: &ScheduleRequest) -> Result<Vec<BoardDateTime>, Error> {
    let jpp_idxs = resolve_journey_pattern_points(data, &request.filter)?;
    let forbidden: HashSet<&str> = request.forbidden_uris.iter().map(String::as_str).collect();
    let mut departures = Vec::new();
    for &jpp_idx in &jpp_idxs {
        let jpp = &data.journey_pattern_points[jpp_idx as usize];
        departures.extend(departures_in_window(
            data,
            request,
            jpp.journey_pattern_idx,
            jpp.order as usize,
            &forbidden,
        ));
    }
    departures.sort_by_key(|dt| (dt.datetime(), dt.vj_idx));
    departures.truncate(request.max_date_times);
    Ok(paginate(departures, request.count, request.start_page))
}

fn resolve_journey_pattern_points(data: &Dataset, filter: &Selector) -> Result<Vec<u32>, Error> {
    let of_stop_point = |sp_idx: u32| data.stop_points[sp_idx as usize].journey_pattern_point_idxs.clone();
    match filter {
        Selector::StopPoint(uri) => {
            let sp = data
                .stop_point_by_uri(uri)
                .ok_or_else(|| Error::BadFilter(format!("unknown stop point: {uri}")))?;
            Ok(of_stop_point(sp.idx))
        }
        Selector::StopArea(uri) => {
            let sa = data
                .stop_area_by_uri(uri)
                .ok_or_else(|| Error::BadFilter(format!("unknown stop area: {uri}")))?;
            Ok(data
                .stop_points
                .iter()
                .filter(|sp| sp.stop_area_idx == sa.idx)
                .flat_map(|sp| sp.journey_pattern_point_idxs.clone())
                .collect())
        }
        Selector::Line(uri) => {
            let line = data
                .line_by_uri(uri)
                .ok_or_else(|| Error::BadFilter(format!("unknown line: {uri}")))?;
            Ok(data
                .journey_patterns
                .iter()
                .filter(|jp| data.routes[jp.route_idx as usize].line_idx == line.idx)
                .flat_map(|jp| jp.point_idxs.iter().copied())
                .collect())
        }
        Selector::Route(uri) => {
            let route = data
                .route_by_uri(uri)
                .ok_or_else(|| Error::BadFilter(format!("unknown route: {uri}")))?;
            Ok(data
                .journey_patterns
                .iter()
                .filter(|jp| jp.route_idx == route.idx)
                .flat_map(|jp| jp.point_idxs.iter().copied())
                .collect())
        }
    }
}

fn vj_is_forbidden(data: &Dataset, vj_idx: u32, forbidden: &HashSet<&str>) -> bool {
    if forbidden.is_empty() {
        return false;
    }
    let vj = &data.vehicle_journeys[vj_idx as usize];
    let jp = &data.journey_patterns[vj.journey_pattern_idx as usize];
    let route = &data.routes[jp.route_idx as usize];
    let line = &data.lines[route.line_idx as usize];
    let mode = &data.physical_modes[vj.physical_mode_idx as usize];
    forbidden.contains(route.uri.as_ref())
        || forbidden.contains(line.uri.as_ref())
        || forbidden.contains(mode.uri.as_ref())
}

/// Departures of one pattern order within `[from, from + duration]` at the
/// requested realtime level.
fn departures_in_window(
    data: &Dataset,
    request: &ScheduleRequest,
    jp_idx: u32,
    order: usize,
    forbidden: &HashSet<&str>,
) -> Vec<BoardDateTime> {
    let from = request.from_datetime;
    let until = from.saturating_add(request.duration);
    let jp = &data.journey_patterns[jp_idx as usize];
    let first_day = from.date().saturating_sub(1);
    let last_day = until.date().min(data.num_days() as u32);

    let mut found = Vec::new();
    for day in first_day..=last_day {
        for &vj_idx in &jp.vehicle_journey_idxs {
            if vj_is_forbidden(data, vj_idx, forbidden) {
                continue;
            }
            let vj = &data.vehicle_journeys[vj_idx as usize];
            if !vj.circulates(request.rt_level, day) {
                continue;
            }
            let st = &data.stop_times_of(vj_idx)[order];
            if !st.pick_up_allowed {
                continue;
            }
            for time in expand_cycles(vj.kind, st.departure_time) {
                let dt = DateTime::new(day, time);
                if dt >= from && dt <= until {
                    found.push(BoardDateTime {
                        time: dt.hour(),
                        date: Some(dt.date()),
                        vj_idx,
                    });
                }
            }
        }
    }
    found
}

/// Departures of one pattern order for every journey circulating on the
/// calendar; entries carry no date.
fn departures_on_calendar(
    data: &Dataset,
    jp_idx: u32,
    order: usize,
    calendar_vp: &crate::model::ValidityPattern,
    forbidden: &HashSet<&str>,
) -> Vec<BoardDateTime> {
    let jp = &data.journey_patterns[jp_idx as usize];
    let mut found = Vec::new();
    for &vj_idx in &jp.vehicle_journey_idxs {
        if vj_is_forbidden(data, vj_idx, forbidden) {
            continue;
        }
        let vj = &data.vehicle_journeys[vj_idx as usize];
        if !vj.base_pattern.intersects(calendar_vp) {
            continue;
        }
        let st = &data.stop_times_of(vj_idx)[order];
        if !st.pick_up_allowed {
            continue;
        }
        for time in expand_cycles(vj.kind, st.departure_time) {
            found.push(BoardDateTime {
                time,
                date: None,
                vj_idx,
            });
        }
    }
    found
}

/// All occurrences of a stop time over one service day: a single time for a
/// discrete journey, one per headway cycle for a frequency journey.
fn expand_cycles(kind: VjKind, departure: Time) -> Vec<Time> {
    match kind {
        VjKind::Discrete => vec![departure],
        VjKind::Frequency { start, end, headway } => {
            let headway = headway.as_seconds().max(1);
            let mut times = Vec::new();
            let mut shift = 0;
            while start.as_seconds() + shift <= end.as_seconds() {
                times.push(Time::from_seconds(departure.as_seconds() + shift));
                shift += headway;
            }
            times
        }
    }
}
