//! Programmatic dataset construction.
//!
//! The production dataset is built by an offline import pipeline and handed
//! to the engine already assembled; this builder is the in-process
//! equivalent used by fixtures and the test suite. Lines, routes, journey
//! patterns, stop areas and meta journeys are derived from the declared
//! vehicle journeys.

use crate::{
    model::{
        Calendar, Dataset, Line, MetaVehicleJourney, Network, PhysicalMode, Route, StopArea,
        StopPoint, StopTime, Transfer, ValidityPattern, VehicleJourney, VjKind, WeekPattern,
        timezone::TimeZoneHandler,
    },
    shared::{Coordinate, Duration, Time},
};
use chrono::NaiveDate;
use std::{collections::HashMap, sync::Arc};

struct PendingStopTime {
    stop_uri: String,
    arrival: Time,
    departure: Time,
    pick_up_allowed: bool,
    drop_off_allowed: bool,
}

struct PendingVj {
    uri: String,
    line_uri: String,
    physical_mode_uri: String,
    wheelchair_accessible: bool,
    valid_days: Option<String>,
    kind: VjKind,
    stop_times: Vec<PendingStopTime>,
}

pub struct DatasetBuilder {
    production_begin: NaiveDate,
    production_end: NaiveDate,
    pending_vjs: Vec<PendingVj>,
    transfers: Vec<(String, String, Duration)>,
    located: HashMap<String, Coordinate>,
    accessible_stops: HashMap<String, bool>,
    route_destinations: HashMap<String, String>,
    mode_co2: HashMap<String, f64>,
    calendars: Vec<Calendar>,
    timezone: Option<TimeZoneHandler>,
    publication_timestamp: i64,
}

/// Chainable handle on one vehicle journey under construction.
pub struct VjBuilder<'a> {
    vj: &'a mut PendingVj,
}

impl VjBuilder<'_> {
    /// Adds a stop with `arrival == departure`.
    pub fn st(self, stop_uri: &str, time: &str) -> Self {
        let time = Time::from_hms(time).expect("invalid time literal");
        self.st_times(stop_uri, time, time)
    }

    pub fn st_dep(self, stop_uri: &str, arrival: &str, departure: &str) -> Self {
        let arrival = Time::from_hms(arrival).expect("invalid time literal");
        let departure = Time::from_hms(departure).expect("invalid time literal");
        self.st_times(stop_uri, arrival, departure)
    }

    fn st_times(self, stop_uri: &str, arrival: Time, departure: Time) -> Self {
        self.vj.stop_times.push(PendingStopTime {
            stop_uri: stop_uri.to_string(),
            arrival,
            departure,
            pick_up_allowed: true,
            drop_off_allowed: true,
        });
        self
    }

    pub fn pick_up(self, allowed: bool) -> Self {
        if let Some(last) = self.vj.stop_times.last_mut() {
            last.pick_up_allowed = allowed;
        }
        self
    }

    pub fn drop_off(self, allowed: bool) -> Self {
        if let Some(last) = self.vj.stop_times.last_mut() {
            last.drop_off_allowed = allowed;
        }
        self
    }

    pub fn wheelchair(self, accessible: bool) -> Self {
        self.vj.wheelchair_accessible = accessible;
        self
    }

    /// Restricts circulation to the given bitstring, first character being
    /// the first production day. The default is every day.
    pub fn valid_days(self, bits: &str) -> Self {
        self.vj.valid_days = Some(bits.to_string());
        self
    }

    pub fn physical_mode(self, uri: &str) -> Self {
        self.vj.physical_mode_uri = uri.to_string();
        self
    }
}

impl DatasetBuilder {
    /// Production period bounds in undelimited form, e.g. `"20150301"`.
    pub fn new(begin: &str, end: &str) -> Self {
        let production_begin = NaiveDate::parse_from_str(begin, "%Y%m%d").expect("invalid begin date");
        let production_end = NaiveDate::parse_from_str(end, "%Y%m%d").expect("invalid end date");
        Self {
            production_begin,
            production_end,
            pending_vjs: Vec::new(),
            transfers: Vec::new(),
            located: HashMap::new(),
            accessible_stops: HashMap::new(),
            route_destinations: HashMap::new(),
            mode_co2: HashMap::new(),
            calendars: Vec::new(),
            timezone: None,
            publication_timestamp: 0,
        }
    }

    /// Declares a vehicle journey on `line_uri`; stops chain off the
    /// returned builder.
    pub fn vj(&mut self, line_uri: &str, uri: &str) -> VjBuilder<'_> {
        self.pending_vjs.push(PendingVj {
            uri: uri.to_string(),
            line_uri: line_uri.to_string(),
            physical_mode_uri: "physical_mode:Bus".to_string(),
            wheelchair_accessible: false,
            valid_days: None,
            kind: VjKind::Discrete,
            stop_times: Vec::new(),
        });
        VjBuilder {
            vj: self.pending_vjs.last_mut().unwrap(),
        }
    }

    /// A journey repeating every `headway` between `start` and `end`; the
    /// declared stop times describe the first cycle.
    pub fn frequency_vj(
        &mut self,
        line_uri: &str,
        uri: &str,
        start: &str,
        end: &str,
        headway_secs: u32,
    ) -> VjBuilder<'_> {
        let start = Time::from_hms(start).expect("invalid time literal");
        let end = Time::from_hms(end).expect("invalid time literal");
        let mut builder = self.vj(line_uri, uri);
        builder.vj.kind = VjKind::Frequency {
            start,
            end,
            headway: Duration::from_seconds(headway_secs),
        };
        builder
    }

    pub fn transfer(&mut self, from: &str, to: &str, seconds: u32) -> &mut Self {
        self.transfers
            .push((from.to_string(), to.to_string(), Duration::from_seconds(seconds)));
        self
    }

    pub fn locate(&mut self, stop_uri: &str, lon: f64, lat: f64) -> &mut Self {
        self.located.insert(stop_uri.to_string(), Coordinate::new(lon, lat));
        self
    }

    pub fn accessible(&mut self, stop_uri: &str, wheelchair: bool) -> &mut Self {
        self.accessible_stops.insert(stop_uri.to_string(), wheelchair);
        self
    }

    /// Overrides a route's destination; the default is the last stop of the
    /// longest pattern of the route.
    pub fn route_destination(&mut self, line_uri: &str, stop_uri: &str) -> &mut Self {
        self.route_destinations
            .insert(line_uri.to_string(), stop_uri.to_string());
        self
    }

    pub fn mode_co2(&mut self, mode_uri: &str, grams_per_km: f64) -> &mut Self {
        self.mode_co2.insert(mode_uri.to_string(), grams_per_km);
        self
    }

    pub fn calendar(
        &mut self,
        uri: &str,
        periods: &[(&str, &str)],
        week_bits: &str,
    ) -> &mut Self {
        let active_periods = periods
            .iter()
            .map(|(begin, end)| {
                (
                    NaiveDate::parse_from_str(begin, "%Y%m%d").expect("invalid period begin"),
                    NaiveDate::parse_from_str(end, "%Y%m%d").expect("invalid period end"),
                )
            })
            .collect();
        self.calendars.push(Calendar {
            idx: self.calendars.len() as u32,
            uri: uri.to_string(),
            active_periods,
            week_pattern: WeekPattern::from_bits(week_bits).expect("invalid week bits"),
            exceptions: Vec::new(),
        });
        self
    }

    pub fn timezone(&mut self, handler: TimeZoneHandler) -> &mut Self {
        self.timezone = Some(handler);
        self
    }

    pub fn published_at(&mut self, timestamp: i64) -> &mut Self {
        self.publication_timestamp = timestamp;
        self
    }

    pub fn build(self) -> Dataset {
        let mut data = Dataset {
            production_begin: self.production_begin,
            production_end: self.production_end,
            timezone: self.timezone,
            publication_timestamp: self.publication_timestamp,
            calendars: self.calendars,
            ..Default::default()
        };
        for calendar in &data.calendars {
            data.calendar_lookup
                .insert(Arc::from(calendar.uri.as_str()), calendar.idx);
        }

        data.networks.push(Network {
            idx: 0,
            uri: Arc::from("network:default"),
            name: Arc::from("default"),
        });
        data.network_lookup.insert(Arc::from("network:default"), 0);

        let num_days = data.num_days();
        let mut stop_grid: u32 = 0;

        // Stop points and their one-to-one stop areas.
        let resolve_stop = |data: &mut Dataset, uri: &str, grid: &mut u32| -> u32 {
            if let Some(idx) = data.stop_point_lookup.get(uri) {
                return *idx;
            }
            let coord = self
                .located
                .get(uri)
                .copied()
                .unwrap_or_else(|| Coordinate::new(2.0 + 0.01 * f64::from(*grid), 48.0));
            *grid += 1;
            let wheelchair = self.accessible_stops.get(uri).copied().unwrap_or(true);
            let area_uri: Arc<str> = Arc::from(format!("sa:{uri}").as_str());
            let area_idx = data.stop_areas.len() as u32;
            data.stop_areas.push(StopArea {
                idx: area_idx,
                uri: area_uri.clone(),
                name: Arc::from(uri),
                coord,
                admin_idxs: Vec::new(),
                wheelchair_accessible: wheelchair,
            });
            data.stop_area_lookup.insert(area_uri, area_idx);
            let sp_idx = data.stop_points.len() as u32;
            let sp_uri: Arc<str> = Arc::from(uri);
            data.stop_points.push(StopPoint {
                idx: sp_idx,
                uri: sp_uri.clone(),
                name: Arc::from(uri),
                coord,
                stop_area_idx: area_idx,
                wheelchair_accessible: wheelchair,
                is_zonal: false,
                journey_pattern_point_idxs: Vec::new(),
            });
            data.stop_point_lookup.insert(sp_uri, sp_idx);
            sp_idx
        };

        // Lines, one route each.
        let mut route_of_line: HashMap<String, u32> = HashMap::new();
        for pending in &self.pending_vjs {
            if route_of_line.contains_key(&pending.line_uri) {
                continue;
            }
            let line_idx = data.lines.len() as u32;
            let line_uri: Arc<str> = Arc::from(pending.line_uri.as_str());
            data.lines.push(Line {
                idx: line_idx,
                uri: line_uri.clone(),
                name: line_uri.clone(),
                code: None,
                network_idx: 0,
            });
            data.line_lookup.insert(line_uri.clone(), line_idx);
            let route_idx = data.routes.len() as u32;
            let route_uri: Arc<str> = Arc::from(format!("route:{}", pending.line_uri).as_str());
            data.routes.push(Route {
                idx: route_idx,
                uri: route_uri.clone(),
                name: line_uri,
                line_idx,
                destination_area_idx: None,
            });
            data.route_lookup.insert(route_uri, route_idx);
            route_of_line.insert(pending.line_uri.clone(), route_idx);
        }

        // Physical modes on demand.
        let mode_idx_of = |data: &mut Dataset, uri: &str| -> u32 {
            if let Some(idx) = data.physical_mode_lookup.get(uri) {
                return *idx;
            }
            let idx = data.physical_modes.len() as u32;
            let mode_uri: Arc<str> = Arc::from(uri);
            data.physical_modes.push(PhysicalMode {
                idx,
                uri: mode_uri.clone(),
                name: Arc::from(uri.rsplit(':').next().unwrap_or(uri)),
                co2_emission: self.mode_co2.get(uri).copied(),
            });
            data.physical_mode_lookup.insert(mode_uri, idx);
            idx
        };

        // Vehicle journeys, grouped into patterns by (route, stop sequence).
        let mut pattern_of: HashMap<(u32, Vec<u32>), u32> = HashMap::new();
        for pending in &self.pending_vjs {
            let route_idx = route_of_line[&pending.line_uri];
            let stop_seq: Vec<u32> = pending
                .stop_times
                .iter()
                .map(|st| resolve_stop(&mut data, &st.stop_uri, &mut stop_grid))
                .collect();
            let jp_idx = *pattern_of
                .entry((route_idx, stop_seq.clone()))
                .or_insert_with(|| {
                    let n = data.journey_patterns.len();
                    let uri: Arc<str> =
                        Arc::from(format!("journey_pattern:{}:{n}", pending.line_uri).as_str());
                    data.register_journey_pattern(route_idx, &stop_seq, uri)
                });

            let stop_times: Vec<StopTime> = pending
                .stop_times
                .iter()
                .map(|st| StopTime {
                    arrival_time: st.arrival,
                    departure_time: st.departure,
                    pick_up_allowed: st.pick_up_allowed,
                    drop_off_allowed: st.drop_off_allowed,
                    date_time_estimated: false,
                    odt: false,
                })
                .collect();
            let slice = data.push_stop_times(stop_times);

            let mut base_pattern = ValidityPattern::new(self.production_begin, num_days);
            match &pending.valid_days {
                Some(bits) => {
                    for (i, c) in bits.chars().enumerate() {
                        if c == '1' {
                            base_pattern.add_date(
                                self.production_begin + chrono::Days::new(i as u64),
                            );
                        }
                    }
                }
                None => {
                    base_pattern.add_period(
                        self.production_begin,
                        self.production_end,
                        WeekPattern::ALL,
                    );
                }
            }

            let meta_idx = data.meta_vjs.len() as u32;
            let vj_uri: Arc<str> = Arc::from(pending.uri.as_str());
            data.meta_vjs.push(MetaVehicleJourney {
                idx: meta_idx,
                uri: vj_uri.clone(),
                base_vj_idx: None,
                realtime_vj_idxs: Vec::new(),
            });
            data.meta_vj_lookup.insert(vj_uri.clone(), meta_idx);

            let vj_idx = data.vehicle_journeys.len() as u32;
            let physical_mode_idx = mode_idx_of(&mut data, &pending.physical_mode_uri);
            data.vehicle_journeys.push(VehicleJourney {
                idx: vj_idx,
                uri: vj_uri.clone(),
                journey_pattern_idx: jp_idx,
                meta_vj_idx: meta_idx,
                physical_mode_idx,
                stop_time_slice: slice,
                realtime_pattern: base_pattern.clone(),
                base_pattern,
                wheelchair_accessible: pending.wheelchair_accessible,
                kind: pending.kind,
                from_disruption: None,
            });
            data.vehicle_journey_lookup.insert(vj_uri, vj_idx);
            data.meta_vjs[meta_idx as usize].base_vj_idx = Some(vj_idx);
            data.journey_patterns[jp_idx as usize]
                .vehicle_journey_idxs
                .push(vj_idx);
        }

        // Route destinations: explicit override, else the last stop of the
        // longest pattern.
        for route in &mut data.routes {
            let line_uri = data.lines[route.line_idx as usize].uri.clone();
            let override_sp = self
                .route_destinations
                .get(line_uri.as_ref())
                .and_then(|sp_uri| data.stop_point_lookup.get(sp_uri.as_str()));
            if let Some(sp_idx) = override_sp {
                route.destination_area_idx =
                    Some(data.stop_points[*sp_idx as usize].stop_area_idx);
                continue;
            }
            let longest = data
                .journey_patterns
                .iter()
                .filter(|jp| jp.route_idx == route.idx)
                .max_by_key(|jp| jp.point_idxs.len());
            if let Some(jp) = longest
                && let Some(last_jpp) = jp.point_idxs.last()
            {
                let sp_idx = data.journey_pattern_points[*last_jpp as usize].stop_point_idx;
                route.destination_area_idx =
                    Some(data.stop_points[sp_idx as usize].stop_area_idx);
            }
        }

        // Order every pattern's journeys by first departure so the boarding
        // scan can stop at the first admissible one.
        let departures: Vec<Time> = data
            .vehicle_journeys
            .iter()
            .map(|vj| {
                data.stop_times[vj.stop_time_slice.start_idx as usize].departure_time
            })
            .collect();
        for jp in &mut data.journey_patterns {
            jp.vehicle_journey_idxs
                .sort_by_key(|vj_idx| departures[*vj_idx as usize]);
        }

        // Transfers.
        data.transfers_from = vec![Vec::new(); data.stop_points.len()];
        data.transfers_to = vec![Vec::new(); data.stop_points.len()];
        for (from, to, duration) in &self.transfers {
            let from_idx = *data
                .stop_point_lookup
                .get(from.as_str())
                .expect("transfer from unknown stop");
            let to_idx = *data
                .stop_point_lookup
                .get(to.as_str())
                .expect("transfer to unknown stop");
            let transfer_idx = data.transfers.len() as u32;
            data.transfers.push(Transfer {
                from_stop_point_idx: from_idx,
                to_stop_point_idx: to_idx,
                duration: *duration,
            });
            data.transfers_from[from_idx as usize].push(transfer_idx);
            data.transfers_to[to_idx as usize].push(transfer_idx);
        }

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RtLevel;

    #[test]
    fn builds_patterns_and_lookups() {
        let mut b = DatasetBuilder::new("20150301", "20150401");
        b.vj("line:A", "vj:1").st("spA", "08:00:00").st("spB", "09:00:00");
        b.vj("line:A", "vj:2")
            .st("spA", "09:00:00")
            .st("spB", "10:00:00")
            .st("spC", "11:00:00");
        let data = b.build();

        assert_eq!(data.lines.len(), 1);
        assert_eq!(data.routes.len(), 1);
        assert_eq!(data.journey_patterns.len(), 2);
        assert_eq!(data.vehicle_journeys.len(), 2);
        assert_eq!(data.stop_points.len(), 3);
        let vj = data.vehicle_journey_by_uri("vj:1").unwrap();
        assert_eq!(data.stop_times_of(vj.idx).len(), 2);
        // Destination of the route is the last stop of the longest pattern.
        let route = &data.routes[0];
        let sp_c = data.stop_point_by_uri("spC").unwrap();
        assert_eq!(route.destination_area_idx, Some(sp_c.stop_area_idx));
    }

    #[test]
    fn valid_days_bits() {
        let mut b = DatasetBuilder::new("20150301", "20150310");
        b.vj("line:A", "vj:1")
            .st("spA", "08:00:00")
            .st("spB", "09:00:00")
            .valid_days("010");
        let data = b.build();
        let vj = data.vehicle_journey_by_uri("vj:1").unwrap();
        assert!(!vj.circulates(RtLevel::Base, 0));
        assert!(vj.circulates(RtLevel::Base, 1));
        assert!(!vj.circulates(RtLevel::Base, 2));
    }
}
