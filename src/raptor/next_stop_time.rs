use crate::{
    model::{Dataset, JourneyPattern, RtLevel, VehicleJourney, VjKind},
    shared::{DateTime, Time},
};
use bitvec::prelude::*;
use std::collections::HashSet;

/// Per-query admissibility of vehicle journeys: realtime level aside, a
/// journey is either usable on every day or on none.
#[derive(Debug)]
pub(crate) struct VjFilter {
    allowed: BitVec,
    pub rt_level: RtLevel,
    pub wheelchair: bool,
}

impl VjFilter {
    pub fn new(data: &Dataset, rt_level: RtLevel, wheelchair: bool, forbidden_uris: &[String]) -> Self {
        let forbidden: HashSet<&str> = forbidden_uris.iter().map(String::as_str).collect();
        let mut allowed = bitvec!(1; data.vehicle_journeys.len());
        for vj in &data.vehicle_journeys {
            if wheelchair && !vj.wheelchair_accessible {
                allowed.set(vj.idx as usize, false);
                continue;
            }
            if forbidden.is_empty() {
                continue;
            }
            let jp = &data.journey_patterns[vj.journey_pattern_idx as usize];
            let route = &data.routes[jp.route_idx as usize];
            let line = &data.lines[route.line_idx as usize];
            let network = &data.networks[line.network_idx as usize];
            let mode = &data.physical_modes[vj.physical_mode_idx as usize];
            if forbidden.contains(route.uri.as_ref())
                || forbidden.contains(line.uri.as_ref())
                || forbidden.contains(network.uri.as_ref())
                || forbidden.contains(mode.uri.as_ref())
            {
                allowed.set(vj.idx as usize, false);
            }
        }
        Self {
            allowed,
            rt_level,
            wheelchair,
        }
    }

    pub fn allows(&self, vj_idx: u32) -> bool {
        self.allowed[vj_idx as usize]
    }
}

/// A boardable (journey, day, cycle) with its times at one pattern order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VjCandidate {
    pub vj_idx: u32,
    pub day: u32,
    pub cycle: u32,
}

/// Offset of a frequency cycle's start over the stored first-cycle times.
fn cycle_shift(vj: &VehicleJourney, cycle: u32) -> u32 {
    match vj.kind {
        VjKind::Discrete => 0,
        VjKind::Frequency { headway, .. } => cycle * headway.as_seconds(),
    }
}

pub(crate) fn departure_at(data: &Dataset, candidate: &VjCandidate, order: usize) -> DateTime {
    let vj = &data.vehicle_journeys[candidate.vj_idx as usize];
    let st = &data.stop_times_of(candidate.vj_idx)[order];
    let time = Time::from_seconds(st.departure_time.as_seconds() + cycle_shift(vj, candidate.cycle));
    DateTime::new(candidate.day, time)
}

pub(crate) fn arrival_at(data: &Dataset, candidate: &VjCandidate, order: usize) -> DateTime {
    let vj = &data.vehicle_journeys[candidate.vj_idx as usize];
    let st = &data.stop_times_of(candidate.vj_idx)[order];
    let time = Time::from_seconds(st.arrival_time.as_seconds() + cycle_shift(vj, candidate.cycle));
    DateTime::new(candidate.day, time)
}

/// Frequency cycles of `vj` whose shifted `base_time` at some order can fall
/// on the wanted side of `from`; discrete journeys expose cycle 0 only.
fn candidate_cycles(vj: &VehicleJourney, base_time: Time, day: u32, from: DateTime, clockwise: bool) -> Vec<u32> {
    match vj.kind {
        VjKind::Discrete => vec![0],
        VjKind::Frequency { start, end, headway } => {
            let headway = headway.as_seconds().max(1);
            let num_cycles = (end.as_seconds().saturating_sub(start.as_seconds())) / headway + 1;
            if clockwise {
                // First cycle departing at or after `from`.
                let day_start = DateTime::new(day, base_time).as_raw();
                let wanted = from.as_raw();
                let cycle = if wanted <= day_start {
                    0
                } else {
                    (wanted - day_start).div_ceil(headway)
                };
                (cycle < num_cycles).then(|| vec![cycle]).unwrap_or_default()
            } else {
                // Last cycle arriving at or before `from`.
                let day_start = DateTime::new(day, base_time).as_raw();
                let wanted = from.as_raw();
                if wanted < day_start {
                    return Vec::new();
                }
                let cycle = ((wanted - day_start) / headway).min(num_cycles - 1);
                vec![cycle]
            }
        }
    }
}

/// The earliest journey of `jp` boardable at `order` from `from` onwards.
///
/// Scans service days ascending, starting one day back to catch overnight
/// stop times past 86 400, and stops one day after the first hit since a
/// later day cannot improve past that.
pub(crate) fn earliest_vj(
    data: &Dataset,
    jp: &JourneyPattern,
    order: usize,
    from: DateTime,
    bound: DateTime,
    filter: &VjFilter,
) -> Option<VjCandidate> {
    let first_day = from.date().saturating_sub(1);
    let last_day = bound.date().min(data.num_days() as u32);
    let mut best: Option<(VjCandidate, DateTime)> = None;
    let mut found_on_day: Option<u32> = None;

    for day in first_day..=last_day {
        if let Some(found) = found_on_day
            && day > found + 1
        {
            break;
        }
        for &vj_idx in &jp.vehicle_journey_idxs {
            if !filter.allows(vj_idx) {
                continue;
            }
            let vj = &data.vehicle_journeys[vj_idx as usize];
            if !vj.circulates(filter.rt_level, day) {
                continue;
            }
            let st = &data.stop_times_of(vj_idx)[order];
            if !st.pick_up_allowed {
                continue;
            }
            for cycle in candidate_cycles(vj, st.departure_time, day, from, true) {
                let candidate = VjCandidate { vj_idx, day, cycle };
                let dep = departure_at(data, &candidate, order);
                if dep < from || dep > bound {
                    continue;
                }
                if best.as_ref().is_none_or(|(_, best_dep)| dep < *best_dep) {
                    best = Some((candidate, dep));
                    found_on_day.get_or_insert(day);
                }
            }
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// The latest journey of `jp` alightable at `order` no later than `from`.
pub(crate) fn latest_vj(
    data: &Dataset,
    jp: &JourneyPattern,
    order: usize,
    from: DateTime,
    bound: DateTime,
    filter: &VjFilter,
) -> Option<VjCandidate> {
    let first_day = bound.date().saturating_sub(1);
    let last_day = (from.date() + 1).min(data.num_days() as u32);
    let mut best: Option<(VjCandidate, DateTime)> = None;
    let mut found_on_day: Option<u32> = None;

    for day in (first_day..=last_day).rev() {
        if let Some(found) = found_on_day
            && day + 1 < found
        {
            break;
        }
        for &vj_idx in &jp.vehicle_journey_idxs {
            if !filter.allows(vj_idx) {
                continue;
            }
            let vj = &data.vehicle_journeys[vj_idx as usize];
            if !vj.circulates(filter.rt_level, day) {
                continue;
            }
            let st = &data.stop_times_of(vj_idx)[order];
            if !st.drop_off_allowed {
                continue;
            }
            for cycle in candidate_cycles(vj, st.arrival_time, day, from, false) {
                let candidate = VjCandidate { vj_idx, day, cycle };
                let arr = arrival_at(data, &candidate, order);
                if arr > from || arr < bound {
                    continue;
                }
                if best.as_ref().is_none_or(|(_, best_arr)| arr > *best_arr) {
                    best = Some((candidate, arr));
                    found_on_day.get_or_insert(day);
                }
            }
        }
    }
    best.map(|(candidate, _)| candidate)
}
