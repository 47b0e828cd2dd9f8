use crate::{
    model::Dataset,
    raptor::{
        next_stop_time::{VjCandidate, VjFilter, arrival_at, departure_at, earliest_vj, latest_vj},
        state::{Parent, SearchState, Update},
    },
    shared::{DateTime, Duration},
};
use rayon::prelude::*;

/// Clockwise route phase of round `round`: every active pattern is scanned
/// from its earliest marked order, keeping the earliest catchable journey
/// and emitting arrival improvements downstream.
///
/// Patterns scan in parallel; updates are buffered and applied serially.
pub(crate) fn scan_routes(
    data: &Dataset,
    state: &mut SearchState,
    filter: &VjFilter,
    round: usize,
    bound: DateTime,
) {
    let updates: Vec<Update> = state
        .active_mask
        .iter_ones()
        .par_bridge()
        .flat_map_iter(|jp_idx| scan_one_route(data, state, filter, round, bound, jp_idx))
        .collect();
    state.updates.extend(updates);
}

fn scan_one_route(
    data: &Dataset,
    state: &SearchState,
    filter: &VjFilter,
    round: usize,
    bound: DateTime,
    jp_idx: usize,
) -> Vec<Update> {
    let mut updates = Vec::new();
    let jp = &data.journey_patterns[jp_idx];
    let first_order = state.active_order[jp_idx] as usize;

    let mut onboard: Option<VjCandidate> = None;
    let mut board_sp: u32 = u32::MAX;
    let mut board_dep = DateTime::MIN;

    for order in first_order..jp.point_idxs.len() {
        let jpp = &data.journey_pattern_points[jp.point_idxs[order] as usize];
        let sp = &data.stop_points[jpp.stop_point_idx as usize];
        let accessible = !filter.wheelchair || sp.wheelchair_accessible;

        if let Some(candidate) = &onboard {
            let st = &data.stop_times_of(candidate.vj_idx)[order];
            let arrival = arrival_at(data, candidate, order);
            if st.drop_off_allowed
                && accessible
                && arrival <= bound
                && state.improves(true, arrival, sp.idx)
            {
                updates.push(Update {
                    stop_point_idx: sp.idx,
                    dt: arrival,
                    parent: Parent::Vehicle {
                        vj_idx: candidate.vj_idx,
                        other_sp: board_sp,
                        dep_dt: board_dep,
                        arr_dt: arrival,
                    },
                    vj_uri: Some(data.vehicle_journeys[candidate.vj_idx as usize].uri.clone()),
                });
            }
        }

        // Hop on an earlier journey when the previous round reached this
        // stop before the current one departs.
        let prev_label = state.label(round - 1, sp.idx);
        if prev_label == state.unreached() || !accessible {
            continue;
        }
        let current_dep = onboard.as_ref().map(|candidate| departure_at(data, candidate, order));
        if current_dep.is_none_or(|dep| prev_label <= dep)
            && let Some(candidate) = earliest_vj(data, jp, order, prev_label, bound, filter)
        {
            let dep = departure_at(data, &candidate, order);
            if current_dep.is_none_or(|current| dep < current) {
                board_sp = sp.idx;
                board_dep = dep;
                onboard = Some(candidate);
            }
        }
    }
    updates
}

/// Reverse route phase: patterns scan backwards from their latest marked
/// order, keeping the latest catchable journey and emitting departure
/// improvements upstream.
pub(crate) fn scan_routes_reverse(
    data: &Dataset,
    state: &mut SearchState,
    filter: &VjFilter,
    round: usize,
    bound: DateTime,
) {
    let updates: Vec<Update> = state
        .active_mask
        .iter_ones()
        .par_bridge()
        .flat_map_iter(|jp_idx| scan_one_route_reverse(data, state, filter, round, bound, jp_idx))
        .collect();
    state.updates.extend(updates);
}

fn scan_one_route_reverse(
    data: &Dataset,
    state: &SearchState,
    filter: &VjFilter,
    round: usize,
    bound: DateTime,
    jp_idx: usize,
) -> Vec<Update> {
    let mut updates = Vec::new();
    let jp = &data.journey_patterns[jp_idx];
    let last_order = state.active_order[jp_idx] as usize;

    let mut onboard: Option<VjCandidate> = None;
    let mut alight_sp: u32 = u32::MAX;
    let mut alight_arr = DateTime::MAX;

    for order in (0..=last_order).rev() {
        let jpp = &data.journey_pattern_points[jp.point_idxs[order] as usize];
        let sp = &data.stop_points[jpp.stop_point_idx as usize];
        let accessible = !filter.wheelchair || sp.wheelchair_accessible;

        if let Some(candidate) = &onboard {
            let st = &data.stop_times_of(candidate.vj_idx)[order];
            let departure = departure_at(data, candidate, order);
            if st.pick_up_allowed
                && accessible
                && departure >= bound
                && state.improves(false, departure, sp.idx)
            {
                updates.push(Update {
                    stop_point_idx: sp.idx,
                    dt: departure,
                    parent: Parent::Vehicle {
                        vj_idx: candidate.vj_idx,
                        other_sp: alight_sp,
                        dep_dt: departure,
                        arr_dt: alight_arr,
                    },
                    vj_uri: Some(data.vehicle_journeys[candidate.vj_idx as usize].uri.clone()),
                });
            }
        }

        // Hop on a later journey when the previous round leaves this stop
        // after the current one arrives.
        let prev_label = state.label(round - 1, sp.idx);
        if prev_label == state.unreached() || !accessible {
            continue;
        }
        let current_arr = onboard.as_ref().map(|candidate| arrival_at(data, candidate, order));
        if current_arr.is_none_or(|arr| prev_label >= arr)
            && let Some(candidate) = latest_vj(data, jp, order, prev_label, bound, filter)
        {
            let arr = arrival_at(data, &candidate, order);
            if current_arr.is_none_or(|current| arr > current) {
                alight_sp = sp.idx;
                alight_arr = arr;
                onboard = Some(candidate);
            }
        }
    }
    updates
}

/// Foot-transfer phase after a clockwise route phase.
///
/// The identity transfer is implicit: a round label can seed the next
/// round's boarding at its own stop without a penalty. Explicit transfers
/// pay their duration plus the transfer penalty.
pub(crate) fn scan_transfers(
    data: &Dataset,
    state: &mut SearchState,
    filter: &VjFilter,
    round: usize,
    bound: DateTime,
    transfer_penalty: Duration,
) {
    let mut updates = Vec::new();
    for sp_idx in state.marked_stops.iter_ones() {
        let departure = state.label(round, sp_idx as u32);
        if departure == state.unreached() {
            continue;
        }
        for &transfer_idx in &data.transfers_from[sp_idx] {
            let transfer = &data.transfers[transfer_idx as usize];
            let destination = &data.stop_points[transfer.to_stop_point_idx as usize];
            if filter.wheelchair && !destination.wheelchair_accessible {
                continue;
            }
            let arrival = departure
                .saturating_add(transfer.duration)
                .saturating_add(transfer_penalty);
            if arrival <= bound && state.improves(true, arrival, transfer.to_stop_point_idx) {
                updates.push(Update {
                    stop_point_idx: transfer.to_stop_point_idx,
                    dt: arrival,
                    parent: Parent::Transfer {
                        other_sp: sp_idx as u32,
                        dep_dt: departure,
                        arr_dt: arrival,
                    },
                    vj_uri: None,
                });
            }
        }
    }
    state.updates.extend(updates);
}

/// Foot-transfer phase after a reverse route phase, walked against the
/// transfer direction.
pub(crate) fn scan_transfers_reverse(
    data: &Dataset,
    state: &mut SearchState,
    filter: &VjFilter,
    round: usize,
    bound: DateTime,
    transfer_penalty: Duration,
) {
    let mut updates = Vec::new();
    for sp_idx in state.marked_stops.iter_ones() {
        let arrival = state.label(round, sp_idx as u32);
        if arrival == state.unreached() {
            continue;
        }
        for &transfer_idx in &data.transfers_to[sp_idx] {
            let transfer = &data.transfers[transfer_idx as usize];
            let origin = &data.stop_points[transfer.from_stop_point_idx as usize];
            if filter.wheelchair && !origin.wheelchair_accessible {
                continue;
            }
            let departure = arrival
                .saturating_sub(transfer.duration)
                .saturating_sub(transfer_penalty);
            if departure >= bound && state.improves(false, departure, transfer.from_stop_point_idx) {
                updates.push(Update {
                    stop_point_idx: transfer.from_stop_point_idx,
                    dt: departure,
                    parent: Parent::Transfer {
                        other_sp: sp_idx as u32,
                        dep_dt: departure,
                        arr_dt: arrival,
                    },
                    vj_uri: None,
                });
            }
        }
    }
    state.updates.extend(updates);
}
