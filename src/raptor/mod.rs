mod explorer;
mod journey;
mod next_stop_time;
mod state;

pub use journey::{Journey, Section};

use crate::{
    model::{Dataset, RtLevel},
    raptor::{
        explorer::{scan_routes, scan_routes_reverse, scan_transfers, scan_transfers_reverse},
        journey::extract_journeys,
        next_stop_time::VjFilter,
        state::SearchState,
    },
    shared::{DateTime, Duration},
};
use tracing::{debug, trace};

/// Hard ceiling on rounds, far above any sensible `max_transfers`.
pub const MAX_ROUNDS: usize = 15;

pub const DEFAULT_TRANSFER_PENALTY: Duration = Duration::from_seconds(120);

/// One transit search: endpoints with street access costs plus every knob
/// the request exposes.
#[derive(Debug, Clone)]
pub struct Query {
    /// Reachable boarding stop points with their street access duration.
    pub departures: Vec<(u32, Duration)>,
    /// Reachable alighting stop points with their street egress duration.
    pub arrivals: Vec<(u32, Duration)>,
    /// Earliest departure (clockwise) or latest arrival (reverse).
    pub init_dt: DateTime,
    pub clockwise: bool,
    pub rt_level: RtLevel,
    pub transfer_penalty: Duration,
    pub max_duration: Option<Duration>,
    pub max_transfers: u32,
    pub wheelchair: bool,
    pub forbidden_uris: Vec<String>,
    /// Duration of the pure street path, when one exists; labels that
    /// cannot beat it are pruned.
    pub direct_path_duration: Option<Duration>,
    pub max_extra_second_pass: u32,
}

impl Query {
    pub fn new(departures: Vec<(u32, Duration)>, arrivals: Vec<(u32, Duration)>, init_dt: DateTime) -> Self {
        Self {
            departures,
            arrivals,
            init_dt,
            clockwise: true,
            rt_level: RtLevel::Base,
            transfer_penalty: DEFAULT_TRANSFER_PENALTY,
            max_duration: None,
            max_transfers: 10,
            wheelchair: false,
            forbidden_uris: Vec::new(),
            direct_path_duration: None,
            max_extra_second_pass: 0,
        }
    }

    /// Time bound of the search, `max_duration` and the direct street path
    /// both tightening it.
    fn bound(&self) -> DateTime {
        let mut bound = if self.clockwise { DateTime::MAX } else { DateTime::MIN };
        let mut tighten = |duration: Duration| {
            bound = if self.clockwise {
                bound.min(self.init_dt.saturating_add(duration))
            } else {
                bound.max(self.init_dt.saturating_sub(duration))
            };
        };
        if let Some(max_duration) = self.max_duration {
            tighten(max_duration);
        }
        if let Some(direct) = self.direct_path_duration {
            tighten(direct);
        }
        bound
    }
}

/// The round-based transit search engine.
///
/// Owned by one worker thread; the label buffers are sized on the dataset
/// and rebuilt when the data holder publishes a new version.
pub struct Raptor {
    state: SearchState,
}

impl Raptor {
    pub fn new(data: &Dataset) -> Self {
        Self {
            state: SearchState::new(data.stop_points.len(), data.journey_patterns.len()),
        }
    }

    /// Journeys from `departures` to `arrivals`, Pareto-optimal on
    /// (time, transfers), refined by the second pass.
    pub fn compute(&mut self, data: &Dataset, query: &Query) -> Vec<Journey> {
        let filter = VjFilter::new(data, query.rt_level, query.wheelchair, &query.forbidden_uris);
        let bound = query.bound();
        let (starts, targets) = if query.clockwise {
            (&query.departures, &query.arrivals)
        } else {
            (&query.arrivals, &query.departures)
        };
        self.run(data, &filter, starts, query.init_dt, query.clockwise, bound, query.max_transfers, query.transfer_penalty);
        let journeys = extract_journeys(&self.state, query.clockwise, targets);
        debug!(solutions = journeys.len(), clockwise = query.clockwise, "raptor search done");
        self.second_pass(data, query, &filter, journeys)
    }

    /// Per-stop best labels of a search without a destination.
    pub fn isochrone(&mut self, data: &Dataset, query: &Query) -> Vec<(u32, DateTime)> {
        let filter = VjFilter::new(data, query.rt_level, query.wheelchair, &query.forbidden_uris);
        let bound = query.bound();
        let starts = if query.clockwise { &query.departures } else { &query.arrivals };
        self.run(data, &filter, starts, query.init_dt, query.clockwise, bound, query.max_transfers, query.transfer_penalty);
        let unreached = self.state.unreached();
        self.state
            .best
            .iter()
            .enumerate()
            .filter(|(_, dt)| **dt != unreached)
            .map(|(sp_idx, dt)| (sp_idx as u32, *dt))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        &mut self,
        data: &Dataset,
        filter: &VjFilter,
        starts: &[(u32, Duration)],
        init_dt: DateTime,
        clockwise: bool,
        bound: DateTime,
        max_transfers: u32,
        transfer_penalty: Duration,
    ) {
        self.state
            .clear(data.stop_points.len(), data.journey_patterns.len(), clockwise);
        self.state.push_round();
        for &(sp_idx, access) in starts {
            let dt = if clockwise {
                init_dt.saturating_add(access)
            } else {
                init_dt.saturating_sub(access)
            };
            let in_bound = if clockwise { dt <= bound } else { dt >= bound };
            if in_bound && self.state.improves(clockwise, dt, sp_idx) {
                self.state.set_label(0, sp_idx, dt, None);
                self.state.best[sp_idx as usize] = dt;
                self.state.marked_stops.set(sp_idx as usize, true);
            }
        }

        // Round k explores journeys of k vehicles, hence k - 1 transfers.
        let max_rounds = (max_transfers as usize + 1).min(MAX_ROUNDS);
        for round in 1..=max_rounds {
            if self.state.marked_stops.not_any() {
                break;
            }
            self.state.push_round();
            mark_patterns(data, &mut self.state, clockwise);

            if clockwise {
                scan_routes(data, &mut self.state, filter, round, bound);
            } else {
                scan_routes_reverse(data, &mut self.state, filter, round, bound);
            }
            let improved_routes = self.state.apply_updates(round, clockwise);

            if clockwise {
                scan_transfers(data, &mut self.state, filter, round, bound, transfer_penalty);
            } else {
                scan_transfers_reverse(data, &mut self.state, filter, round, bound, transfer_penalty);
            }
            let improved_transfers = self.state.apply_updates(round, clockwise);

            trace!(round, improved_routes, improved_transfers, "raptor round done");
            if !improved_routes && !improved_transfers {
                break;
            }
        }
    }

    /// Tightens each Pareto solution from the other side: a clockwise
    /// search leaves as late as possible, a reverse one arrives as early as
    /// possible, preserving (time, transfers). `max_extra_second_pass`
    /// additional distinct solutions may be kept.
    fn second_pass(
        &mut self,
        data: &Dataset,
        query: &Query,
        filter: &VjFilter,
        journeys: Vec<Journey>,
    ) -> Vec<Journey> {
        if journeys.is_empty() {
            return journeys;
        }
        let mut refined = Vec::with_capacity(journeys.len());
        let mut extras_left = query.max_extra_second_pass;
        for journey in journeys {
            let (endpoint_sp, endpoint_dt) = if query.clockwise {
                match journey.sections.last() {
                    Some(Section::PublicTransport { to_sp, arr_dt, .. })
                    | Some(Section::Transfer { to_sp, arr_dt, .. }) => (*to_sp, *arr_dt),
                    None => {
                        refined.push(journey);
                        continue;
                    }
                }
            } else {
                match journey.sections.first() {
                    Some(Section::PublicTransport { from_sp, dep_dt, .. })
                    | Some(Section::Transfer { from_sp, dep_dt, .. }) => (*from_sp, *dep_dt),
                    None => {
                        refined.push(journey);
                        continue;
                    }
                }
            };

            self.run(
                data,
                filter,
                &[(endpoint_sp, Duration::ZERO)],
                endpoint_dt,
                // The refinement runs against the original direction.
                !query.clockwise,
                query.init_dt,
                journey.transfers,
                query.transfer_penalty,
            );
            let targets = if query.clockwise { &query.departures } else { &query.arrivals };
            let mut candidates = extract_journeys(&self.state, !query.clockwise, targets);
            candidates.retain(|candidate| candidate.transfers <= journey.transfers);

            // Pick the candidate preserving the arrival while moving the
            // departure closest to the requested datetime.
            let best = candidates
                .iter()
                .max_by(|a, b| {
                    let key = |j: &Journey| {
                        if query.clockwise {
                            j.departure_dt
                        } else {
                            DateTime::from_raw(u32::MAX - j.arrival_dt.as_raw())
                        }
                    };
                    key(a).cmp(&key(b)).then_with(|| {
                        b.vj_uris(data).cmp(&a.vj_uris(data))
                    })
                })
                .cloned();
            match best {
                Some(best) => {
                    for candidate in candidates {
                        if candidate != best && extras_left > 0 {
                            extras_left -= 1;
                            refined.push(candidate);
                        }
                    }
                    refined.push(best);
                }
                None => refined.push(journey),
            }
        }
        refined.sort_by(|a, b| {
            let time_order = if query.clockwise {
                a.arrival_dt.cmp(&b.arrival_dt)
            } else {
                b.departure_dt.cmp(&a.departure_dt)
            };
            time_order
                .then_with(|| a.transfers.cmp(&b.transfers))
                .then_with(|| a.vj_uris(data).cmp(&b.vj_uris(data)))
        });
        refined.dedup();
        refined
    }
}

/// Collects the patterns touched by the marked stops, each with its
/// earliest (clockwise) or latest (reverse) marked order, then clears the
/// marks for the scan phase.
fn mark_patterns(data: &Dataset, state: &mut SearchState, clockwise: bool) {
    state.active_mask.fill(false);
    for sp_idx in state.marked_stops.iter_ones() {
        for &jpp_idx in &data.stop_points[sp_idx].journey_pattern_point_idxs {
            let jpp = &data.journey_pattern_points[jpp_idx as usize];
            let jp_idx = jpp.journey_pattern_idx as usize;
            if !state.active_mask[jp_idx] {
                state.active_mask.set(jp_idx, true);
                state.active_order[jp_idx] = jpp.order;
            } else if clockwise {
                state.active_order[jp_idx] = state.active_order[jp_idx].min(jpp.order);
            } else {
                state.active_order[jp_idx] = state.active_order[jp_idx].max(jpp.order);
            }
        }
    }
    state.marked_stops.fill(false);
}
