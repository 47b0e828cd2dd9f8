use crate::{
    model::{Dataset, StopTime, VehicleJourney, VjKind},
    realtime::disruption::{Disruption, Effect, InformedEntity},
};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, warn};

/// Applies a validated disruption: masks the impacted day on the base
/// journey's realtime pattern and, for a delay, materializes the realtime
/// variant with the amended stop times.
///
/// The base journey itself is never modified.
pub fn apply_disruption(data: &mut Dataset, disruption: Disruption, circulation_date: NaiveDate) {
    for impact in &disruption.impacts {
        for entity in &impact.informed_entities {
            let InformedEntity::MetaVehicleJourney(meta_vj_idx) = entity else {
                continue;
            };
            let Some(base_vj_idx) = data.meta_vjs[*meta_vj_idx as usize].base_vj_idx else {
                warn!(disruption = disruption.uri, "impacted trip has no base journey");
                continue;
            };

            data.vehicle_journeys[base_vj_idx as usize]
                .realtime_pattern
                .remove_date(circulation_date);

            if impact.severity.effect == Effect::NoService || impact.amended_stop_times.is_empty() {
                continue;
            }

            // Materialize the delayed variant on its own pattern; realtime
            // stop sequences may differ from the base one.
            let base_vj = &data.vehicle_journeys[base_vj_idx as usize];
            let route_idx =
                data.journey_patterns[base_vj.journey_pattern_idx as usize].route_idx;
            let meta_uri = data.meta_vjs[*meta_vj_idx as usize].uri.clone();
            let wheelchair_accessible = base_vj.wheelchair_accessible;
            let physical_mode_idx = base_vj.physical_mode_idx;

            let stop_seq: Vec<u32> = impact
                .amended_stop_times
                .iter()
                .map(|stu| stu.stop_time.stop_point_idx)
                .collect();
            let jp_uri: Arc<str> = Arc::from(
                format!("journey_pattern:realtime:{}:{}", disruption.uri, data.journey_patterns.len())
                    .as_str(),
            );
            let jp_idx = data.register_journey_pattern(route_idx, &stop_seq, jp_uri);

            let stop_times: Vec<StopTime> = impact
                .amended_stop_times
                .iter()
                .map(|stu| StopTime {
                    arrival_time: stu.stop_time.arrival_time,
                    departure_time: stu.stop_time.departure_time,
                    pick_up_allowed: stu.stop_time.pick_up_allowed,
                    drop_off_allowed: stu.stop_time.drop_off_allowed,
                    date_time_estimated: false,
                    odt: false,
                })
                .collect();
            let slice = data.push_stop_times(stop_times);

            let mut realtime_pattern = data.empty_validity_pattern();
            realtime_pattern.add_date(circulation_date);
            let uri: Arc<str> = Arc::from(
                format!(
                    "{}:realtime:{}:{}",
                    meta_uri,
                    circulation_date.format("%Y%m%d"),
                    disruption.uri
                )
                .as_str(),
            );
            let vj_idx = data.register_vehicle_journey(VehicleJourney {
                idx: 0,
                uri,
                journey_pattern_idx: jp_idx,
                meta_vj_idx: *meta_vj_idx,
                physical_mode_idx,
                stop_time_slice: slice,
                base_pattern: data.empty_validity_pattern(),
                realtime_pattern,
                wheelchair_accessible,
                kind: VjKind::Discrete,
                from_disruption: Some(Arc::from(disruption.uri.as_str())),
            });
            debug!(disruption = disruption.uri, vj_idx, "realtime vehicle journey registered");
        }
    }
    data.disruptions.insert(disruption);
}

/// Removes a disruption and rolls its effects back: realtime variants are
/// unregistered and the base journey circulates again on every masked day
/// the base schedule covers.
pub fn delete_disruption(data: &mut Dataset, id: &str) {
    let Some(disruption) = data.disruptions.remove(id) else {
        return;
    };
    debug!(disruption = id, "deleting disruption");
    for impact in &disruption.impacts {
        for entity in &impact.informed_entities {
            let InformedEntity::MetaVehicleJourney(meta_vj_idx) = entity else {
                continue;
            };
            let realtime_vjs: Vec<u32> = data.meta_vjs[*meta_vj_idx as usize]
                .realtime_vj_idxs
                .iter()
                .copied()
                .filter(|vj_idx| {
                    data.vehicle_journeys[*vj_idx as usize]
                        .from_disruption
                        .as_deref()
                        == Some(id)
                })
                .collect();
            for vj_idx in realtime_vjs {
                data.unregister_vehicle_journey(vj_idx);
            }

            let Some(base_vj_idx) = data.meta_vjs[*meta_vj_idx as usize].base_vj_idx else {
                continue;
            };
            for &(begin, end) in &impact.application_periods {
                let mut date = begin.date();
                while date <= end.date() {
                    let circulates = data.vehicle_journeys[base_vj_idx as usize]
                        .base_pattern
                        .check_date(date);
                    if circulates {
                        data.vehicle_journeys[base_vj_idx as usize]
                            .realtime_pattern
                            .add_date(date);
                    }
                    date = date + chrono::Days::new(1);
                }
            }
        }
    }
}
