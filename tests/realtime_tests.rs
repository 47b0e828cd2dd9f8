mod common;

use common::{datetime, dt, posix};
use wayfarer::{
    model::{Dataset, RtLevel, builder::DatasetBuilder},
    raptor::{Query, Raptor},
    realtime::{
        self, ScheduleRelationship, StopTimeEvent, TripStopTimeUpdate, TripUpdate,
        apply::delete_disruption,
    },
    shared::Duration,
    streets::StreetNetwork,
    worker::DataManager,
};

fn base_data() -> Dataset {
    let mut b = DatasetBuilder::new("20150301", "20150401");
    b.vj("line:A", "vj:1").st("stop1", "08:10:00").st("stop2", "08:20:00");
    b.build()
}

fn cancellation(id: &str, trip: &str, start_date: &str) -> TripUpdate {
    TripUpdate {
        id: id.to_string(),
        timestamp: datetime("20150314", "07:00:00"),
        trip_id: trip.to_string(),
        start_date: start_date.to_string(),
        schedule_relationship: ScheduleRelationship::Canceled,
        stop_time_updates: Vec::new(),
        message: None,
    }
}

fn event(date_str: &str, hms: &str) -> StopTimeEvent {
    StopTimeEvent {
        has_time: true,
        time: posix(date_str, hms),
    }
}

const MISSING: StopTimeEvent = StopTimeEvent {
    has_time: false,
    time: 0,
};

fn delay(id: &str, trip: &str, updates: Vec<TripStopTimeUpdate>) -> TripUpdate {
    TripUpdate {
        id: id.to_string(),
        timestamp: datetime("20150314", "07:00:00"),
        trip_id: trip.to_string(),
        start_date: "20150314".to_string(),
        schedule_relationship: ScheduleRelationship::Scheduled,
        stop_time_updates: updates,
        message: None,
    }
}

fn sp(data: &Dataset, uri: &str) -> u32 {
    data.stop_point_by_uri(uri).unwrap().idx
}

#[test]
fn cancellation_masks_the_realtime_day_only() {
    let mut data = base_data();
    realtime::handle_trip_update(&mut data, &cancellation("disruption:1", "vj:1", "20150314"))
        .unwrap();

    let vj = data.vehicle_journey_by_uri("vj:1").unwrap();
    // March 14th is day 13 of the production period.
    assert!(vj.circulates(RtLevel::Base, 13));
    assert!(!vj.circulates(RtLevel::RealTime, 13));
    assert!(vj.circulates(RtLevel::RealTime, 14));

    let disruption = data.disruptions.get("disruption:1").unwrap();
    assert_eq!(disruption.impacts[0].severity.wording, "trip canceled");

    let mut raptor = Raptor::new(&data);
    let mut query = Query::new(
        vec![(sp(&data, "stop1"), Duration::ZERO)],
        vec![(sp(&data, "stop2"), Duration::ZERO)],
        dt(13, "08:00:00"),
    );
    query.rt_level = RtLevel::RealTime;
    assert!(raptor.compute(&data, &query).is_empty());

    query.rt_level = RtLevel::Base;
    assert!(!raptor.compute(&data, &query).is_empty());

    let mut next_day = Query::new(
        vec![(sp(&data, "stop1"), Duration::ZERO)],
        vec![(sp(&data, "stop2"), Duration::ZERO)],
        dt(14, "08:00:00"),
    );
    next_day.rt_level = RtLevel::RealTime;
    assert!(!raptor.compute(&data, &next_day).is_empty());
}

#[test]
fn delay_with_missing_arrival_repairs_the_stop_time() {
    let mut data = base_data();
    let update = delay(
        "disruption:delay",
        "vj:1",
        vec![
            TripStopTimeUpdate {
                stop_id: "stop1".to_string(),
                arrival: event("20150314", "08:30:00"),
                departure: event("20150314", "08:30:00"),
                message: None,
            },
            TripStopTimeUpdate {
                stop_id: "stop2".to_string(),
                arrival: MISSING,
                departure: event("20150314", "08:45:00"),
                message: None,
            },
        ],
    );
    realtime::handle_trip_update(&mut data, &update).unwrap();

    let meta = data.meta_vj_by_uri("vj:1").unwrap();
    assert_eq!(meta.realtime_vj_idxs.len(), 1);
    let rt_vj = &data.vehicle_journeys[meta.realtime_vj_idxs[0] as usize];
    assert!(rt_vj.circulates(RtLevel::RealTime, 13));
    assert!(!rt_vj.circulates(RtLevel::Base, 13));

    let stop_times = data.stop_times_of(rt_vj.idx);
    assert_eq!(stop_times.len(), 2);
    // The missing arrival was filled from the departure.
    assert_eq!(stop_times[1].arrival_time, stop_times[1].departure_time);
    assert_eq!(stop_times[1].arrival_time.to_hms_string(), "08:45:00");
    assert!(!stop_times[1].drop_off_allowed);
    assert!(stop_times[1].pick_up_allowed);
    assert!(stop_times[0].drop_off_allowed);

    let disruption = data.disruptions.get("disruption:delay").unwrap();
    assert_eq!(disruption.impacts[0].severity.wording, "trip delayed");

    // The base journey no longer circulates at the realtime level that day.
    let base_vj = data.corresponding_base(rt_vj.idx).unwrap();
    assert!(!base_vj.circulates(RtLevel::RealTime, 13));
}

#[test]
fn backwards_stop_times_are_rejected_whole() {
    let mut data = base_data();
    let update = delay(
        "disruption:bad",
        "vj:1",
        vec![
            TripStopTimeUpdate {
                stop_id: "stop1".to_string(),
                arrival: event("20150314", "09:00:00"),
                departure: event("20150314", "09:00:00"),
                message: None,
            },
            TripStopTimeUpdate {
                stop_id: "stop2".to_string(),
                arrival: event("20150314", "08:30:00"),
                departure: event("20150314", "08:30:00"),
                message: None,
            },
        ],
    );
    assert!(realtime::handle_trip_update(&mut data, &update).is_err());

    // The previous state is preserved.
    let vj = data.vehicle_journey_by_uri("vj:1").unwrap();
    assert!(vj.circulates(RtLevel::RealTime, 13));
    assert!(data.disruptions.get("disruption:bad").is_none());
}

#[test]
fn unknown_stop_rejects_the_whole_disruption() {
    let mut data = base_data();
    let update = delay(
        "disruption:unknown",
        "vj:1",
        vec![TripStopTimeUpdate {
            stop_id: "nowhere".to_string(),
            arrival: event("20150314", "08:30:00"),
            departure: event("20150314", "08:30:00"),
            message: None,
        }],
    );
    assert!(matches!(
        realtime::handle_trip_update(&mut data, &update),
        Err(realtime::Error::UnknownStopPoint(_))
    ));
    assert!(data.disruptions.is_empty());
}

#[test]
fn unknown_trip_is_an_error() {
    let mut data = base_data();
    assert!(matches!(
        realtime::handle_trip_update(&mut data, &cancellation("d", "vj:ghost", "20150314")),
        Err(realtime::Error::UnknownTrip(_))
    ));
}

#[test]
fn stop_time_before_the_impacted_day_is_unhandled() {
    let mut data = base_data();
    let update = delay(
        "disruption:early",
        "vj:1",
        vec![TripStopTimeUpdate {
            stop_id: "stop1".to_string(),
            arrival: event("20150313", "23:00:00"),
            departure: event("20150313", "23:00:00"),
            message: None,
        }],
    );
    assert!(matches!(
        realtime::handle_trip_update(&mut data, &update),
        Err(realtime::Error::Unhandled)
    ));
}

#[test]
fn deleting_a_disruption_restores_the_base_days() {
    let mut data = base_data();
    realtime::handle_trip_update(&mut data, &cancellation("disruption:1", "vj:1", "20150314"))
        .unwrap();
    assert!(!data.vehicle_journey_by_uri("vj:1").unwrap().circulates(RtLevel::RealTime, 13));

    delete_disruption(&mut data, "disruption:1");
    assert!(data.vehicle_journey_by_uri("vj:1").unwrap().circulates(RtLevel::RealTime, 13));
    assert!(data.disruptions.is_empty());
}

#[test]
fn replacing_a_disruption_supersedes_the_previous_one() {
    let mut data = base_data();
    let first = delay(
        "disruption:1",
        "vj:1",
        vec![TripStopTimeUpdate {
            stop_id: "stop1".to_string(),
            arrival: event("20150314", "08:30:00"),
            departure: event("20150314", "08:30:00"),
            message: None,
        }],
    );
    realtime::handle_trip_update(&mut data, &first).unwrap();
    assert_eq!(data.meta_vj_by_uri("vj:1").unwrap().realtime_vj_idxs.len(), 1);

    // Same key, new content: one realtime variant, not two.
    realtime::handle_trip_update(&mut data, &cancellation("disruption:1", "vj:1", "20150314"))
        .unwrap();
    assert!(data.meta_vj_by_uri("vj:1").unwrap().realtime_vj_idxs.is_empty());
    assert_eq!(data.disruptions.len(), 1);
    assert_eq!(
        data.disruptions.get("disruption:1").unwrap().impacts[0].severity.effect,
        wayfarer::realtime::disruption::Effect::NoService
    );
}

#[test]
fn readers_keep_their_snapshot_across_realtime_application() {
    let manager = DataManager::new();
    manager.load(base_data(), StreetNetwork::new());
    let before = manager.current();

    manager
        .apply_trip_update(&cancellation("disruption:1", "vj:1", "20150314"))
        .unwrap();
    let after = manager.current();

    // The in-flight reader still sees the journey circulating.
    let vj_before = before.transit.vehicle_journey_by_uri("vj:1").unwrap();
    assert!(vj_before.circulates(RtLevel::RealTime, 13));
    let vj_after = after.transit.vehicle_journey_by_uri("vj:1").unwrap();
    assert!(!vj_after.circulates(RtLevel::RealTime, 13));
    assert!(after.identifier > before.identifier);
}
