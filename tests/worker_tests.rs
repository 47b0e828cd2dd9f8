mod common;

use common::{datetime, posix};
use std::sync::Arc;
use wayfarer::{
    model::{Dataset, builder::DatasetBuilder},
    realtime::{ScheduleRelationship, TripUpdate},
    shared::Coordinate,
    streets::{ModeSet, StreetNetwork},
    worker::{
        Api, DataManager, ErrorId, JourneysRequest, Payload, Request, Response, ScheduleApiRequest,
        Worker, WorkerConfig,
    },
};

fn transit_data() -> Dataset {
    let mut b = DatasetBuilder::new("20150301", "20150401");
    // Far enough apart that the bus beats walking.
    b.locate("spA", 2.0, 48.0).locate("spB", 2.03, 48.0);
    b.mode_co2("physical_mode:Bus", 132.0);
    b.vj("line:A", "vj:1").st("spA", "08:10:00").st("spB", "08:20:00");
    b.vj("line:A", "vj:2").st("spA", "12:10:00").st("spB", "12:20:00");
    b.build()
}

fn street_data() -> StreetNetwork {
    let mut sn = StreetNetwork::new();
    let way = sn.add_way("way:main", "main street", "street");
    let a = sn.add_vertex(Coordinate::new(2.0, 48.0));
    let b = sn.add_vertex(Coordinate::new(2.03, 48.0));
    sn.add_segment(a, b, way, ModeSet::ALL);
    sn.build();
    sn
}

fn worker_with_data() -> Worker {
    let manager = Arc::new(DataManager::new());
    manager.load(transit_data(), street_data());
    Worker::new(manager, WorkerConfig::default())
}

fn dispatch(worker: &mut Worker, api: Api) -> Response {
    worker.dispatch(&Request {
        request_id: "test".to_string(),
        api,
    })
}

#[test]
fn status_without_data_reports_unloaded() {
    let manager = Arc::new(DataManager::new());
    let mut worker = Worker::new(manager, WorkerConfig::default());
    let response = dispatch(&mut worker, Api::Status);
    assert_eq!(response.publication_date, -1);
    match response.payload {
        Some(Payload::Status(status)) => assert!(!status.loaded),
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn journeys_from_a_coordinate_get_a_street_access_leg() {
    let mut worker = worker_with_data();
    // 20150314 is inside the production period.
    let request = JourneysRequest::between("2.0002;48.0", "spB", posix("20150314", "08:00:00"));
    let response = dispatch(&mut worker, Api::Journeys(request));
    assert!(response.error.is_none(), "{:?}", response.error);
    let Some(Payload::Journeys(journeys)) = response.payload else {
        panic!("expected journeys");
    };
    let transit_journey = journeys
        .iter()
        .find(|j| j.sections.iter().any(|s| s.vehicle_journey.is_some()))
        .expect("a transit journey");
    assert_eq!(
        transit_journey
            .sections
            .iter()
            .find_map(|s| s.vehicle_journey.clone()),
        Some("vj:1".to_string())
    );
    assert_eq!(
        transit_journey.sections[0].kind,
        wayfarer::worker::request::SectionKind::StreetNetwork
    );
    assert!(transit_journey.co2_emission.is_some());
    // The walking direct path is also proposed.
    assert!(journeys.iter().any(|j| j.sections.len() == 1));
}

#[test]
fn unresolvable_endpoints_map_to_wire_errors() {
    let mut worker = worker_with_data();
    let when = posix("20150314", "08:00:00");

    let response = dispatch(&mut worker, Api::Journeys(JourneysRequest::between("nowhere", "spB", when)));
    assert_eq!(response.error.unwrap().id, ErrorId::NoOriginPoint);

    let response = dispatch(&mut worker, Api::Journeys(JourneysRequest::between("spA", "nowhere", when)));
    assert_eq!(response.error.unwrap().id, ErrorId::NoDestinationPoint);

    let response = dispatch(&mut worker, Api::Journeys(JourneysRequest::between("nowhere", "nowhere", when)));
    assert_eq!(response.error.unwrap().id, ErrorId::NoOriginNorDestination);
}

#[test]
fn datetime_outside_production_is_out_of_bounds() {
    let mut worker = worker_with_data();
    let response = dispatch(
        &mut worker,
        Api::Journeys(JourneysRequest::between("spA", "spB", posix("19700102", "08:00:00"))),
    );
    assert_eq!(response.error.unwrap().id, ErrorId::DateOutOfBounds);
}

#[test]
fn unknown_board_filter_is_a_bad_filter() {
    let mut worker = worker_with_data();
    let response = dispatch(
        &mut worker,
        Api::StopSchedules(ScheduleApiRequest::at("bogus", posix("20150314", "08:00:00"), 3600)),
    );
    assert_eq!(response.error.unwrap().id, ErrorId::BadFilter);
}

#[test]
fn stop_schedules_round_trip_through_the_worker() {
    let mut worker = worker_with_data();
    let response = dispatch(
        &mut worker,
        Api::StopSchedules(ScheduleApiRequest::at("spA", posix("20150314", "08:00:00"), 6 * 3600)),
    );
    assert!(response.error.is_none(), "{:?}", response.error);
    let Some(Payload::StopSchedules(boards)) = response.payload else {
        panic!("expected stop schedules");
    };
    assert_eq!(boards.schedules.len(), 1);
    assert_eq!(boards.schedules[0].date_times.len(), 2);
    assert_eq!(boards.schedules[0].date_times[0].time, "08:10:00");
}

#[test]
fn unimplemented_api_reports_invalid_request() {
    let mut worker = worker_with_data();
    let response = dispatch(&mut worker, Api::Autocomplete);
    assert_eq!(response.error.unwrap().id, ErrorId::InvalidProtobufRequest);
}

#[test]
fn dataset_swap_reinitializes_the_worker() {
    let manager = Arc::new(DataManager::new());
    manager.load(transit_data(), street_data());
    let mut worker = Worker::new(manager.clone(), WorkerConfig::default());

    let response = dispatch(&mut worker, Api::Status);
    let Some(Payload::Status(status)) = response.payload else {
        panic!("expected status");
    };
    assert_eq!(status.start_production_date, "20150301");

    // Publish a new production period; the next request must see it.
    let mut b = DatasetBuilder::new("20160301", "20160401");
    b.vj("line:A", "vj:1").st("spA", "08:10:00").st("spB", "08:20:00");
    manager.load(b.build(), street_data());

    let response = dispatch(&mut worker, Api::Status);
    let Some(Payload::Status(status)) = response.payload else {
        panic!("expected status");
    };
    assert_eq!(status.start_production_date, "20160301");
}

#[test]
fn disruption_active_journeys_skip_canceled_trips() {
    let manager = Arc::new(DataManager::new());
    manager.load(transit_data(), StreetNetwork::new());
    let mut worker = Worker::new(manager.clone(), WorkerConfig::default());

    manager
        .apply_trip_update(&TripUpdate {
            id: "disruption:1".to_string(),
            timestamp: datetime("20150314", "07:00:00"),
            trip_id: "vj:1".to_string(),
            start_date: "20150314".to_string(),
            schedule_relationship: ScheduleRelationship::Canceled,
            stop_time_updates: Vec::new(),
            message: None,
        })
        .unwrap();

    let when = posix("20150314", "08:00:00");
    let mut request = JourneysRequest::between("spA", "spB", when);
    request.disruption_active = true;
    let response = dispatch(&mut worker, Api::Journeys(request));
    // The canceled 08:10 is gone, the 12:10 answers instead.
    let Some(Payload::Journeys(journeys)) = response.payload else {
        panic!("expected journeys, got {:?}", response.error);
    };
    assert_eq!(
        journeys[0].sections.iter().find_map(|s| s.vehicle_journey.clone()),
        Some("vj:2".to_string())
    );
    // The journey does not touch the canceled trip, nothing to report.
    assert!(journeys[0].most_serious_disruption_effect.is_none());

    // The base schedule still sees the canceled trip.
    let base_request = JourneysRequest::between("spA", "spB", when);
    let response = dispatch(&mut worker, Api::Journeys(base_request));
    let Some(Payload::Journeys(journeys)) = response.payload else {
        panic!("expected journeys, got {:?}", response.error);
    };
    assert_eq!(
        journeys[0].sections.iter().find_map(|s| s.vehicle_journey.clone()),
        Some("vj:1".to_string())
    );
}

#[test]
fn delayed_journeys_carry_the_disruption_effect() {
    use wayfarer::realtime::{StopTimeEvent, TripStopTimeUpdate};

    let manager = Arc::new(DataManager::new());
    manager.load(transit_data(), StreetNetwork::new());
    let mut worker = Worker::new(manager.clone(), WorkerConfig::default());

    let event = |hms: &str| StopTimeEvent {
        has_time: true,
        time: posix("20150314", hms),
    };
    manager
        .apply_trip_update(&TripUpdate {
            id: "disruption:delay".to_string(),
            timestamp: datetime("20150314", "07:00:00"),
            trip_id: "vj:1".to_string(),
            start_date: "20150314".to_string(),
            schedule_relationship: ScheduleRelationship::Scheduled,
            stop_time_updates: vec![
                TripStopTimeUpdate {
                    stop_id: "spA".to_string(),
                    arrival: event("08:30:00"),
                    departure: event("08:30:00"),
                    message: None,
                },
                TripStopTimeUpdate {
                    stop_id: "spB".to_string(),
                    arrival: event("08:40:00"),
                    departure: event("08:40:00"),
                    message: None,
                },
            ],
            message: None,
        })
        .unwrap();

    let mut request = JourneysRequest::between("spA", "spB", posix("20150314", "08:00:00"));
    request.disruption_active = true;
    let response = dispatch(&mut worker, Api::Journeys(request));
    let Some(Payload::Journeys(journeys)) = response.payload else {
        panic!("expected journeys, got {:?}", response.error);
    };
    let vj_uri = journeys[0]
        .sections
        .iter()
        .find_map(|s| s.vehicle_journey.clone())
        .unwrap();
    assert!(vj_uri.contains("realtime"));
    assert_eq!(journeys[0].arrival - journeys[0].departure, 600);
    assert_eq!(
        journeys[0].most_serious_disruption_effect,
        Some(wayfarer::realtime::disruption::Effect::SignificantDelays)
    );
}
