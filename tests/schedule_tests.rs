mod common;

use common::dt;
use wayfarer::{
    model::{Dataset, builder::DatasetBuilder},
    schedules::{ResponseStatus, ScheduleRequest, Selector, stop_schedules},
    shared::Duration,
};

/// One route, two journeys: the short turn stops at spB while the full run
/// continues to spC, making spC the route destination.
fn partial_terminus_dataset() -> Dataset {
    let mut b = DatasetBuilder::new("20150301", "20150401");
    b.vj("line:A", "vj:short")
        .st("spA", "08:00:00")
        .st("spB", "09:00:00")
        .pick_up(false);
    b.vj("line:A", "vj:full")
        .st("spA", "08:30:00")
        .st("spB", "09:30:00")
        .st("spC", "10:30:00")
        .pick_up(false);
    b.build()
}

#[test]
fn short_turn_end_is_a_partial_terminus() {
    let data = partial_terminus_dataset();
    let request = ScheduleRequest::new(
        Selector::StopPoint("spB".to_string()),
        dt(0, "07:00:00"),
        Duration::from_hours(12),
    );
    let response = stop_schedules(&data, &request).unwrap();
    assert_eq!(response.schedules.len(), 1);
    let board = &response.schedules[0];
    // The full run still departs from spB, the short turn ends there.
    assert_eq!(board.date_times.len(), 1);
    assert_eq!(board.date_times[0].time.to_hms_string(), "09:30:00");
    assert_eq!(board.status, Some(ResponseStatus::PartialTerminus));
}

#[test]
fn route_destination_is_a_terminus() {
    let data = partial_terminus_dataset();
    let request = ScheduleRequest::new(
        Selector::StopPoint("spC".to_string()),
        dt(0, "07:00:00"),
        Duration::from_hours(12),
    );
    let response = stop_schedules(&data, &request).unwrap();
    assert_eq!(response.schedules.len(), 1);
    let board = &response.schedules[0];
    assert!(board.date_times.is_empty());
    assert_eq!(board.status, Some(ResponseStatus::Terminus));
}

#[test]
fn calendar_mode_wraps_around_the_requested_hour() {
    let mut b = DatasetBuilder::new("20150301", "20150401");
    b.calendar("calendar:weekdays", &[("20150302", "20150330")], "1111100");
    b.frequency_vj("line:F", "vj:freq", "00:10:00", "23:10:00", 3600)
        .st("spF1", "00:10:00")
        .st("spF2", "00:20:00");
    let data = b.build();

    let mut request = ScheduleRequest::new(
        Selector::StopPoint("spF1".to_string()),
        dt(2, "08:00:00"),
        Duration::from_hours(1),
    );
    request.calendar_uri = Some("calendar:weekdays".to_string());
    request.max_date_times = 100;
    let response = stop_schedules(&data, &request).unwrap();
    assert_eq!(response.schedules.len(), 1);
    let board = &response.schedules[0];

    assert_eq!(board.date_times.len(), 24);
    assert_eq!(board.date_times[0].time.to_hms_string(), "08:10:00");
    assert_eq!(board.date_times.last().unwrap().time.to_hms_string(), "07:10:00");
    assert!(board.date_times.iter().all(|entry| entry.date.is_none()));
}

#[test]
fn unknown_calendar_is_a_bad_filter() {
    let data = partial_terminus_dataset();
    let mut request = ScheduleRequest::new(
        Selector::StopPoint("spB".to_string()),
        dt(0, "07:00:00"),
        Duration::from_hours(12),
    );
    request.calendar_uri = Some("calendar:ghost".to_string());
    assert!(stop_schedules(&data, &request).is_err());
}

#[test]
fn day_without_service_reports_no_departure() {
    let mut b = DatasetBuilder::new("20150301", "20150401");
    b.vj("line:A", "vj:once")
        .st("spA", "08:00:00")
        .st("spB", "09:00:00")
        .valid_days("1");
    let data = b.build();

    let request = ScheduleRequest::new(
        Selector::StopPoint("spA".to_string()),
        dt(5, "07:00:00"),
        Duration::from_hours(2),
    );
    let response = stop_schedules(&data, &request).unwrap();
    assert_eq!(response.schedules.len(), 1);
    let board = &response.schedules[0];
    assert!(board.date_times.is_empty());
    assert_eq!(board.status, Some(ResponseStatus::NoDepartureThisDay));
}

#[test]
fn window_mode_sorts_by_datetime_and_sets_dates() {
    let mut b = DatasetBuilder::new("20150301", "20150401");
    b.vj("line:A", "vj:late").st("spA", "10:00:00").st("spB", "11:00:00");
    b.vj("line:A", "vj:early").st("spA", "08:00:00").st("spB", "09:00:00");
    let data = b.build();

    let request = ScheduleRequest::new(
        Selector::StopPoint("spA".to_string()),
        dt(3, "07:00:00"),
        Duration::from_hours(6),
    );
    let response = stop_schedules(&data, &request).unwrap();
    let board = &response.schedules[0];
    assert_eq!(board.date_times.len(), 2);
    assert_eq!(board.date_times[0].time.to_hms_string(), "08:00:00");
    assert_eq!(board.date_times[1].time.to_hms_string(), "10:00:00");
    assert!(board.date_times.iter().all(|entry| entry.date == Some(3)));
}

#[test]
fn line_filter_covers_every_stop_of_the_line() {
    let data = partial_terminus_dataset();
    let request = ScheduleRequest::new(
        Selector::Line("line:A".to_string()),
        dt(0, "07:00:00"),
        Duration::from_hours(12),
    );
    let response = stop_schedules(&data, &request).unwrap();
    // Three stops, one route.
    assert_eq!(response.total_result, 3);
}

#[test]
fn pagination_slices_the_boards() {
    let data = partial_terminus_dataset();
    let mut request = ScheduleRequest::new(
        Selector::Line("line:A".to_string()),
        dt(0, "07:00:00"),
        Duration::from_hours(12),
    );
    request.count = 2;
    request.start_page = 1;
    let response = stop_schedules(&data, &request).unwrap();
    assert_eq!(response.total_result, 3);
    assert_eq!(response.schedules.len(), 1);
}
