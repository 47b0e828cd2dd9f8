mod common;

use common::dt;
use wayfarer::{
    model::{Dataset, builder::DatasetBuilder},
    raptor::{Query, Raptor, Section},
    shared::Duration,
};

fn sp(data: &Dataset, uri: &str) -> u32 {
    data.stop_point_by_uri(uri).unwrap().idx
}

/// Three journeys on three lines; only the second is wheelchair accessible.
fn accessibility_dataset() -> Dataset {
    let mut b = DatasetBuilder::new("20150301", "20150401");
    b.vj("line:1", "vj:l1").st("spA", "08:00:00").st("spB", "09:00:00");
    b.vj("line:2", "vj:l2")
        .st("spA", "09:00:00")
        .st("spB", "10:00:00")
        .wheelchair(true);
    b.vj("line:3", "vj:l3").st("spA", "10:00:00").st("spC", "11:00:00");
    b.build()
}

#[test]
fn earliest_journey_without_accessibility() {
    let data = accessibility_dataset();
    let mut raptor = Raptor::new(&data);
    let query = Query::new(
        vec![(sp(&data, "spA"), Duration::ZERO)],
        vec![(sp(&data, "spB"), Duration::ZERO)],
        dt(0, "08:00:00"),
    );
    let journeys = raptor.compute(&data, &query);
    assert!(!journeys.is_empty());
    assert_eq!(journeys[0].arrival_dt, dt(0, "09:00:00"));
    assert_eq!(journeys[0].departure_dt, dt(0, "08:00:00"));
}

#[test]
fn wheelchair_skips_inaccessible_journey() {
    let data = accessibility_dataset();
    let mut raptor = Raptor::new(&data);
    let mut query = Query::new(
        vec![(sp(&data, "spA"), Duration::ZERO)],
        vec![(sp(&data, "spB"), Duration::ZERO)],
        dt(0, "08:00:00"),
    );
    query.wheelchair = true;
    let journeys = raptor.compute(&data, &query);
    assert!(!journeys.is_empty());
    assert_eq!(journeys[0].arrival_dt, dt(0, "10:00:00"));
}

#[test]
fn wheelchair_with_no_accessible_journey_has_no_solution() {
    let data = accessibility_dataset();
    let mut raptor = Raptor::new(&data);
    let mut query = Query::new(
        vec![(sp(&data, "spA"), Duration::ZERO)],
        vec![(sp(&data, "spC"), Duration::ZERO)],
        dt(0, "08:00:00"),
    );
    query.wheelchair = true;
    assert!(raptor.compute(&data, &query).is_empty());
}

/// A forced connection: line X reaches spB, line Y leaves from it.
fn connection_dataset() -> Dataset {
    let mut b = DatasetBuilder::new("20150301", "20150401");
    b.vj("line:X", "vj:x").st("spA", "08:00:00").st("spB", "09:00:00");
    b.vj("line:Y", "vj:y").st("spB", "09:30:00").st("spC", "10:00:00");
    b.build()
}

#[test]
fn transfer_needs_a_round() {
    let data = connection_dataset();
    let mut raptor = Raptor::new(&data);
    let mut query = Query::new(
        vec![(sp(&data, "spA"), Duration::ZERO)],
        vec![(sp(&data, "spC"), Duration::ZERO)],
        dt(0, "08:00:00"),
    );
    query.max_transfers = 0;
    assert!(raptor.compute(&data, &query).is_empty());

    query.max_transfers = 1;
    let journeys = raptor.compute(&data, &query);
    assert!(!journeys.is_empty());
    let journey = &journeys[0];
    assert_eq!(journey.arrival_dt, dt(0, "10:00:00"));
    assert_eq!(journey.transfers, 1);
    assert_eq!(
        journey.sections.iter().filter(|s| s.is_public_transport()).count(),
        2
    );
}

#[test]
fn more_transfers_never_worsen_the_best_arrival() {
    let data = connection_dataset();
    let mut raptor = Raptor::new(&data);
    let mut best = None;
    for max_transfers in 1..5 {
        let mut query = Query::new(
            vec![(sp(&data, "spA"), Duration::ZERO)],
            vec![(sp(&data, "spC"), Duration::ZERO)],
            dt(0, "08:00:00"),
        );
        query.max_transfers = max_transfers;
        let journeys = raptor.compute(&data, &query);
        let arrival = journeys.iter().map(|j| j.arrival_dt).min().unwrap();
        if let Some(previous) = best {
            assert!(arrival <= previous);
        }
        best = Some(arrival);
    }
}

#[test]
fn reverse_search_reproduces_the_journey() {
    let data = connection_dataset();
    let mut raptor = Raptor::new(&data);
    let mut query = Query::new(
        vec![(sp(&data, "spA"), Duration::ZERO)],
        vec![(sp(&data, "spC"), Duration::ZERO)],
        dt(0, "10:00:00"),
    );
    query.clockwise = false;
    let journeys = raptor.compute(&data, &query);
    assert!(!journeys.is_empty());
    let journey = &journeys[0];
    assert_eq!(journey.departure_dt, dt(0, "08:00:00"));
    assert_eq!(journey.arrival_dt, dt(0, "10:00:00"));
    // Sections come out in travel order regardless of search direction.
    match (&journey.sections[0], journey.sections.last().unwrap()) {
        (
            Section::PublicTransport { from_sp, .. },
            Section::PublicTransport { to_sp, .. },
        ) => {
            assert_eq!(*from_sp, sp(&data, "spA"));
            assert_eq!(*to_sp, sp(&data, "spC"));
        }
        other => panic!("unexpected sections: {other:?}"),
    }
}

#[test]
fn forbidden_line_removes_solutions() {
    let data = connection_dataset();
    let mut raptor = Raptor::new(&data);
    let mut query = Query::new(
        vec![(sp(&data, "spA"), Duration::ZERO)],
        vec![(sp(&data, "spC"), Duration::ZERO)],
        dt(0, "08:00:00"),
    );
    query.forbidden_uris = vec!["line:Y".to_string()];
    assert!(raptor.compute(&data, &query).is_empty());
}

#[test]
fn explicit_transfer_pays_duration_and_penalty() {
    let mut b = DatasetBuilder::new("20150301", "20150401");
    b.vj("line:X", "vj:x").st("spA", "08:00:00").st("spB", "09:00:00");
    b.vj("line:Y", "vj:y").st("spD", "09:10:00").st("spC", "10:00:00");
    b.transfer("spB", "spD", 120);
    let data = b.build();
    let mut raptor = Raptor::new(&data);

    let mut query = Query::new(
        vec![(sp(&data, "spA"), Duration::ZERO)],
        vec![(sp(&data, "spC"), Duration::ZERO)],
        dt(0, "08:00:00"),
    );
    // 09:00 + 120 s + 120 s penalty = 09:04, in time for the 09:10.
    query.transfer_penalty = Duration::from_seconds(120);
    let journeys = raptor.compute(&data, &query);
    assert!(!journeys.is_empty());
    assert_eq!(journeys[0].arrival_dt, dt(0, "10:00:00"));
    assert!(journeys[0].sections.iter().any(|s| matches!(s, Section::Transfer { .. })));

    // A penalty too large to make the connection.
    query.transfer_penalty = Duration::from_minutes(20);
    assert!(raptor.compute(&data, &query).is_empty());
}

#[test]
fn direct_path_prunes_worse_solutions() {
    let data = connection_dataset();
    let mut raptor = Raptor::new(&data);
    let mut query = Query::new(
        vec![(sp(&data, "spA"), Duration::ZERO)],
        vec![(sp(&data, "spC"), Duration::ZERO)],
        dt(0, "08:00:00"),
    );
    // A 90-minute street path beats the 2-hour transit journey.
    query.direct_path_duration = Some(Duration::from_minutes(90));
    assert!(raptor.compute(&data, &query).is_empty());
}

#[test]
fn isochrone_returns_per_stop_labels() {
    let data = connection_dataset();
    let mut raptor = Raptor::new(&data);
    let query = Query::new(
        vec![(sp(&data, "spA"), Duration::ZERO)],
        Vec::new(),
        dt(0, "08:00:00"),
    );
    let labels = raptor.isochrone(&data, &query);
    let b_label = labels.iter().find(|(idx, _)| *idx == sp(&data, "spB"));
    let c_label = labels.iter().find(|(idx, _)| *idx == sp(&data, "spC"));
    assert_eq!(b_label.unwrap().1, dt(0, "09:00:00"));
    assert_eq!(c_label.unwrap().1, dt(0, "10:00:00"));
}

#[test]
fn overnight_roll_over_is_found_on_the_next_day() {
    let mut b = DatasetBuilder::new("20150301", "20150401");
    // Departs 23:50, arrives 00:30 the next day, expressed past 86 400.
    b.vj("line:N", "vj:night").st("spA", "23:50:00").st("spB", "24:30:00");
    let data = b.build();
    let mut raptor = Raptor::new(&data);
    let query = Query::new(
        vec![(sp(&data, "spA"), Duration::ZERO)],
        vec![(sp(&data, "spB"), Duration::ZERO)],
        dt(0, "23:00:00"),
    );
    let journeys = raptor.compute(&data, &query);
    assert!(!journeys.is_empty());
    assert_eq!(journeys[0].arrival_dt, dt(1, "00:30:00"));
}
