mod common;

use wayfarer::{
    shared::{Coordinate, Duration},
    streets::{Mode, ModeSet, ProximityList, StreetNetwork, StreetWorker},
};

/// A 3x3 street grid, roughly 740 m between neighbors.
fn grid_network() -> StreetNetwork {
    let mut sn = StreetNetwork::new();
    let way = sn.add_way("way:grid", "grid", "street");
    let mut vertices = Vec::new();
    for y in 0..3 {
        for x in 0..3 {
            vertices.push(sn.add_vertex(Coordinate::new(
                2.0 + 0.01 * f64::from(x),
                48.0 + 0.01 * f64::from(y),
            )));
        }
    }
    for y in 0..3 {
        for x in 0..3 {
            let at = (y * 3 + x) as usize;
            if x < 2 {
                sn.add_segment(vertices[at], vertices[at + 1], way, ModeSet::ALL);
            }
            if y < 2 {
                sn.add_segment(vertices[at], vertices[at + 3], way, ModeSet::ALL);
            }
        }
    }
    sn.build();
    sn
}

fn walk_duration(sn: &StreetNetwork, worker: &mut StreetWorker, from: (f64, f64), to: (f64, f64)) -> u32 {
    worker
        .direct_path(
            sn,
            &Coordinate::new(from.0, from.1),
            &Coordinate::new(to.0, to.1),
            Mode::Walking,
            1.0,
        )
        .unwrap()
        .duration
        .as_seconds()
}

#[test]
fn street_paths_respect_the_triangle_inequality() {
    let sn = grid_network();
    let mut worker = StreetWorker::new(sn.graph.node_count());
    let a = (2.0, 48.0);
    let b = (2.01, 48.01);
    let c = (2.02, 48.02);
    let ab = walk_duration(&sn, &mut worker, a, b);
    let bc = walk_duration(&sn, &mut worker, b, c);
    let ac = walk_duration(&sn, &mut worker, a, c);
    // Up to projection rounding.
    assert!(ac <= ab + bc + 2);
}

#[test]
fn faster_mode_means_shorter_durations() {
    let sn = grid_network();
    let mut worker = StreetWorker::new(sn.graph.node_count());
    let from = Coordinate::new(2.0, 48.0);
    let to = Coordinate::new(2.02, 48.02);
    let on_foot = worker.direct_path(&sn, &from, &to, Mode::Walking, 1.0).unwrap();
    let by_bike = worker.direct_path(&sn, &from, &to, Mode::Bike, 1.0).unwrap();
    assert!(by_bike.duration < on_foot.duration);

    // The speed factor scales the same way.
    let hurried = worker.direct_path(&sn, &from, &to, Mode::Walking, 2.0).unwrap();
    assert!(hurried.duration < on_foot.duration);
}

#[test]
fn nearest_stop_points_is_bounded_by_duration() {
    let sn = grid_network();
    let mut worker = StreetWorker::new(sn.graph.node_count());

    let mut stops = ProximityList::new();
    // One stop on the origin corner, one on the opposite corner.
    stops.add(Coordinate::new(2.0, 48.0), 0u32);
    stops.add(Coordinate::new(2.02, 48.02), 1u32);

    let origin = Coordinate::new(2.0005, 48.0);
    let near_only = worker
        .nearest_stop_points(&sn, &origin, Mode::Walking, 1.0, Duration::from_minutes(5), &stops)
        .unwrap();
    assert!(near_only.iter().any(|(sp, _)| *sp == 0));
    assert!(!near_only.iter().any(|(sp, _)| *sp == 1));

    let both = worker
        .nearest_stop_points(&sn, &origin, Mode::Walking, 1.0, Duration::from_hours(1), &stops)
        .unwrap();
    assert!(both.iter().any(|(sp, _)| *sp == 1));
}

#[test]
fn house_number_interpolation_preserves_order() {
    let mut sn = StreetNetwork::new();
    let way_idx = sn.add_way("way:1", "rue ordonnée", "street");
    let a = sn.add_vertex(Coordinate::new(2.0, 48.0));
    let b = sn.add_vertex(Coordinate::new(2.02, 48.0));
    sn.add_segment(a, b, way_idx, ModeSet::ALL);
    sn.build();

    {
        let way = &mut sn.ways[way_idx as usize];
        way.add_house_number(wayfarer::streets::HouseNumber {
            number: 1,
            coord: Coordinate::new(2.0, 48.0),
        });
        way.add_house_number(wayfarer::streets::HouseNumber {
            number: 21,
            coord: Coordinate::new(2.02, 48.0),
        });
    }
    let way = &sn.ways[way_idx as usize];
    let mut last_lon = f64::MIN;
    for number in [1, 3, 5, 9, 15, 21] {
        let coord = way.nearest_coord(number, &sn.graph);
        assert!(coord.lon >= last_lon);
        last_lon = coord.lon;
    }
}

#[test]
fn path_items_group_segments_by_way() {
    let mut sn = StreetNetwork::new();
    let first = sn.add_way("way:first", "first street", "street");
    let second = sn.add_way("way:second", "second street", "street");
    let a = sn.add_vertex(Coordinate::new(2.0, 48.0));
    let b = sn.add_vertex(Coordinate::new(2.01, 48.0));
    let c = sn.add_vertex(Coordinate::new(2.02, 48.0));
    sn.add_segment(a, b, first, ModeSet::ALL);
    sn.add_segment(b, c, second, ModeSet::ALL);
    sn.build();

    let mut worker = StreetWorker::new(sn.graph.node_count());
    let path = worker
        .direct_path(
            &sn,
            &Coordinate::new(2.0, 48.0),
            &Coordinate::new(2.02, 48.0),
            Mode::Walking,
            1.0,
        )
        .unwrap();
    assert_eq!(path.path_items.len(), 2);
    assert_ne!(path.path_items[0].way_idx, path.path_items[1].way_idx);
}
