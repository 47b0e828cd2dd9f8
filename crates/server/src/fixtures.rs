//! A small built-in network for running the server without an installed
//! dataset. A real deployment replaces this with the artifact produced by
//! the offline import pipeline.

use wayfarer::{
    model::{Dataset, builder::DatasetBuilder},
    shared::Coordinate,
    streets::{ModeSet, StreetNetwork},
};

pub fn demo_dataset() -> (Dataset, StreetNetwork) {
    let mut b = DatasetBuilder::new("20250101", "20251231");
    b.locate("stop:center", 2.000, 48.000)
        .locate("stop:north", 2.000, 48.020)
        .locate("stop:east", 2.030, 48.000)
        .mode_co2("physical_mode:Bus", 132.0);
    b.vj("line:1", "trip:1-morning")
        .st("stop:center", "08:00:00")
        .st("stop:north", "08:15:00");
    b.vj("line:1", "trip:1-noon")
        .st("stop:center", "12:00:00")
        .st("stop:north", "12:15:00");
    b.vj("line:2", "trip:2-morning")
        .st("stop:north", "08:30:00")
        .st("stop:east", "08:50:00");
    b.transfer("stop:north", "stop:north", 60);
    let transit = b.build();

    let mut streets = StreetNetwork::new();
    let way = streets.add_way("way:main", "Main street", "street");
    let a = streets.add_vertex(Coordinate::new(2.000, 48.000));
    let north = streets.add_vertex(Coordinate::new(2.000, 48.020));
    let east = streets.add_vertex(Coordinate::new(2.030, 48.000));
    streets.add_segment(a, north, way, ModeSet::ALL);
    streets.add_segment(a, east, way, ModeSet::ALL);
    streets.build();

    (transit, streets)
}
