pub mod admin;
pub mod path;
pub mod proximity;

pub use admin::{Admin, AdminIndex};
pub use path::{PathItem, ProjectionData, StreetPath, StreetWorker};
pub use proximity::{NotFound, ProximityList};

use crate::shared::{Coordinate, Distance};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum Error {
    #[error("no street network candidate found")]
    NotFound,
    #[error("unknown way: {0}")]
    UnknownWay(String),
}

impl From<NotFound> for Error {
    fn from(_: NotFound) -> Self {
        Error::NotFound
    }
}

/// How a traveler moves on the street network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Walking,
    Bike,
    Car,
    Bss,
}

impl Mode {
    /// Base speed in meters per second, scaled by the request's speed factor.
    pub const fn default_speed(&self) -> f64 {
        match self {
            Mode::Walking => 1.12,
            Mode::Bike | Mode::Bss => 4.1,
            Mode::Car => 11.11,
        }
    }

    pub fn parse(s: &str) -> Option<Mode> {
        match s {
            "walking" => Some(Mode::Walking),
            "bike" => Some(Mode::Bike),
            "car" => Some(Mode::Car),
            "bss" => Some(Mode::Bss),
            _ => None,
        }
    }
}

/// Which kinds of traffic an edge admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeSet(u8);

impl ModeSet {
    pub const WALK: ModeSet = ModeSet(1);
    pub const BIKE: ModeSet = ModeSet(2);
    pub const CAR: ModeSet = ModeSet(4);
    pub const BSS_TAKE: ModeSet = ModeSet(8);
    pub const BSS_PUTBACK: ModeSet = ModeSet(16);
    pub const ALL: ModeSet = ModeSet(1 | 2 | 4 | 8 | 16);

    pub const fn union(self, other: ModeSet) -> ModeSet {
        ModeSet(self.0 | other.0)
    }

    const fn intersects(self, other: ModeSet) -> bool {
        self.0 & other.0 != 0
    }

    /// A shared-bike leg rides ordinary bike and walk edges plus the
    /// station take/putback connectors.
    pub const fn allows(self, mode: Mode) -> bool {
        match mode {
            Mode::Walking => self.intersects(ModeSet::WALK),
            Mode::Bike => self.intersects(ModeSet::BIKE),
            Mode::Car => self.intersects(ModeSet::CAR),
            Mode::Bss => self.intersects(ModeSet(1 | 2 | 8 | 16)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreetVertex {
    pub coord: Coordinate,
}

#[derive(Debug, Clone, Copy)]
pub struct StreetEdge {
    pub way_idx: u32,
    pub length: Distance,
    pub modes: ModeSet,
}

/// A house number anchored on a way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HouseNumber {
    pub number: i32,
    pub coord: Coordinate,
}

/// A named street owning an ordered list of graph edges and the house
/// numbers along it, split by parity.
#[derive(Debug, Clone, Default)]
pub struct Way {
    pub idx: u32,
    pub uri: Arc<str>,
    pub name: Arc<str>,
    pub way_type: Arc<str>,
    pub admin_idxs: Vec<u32>,
    /// Vertex pairs of the way's edges, in street order.
    pub edges: Vec<(NodeIndex, NodeIndex)>,
    /// Sorted ascending.
    pub house_numbers_even: Vec<HouseNumber>,
    /// Sorted ascending.
    pub house_numbers_odd: Vec<HouseNumber>,
}

impl Way {
    /// Files a house number on the parity list, keeping the list sorted.
    pub fn add_house_number(&mut self, house_number: HouseNumber) {
        let list = if house_number.number % 2 == 0 {
            &mut self.house_numbers_even
        } else {
            &mut self.house_numbers_odd
        };
        list.push(house_number);
        list.sort_by_key(|hn| hn.number);
    }

    /// Coordinates of `number` on this way.
    ///
    /// Falls back on the way's barycenter when the parity list is empty or
    /// the number is not positive; clamps to the first or last number when
    /// out of range; interpolates between the enclosing neighbors otherwise.
    pub fn nearest_coord(&self, number: i32, graph: &DiGraph<StreetVertex, StreetEdge>) -> Coordinate {
        let list = if number % 2 == 0 {
            &self.house_numbers_even
        } else {
            &self.house_numbers_odd
        };
        if list.is_empty() || number <= 0 {
            return self.barycenter(graph);
        }
        let last = list.last().unwrap();
        if last.number <= number {
            return last.coord;
        }
        let first = list.first().unwrap();
        if first.number >= number {
            return first.coord;
        }
        if let Some(exact) = list.iter().find(|hn| hn.number == number) {
            return exact.coord;
        }
        self.extrapolate(list, number)
    }

    /// Linear interpolation between the enclosing lower and upper neighbors
    /// of `number` on the same parity list.
    fn extrapolate(&self, list: &[HouseNumber], number: i32) -> Coordinate {
        let mut lower = list[0];
        let mut upper = list[0];
        for hn in list {
            if hn.number < number {
                lower = *hn;
            } else {
                upper = *hn;
                break;
            }
        }
        let diff_house_number = upper.number - lower.number;
        let diff_number = number - lower.number;
        let x_step = (upper.coord.lon - lower.coord.lon) / f64::from(diff_house_number);
        let y_step = (upper.coord.lat - lower.coord.lat) / f64::from(diff_house_number);
        Coordinate::new(
            lower.coord.lon + x_step * f64::from(diff_number),
            lower.coord.lat + y_step * f64::from(diff_number),
        )
    }

    /// Centroid of the way's polyline, skipping an edge that merely retraces
    /// the previous one.
    pub fn barycenter(&self, graph: &DiGraph<StreetVertex, StreetEdge>) -> Coordinate {
        let mut line: Vec<Coordinate> = Vec::new();
        let mut previous: Option<(NodeIndex, NodeIndex)> = None;
        for &(source, target) in &self.edges {
            let is_reverse_of_previous =
                previous.map(|(s, t)| source == t && target == s).unwrap_or(false);
            if !is_reverse_of_previous {
                line.push(graph[source].coord);
                line.push(graph[target].coord);
            }
            previous = Some((source, target));
        }
        if line.is_empty() {
            warn!("could not compute the barycenter of way {}", self.name);
            return Coordinate::default();
        }
        line.into_iter().sum()
    }

    /// The stored house number closest to `coord`, or -1 when the way has
    /// no number at all.
    pub fn nearest_number(&self, coord: &Coordinate) -> i32 {
        let mut nearest = -1;
        let mut best = Distance::MAX;
        for hn in self.house_numbers_odd.iter().chain(&self.house_numbers_even) {
            let distance = coord.distance_to(&hn.coord);
            if distance < best {
                nearest = hn.number;
                best = distance;
            }
        }
        nearest
    }
}

/// A point of interest anchored on the street network.
#[derive(Debug, Clone)]
pub struct Poi {
    pub idx: u32,
    pub uri: Arc<str>,
    pub name: Arc<str>,
    pub coord: Coordinate,
}

/// The street half of the dataset: a weighted planar graph, the ways over
/// it, admin regions and the spatial indexes a query needs.
#[derive(Debug, Clone, Default)]
pub struct StreetNetwork {
    pub graph: DiGraph<StreetVertex, StreetEdge>,
    pub ways: Vec<Way>,
    pub admins: Vec<Admin>,
    pub pois: Vec<Poi>,
    admin_index: AdminIndex,
    pub(crate) proximity: ProximityList<NodeIndex>,
    way_lookup: HashMap<Arc<str>, u32>,
    admin_lookup: HashMap<Arc<str>, u32>,
    poi_lookup: HashMap<Arc<str>, u32>,
    /// Nearest-edge projection per stop point, aligned with the transit
    /// dataset's stop point arena.
    pub projected_stop_points: Vec<ProjectionData>,
}

impl StreetNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, coord: Coordinate) -> NodeIndex {
        self.graph.add_node(StreetVertex { coord })
    }

    /// Adds a directed edge and registers it on its way.
    pub fn add_edge(
        &mut self,
        source: NodeIndex,
        target: NodeIndex,
        way_idx: u32,
        modes: ModeSet,
    ) -> EdgeIndex {
        let length = self.graph[source].coord.distance_to(&self.graph[target].coord);
        self.ways[way_idx as usize].edges.push((source, target));
        self.graph.add_edge(source, target, StreetEdge { way_idx, length, modes })
    }

    /// Adds both directions of a street segment.
    pub fn add_segment(&mut self, a: NodeIndex, b: NodeIndex, way_idx: u32, modes: ModeSet) {
        self.add_edge(a, b, way_idx, modes);
        self.add_edge(b, a, way_idx, modes);
    }

    pub fn add_way(&mut self, uri: &str, name: &str, way_type: &str) -> u32 {
        let idx = self.ways.len() as u32;
        self.ways.push(Way {
            idx,
            uri: Arc::from(uri),
            name: Arc::from(name),
            way_type: Arc::from(way_type),
            ..Default::default()
        });
        idx
    }

    pub fn add_admin(&mut self, admin: Admin) -> u32 {
        let idx = self.admins.len() as u32;
        self.admins.push(admin);
        self.admins[idx as usize].idx = idx;
        idx
    }

    pub fn add_poi(&mut self, uri: &str, name: &str, coord: Coordinate) -> u32 {
        let idx = self.pois.len() as u32;
        self.pois.push(Poi {
            idx,
            uri: Arc::from(uri),
            name: Arc::from(name),
            coord,
        });
        idx
    }

    /// Finalizes the indexes; must run after the graph is fully populated.
    ///
    /// Way uris gain the `address:` prefix and admin uris the `admin`
    /// prefix, matching the external identifier scheme.
    pub fn build(&mut self) {
        self.proximity = ProximityList::new();
        for vertex_idx in self.graph.node_indices() {
            self.proximity.add(self.graph[vertex_idx].coord, vertex_idx);
        }
        self.admin_index = AdminIndex::build(&self.admins);
        self.way_lookup.clear();
        for way in &mut self.ways {
            if !way.uri.starts_with("address:") {
                way.uri = Arc::from(format!("address:{}", way.uri).as_str());
            }
            self.way_lookup.insert(way.uri.clone(), way.idx);
        }
        self.admin_lookup.clear();
        for admin in &mut self.admins {
            if !admin.uri.starts_with("admin") {
                admin.uri = Arc::from(format!("admin{}", admin.uri).as_str());
            }
            self.admin_lookup.insert(admin.uri.clone(), admin.idx);
        }
        self.poi_lookup.clear();
        for poi in &self.pois {
            self.poi_lookup.insert(poi.uri.clone(), poi.idx);
        }
    }

    pub fn poi_by_uri(&self, uri: &str) -> Option<&Poi> {
        let idx = self.poi_lookup.get(uri)?;
        Some(&self.pois[*idx as usize])
    }

    pub fn way_by_uri(&self, uri: &str) -> Option<&Way> {
        let idx = self.way_lookup.get(uri)?;
        Some(&self.ways[*idx as usize])
    }

    pub fn admin_by_uri(&self, uri: &str) -> Option<&Admin> {
        let idx = self.admin_lookup.get(uri)?;
        Some(&self.admins[*idx as usize])
    }

    /// All admins containing `coord`.
    pub fn find_admins(&self, coord: &Coordinate) -> Vec<u32> {
        self.admin_index.find_admins(coord, &self.admins)
    }

    /// Projects every stop point of the transit dataset on its nearest
    /// street edge; returns how many projections succeeded.
    pub fn project_stop_points(&mut self, stop_points: &[crate::model::StopPoint]) -> usize {
        use rayon::prelude::*;
        let projections: Vec<ProjectionData> = {
            let network: &StreetNetwork = &*self;
            stop_points
                .par_iter()
                .map(|stop_point| ProjectionData::new(&stop_point.coord, network))
                .collect()
        };
        self.projected_stop_points = projections;
        let matched = self.projected_stop_points.iter().filter(|p| p.found).count();
        info!(
            matched,
            total = stop_points.len(),
            "projected stop points on the street network"
        );
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_with_way() -> (StreetNetwork, u32) {
        let mut sn = StreetNetwork::new();
        let way = sn.add_way("way:1", "rue de la Paix", "street");
        let a = sn.add_vertex(Coordinate::new(2.0, 48.0));
        let b = sn.add_vertex(Coordinate::new(2.01, 48.0));
        let c = sn.add_vertex(Coordinate::new(2.02, 48.0));
        sn.add_segment(a, b, way, ModeSet::ALL);
        sn.add_segment(b, c, way, ModeSet::ALL);
        sn.build();
        (sn, way)
    }

    #[test]
    fn house_number_parity_and_order() {
        let (mut sn, way) = network_with_way();
        let way = &mut sn.ways[way as usize];
        way.add_house_number(HouseNumber { number: 7, coord: Coordinate::new(2.014, 48.0) });
        way.add_house_number(HouseNumber { number: 3, coord: Coordinate::new(2.006, 48.0) });
        way.add_house_number(HouseNumber { number: 4, coord: Coordinate::new(2.008, 48.0) });
        assert_eq!(way.house_numbers_odd.iter().map(|hn| hn.number).collect::<Vec<_>>(), vec![3, 7]);
        assert_eq!(way.house_numbers_even.iter().map(|hn| hn.number).collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn nearest_coord_interpolates_on_parity_list() {
        let (mut sn, way_idx) = network_with_way();
        {
            let way = &mut sn.ways[way_idx as usize];
            way.add_house_number(HouseNumber { number: 1, coord: Coordinate::new(2.0, 48.0) });
            way.add_house_number(HouseNumber { number: 9, coord: Coordinate::new(2.008, 48.0) });
        }
        let way = &sn.ways[way_idx as usize];
        let coord = way.nearest_coord(5, &sn.graph);
        // Halfway between number 1 and number 9.
        assert!((coord.lon - 2.004).abs() < 1e-9);
    }

    #[test]
    fn nearest_coord_clamps_out_of_range() {
        let (mut sn, way_idx) = network_with_way();
        {
            let way = &mut sn.ways[way_idx as usize];
            way.add_house_number(HouseNumber { number: 3, coord: Coordinate::new(2.002, 48.0) });
            way.add_house_number(HouseNumber { number: 11, coord: Coordinate::new(2.015, 48.0) });
        }
        let way = &sn.ways[way_idx as usize];
        assert_eq!(way.nearest_coord(99, &sn.graph), Coordinate::new(2.015, 48.0));
        assert_eq!(way.nearest_coord(1, &sn.graph), Coordinate::new(2.002, 48.0));
        assert_eq!(way.nearest_coord(11, &sn.graph), Coordinate::new(2.015, 48.0));
    }

    #[test]
    fn nearest_coord_without_numbers_is_barycenter() {
        let (sn, way_idx) = network_with_way();
        let way = &sn.ways[way_idx as usize];
        let barycenter = way.nearest_coord(4, &sn.graph);
        // The way spans lon 2.00..2.02, its centroid sits mid-way.
        assert!((barycenter.lon - 2.01).abs() < 0.005);
    }

    #[test]
    fn nearest_number_lookup() {
        let (mut sn, way_idx) = network_with_way();
        {
            let way = &mut sn.ways[way_idx as usize];
            way.add_house_number(HouseNumber { number: 3, coord: Coordinate::new(2.002, 48.0) });
            way.add_house_number(HouseNumber { number: 8, coord: Coordinate::new(2.016, 48.0) });
        }
        let way = &sn.ways[way_idx as usize];
        assert_eq!(way.nearest_number(&Coordinate::new(2.015, 48.0)), 8);
        assert_eq!(way.nearest_number(&Coordinate::new(2.001, 48.0)), 3);
    }

    #[test]
    fn uri_normalization() {
        let (sn, _) = network_with_way();
        assert!(sn.way_by_uri("address:way:1").is_some());
        assert!(sn.way_by_uri("way:1").is_none());
    }
}
