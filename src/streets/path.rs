use crate::{
    shared::{Coordinate, Distance, Duration},
    streets::{Error, Mode, StreetNetwork},
};
use petgraph::{
    graph::{EdgeIndex, NodeIndex},
    visit::EdgeRef,
};
use std::{cmp::Ordering, collections::BinaryHeap};

/// Projection of an arbitrary coordinate on its nearest street edge.
///
/// Keeps the two pseudo-start distances from the projected point to the edge
/// endpoints, which seed the multi-source Dijkstra.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionData {
    pub found: bool,
    pub source: NodeIndex,
    pub target: NodeIndex,
    pub projected: Coordinate,
    pub source_distance: Distance,
    pub target_distance: Distance,
}

impl Default for ProjectionData {
    fn default() -> Self {
        Self {
            found: false,
            source: NodeIndex::end(),
            target: NodeIndex::end(),
            projected: Coordinate::default(),
            source_distance: Distance::MAX,
            target_distance: Distance::MAX,
        }
    }
}

impl ProjectionData {
    pub fn new(coord: &Coordinate, sn: &StreetNetwork) -> Self {
        let Ok(edge) = nearest_edge(coord, sn) else {
            return Self::default();
        };
        let (source, target) = sn.graph.edge_endpoints(edge).unwrap();
        let (projected, _) = coord.project_on_segment(&sn.graph[source].coord, &sn.graph[target].coord);
        Self {
            found: true,
            source,
            target,
            projected,
            source_distance: projected.distance_to(&sn.graph[source].coord),
            target_distance: projected.distance_to(&sn.graph[target].coord),
        }
    }
}

/// Nearest edge to a coordinate: the best-projecting outgoing edge of the
/// nearest graph vertex.
pub fn nearest_edge(coord: &Coordinate, sn: &StreetNetwork) -> Result<EdgeIndex, Error> {
    let (vertex, _) = sn.proximity.find_nearest(coord)?;
    let vertex_coord = sn.graph[vertex].coord;
    let mut best: Option<(EdgeIndex, Distance)> = None;
    for edge in sn.graph.edges(vertex) {
        let target_coord = sn.graph[edge.target()].coord;
        // The projection follows the segment, not the actual street shape.
        let (_, distance) = coord.project_on_segment(&vertex_coord, &target_coord);
        let better = match &best {
            Some((_, best_distance)) => distance < *best_distance,
            None => true,
        };
        if better {
            best = Some((edge.id(), distance));
        }
    }
    best.map(|(edge, _)| edge).ok_or(Error::NotFound)
}

/// One street of a path: consecutive segments on the same way.
#[derive(Debug, Clone, Default)]
pub struct PathItem {
    pub way_idx: u32,
    pub length: Distance,
    pub segments: Vec<EdgeIndex>,
}

/// A computed street-network path.
#[derive(Debug, Clone, Default)]
pub struct StreetPath {
    pub duration: Duration,
    pub length: Distance,
    pub coordinates: Vec<Coordinate>,
    pub path_items: Vec<PathItem>,
    pub mode: Mode,
}

impl StreetPath {
    pub fn is_empty(&self) -> bool {
        self.path_items.is_empty()
    }
}

struct MinScored(f64, NodeIndex);

impl PartialEq for MinScored {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for MinScored {}

impl PartialOrd for MinScored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MinScored {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the binary heap pops the smallest score first.
        other.0.partial_cmp(&self.0).unwrap_or(Ordering::Equal)
    }
}

/// Per-thread street pathfinder.
///
/// Owns the Dijkstra buffers, sized by the vertex count and reset at the
/// start of each request.
#[derive(Debug, Default)]
pub struct StreetWorker {
    distances: Vec<f64>,
    predecessors: Vec<NodeIndex>,
}

impl StreetWorker {
    pub fn new(num_vertices: usize) -> Self {
        Self {
            distances: vec![f64::MAX; num_vertices],
            predecessors: Vec::with_capacity(num_vertices),
        }
    }

    /// Resets the buffers for a fresh request against `sn`.
    pub fn init(&mut self, sn: &StreetNetwork) {
        let n = sn.graph.node_count();
        self.distances.clear();
        self.distances.resize(n, f64::MAX);
        self.predecessors.clear();
        self.predecessors.extend((0..n).map(NodeIndex::new));
    }

    /// Relaxes every vertex reachable from the seeds, stopping beyond
    /// `bound` seconds when one is given.
    fn dijkstra(
        &mut self,
        sn: &StreetNetwork,
        seeds: &[(NodeIndex, f64)],
        mode: Mode,
        speed: f64,
        bound: Option<f64>,
    ) {
        let mut heap = BinaryHeap::new();
        for &(seed, initial) in seeds {
            if initial < self.distances[seed.index()] {
                self.distances[seed.index()] = initial;
                heap.push(MinScored(initial, seed));
            }
        }
        while let Some(MinScored(score, vertex)) = heap.pop() {
            if score > self.distances[vertex.index()] {
                continue;
            }
            if let Some(bound) = bound
                && score > bound
            {
                break;
            }
            for edge in sn.graph.edges(vertex) {
                if !edge.weight().modes.allows(mode) {
                    continue;
                }
                let next = edge.target();
                let next_score = score + edge.weight().length.as_meters() / speed;
                if next_score < self.distances[next.index()] {
                    self.distances[next.index()] = next_score;
                    self.predecessors[next.index()] = vertex;
                    heap.push(MinScored(next_score, next));
                }
            }
        }
    }

    /// Shortest path between vertex sets, seeded with the pseudo-start
    /// durations of projected endpoints.
    pub fn compute(
        &mut self,
        sn: &StreetNetwork,
        starts: &[NodeIndex],
        destinations: &[NodeIndex],
        start_offsets: &[f64],
        destination_offsets: &[f64],
        mode: Mode,
        speed: f64,
    ) -> Result<StreetPath, Error> {
        if starts.is_empty() || destinations.is_empty() {
            return Err(Error::NotFound);
        }
        self.init(sn);
        let seeds: Vec<(NodeIndex, f64)> = starts
            .iter()
            .enumerate()
            .map(|(i, start)| (*start, start_offsets.get(i).copied().unwrap_or(0.0)))
            .collect();
        self.dijkstra(sn, &seeds, mode, speed, None);

        let mut best_destination = destinations[0];
        let mut best_duration = f64::MAX;
        for (i, destination) in destinations.iter().enumerate() {
            let offset = destination_offsets.get(i).copied().unwrap_or(0.0);
            let duration = self.distances[destination.index()];
            if duration == f64::MAX {
                continue;
            }
            let total = duration + offset;
            if total < best_duration {
                best_duration = total;
                best_destination = *destination;
            }
        }
        if best_duration == f64::MAX {
            return Err(Error::NotFound);
        }
        let mut path = self.build_path(sn, best_destination);
        path.duration = Duration::from_seconds(best_duration.ceil() as u32);
        path.mode = mode;
        Ok(path)
    }

    /// Folds the predecessor chain into per-way path items.
    fn build_path(&self, sn: &StreetNetwork, best_destination: NodeIndex) -> StreetPath {
        let mut reverse_path = vec![best_destination];
        let mut vertex = best_destination;
        while self.predecessors[vertex.index()] != vertex {
            vertex = self.predecessors[vertex.index()];
            reverse_path.push(vertex);
        }

        let mut path = StreetPath::default();
        path.coordinates.push(sn.graph[*reverse_path.last().unwrap()].coord);
        let mut last_way: Option<u32> = None;
        let mut item = PathItem::default();
        for window in reverse_path.windows(2).rev() {
            let (u, v) = (window[1], window[0]);
            path.coordinates.push(sn.graph[v].coord);
            let Some(edge_idx) = sn.graph.find_edge(u, v) else {
                continue;
            };
            let edge = sn.graph[edge_idx];
            if last_way.is_some_and(|way| way != edge.way_idx) {
                path.path_items.push(std::mem::take(&mut item));
            }
            last_way = Some(edge.way_idx);
            item.way_idx = edge.way_idx;
            item.segments.push(edge_idx);
            item.length = item.length + edge.length;
            path.length = path.length + edge.length;
        }
        if reverse_path.len() > 1 {
            path.path_items.push(item);
        }
        path
    }

    /// Direct origin-to-destination path over the street network.
    pub fn direct_path(
        &mut self,
        sn: &StreetNetwork,
        from: &Coordinate,
        to: &Coordinate,
        mode: Mode,
        speed_factor: f64,
    ) -> Result<StreetPath, Error> {
        let speed = mode.default_speed() * speed_factor;
        let start = ProjectionData::new(from, sn);
        let destination = ProjectionData::new(to, sn);
        if !start.found || !destination.found {
            return Err(Error::NotFound);
        }
        let mut path = self.compute(
            sn,
            &[start.source, start.target],
            &[destination.source, destination.target],
            &[
                start.source_distance.as_meters() / speed,
                start.target_distance.as_meters() / speed,
            ],
            &[
                destination.source_distance.as_meters() / speed,
                destination.target_distance.as_meters() / speed,
            ],
            mode,
            speed,
        )?;
        path.coordinates.insert(0, start.projected);
        path.coordinates.push(destination.projected);
        Ok(path)
    }

    /// Travel durations to every stop point reachable within `max_duration`
    /// from `origin`.
    ///
    /// Candidate stops come from the stop-point proximity list, bounded by
    /// the crow-fly radius `max_duration * speed`; the Dijkstra pass then
    /// prices each candidate through its edge projection.
    pub fn nearest_stop_points(
        &mut self,
        sn: &StreetNetwork,
        origin: &Coordinate,
        mode: Mode,
        speed_factor: f64,
        max_duration: Duration,
        stop_point_proximity: &crate::streets::ProximityList<u32>,
    ) -> Result<Vec<(u32, Duration)>, Error> {
        let speed = mode.default_speed() * speed_factor;
        let start = ProjectionData::new(origin, sn);
        if !start.found {
            return Err(Error::NotFound);
        }
        let bound = f64::from(max_duration.as_seconds());
        self.init(sn);
        self.dijkstra(
            sn,
            &[
                (start.source, start.source_distance.as_meters() / speed),
                (start.target, start.target_distance.as_meters() / speed),
            ],
            mode,
            speed,
            Some(bound),
        );

        let radius = Distance::from_meters(bound * speed);
        let mut reachable = Vec::new();
        for (stop_point_idx, _) in stop_point_proximity.find_within(origin, radius) {
            let Some(projection) = sn.projected_stop_points.get(stop_point_idx as usize) else {
                continue;
            };
            if !projection.found {
                continue;
            }
            let through_source = self.distances[projection.source.index()]
                + projection.source_distance.as_meters() / speed;
            let through_target = self.distances[projection.target.index()]
                + projection.target_distance.as_meters() / speed;
            let duration = through_source.min(through_target);
            if duration <= bound {
                reachable.push((stop_point_idx, Duration::from_seconds(duration.ceil() as u32)));
            }
        }
        Ok(reachable)
    }

    /// Rebuilds the street path to a stop point priced by the last
    /// [`StreetWorker::nearest_stop_points`] pass.
    pub fn path_to_stop_point(
        &self,
        sn: &StreetNetwork,
        stop_point_idx: u32,
        mode: Mode,
        speed_factor: f64,
    ) -> Result<StreetPath, Error> {
        let speed = mode.default_speed() * speed_factor;
        let projection = sn
            .projected_stop_points
            .get(stop_point_idx as usize)
            .filter(|p| p.found)
            .ok_or(Error::NotFound)?;
        let through_source =
            self.distances[projection.source.index()] + projection.source_distance.as_meters() / speed;
        let through_target =
            self.distances[projection.target.index()] + projection.target_distance.as_meters() / speed;
        let (best_vertex, duration) = if through_source <= through_target {
            (projection.source, through_source)
        } else {
            (projection.target, through_target)
        };
        if duration == f64::MAX {
            return Err(Error::NotFound);
        }
        let mut path = self.build_path(sn, best_vertex);
        path.duration = Duration::from_seconds(duration.ceil() as u32);
        path.mode = mode;
        path.coordinates.push(projection.projected);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streets::ModeSet;

    /// A 3-vertex line along the equatorial parallel, roughly 740 m per hop.
    fn line_network() -> (StreetNetwork, Vec<NodeIndex>) {
        let mut sn = StreetNetwork::new();
        let way = sn.add_way("way:1", "main", "street");
        let vertices: Vec<NodeIndex> = (0..3)
            .map(|i| sn.add_vertex(Coordinate::new(2.0 + 0.01 * f64::from(i), 48.0)))
            .collect();
        for pair in vertices.windows(2) {
            sn.add_segment(pair[0], pair[1], way, ModeSet::ALL);
        }
        sn.build();
        (sn, vertices)
    }

    #[test]
    fn projection_on_edge() {
        let (sn, _) = line_network();
        let projection = ProjectionData::new(&Coordinate::new(2.005, 48.001), &sn);
        assert!(projection.found);
        assert_eq!(projection.projected, Coordinate::new(2.005, 48.0));
    }

    #[test]
    fn direct_path_duration() {
        let (sn, _) = line_network();
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
        let crow_fly = Coordinate::new(2.0, 48.0).distance_to(&Coordinate::new(2.02, 48.0));
        let expected = crow_fly.as_meters() / Mode::Walking.default_speed();
        let got = f64::from(path.duration.as_seconds());
        assert!((got - expected).abs() < 5.0);
        assert_eq!(path.path_items.len(), 1);
    }

    #[test]
    fn unreachable_is_not_found() {
        let mut sn = StreetNetwork::new();
        let way = sn.add_way("way:1", "main", "street");
        let a = sn.add_vertex(Coordinate::new(2.0, 48.0));
        let b = sn.add_vertex(Coordinate::new(2.001, 48.0));
        // One-way edge from b to a only: a cannot reach b.
        sn.add_edge(b, a, way, ModeSet::ALL);
        sn.build();
        let mut worker = StreetWorker::new(sn.graph.node_count());
        let result = worker.compute(&sn, &[a], &[b], &[0.0], &[0.0], Mode::Walking, 1.12);
        assert!(result.is_err());
    }

    #[test]
    fn mode_filtering() {
        let mut sn = StreetNetwork::new();
        let way = sn.add_way("way:1", "motorway", "street");
        let a = sn.add_vertex(Coordinate::new(2.0, 48.0));
        let b = sn.add_vertex(Coordinate::new(2.01, 48.0));
        sn.add_segment(a, b, way, ModeSet::CAR);
        sn.build();
        let mut worker = StreetWorker::new(sn.graph.node_count());
        assert!(worker.compute(&sn, &[a], &[b], &[0.0], &[0.0], Mode::Car, 11.11).is_ok());
        assert!(worker.compute(&sn, &[a], &[b], &[0.0], &[0.0], Mode::Walking, 1.12).is_err());
    }
}
