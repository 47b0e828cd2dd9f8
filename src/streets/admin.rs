use crate::shared::Coordinate;
use rstar::{AABB, RTree, RTreeObject};
use std::sync::Arc;

/// An administrative region bounded by a polygon.
#[derive(Debug, Clone)]
pub struct Admin {
    pub idx: u32,
    pub uri: Arc<str>,
    pub name: Arc<str>,
    pub coord: Coordinate,
    /// Boundary ring, implicitly closed.
    pub boundary: Vec<Coordinate>,
    /// Stop areas a journey query from this admin starts from.
    pub main_stop_area_idxs: Vec<u32>,
}

impl Admin {
    /// Ray-casting containment test against the boundary ring.
    pub fn contains(&self, coord: &Coordinate) -> bool {
        let ring = &self.boundary;
        if ring.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = ring.len() - 1;
        for i in 0..ring.len() {
            let (a, b) = (&ring[i], &ring[j]);
            if (a.lat > coord.lat) != (b.lat > coord.lat) {
                let slope_x = (b.lon - a.lon) * (coord.lat - a.lat) / (b.lat - a.lat) + a.lon;
                if coord.lon < slope_x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

#[derive(Debug, Clone)]
struct AdminEnvelope {
    admin_idx: u32,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for AdminEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over admin bounding boxes; candidates are refined with the exact
/// polygon test.
#[derive(Debug, Clone, Default)]
pub struct AdminIndex {
    tree: RTree<AdminEnvelope>,
}

impl AdminIndex {
    pub fn build(admins: &[Admin]) -> Self {
        let envelopes = admins
            .iter()
            .filter(|admin| !admin.boundary.is_empty())
            .map(|admin| {
                let lons = admin.boundary.iter().map(|c| c.lon);
                let lats = admin.boundary.iter().map(|c| c.lat);
                let min = [
                    lons.clone().fold(f64::INFINITY, f64::min),
                    lats.clone().fold(f64::INFINITY, f64::min),
                ];
                let max = [
                    lons.fold(f64::NEG_INFINITY, f64::max),
                    lats.fold(f64::NEG_INFINITY, f64::max),
                ];
                AdminEnvelope {
                    admin_idx: admin.idx,
                    envelope: AABB::from_corners(min, max),
                }
            })
            .collect();
        Self {
            tree: RTree::bulk_load(envelopes),
        }
    }

    /// All admins whose polygon contains `coord`.
    pub fn find_admins(&self, coord: &Coordinate, admins: &[Admin]) -> Vec<u32> {
        let point = [coord.lon, coord.lat];
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point(point))
            .filter(|envelope| admins[envelope.admin_idx as usize].contains(coord))
            .map(|envelope| envelope.admin_idx)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(idx: u32, uri: &str, min: (f64, f64), max: (f64, f64)) -> Admin {
        Admin {
            idx,
            uri: Arc::from(uri),
            name: Arc::from(uri),
            coord: Coordinate::new((min.0 + max.0) / 2.0, (min.1 + max.1) / 2.0),
            boundary: vec![
                Coordinate::new(min.0, min.1),
                Coordinate::new(max.0, min.1),
                Coordinate::new(max.0, max.1),
                Coordinate::new(min.0, max.1),
            ],
            main_stop_area_idxs: Vec::new(),
        }
    }

    #[test]
    fn containment() {
        let admin = square(0, "admin:1", (2.0, 48.0), (2.1, 48.1));
        assert!(admin.contains(&Coordinate::new(2.05, 48.05)));
        assert!(!admin.contains(&Coordinate::new(2.2, 48.05)));
    }

    #[test]
    fn find_admins_overlapping() {
        let admins = vec![
            square(0, "admin:1", (2.0, 48.0), (2.1, 48.1)),
            square(1, "admin:2", (2.05, 48.0), (2.2, 48.1)),
            square(2, "admin:3", (3.0, 49.0), (3.1, 49.1)),
        ];
        let index = AdminIndex::build(&admins);
        let mut found = index.find_admins(&Coordinate::new(2.07, 48.05), &admins);
        found.sort_unstable();
        assert_eq!(found, vec![0, 1]);
        assert!(index.find_admins(&Coordinate::new(2.5, 48.05), &admins).is_empty());
    }
}
