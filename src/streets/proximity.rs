use crate::shared::{Coordinate, Distance};
use std::collections::HashMap;

pub(crate) const LONGITUDE_DISTANCE: Distance = Distance::from_meters(111_320.0);
pub(crate) const LATITUDE_DISTANCE: Distance = Distance::from_meters(110_540.0);

/// Grid cell edge, sized so one cell holds a handful of vertices in a dense
/// city network.
const CELL_SIZE: Distance = Distance::from_meters(500.0);

pub type Cell = (i32, i32);

pub(crate) fn cell_of(coord: &Coordinate) -> Cell {
    let x = (coord.lon * LONGITUDE_DISTANCE.as_meters() / CELL_SIZE.as_meters()) as i32;
    let y = (coord.lat * LATITUDE_DISTANCE.as_meters() / CELL_SIZE.as_meters()) as i32;
    (x, y)
}

/// Bucket-grid index for nearest and radius lookups over coordinates.
///
/// Items land in 500 m cells keyed by truncated projected coordinates; a
/// nearest query scans growing rings of cells and stops once a further ring
/// cannot beat the best candidate.
#[derive(Debug, Clone, Default)]
pub struct ProximityList<T: Copy> {
    cells: HashMap<Cell, Vec<(Coordinate, T)>>,
    len: usize,
}

impl<T: Copy> ProximityList<T> {
    pub fn new() -> Self {
        Self {
            cells: HashMap::new(),
            len: 0,
        }
    }

    pub fn add(&mut self, coord: Coordinate, item: T) {
        self.cells.entry(cell_of(&coord)).or_default().push((coord, item));
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every item within `radius` of `coord`, closest first.
    pub fn find_within(&self, coord: &Coordinate, radius: Distance) -> Vec<(T, Distance)> {
        let reach = (radius.as_meters() / CELL_SIZE.as_meters()).ceil().abs() as i32;
        let (origin_x, origin_y) = cell_of(coord);
        let mut found: Vec<(T, Distance)> = Vec::new();
        for x in -reach..=reach {
            for y in -reach..=reach {
                let Some(items) = self.cells.get(&(origin_x + x, origin_y + y)) else {
                    continue;
                };
                for (item_coord, item) in items {
                    let distance = coord.distance_to(item_coord);
                    if distance <= radius {
                        found.push((*item, distance));
                    }
                }
            }
        }
        found.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        found
    }

    /// The closest item to `coord`, scanning rings outward.
    ///
    /// Fails when the grid holds no candidate at all.
    pub fn find_nearest(&self, coord: &Coordinate) -> Result<(T, Distance), NotFound> {
        if self.len == 0 {
            return Err(NotFound);
        }
        let (origin_x, origin_y) = cell_of(coord);
        let max_reach = self
            .cells
            .keys()
            .map(|(x, y)| (x - origin_x).abs().max((y - origin_y).abs()))
            .max()
            .ok_or(NotFound)?;

        let mut best: Option<(T, Distance)> = None;
        for reach in 0..=max_reach {
            // Once a candidate is closer than the nearest possible point of
            // this ring, no further ring can improve on it.
            if let Some((_, best_distance)) = &best {
                let ring_floor = CELL_SIZE.as_meters() * f64::from(reach - 1).max(0.0);
                if best_distance.as_meters() < ring_floor {
                    break;
                }
            }
            for x in -reach..=reach {
                for y in -reach..=reach {
                    if x.abs() != reach && y.abs() != reach {
                        continue;
                    }
                    let Some(items) = self.cells.get(&(origin_x + x, origin_y + y)) else {
                        continue;
                    };
                    for (item_coord, item) in items {
                        let distance = coord.distance_to(item_coord);
                        let better = match &best {
                            Some((_, best_distance)) => distance < *best_distance,
                            None => true,
                        };
                        if better {
                            best = Some((*item, distance));
                        }
                    }
                }
            }
        }
        best.ok_or(NotFound)
    }
}

/// The proximity grid had no candidate for the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no candidate in the proximity index")]
pub struct NotFound;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_grid_is_not_found() {
        let pl: ProximityList<u32> = ProximityList::new();
        assert_eq!(pl.find_nearest(&Coordinate::new(2.0, 48.0)), Err(NotFound));
    }

    #[test]
    fn nearest_of_several() {
        let mut pl = ProximityList::new();
        pl.add(Coordinate::new(2.0, 48.0), 0u32);
        pl.add(Coordinate::new(2.001, 48.0), 1u32);
        pl.add(Coordinate::new(2.1, 48.0), 2u32);
        let (item, _) = pl.find_nearest(&Coordinate::new(2.0009, 48.0)).unwrap();
        assert_eq!(item, 1);
    }

    #[test]
    fn nearest_in_far_cell() {
        let mut pl = ProximityList::new();
        pl.add(Coordinate::new(2.3, 48.0), 7u32);
        // The query lands several cells away, rings must expand to reach it.
        let (item, _) = pl.find_nearest(&Coordinate::new(2.0, 48.0)).unwrap();
        assert_eq!(item, 7);
    }

    #[test]
    fn within_radius_sorted() {
        let mut pl = ProximityList::new();
        pl.add(Coordinate::new(2.0, 48.0), 0u32);
        pl.add(Coordinate::new(2.002, 48.0), 1u32);
        pl.add(Coordinate::new(2.2, 48.0), 2u32);
        let found = pl.find_within(&Coordinate::new(2.0, 48.0), Distance::from_meters(1000.0));
        let items: Vec<u32> = found.iter().map(|(item, _)| *item).collect();
        assert_eq!(items, vec![0, 1]);
    }
}
