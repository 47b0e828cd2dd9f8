use crate::shared::DateTime;
use bitvec::prelude::*;

/// How a round label was reached, recorded for path reconstruction.
///
/// In a clockwise search the record sits at the alighting stop and `other_sp`
/// is the boarding stop; in a reverse search the record sits at the boarding
/// stop and `other_sp` is the alighting one.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Parent {
    Vehicle {
        vj_idx: u32,
        other_sp: u32,
        dep_dt: DateTime,
        arr_dt: DateTime,
    },
    Transfer {
        other_sp: u32,
        dep_dt: DateTime,
        arr_dt: DateTime,
    },
}

impl Parent {
    pub fn is_vehicle(&self) -> bool {
        matches!(self, Parent::Vehicle { .. })
    }
}

/// A label improvement produced by a scan, applied serially after the
/// parallel phase so the outcome stays deterministic.
#[derive(Debug, Clone)]
pub(crate) struct Update {
    pub stop_point_idx: u32,
    pub dt: DateTime,
    pub parent: Parent,
    /// Lexicographic tiebreaker between equal-time candidates.
    pub vj_uri: Option<std::sync::Arc<str>>,
}

/// Round-indexed label state of one search.
///
/// Labels live in a flat matrix `[round][stop_point]`; `best` carries the
/// per-stop Pareto bound across rounds and prunes dominated candidates.
#[derive(Debug)]
pub(crate) struct SearchState {
    pub labels: Vec<DateTime>,
    pub parents: Vec<Option<Parent>>,
    pub best: Vec<DateTime>,
    pub marked_stops: BitVec,
    /// Earliest (clockwise) or latest (reverse) marked order per pattern.
    pub active_order: Vec<u16>,
    pub active_mask: BitVec,
    pub updates: Vec<Update>,
    pub num_stop_points: usize,
    pub rounds: usize,
    unreached: DateTime,
}

impl SearchState {
    pub fn new(num_stop_points: usize, num_patterns: usize) -> Self {
        Self {
            labels: Vec::new(),
            parents: Vec::new(),
            best: Vec::new(),
            marked_stops: bitvec!(0; num_stop_points),
            active_order: vec![0; num_patterns],
            active_mask: bitvec!(0; num_patterns),
            updates: Vec::new(),
            num_stop_points,
            rounds: 0,
            unreached: DateTime::MAX,
        }
    }

    /// Clears everything for a new search. `clockwise` picks the unreached
    /// sentinel.
    pub fn clear(&mut self, num_stop_points: usize, num_patterns: usize, clockwise: bool) {
        self.unreached = if clockwise { DateTime::MAX } else { DateTime::MIN };
        self.num_stop_points = num_stop_points;
        self.labels.clear();
        self.parents.clear();
        self.best.clear();
        self.best.resize(num_stop_points, self.unreached);
        self.marked_stops = bitvec!(0; num_stop_points);
        self.active_order.clear();
        self.active_order.resize(num_patterns, 0);
        self.active_mask = bitvec!(0; num_patterns);
        self.updates.clear();
        self.rounds = 0;
    }

    pub fn unreached(&self) -> DateTime {
        self.unreached
    }

    /// Opens a new round; every label starts unreached.
    pub fn push_round(&mut self) {
        self.labels
            .extend(std::iter::repeat_n(self.unreached, self.num_stop_points));
        self.parents.extend(std::iter::repeat_n(None, self.num_stop_points));
        self.rounds += 1;
    }

    pub fn label(&self, round: usize, stop_point_idx: u32) -> DateTime {
        self.labels[round * self.num_stop_points + stop_point_idx as usize]
    }

    pub fn parent(&self, round: usize, stop_point_idx: u32) -> Option<Parent> {
        self.parents[round * self.num_stop_points + stop_point_idx as usize]
    }

    pub fn set_label(&mut self, round: usize, stop_point_idx: u32, dt: DateTime, parent: Option<Parent>) {
        let at = round * self.num_stop_points + stop_point_idx as usize;
        self.labels[at] = dt;
        self.parents[at] = parent;
    }

    /// Whether `dt` beats `best` for the search direction.
    pub fn improves(&self, clockwise: bool, dt: DateTime, stop_point_idx: u32) -> bool {
        if clockwise {
            dt < self.best[stop_point_idx as usize]
        } else {
            dt > self.best[stop_point_idx as usize]
        }
    }

    /// Applies the buffered updates of `round` in deterministic order:
    /// best time first, ties broken on the journey identifier.
    pub fn apply_updates(&mut self, round: usize, clockwise: bool) -> bool {
        let mut updates = std::mem::take(&mut self.updates);
        updates.sort_by(|a, b| {
            let time_order = if clockwise {
                a.dt.cmp(&b.dt)
            } else {
                b.dt.cmp(&a.dt)
            };
            time_order.then_with(|| a.vj_uri.cmp(&b.vj_uri))
        });
        let mut improved = false;
        for update in updates {
            if self.improves(clockwise, update.dt, update.stop_point_idx) {
                self.set_label(round, update.stop_point_idx, update.dt, Some(update.parent));
                self.best[update.stop_point_idx as usize] = update.dt;
                self.marked_stops.set(update.stop_point_idx as usize, true);
                improved = true;
            }
        }
        improved
    }
}
