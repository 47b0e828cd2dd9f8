use crate::{
    model::Dataset,
    raptor::state::{Parent, SearchState},
    shared::{DateTime, Duration},
};

/// One leg of a transit journey. Street access and egress legs are wrapped
/// around by the request dispatcher, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    PublicTransport {
        vj_idx: u32,
        from_sp: u32,
        to_sp: u32,
        dep_dt: DateTime,
        arr_dt: DateTime,
    },
    Transfer {
        from_sp: u32,
        to_sp: u32,
        dep_dt: DateTime,
        arr_dt: DateTime,
    },
}

impl Section {
    pub fn departure(&self) -> DateTime {
        match self {
            Section::PublicTransport { dep_dt, .. } | Section::Transfer { dep_dt, .. } => *dep_dt,
        }
    }

    pub fn arrival(&self) -> DateTime {
        match self {
            Section::PublicTransport { arr_dt, .. } | Section::Transfer { arr_dt, .. } => *arr_dt,
        }
    }

    pub fn is_public_transport(&self) -> bool {
        matches!(self, Section::PublicTransport { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Journey {
    pub sections: Vec<Section>,
    pub departure_dt: DateTime,
    pub arrival_dt: DateTime,
    /// Vehicle changes, one less than the vehicle sections.
    pub transfers: u32,
}

impl Journey {
    pub(crate) fn from_sections(sections: Vec<Section>) -> Option<Self> {
        let departure_dt = sections.first()?.departure();
        let arrival_dt = sections.last()?.arrival();
        let vehicles = sections.iter().filter(|s| s.is_public_transport()).count() as u32;
        Some(Self {
            sections,
            departure_dt,
            arrival_dt,
            transfers: vehicles.saturating_sub(1),
        })
    }

    pub fn duration(&self) -> Duration {
        self.arrival_dt - self.departure_dt
    }

    /// Vehicle journey identifiers, in travel order; the deterministic
    /// tiebreaker between otherwise equal journeys.
    pub fn vj_uris<'a>(&self, data: &'a Dataset) -> Vec<&'a str> {
        self.sections
            .iter()
            .filter_map(|section| match section {
                Section::PublicTransport { vj_idx, .. } => {
                    Some(data.vehicle_journeys[*vj_idx as usize].uri.as_ref())
                }
                Section::Transfer { .. } => None,
            })
            .collect()
    }
}

/// Extracts the Pareto front (time, transfers) of a finished search.
///
/// Walks rounds in increasing transfer count and keeps a round's best
/// endpoint only when it strictly improves the time criterion, so a tie on
/// time goes to the journey with fewer transfers.
pub(crate) fn extract_journeys(
    state: &SearchState,
    clockwise: bool,
    endpoints: &[(u32, Duration)],
) -> Vec<Journey> {
    let mut journeys = Vec::new();
    let mut best_total: Option<DateTime> = None;

    for round in 1..state.rounds {
        let mut round_best: Option<(DateTime, u32)> = None;
        for &(sp_idx, access) in endpoints {
            let label = state.label(round, sp_idx);
            if label == state.unreached() {
                continue;
            }
            // The access cost of reaching the endpoint itself.
            let total = if clockwise {
                label.saturating_add(access)
            } else {
                label.saturating_sub(access)
            };
            let better = match &round_best {
                Some((best, best_sp)) => {
                    let time_order = if clockwise { total < *best } else { total > *best };
                    time_order || (total == *best && sp_idx < *best_sp)
                }
                None => true,
            };
            if better {
                round_best = Some((total, sp_idx));
            }
        }
        let Some((total, sp_idx)) = round_best else {
            continue;
        };
        let improves_front = match &best_total {
            Some(best) => {
                if clockwise {
                    total < *best
                } else {
                    total > *best
                }
            }
            None => true,
        };
        if !improves_front {
            continue;
        }
        if let Some(journey) = backtrack(state, clockwise, round, sp_idx) {
            best_total = Some(total);
            journeys.push(journey);
        }
    }
    journeys
}

/// Rebuilds the section list from the parent records of `(round, sp_idx)`.
fn backtrack(state: &SearchState, clockwise: bool, round: usize, sp_idx: u32) -> Option<Journey> {
    let mut sections = Vec::new();
    let mut round = round;
    let mut sp = sp_idx;

    loop {
        match state.parent(round, sp) {
            Some(Parent::Vehicle { vj_idx, other_sp, dep_dt, arr_dt }) => {
                let (from_sp, to_sp) = if clockwise { (other_sp, sp) } else { (sp, other_sp) };
                sections.push(Section::PublicTransport {
                    vj_idx,
                    from_sp,
                    to_sp,
                    dep_dt,
                    arr_dt,
                });
                // A vehicle section consumes a round; transfers do not.
                if round == 0 {
                    break;
                }
                round -= 1;
                sp = other_sp;
            }
            Some(Parent::Transfer { other_sp, dep_dt, arr_dt }) => {
                let (from_sp, to_sp) = if clockwise { (other_sp, sp) } else { (sp, other_sp) };
                sections.push(Section::Transfer {
                    from_sp,
                    to_sp,
                    dep_dt,
                    arr_dt,
                });
                sp = other_sp;
            }
            None => break,
        }
    }

    if clockwise {
        sections.reverse();
    }
    Journey::from_sections(sections)
}
