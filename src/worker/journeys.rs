//! Journey composition: entry-point resolution, street fallback tables,
//! the transit search and the street/crow-fly wrapping of its results.

use crate::{
    model::{Dataset, RtLevel},
    raptor::{Journey, Query, Raptor, Section},
    realtime::disruption::{Effect, InformedEntity},
    shared::{Coordinate, DateTime, Duration},
    streets::{Mode, ProximityList, StreetNetwork, StreetWorker},
    worker::{
        Error,
        request::{
            JourneyResponse, JourneysRequest, LocationArg, Payload, SectionKind, SectionResponse,
        },
    },
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Crow-fly radius inside which a zonal on-demand stop covers a coordinate.
const ODT_RADIUS: crate::shared::Distance = crate::shared::Distance::from_meters(500.0);

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PlaceKind {
    StopPoint(u32),
    StopArea(u32),
    Admin(u32),
    Address,
    Poi,
    Coord,
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedPlace {
    pub kind: PlaceKind,
    pub coord: Coordinate,
    pub uri: String,
}

/// Resolves a place identifier to a tagged entry point.
///
/// Accepted shapes: a stop point, stop area or poi uri, an `admin…` uri, an
/// `address:…` way uri with an optional `:<number>` house-number suffix, or
/// a raw `lon;lat` coordinate.
pub(crate) fn resolve_place(
    data: &Dataset,
    streets: &StreetNetwork,
    place: &str,
) -> Option<ResolvedPlace> {
    if let Some(sp) = data.stop_point_by_uri(place) {
        return Some(ResolvedPlace {
            kind: PlaceKind::StopPoint(sp.idx),
            coord: sp.coord,
            uri: place.to_string(),
        });
    }
    if let Some(sa) = data.stop_area_by_uri(place) {
        return Some(ResolvedPlace {
            kind: PlaceKind::StopArea(sa.idx),
            coord: sa.coord,
            uri: place.to_string(),
        });
    }
    if place.starts_with("admin") {
        let admin = streets.admin_by_uri(place)?;
        return Some(ResolvedPlace {
            kind: PlaceKind::Admin(admin.idx),
            coord: admin.coord,
            uri: place.to_string(),
        });
    }
    if place.starts_with("address:") {
        // Either the bare way uri or way uri plus a house number.
        if let Some(way) = streets.way_by_uri(place) {
            return Some(ResolvedPlace {
                kind: PlaceKind::Address,
                coord: way.nearest_coord(-1, &streets.graph),
                uri: place.to_string(),
            });
        }
        let (way_uri, number) = place.rsplit_once(':')?;
        let number: i32 = number.parse().ok()?;
        let way = streets.way_by_uri(way_uri)?;
        return Some(ResolvedPlace {
            kind: PlaceKind::Address,
            coord: way.nearest_coord(number, &streets.graph),
            uri: place.to_string(),
        });
    }
    if let Some(poi) = streets.poi_by_uri(place) {
        return Some(ResolvedPlace {
            kind: PlaceKind::Poi,
            coord: poi.coord,
            uri: place.to_string(),
        });
    }
    let coord: Coordinate = place.parse().ok()?;
    Some(ResolvedPlace {
        kind: PlaceKind::Coord,
        coord,
        uri: place.to_string(),
    })
}

/// Zonal on-demand stop points covering a coordinate.
pub(crate) fn odt_stop_points(
    data: &Dataset,
    stop_point_proximity: &ProximityList<u32>,
    coord: &Coordinate,
) -> Vec<u32> {
    stop_point_proximity
        .find_within(coord, ODT_RADIUS)
        .into_iter()
        .filter(|(sp_idx, _)| data.stop_points[*sp_idx as usize].is_zonal)
        .map(|(sp_idx, _)| sp_idx)
        .collect()
}

/// The reachable-stop-point table of one side of the query: every boarding
/// (or alighting) candidate with the street duration to reach it.
#[allow(clippy::too_many_arguments)]
pub(crate) fn fallback_table(
    data: &Dataset,
    streets: &StreetNetwork,
    street_worker: &mut StreetWorker,
    stop_point_proximity: &ProximityList<u32>,
    places: &[(ResolvedPlace, Duration)],
    mode: Mode,
    speed_factor: f64,
    max_street_duration: Duration,
) -> HashMap<u32, Duration> {
    let mut table: HashMap<u32, Duration> = HashMap::new();
    let mut insert = |sp_idx: u32, duration: Duration| {
        table
            .entry(sp_idx)
            .and_modify(|known| *known = (*known).min(duration))
            .or_insert(duration);
    };
    for (place, access) in places {
        match &place.kind {
            PlaceKind::StopPoint(sp_idx) => insert(*sp_idx, *access),
            PlaceKind::StopArea(sa_idx) => {
                for sp in data.stop_points.iter().filter(|sp| sp.stop_area_idx == *sa_idx) {
                    insert(sp.idx, *access);
                }
            }
            PlaceKind::Admin(admin_idx) => {
                // An admin reaches transit through its advertised main stop
                // areas, plus whatever the street network covers from its
                // barycenter.
                let admin = &streets.admins[*admin_idx as usize];
                for &sa_idx in &admin.main_stop_area_idxs {
                    for sp in data.stop_points.iter().filter(|sp| sp.stop_area_idx == sa_idx) {
                        insert(sp.idx, *access);
                    }
                }
                street_fallback(
                    data,
                    streets,
                    street_worker,
                    stop_point_proximity,
                    &place.coord,
                    mode,
                    speed_factor,
                    max_street_duration,
                    *access,
                    &mut insert,
                );
            }
            PlaceKind::Address | PlaceKind::Poi | PlaceKind::Coord => {
                street_fallback(
                    data,
                    streets,
                    street_worker,
                    stop_point_proximity,
                    &place.coord,
                    mode,
                    speed_factor,
                    max_street_duration,
                    *access,
                    &mut insert,
                );
            }
        }
    }
    table
}

#[allow(clippy::too_many_arguments)]
fn street_fallback(
    data: &Dataset,
    streets: &StreetNetwork,
    street_worker: &mut StreetWorker,
    stop_point_proximity: &ProximityList<u32>,
    coord: &Coordinate,
    mode: Mode,
    speed_factor: f64,
    max_street_duration: Duration,
    access: Duration,
    insert: &mut impl FnMut(u32, Duration),
) {
    match street_worker.nearest_stop_points(
        streets,
        coord,
        mode,
        speed_factor,
        max_street_duration,
        stop_point_proximity,
    ) {
        Ok(reachable) => {
            for (sp_idx, duration) in reachable {
                insert(sp_idx, duration + access);
            }
        }
        Err(err) => {
            debug!(%err, "no street fallback from coordinate");
        }
    }
    for sp_idx in odt_stop_points(data, stop_point_proximity, coord) {
        insert(sp_idx, access);
    }
}

pub(crate) struct JourneyContext<'a> {
    pub data: &'a Dataset,
    pub streets: &'a StreetNetwork,
    pub raptor: &'a mut Raptor,
    pub street_worker: &'a mut StreetWorker,
    pub stop_point_proximity: &'a ProximityList<u32>,
}

/// The journeys handler: resolve endpoints, fill the two fallback tables,
/// run the transit search per datetime and wrap each result with street or
/// crow-fly legs. Always computes the pure street path when enabled.
pub(crate) fn journeys(ctx: &mut JourneyContext<'_>, request: &JourneysRequest) -> Result<Payload, Error> {
    let (origins, destinations) = resolve_endpoints(ctx.data, ctx.streets, request)?;
    let params = &request.streetnetwork_params;
    let origin_mode = Mode::parse(&params.origin_mode).unwrap_or_default();
    let destination_mode = Mode::parse(&params.destination_mode).unwrap_or_default();
    let max_street = Duration::from_seconds(params.max_duration);

    let departures = fallback_table(
        ctx.data,
        ctx.streets,
        ctx.street_worker,
        ctx.stop_point_proximity,
        &origins,
        origin_mode,
        params.speed_factor,
        max_street,
    );
    let arrivals = fallback_table(
        ctx.data,
        ctx.streets,
        ctx.street_worker,
        ctx.stop_point_proximity,
        &destinations,
        destination_mode,
        params.speed_factor,
        max_street,
    );

    // The pure street path doubles as a pruning bound and a journey of its
    // own (direct path uses the origin mode only).
    let direct_path = if params.enable_direct_path {
        ctx.street_worker
            .direct_path(
                ctx.streets,
                &origins[0].0.coord,
                &destinations[0].0.coord,
                origin_mode,
                params.speed_factor,
            )
            .ok()
    } else {
        None
    };
    let direct_duration = direct_path.as_ref().map(|path| path.duration);

    let rt_level = if request.disruption_active {
        RtLevel::RealTime
    } else {
        RtLevel::Base
    };
    let mut journeys: Vec<(Journey, DateTime)> = Vec::new();
    for &timestamp in &request.datetimes {
        let init_dt = ctx
            .data
            .posix_to_datetime(timestamp)
            .map_err(|_| Error::DateOutOfBounds)?;
        let mut query = Query::new(
            departures.iter().map(|(sp, d)| (*sp, *d)).collect(),
            arrivals.iter().map(|(sp, d)| (*sp, *d)).collect(),
            init_dt,
        );
        query.clockwise = request.clockwise;
        query.rt_level = rt_level;
        query.wheelchair = request.wheelchair;
        query.max_transfers = request.max_transfers;
        query.forbidden_uris = request.forbidden_uris.clone();
        query.max_extra_second_pass = request.max_extra_second_pass;
        if request.max_duration > 0 {
            query.max_duration = Some(Duration::from_seconds(request.max_duration));
        }
        query.direct_path_duration = direct_duration;
        for journey in ctx.raptor.compute(ctx.data, &query) {
            journeys.push((journey, init_dt));
        }
    }

    let mut responses: Vec<JourneyResponse> = Vec::new();
    for (journey, init_dt) in journeys {
        match build_journey_response(ctx, request, &origins[0].0, &destinations[0].0, &departures, &arrivals, &journey, init_dt) {
            Ok(response) => responses.push(response),
            Err(err) => warn!(%err, "could not finalize a journey, dropping it"),
        }
    }
    if let Some(path) = direct_path
        && let Some(direct) = direct_path_response(&origins[0].0, &destinations[0].0, &path, request)
    {
        responses.push(direct);
    }
    if responses.is_empty() {
        return Err(Error::NoSolution);
    }
    Ok(Payload::Journeys(responses))
}

/// The isochrone handler: same search, no destination.
pub(crate) fn isochrone(ctx: &mut JourneyContext<'_>, request: &JourneysRequest) -> Result<Payload, Error> {
    let (origins, _) = resolve_origins_only(ctx.data, ctx.streets, request)?;
    let params = &request.streetnetwork_params;
    let origin_mode = Mode::parse(&params.origin_mode).unwrap_or_default();
    let departures = fallback_table(
        ctx.data,
        ctx.streets,
        ctx.street_worker,
        ctx.stop_point_proximity,
        &origins,
        origin_mode,
        params.speed_factor,
        Duration::from_seconds(params.max_duration),
    );
    let timestamp = *request.datetimes.first().ok_or(Error::DateOutOfBounds)?;
    let init_dt = ctx
        .data
        .posix_to_datetime(timestamp)
        .map_err(|_| Error::DateOutOfBounds)?;
    let mut query = Query::new(departures.into_iter().collect(), Vec::new(), init_dt);
    query.clockwise = request.clockwise;
    query.rt_level = if request.disruption_active {
        RtLevel::RealTime
    } else {
        RtLevel::Base
    };
    query.wheelchair = request.wheelchair;
    query.max_transfers = request.max_transfers;
    query.forbidden_uris = request.forbidden_uris.clone();
    if request.max_duration > 0 {
        query.max_duration = Some(Duration::from_seconds(request.max_duration));
    }
    let entries = ctx
        .raptor
        .isochrone(ctx.data, &query)
        .into_iter()
        .map(|(sp_idx, dt)| {
            let duration = if request.clockwise {
                dt - init_dt
            } else {
                init_dt - dt
            };
            crate::worker::request::IsochroneEntry {
                stop_point: ctx.data.stop_points[sp_idx as usize].uri.to_string(),
                duration: duration.as_seconds(),
            }
        })
        .collect();
    Ok(Payload::Isochrone(entries))
}

type Endpoints = (Vec<(ResolvedPlace, Duration)>, Vec<(ResolvedPlace, Duration)>);

fn resolve_side(
    data: &Dataset,
    streets: &StreetNetwork,
    args: &[LocationArg],
) -> Vec<(ResolvedPlace, Duration)> {
    args.iter()
        .filter_map(|arg| {
            let place = resolve_place(data, streets, &arg.place);
            if place.is_none() {
                warn!(place = arg.place, "impossible to resolve entry point");
            }
            place.map(|p| (p, Duration::from_seconds(arg.access_duration)))
        })
        .collect()
}

fn resolve_endpoints(
    data: &Dataset,
    streets: &StreetNetwork,
    request: &JourneysRequest,
) -> Result<Endpoints, Error> {
    let origins = resolve_side(data, streets, &request.origin);
    let destinations = resolve_side(data, streets, &request.destination);
    match (origins.is_empty(), destinations.is_empty()) {
        (true, true) => Err(Error::NoOriginNorDestination),
        (true, false) => Err(Error::NoOriginPoint),
        (false, true) => Err(Error::NoDestinationPoint),
        (false, false) => Ok((origins, destinations)),
    }
}

fn resolve_origins_only(
    data: &Dataset,
    streets: &StreetNetwork,
    request: &JourneysRequest,
) -> Result<Endpoints, Error> {
    let origins = resolve_side(data, streets, &request.origin);
    if origins.is_empty() {
        return Err(Error::NoOriginPoint);
    }
    Ok((origins, Vec::new()))
}

/// Whether the boarding stop needs no access leg, a crow-fly leg or a real
/// street leg in front of it.
fn access_leg_kind(data: &Dataset, place: &ResolvedPlace, sp_idx: u32) -> Option<SectionKind> {
    match &place.kind {
        PlaceKind::StopPoint(idx) if *idx == sp_idx => None,
        // The stop-area fallback is degenerate: one synthetic straight leg.
        PlaceKind::StopArea(idx) if *idx == data.stop_points[sp_idx as usize].stop_area_idx => {
            Some(SectionKind::CrowFly)
        }
        PlaceKind::Admin(_) => Some(SectionKind::CrowFly),
        _ => Some(SectionKind::StreetNetwork),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_journey_response(
    ctx: &mut JourneyContext<'_>,
    request: &JourneysRequest,
    origin: &ResolvedPlace,
    destination: &ResolvedPlace,
    departures: &HashMap<u32, Duration>,
    arrivals: &HashMap<u32, Duration>,
    journey: &Journey,
    _init_dt: DateTime,
) -> Result<JourneyResponse, crate::model::Error> {
    let data = ctx.data;
    let params = &request.streetnetwork_params;
    let mut sections: Vec<SectionResponse> = Vec::new();
    let mut co2: f64 = 0.0;
    let mut has_co2 = false;
    let mut walking: u32 = 0;

    // Access leg.
    let first_sp = first_stop_point(journey);
    if let Some(sp_idx) = first_sp
        && let Some(kind) = access_leg_kind(data, origin, sp_idx)
    {
        let mode = Mode::parse(&params.origin_mode).unwrap_or_default();
        let duration = departures.get(&sp_idx).copied().unwrap_or(Duration::ZERO);
        let board_posix = data.datetime_to_posix(journey.departure_dt)?;
        let section = street_or_crowfly(
            ctx,
            kind,
            origin.uri.clone(),
            origin.coord,
            data.stop_points[sp_idx as usize].uri.to_string(),
            data.stop_points[sp_idx as usize].coord,
            mode,
            params.speed_factor,
            duration,
            board_posix - i64::from(duration.as_seconds()),
        );
        if section.mode == Some(Mode::Walking) {
            walking += section.duration;
        }
        sections.push(section);
    }

    // Transit and transfer legs.
    for section in &journey.sections {
        match section {
            Section::PublicTransport { vj_idx, from_sp, to_sp, dep_dt, arr_dt } => {
                let vj = &data.vehicle_journeys[*vj_idx as usize];
                let from = &data.stop_points[*from_sp as usize];
                let to = &data.stop_points[*to_sp as usize];
                let mode = &data.physical_modes[vj.physical_mode_idx as usize];
                if let Some(rate) = mode.co2_emission {
                    co2 += rate * from.coord.distance_to(&to.coord).as_kilometers();
                    has_co2 = true;
                }
                sections.push(SectionResponse {
                    kind: SectionKind::PublicTransport,
                    from: from.uri.to_string(),
                    to: to.uri.to_string(),
                    departure: data.datetime_to_posix(*dep_dt)?,
                    arrival: data.datetime_to_posix(*arr_dt)?,
                    duration: (*arr_dt - *dep_dt).as_seconds(),
                    mode: None,
                    vehicle_journey: Some(vj.uri.to_string()),
                    coordinates: Vec::new(),
                });
            }
            Section::Transfer { from_sp, to_sp, dep_dt, arr_dt } => {
                let duration = (*arr_dt - *dep_dt).as_seconds();
                walking += duration;
                sections.push(SectionResponse {
                    kind: SectionKind::Transfer,
                    from: data.stop_points[*from_sp as usize].uri.to_string(),
                    to: data.stop_points[*to_sp as usize].uri.to_string(),
                    departure: data.datetime_to_posix(*dep_dt)?,
                    arrival: data.datetime_to_posix(*arr_dt)?,
                    duration,
                    mode: Some(Mode::Walking),
                    vehicle_journey: None,
                    coordinates: Vec::new(),
                });
            }
        }
    }

    // Egress leg.
    let last_sp = last_stop_point(journey);
    if let Some(sp_idx) = last_sp
        && let Some(kind) = access_leg_kind(data, destination, sp_idx)
    {
        let mode = Mode::parse(&params.destination_mode).unwrap_or_default();
        let duration = arrivals.get(&sp_idx).copied().unwrap_or(Duration::ZERO);
        let alight_posix = data.datetime_to_posix(journey.arrival_dt)?;
        let section = street_or_crowfly(
            ctx,
            kind,
            data.stop_points[sp_idx as usize].uri.to_string(),
            data.stop_points[sp_idx as usize].coord,
            destination.uri.clone(),
            destination.coord,
            mode,
            params.speed_factor,
            duration,
            alight_posix,
        );
        if section.mode == Some(Mode::Walking) {
            walking += section.duration;
        }
        sections.push(section);
    }

    let departure = sections.first().map(|s| s.departure).unwrap_or_default();
    let arrival = sections.last().map(|s| s.arrival).unwrap_or_default();
    Ok(JourneyResponse {
        departure,
        arrival,
        duration: (arrival - departure).max(0) as u32,
        nb_transfers: journey.transfers,
        walking_duration: walking,
        co2_emission: has_co2.then_some(co2),
        fare: None,
        most_serious_disruption_effect: most_serious_effect(data, journey, origin, destination),
        sections,
    })
}

fn first_stop_point(journey: &Journey) -> Option<u32> {
    journey.sections.first().map(|section| match section {
        Section::PublicTransport { from_sp, .. } | Section::Transfer { from_sp, .. } => *from_sp,
    })
}

fn last_stop_point(journey: &Journey) -> Option<u32> {
    journey.sections.last().map(|section| match section {
        Section::PublicTransport { to_sp, .. } | Section::Transfer { to_sp, .. } => *to_sp,
    })
}

/// A street leg between a place and a stop point, degraded to a crow-fly
/// leg when asked for or when the street path cannot be computed.
#[allow(clippy::too_many_arguments)]
fn street_or_crowfly(
    ctx: &mut JourneyContext<'_>,
    kind: SectionKind,
    from: String,
    from_coord: Coordinate,
    to: String,
    to_coord: Coordinate,
    mode: Mode,
    speed_factor: f64,
    fallback_duration: Duration,
    departure_posix: i64,
) -> SectionResponse {
    if kind == SectionKind::StreetNetwork
        && let Ok(path) = ctx
            .street_worker
            .direct_path(ctx.streets, &from_coord, &to_coord, mode, speed_factor)
    {
        return SectionResponse {
            kind: SectionKind::StreetNetwork,
            from,
            to,
            departure: departure_posix,
            arrival: departure_posix + i64::from(path.duration.as_seconds()),
            duration: path.duration.as_seconds(),
            mode: Some(mode),
            vehicle_journey: None,
            coordinates: path.coordinates,
        };
    }
    SectionResponse {
        kind: SectionKind::CrowFly,
        from,
        to,
        departure: departure_posix,
        arrival: departure_posix + i64::from(fallback_duration.as_seconds()),
        duration: fallback_duration.as_seconds(),
        mode: Some(mode),
        vehicle_journey: None,
        coordinates: vec![from_coord, to_coord],
    }
}

fn direct_path_response(
    origin: &ResolvedPlace,
    destination: &ResolvedPlace,
    path: &crate::streets::StreetPath,
    request: &JourneysRequest,
) -> Option<JourneyResponse> {
    let timestamp = *request.datetimes.first()?;
    let (departure, arrival) = if request.clockwise {
        (timestamp, timestamp + i64::from(path.duration.as_seconds()))
    } else {
        (timestamp - i64::from(path.duration.as_seconds()), timestamp)
    };
    Some(JourneyResponse {
        sections: vec![SectionResponse {
            kind: SectionKind::StreetNetwork,
            from: origin.uri.clone(),
            to: destination.uri.clone(),
            departure,
            arrival,
            duration: path.duration.as_seconds(),
            mode: Some(path.mode),
            vehicle_journey: None,
            coordinates: path.coordinates.clone(),
        }],
        departure,
        arrival,
        duration: path.duration.as_seconds(),
        nb_transfers: 0,
        walking_duration: if path.mode == Mode::Walking {
            path.duration.as_seconds()
        } else {
            0
        },
        co2_emission: None,
        fare: None,
        most_serious_disruption_effect: None,
    })
}

/// Worst disruption effect touching the journey: its vehicle journeys, the
/// origin and destination stop points and their stop areas.
fn most_serious_effect(
    data: &Dataset,
    journey: &Journey,
    origin: &ResolvedPlace,
    destination: &ResolvedPlace,
) -> Option<Effect> {
    let mut entities: Vec<InformedEntity> = Vec::new();
    for section in &journey.sections {
        if let Section::PublicTransport { vj_idx, .. } = section {
            let vj = &data.vehicle_journeys[*vj_idx as usize];
            entities.push(InformedEntity::MetaVehicleJourney(vj.meta_vj_idx));
        }
    }
    for place in [origin, destination] {
        match &place.kind {
            PlaceKind::StopPoint(sp_idx) => {
                entities.push(InformedEntity::StopPoint(*sp_idx));
                entities.push(InformedEntity::StopArea(
                    data.stop_points[*sp_idx as usize].stop_area_idx,
                ));
            }
            PlaceKind::StopArea(sa_idx) => entities.push(InformedEntity::StopArea(*sa_idx)),
            _ => {}
        }
    }
    entities
        .iter()
        .flat_map(|entity| data.disruptions.impacts_on(entity))
        .map(|impact| impact.severity.effect)
        .min()
}
