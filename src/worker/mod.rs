mod journeys;
pub mod request;

pub use request::{
    Api, DirectPathRequest, ErrorId, JourneyResponse, JourneysRequest, LocationArg,
    NearestStopPointsRequest, Payload, PlacesNearbyRequest, Request, Response, ScheduleApiRequest,
    StreetNetworkParams,
};

use crate::{
    model::Dataset,
    model::RtLevel,
    raptor::Raptor,
    realtime::{self, TripUpdate},
    schedules::{self, ScheduleRequest, Selector},
    shared::{Distance, Duration, paginate},
    streets::{Mode, ProximityList, StreetNetwork, StreetWorker},
    worker::journeys::JourneyContext,
};
use std::{
    sync::{Arc, RwLock, atomic::AtomicU64, atomic::Ordering},
    time::Instant,
};
use thiserror::Error;
use tracing::{info, info_span, warn};

#[derive(Error, Debug)]
pub enum Error {
    #[error("dataset not loaded")]
    DatasetNotLoaded,
    #[error("bad filter: {0}")]
    BadFilter(String),
    #[error("date is not in the production period")]
    DateOutOfBounds,
    #[error("no origin point")]
    NoOriginPoint,
    #[error("no destination point")]
    NoDestinationPoint,
    #[error("no origin nor destination point")]
    NoOriginNorDestination,
    #[error("no solution found for this journey")]
    NoSolution,
    #[error("unable to parse: {0}")]
    UnableToParse(String),
    #[error("api {0} is not handled by this worker")]
    UnknownApi(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    fn id(&self) -> ErrorId {
        match self {
            Error::DatasetNotLoaded | Error::Internal(_) => ErrorId::InternalError,
            Error::BadFilter(_) => ErrorId::BadFilter,
            Error::DateOutOfBounds => ErrorId::DateOutOfBounds,
            Error::NoOriginPoint => ErrorId::NoOriginPoint,
            Error::NoDestinationPoint => ErrorId::NoDestinationPoint,
            Error::NoOriginNorDestination => ErrorId::NoOriginNorDestination,
            Error::NoSolution => ErrorId::NoSolution,
            Error::UnableToParse(_) => ErrorId::UnableToParse,
            Error::UnknownApi(_) => ErrorId::InvalidProtobufRequest,
        }
    }
}

impl From<schedules::Error> for Error {
    fn from(err: schedules::Error) -> Self {
        match err {
            schedules::Error::BadFilter(message) => Error::BadFilter(message),
        }
    }
}

/// Pluggable fare computation; the engine itself never prices journeys.
pub trait FareCalculator: Send + Sync {
    fn fare(&self, journey: &JourneyResponse) -> Option<f64>;
}

/// One published version of the whole dataset: transit plus streets, under
/// a single monotonically increasing identifier.
#[derive(Debug, Clone, Default)]
pub struct EngineData {
    pub transit: Dataset,
    pub streets: StreetNetwork,
    pub identifier: u64,
    pub loaded: bool,
}

/// Process-wide holder of the current dataset.
///
/// Readers clone the current [`Arc`] handle and keep a consistent snapshot
/// for the whole request. A reload publishes a fresh version; realtime
/// application takes the write lock and mutates a copy-on-write handle, so
/// in-flight readers still drain on the old state.
#[derive(Default)]
pub struct DataManager {
    current: RwLock<Arc<EngineData>>,
    next_identifier: AtomicU64,
}

impl DataManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Arc<EngineData> {
        self.current.read().unwrap().clone()
    }

    /// Publishes a freshly built dataset. Stop points are projected on the
    /// street network here, once, before anything can read the version.
    pub fn load(&self, transit: Dataset, mut streets: StreetNetwork) {
        streets.project_stop_points(&transit.stop_points);
        let identifier = self.next_identifier.fetch_add(1, Ordering::SeqCst) + 1;
        let data = Arc::new(EngineData {
            transit,
            streets,
            identifier,
            loaded: true,
        });
        *self.current.write().unwrap() = data;
        info!(identifier, "dataset published");
    }

    /// Applies one realtime trip update under the write lock.
    ///
    /// New stop-point arenas never shrink, so street projections stay
    /// aligned; the identifier still moves forward so workers resize their
    /// search state.
    pub fn apply_trip_update(&self, update: &TripUpdate) -> Result<(), realtime::Error> {
        let mut guard = self.current.write().unwrap();
        let mut data = (**guard).clone();
        let result = realtime::handle_trip_update(&mut data.transit, update);
        if result.is_ok() {
            data.identifier = self.next_identifier.fetch_add(1, Ordering::SeqCst) + 1;
            *guard = Arc::new(data);
        }
        result
    }
}

#[derive(Clone)]
pub struct WorkerConfig {
    /// Requests slower than this are logged at WARN.
    pub slow_request_threshold: std::time::Duration,
    pub nb_threads: usize,
    pub fare: Option<Arc<dyn FareCalculator>>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            slow_request_threshold: std::time::Duration::from_millis(200),
            nb_threads: 1,
            fare: None,
        }
    }
}

/// Per-thread request handler.
///
/// Owns the transit search engine and the street pathfinder; both are
/// rebuilt whenever the data manager publishes a new dataset version.
pub struct Worker {
    data_manager: Arc<DataManager>,
    config: WorkerConfig,
    raptor: Option<Raptor>,
    street_worker: StreetWorker,
    stop_point_proximity: ProximityList<u32>,
    last_data_identifier: Option<u64>,
}

impl Worker {
    pub fn new(data_manager: Arc<DataManager>, config: WorkerConfig) -> Self {
        Self {
            data_manager,
            config,
            raptor: None,
            street_worker: StreetWorker::default(),
            stop_point_proximity: ProximityList::new(),
            last_data_identifier: None,
        }
    }

    /// Rebuilds the per-thread state against a newly published dataset.
    fn init_worker_data(&mut self, data: &EngineData) {
        info!(identifier = data.identifier, "initializing worker against a new dataset");
        self.raptor = Some(Raptor::new(&data.transit));
        self.street_worker = StreetWorker::new(data.streets.graph.node_count());
        self.stop_point_proximity = ProximityList::new();
        for sp in &data.transit.stop_points {
            self.stop_point_proximity.add(sp.coord, sp.idx);
        }
        self.last_data_identifier = Some(data.identifier);
    }

    /// Routes one typed request to its handler and shapes the response.
    pub fn dispatch(&mut self, request: &Request) -> Response {
        let span = info_span!("request", id = %request.request_id, api = request.api.name());
        let _guard = span.enter();
        let started = Instant::now();

        let data = self.data_manager.current();
        if self.last_data_identifier != Some(data.identifier) {
            self.init_worker_data(&data);
        }
        let publication_date = if data.loaded {
            data.transit.publication_timestamp
        } else {
            -1
        };

        let result = self.handle(&data, &request.api);
        let response = match result {
            Ok(payload) => Response::from_payload(payload, publication_date),
            Err(err) => Response::from_error(err.id(), err.to_string(), publication_date),
        };

        let elapsed = started.elapsed();
        if elapsed >= self.config.slow_request_threshold {
            warn!(?elapsed, "slow request");
        }
        response
    }

    fn handle(&mut self, data: &EngineData, api: &Api) -> Result<Payload, Error> {
        match api {
            Api::Status => return Ok(self.status(data)),
            Api::Metadatas => return Ok(self.metadatas(data)),
            _ => {}
        }
        if !data.loaded {
            return Err(Error::DatasetNotLoaded);
        }
        match api {
            Api::Journeys(request) => {
                let mut ctx = JourneyContext {
                    data: &data.transit,
                    streets: &data.streets,
                    raptor: self.raptor.as_mut().expect("worker initialized"),
                    street_worker: &mut self.street_worker,
                    stop_point_proximity: &self.stop_point_proximity,
                };
                let mut payload = journeys::journeys(&mut ctx, request)?;
                if let (Some(fare), Payload::Journeys(journeys)) = (&self.config.fare, &mut payload) {
                    for journey in journeys {
                        journey.fare = fare.fare(journey);
                    }
                }
                Ok(payload)
            }
            Api::Isochrone(request) => {
                let mut ctx = JourneyContext {
                    data: &data.transit,
                    streets: &data.streets,
                    raptor: self.raptor.as_mut().expect("worker initialized"),
                    street_worker: &mut self.street_worker,
                    stop_point_proximity: &self.stop_point_proximity,
                };
                journeys::isochrone(&mut ctx, request)
            }
            Api::StopSchedules(request) => self.stop_schedules(data, request),
            Api::NextDepartures(request) => self.next_departures(data, request),
            Api::PlacesNearby(request) => self.places_nearby(data, request),
            Api::NearestStopPoints(request) => self.nearest_stop_points(data, request),
            Api::DirectPath(request) => self.direct_path(data, request),
            Api::OdtStopPoints { coord } => {
                let found = journeys::odt_stop_points(&data.transit, &self.stop_point_proximity, coord)
                    .into_iter()
                    .map(|sp_idx| data.transit.stop_points[sp_idx as usize].uri.to_string())
                    .collect();
                Ok(Payload::OdtStopPoints(found))
            }
            Api::Status | Api::Metadatas => unreachable!("handled above"),
            other => Err(Error::UnknownApi(other.name())),
        }
    }

    fn status(&self, data: &EngineData) -> Payload {
        Payload::Status(request::StatusResponse {
            loaded: data.loaded,
            publication_date: if data.loaded {
                data.transit.publication_timestamp
            } else {
                -1
            },
            start_production_date: data.transit.production_begin.format("%Y%m%d").to_string(),
            end_production_date: data.transit.production_end.format("%Y%m%d").to_string(),
            nb_threads: self.config.nb_threads,
        })
    }

    fn metadatas(&self, data: &EngineData) -> Payload {
        Payload::Metadatas(request::MetadatasResponse {
            start_production_date: data.transit.production_begin.format("%Y%m%d").to_string(),
            end_production_date: data.transit.production_end.format("%Y%m%d").to_string(),
            timezone: data
                .transit
                .timezone
                .as_ref()
                .map(|tz| tz.name.clone())
                .unwrap_or_default(),
        })
    }

    /// Maps a board filter uri on the reference object it names.
    fn parse_selector(&self, data: &Dataset, uri: &str) -> Result<Selector, Error> {
        if data.stop_point_by_uri(uri).is_some() {
            return Ok(Selector::StopPoint(uri.to_string()));
        }
        if data.stop_area_by_uri(uri).is_some() {
            return Ok(Selector::StopArea(uri.to_string()));
        }
        if data.line_by_uri(uri).is_some() {
            return Ok(Selector::Line(uri.to_string()));
        }
        if data.route_by_uri(uri).is_some() {
            return Ok(Selector::Route(uri.to_string()));
        }
        Err(Error::BadFilter(format!("unknown object: {uri}")))
    }

    fn schedule_request(&self, data: &Dataset, request: &ScheduleApiRequest) -> Result<ScheduleRequest, Error> {
        let filter = self.parse_selector(data, &request.filter)?;
        let from_datetime = data
            .posix_to_datetime(request.from_datetime)
            .map_err(|_| Error::DateOutOfBounds)?;
        let mut schedule = ScheduleRequest::new(
            filter,
            from_datetime,
            Duration::from_seconds(request.duration),
        );
        schedule.calendar_uri = request.calendar.clone();
        schedule.rt_level = if request.disruption_active {
            RtLevel::RealTime
        } else {
            RtLevel::Base
        };
        schedule.max_date_times = request.max_date_times as usize;
        schedule.count = request.count as usize;
        schedule.start_page = request.start_page as usize;
        schedule.forbidden_uris = request.forbidden_uris.clone();
        Ok(schedule)
    }

    fn board_entry(&self, data: &Dataset, entry: &schedules::BoardDateTime) -> request::BoardEntryResponse {
        request::BoardEntryResponse {
            date: entry.date.map(|day| data.day_to_date(day).format("%Y%m%d").to_string()),
            time: entry.time.to_hms_string(),
            vehicle_journey: data.vehicle_journeys[entry.vj_idx as usize].uri.to_string(),
        }
    }

    fn stop_schedules(&self, data: &EngineData, request: &ScheduleApiRequest) -> Result<Payload, Error> {
        let schedule_request = self.schedule_request(&data.transit, request)?;
        let boards = schedules::stop_schedules(&data.transit, &schedule_request)?;
        let transit = &data.transit;
        let schedules = boards
            .schedules
            .iter()
            .map(|board| request::StopScheduleResponse {
                stop_point: transit.stop_points[board.stop_point_idx as usize].uri.to_string(),
                route: transit.routes[board.route_idx as usize].uri.to_string(),
                date_times: board
                    .date_times
                    .iter()
                    .map(|entry| self.board_entry(transit, entry))
                    .collect(),
                response_status: board.status.map(|status| {
                    match status {
                        schedules::ResponseStatus::Terminus => "terminus",
                        schedules::ResponseStatus::PartialTerminus => "partial_terminus",
                        schedules::ResponseStatus::NoDepartureThisDay => "no_departure_this_day",
                    }
                    .to_string()
                }),
            })
            .collect::<Vec<_>>();
        Ok(Payload::StopSchedules(request::StopSchedulesResponse {
            items_per_page: boards.count,
            total_result: boards.total_result,
            start_page: boards.start_page,
            schedules,
        }))
    }

    fn next_departures(&self, data: &EngineData, request: &ScheduleApiRequest) -> Result<Payload, Error> {
        let schedule_request = self.schedule_request(&data.transit, request)?;
        let departures = schedules::next_departures(&data.transit, &schedule_request)?;
        Ok(Payload::NextDepartures(
            departures
                .iter()
                .map(|entry| self.board_entry(&data.transit, entry))
                .collect(),
        ))
    }

    fn places_nearby(&self, data: &EngineData, request: &PlacesNearbyRequest) -> Result<Payload, Error> {
        let place = journeys::resolve_place(&data.transit, &data.streets, &request.uri)
            .ok_or_else(|| Error::UnableToParse(format!("unknown place: {}", request.uri)))?;
        let found = self
            .stop_point_proximity
            .find_within(&place.coord, Distance::from_meters(request.distance));
        let places: Vec<request::PlaceNearbyResponse> = found
            .into_iter()
            .map(|(sp_idx, distance)| {
                let sp = &data.transit.stop_points[sp_idx as usize];
                request::PlaceNearbyResponse {
                    uri: sp.uri.to_string(),
                    name: sp.name.to_string(),
                    distance: distance.as_meters(),
                }
            })
            .collect();
        Ok(Payload::PlacesNearby(paginate(
            places,
            request.count as usize,
            request.start_page as usize,
        )))
    }

    fn nearest_stop_points(&mut self, data: &EngineData, request: &NearestStopPointsRequest) -> Result<Payload, Error> {
        let place = journeys::resolve_place(&data.transit, &data.streets, &request.place)
            .ok_or(Error::NoOriginPoint)?;
        let mode = Mode::parse(&request.mode)
            .ok_or_else(|| Error::UnableToParse(format!("unknown mode: {}", request.mode)))?;
        let reachable = self
            .street_worker
            .nearest_stop_points(
                &data.streets,
                &place.coord,
                mode,
                request.speed_factor,
                Duration::from_seconds(request.max_duration),
                &self.stop_point_proximity,
            )
            .map_err(|_| Error::NoOriginPoint)?;
        Ok(Payload::NearestStopPoints(
            reachable
                .into_iter()
                .map(|(sp_idx, duration)| {
                    (
                        data.transit.stop_points[sp_idx as usize].uri.to_string(),
                        duration.as_seconds(),
                    )
                })
                .collect(),
        ))
    }

    fn direct_path(&mut self, data: &EngineData, request: &DirectPathRequest) -> Result<Payload, Error> {
        let origin = journeys::resolve_place(&data.transit, &data.streets, &request.origin)
            .ok_or(Error::NoOriginPoint)?;
        let destination = journeys::resolve_place(&data.transit, &data.streets, &request.destination)
            .ok_or(Error::NoDestinationPoint)?;
        let mode = Mode::parse(&request.mode)
            .ok_or_else(|| Error::UnableToParse(format!("unknown mode: {}", request.mode)))?;
        let path = self
            .street_worker
            .direct_path(
                &data.streets,
                &origin.coord,
                &destination.coord,
                mode,
                request.speed_factor,
            )
            .map_err(|_| Error::NoSolution)?;
        let walking = if mode == Mode::Walking {
            path.duration.as_seconds()
        } else {
            0
        };
        Ok(Payload::DirectPath(Box::new(JourneyResponse {
            sections: vec![request::SectionResponse {
                kind: request::SectionKind::StreetNetwork,
                from: origin.uri,
                to: destination.uri,
                departure: request.datetime,
                arrival: request.datetime + i64::from(path.duration.as_seconds()),
                duration: path.duration.as_seconds(),
                mode: Some(mode),
                vehicle_journey: None,
                coordinates: path.coordinates.clone(),
            }],
            departure: request.datetime,
            arrival: request.datetime + i64::from(path.duration.as_seconds()),
            duration: path.duration.as_seconds(),
            nb_transfers: 0,
            walking_duration: walking,
            co2_emission: None,
            fare: None,
            most_serious_disruption_effect: None,
        })))
    }
}
