use crate::{realtime::disruption::Effect, shared::Coordinate, streets::Mode};
use serde::{Deserialize, Serialize};

/// Error identifiers reproduced on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorId {
    InvalidProtobufRequest,
    UnableToParse,
    BadFilter,
    DateOutOfBounds,
    NoOriginPoint,
    NoDestinationPoint,
    NoOriginNorDestination,
    NoSolution,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub id: ErrorId,
    pub message: String,
}

/// Street-network knobs of a journey request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreetNetworkParams {
    pub origin_mode: String,
    pub destination_mode: String,
    pub speed_factor: f64,
    /// Cap on each street leg, in seconds.
    pub max_duration: u32,
    pub enable_direct_path: bool,
}

impl Default for StreetNetworkParams {
    fn default() -> Self {
        Self {
            origin_mode: "walking".into(),
            destination_mode: "walking".into(),
            speed_factor: 1.0,
            max_duration: 15 * 60,
            enable_direct_path: true,
        }
    }
}

/// An origin or destination: a place identifier plus the time it takes to
/// reach that place itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationArg {
    pub place: String,
    pub access_duration: u32,
}

impl LocationArg {
    pub fn new(place: impl Into<String>) -> Self {
        Self {
            place: place.into(),
            access_duration: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneysRequest {
    pub origin: Vec<LocationArg>,
    pub destination: Vec<LocationArg>,
    /// POSIX seconds; one search per datetime.
    pub datetimes: Vec<i64>,
    pub clockwise: bool,
    pub wheelchair: bool,
    pub disruption_active: bool,
    /// Cap on the whole journey, in seconds. Zero means unbounded.
    pub max_duration: u32,
    pub max_transfers: u32,
    pub forbidden_uris: Vec<String>,
    pub max_extra_second_pass: u32,
    pub streetnetwork_params: StreetNetworkParams,
}

impl JourneysRequest {
    pub fn between(origin: impl Into<String>, destination: impl Into<String>, datetime: i64) -> Self {
        Self {
            origin: vec![LocationArg::new(origin)],
            destination: vec![LocationArg::new(destination)],
            datetimes: vec![datetime],
            clockwise: true,
            wheelchair: false,
            disruption_active: false,
            max_duration: 0,
            max_transfers: 10,
            forbidden_uris: Vec::new(),
            max_extra_second_pass: 0,
            streetnetwork_params: StreetNetworkParams::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleApiRequest {
    /// Identifier the board is about: a stop point, stop area, line or
    /// route uri.
    pub filter: String,
    pub from_datetime: i64,
    pub duration: u32,
    pub calendar: Option<String>,
    pub disruption_active: bool,
    pub max_date_times: u32,
    pub count: u32,
    pub start_page: u32,
    pub forbidden_uris: Vec<String>,
}

impl ScheduleApiRequest {
    pub fn at(filter: impl Into<String>, from_datetime: i64, duration: u32) -> Self {
        Self {
            filter: filter.into(),
            from_datetime,
            duration,
            calendar: None,
            disruption_active: false,
            max_date_times: u32::MAX,
            count: 10,
            start_page: 0,
            forbidden_uris: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesNearbyRequest {
    pub uri: String,
    pub distance: f64,
    pub count: u32,
    pub start_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearestStopPointsRequest {
    pub place: String,
    pub mode: String,
    pub speed_factor: f64,
    pub max_duration: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectPathRequest {
    pub origin: String,
    pub destination: String,
    pub datetime: i64,
    pub mode: String,
    pub speed_factor: f64,
}

/// The tagged union of request payloads.
///
/// Kinds without a handler in this worker still parse; they answer with an
/// `invalid_protobuf_request` error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Api {
    Journeys(JourneysRequest),
    Isochrone(JourneysRequest),
    GraphicalIsochrone,
    HeatMap,
    NextDepartures(ScheduleApiRequest),
    StopSchedules(ScheduleApiRequest),
    PlacesNearby(PlacesNearbyRequest),
    PlaceUri { uri: String },
    Autocomplete,
    Ptref,
    TrafficReports,
    Calendars,
    PtObject,
    PlaceCode,
    NearestStopPoints(NearestStopPointsRequest),
    DirectPath(DirectPathRequest),
    RoutingMatrix,
    OdtStopPoints { coord: Coordinate },
    Status,
    Metadatas,
}

impl Api {
    pub fn name(&self) -> &'static str {
        match self {
            Api::Journeys(_) => "journeys",
            Api::Isochrone(_) => "isochrone",
            Api::GraphicalIsochrone => "graphical_isochrone",
            Api::HeatMap => "heat_map",
            Api::NextDepartures(_) => "next_departures",
            Api::StopSchedules(_) => "stop_schedules",
            Api::PlacesNearby(_) => "places_nearby",
            Api::PlaceUri { .. } => "place_uri",
            Api::Autocomplete => "autocomplete",
            Api::Ptref => "ptref",
            Api::TrafficReports => "traffic_reports",
            Api::Calendars => "calendars",
            Api::PtObject => "pt_object",
            Api::PlaceCode => "place_code",
            Api::NearestStopPoints(_) => "nearest_stop_points",
            Api::DirectPath(_) => "direct_path",
            Api::RoutingMatrix => "routing_matrix",
            Api::OdtStopPoints { .. } => "odt_stop_points",
            Api::Status => "status",
            Api::Metadatas => "metadatas",
        }
    }
}

/// A typed request; `request_id` keys every log line of its handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub request_id: String,
    pub api: Api,
}

// --- Response side ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    PublicTransport,
    Transfer,
    StreetNetwork,
    CrowFly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionResponse {
    pub kind: SectionKind,
    pub from: String,
    pub to: String,
    pub departure: i64,
    pub arrival: i64,
    pub duration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_journey: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub coordinates: Vec<Coordinate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyResponse {
    pub sections: Vec<SectionResponse>,
    pub departure: i64,
    pub arrival: i64,
    pub duration: u32,
    pub nb_transfers: u32,
    pub walking_duration: u32,
    /// Grams of CO₂ for the whole journey, when the modes carry a rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub co2_emission: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fare: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_serious_disruption_effect: Option<Effect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsochroneEntry {
    pub stop_point: String,
    pub duration: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardEntryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub time: String,
    pub vehicle_journey: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopScheduleResponse {
    pub stop_point: String,
    pub route: String,
    pub date_times: Vec<BoardEntryResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopSchedulesResponse {
    pub schedules: Vec<StopScheduleResponse>,
    pub total_result: usize,
    pub start_page: usize,
    pub items_per_page: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceNearbyResponse {
    pub uri: String,
    pub name: String,
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub loaded: bool,
    pub publication_date: i64,
    pub start_production_date: String,
    pub end_production_date: String,
    pub nb_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadatasResponse {
    pub start_production_date: String,
    pub end_production_date: String,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    Journeys(Vec<JourneyResponse>),
    Isochrone(Vec<IsochroneEntry>),
    NextDepartures(Vec<BoardEntryResponse>),
    StopSchedules(StopSchedulesResponse),
    PlacesNearby(Vec<PlaceNearbyResponse>),
    NearestStopPoints(Vec<(String, u32)>),
    DirectPath(Box<JourneyResponse>),
    OdtStopPoints(Vec<String>),
    Status(StatusResponse),
    Metadatas(MetadatasResponse),
}

/// A typed response: a payload or an error, plus the publication timestamp
/// of the dataset that answered (-1 when none is loaded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    pub publication_date: i64,
}

impl Response {
    pub fn from_payload(payload: Payload, publication_date: i64) -> Self {
        Self {
            payload: Some(payload),
            error: None,
            publication_date,
        }
    }

    pub fn from_error(id: ErrorId, message: impl Into<String>, publication_date: i64) -> Self {
        Self {
            payload: None,
            error: Some(ResponseError {
                id,
                message: message.into(),
            }),
            publication_date,
        }
    }
}
