use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, sync::Arc};
use wayfarer::worker::{Api, JourneysRequest, Request};

pub async fn journeys(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, StatusCode> {
    let from = params.get("from").ok_or(StatusCode::BAD_REQUEST)?;
    let to = params.get("to").ok_or(StatusCode::BAD_REQUEST)?;
    let datetime: i64 = params
        .get("datetime")
        .ok_or(StatusCode::BAD_REQUEST)?
        .parse()
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let mut journeys_request = JourneysRequest::between(from, to, datetime);
    if let Some(clockwise) = params.get("clockwise") {
        journeys_request.clockwise = clockwise != "false";
    }
    if let Some(wheelchair) = params.get("wheelchair") {
        journeys_request.wheelchair = wheelchair == "true";
    }
    if let Some(active) = params.get("disruption_active") {
        journeys_request.disruption_active = active == "true";
    }
    if let Some(max_duration) = params.get("max_duration") {
        journeys_request.max_duration = max_duration.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    }

    let request = Request {
        request_id: request_id(&params),
        api: Api::Journeys(journeys_request),
    };
    let response = state.with_worker(|worker| worker.dispatch(&request));
    Ok(Json(response).into_response())
}

pub fn request_id(params: &HashMap<String, String>) -> String {
    params
        .get("request_id")
        .cloned()
        .unwrap_or_else(|| "http".to_string())
}
