use crate::{api::journeys::request_id, state::AppState};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, sync::Arc};
use wayfarer::worker::{Api, Request, ScheduleApiRequest};

pub async fn stop_schedules(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, StatusCode> {
    schedule_api(params, state, true).await
}

pub async fn next_departures(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, StatusCode> {
    schedule_api(params, state, false).await
}

async fn schedule_api(
    params: HashMap<String, String>,
    state: Arc<AppState>,
    boards: bool,
) -> Result<Response, StatusCode> {
    let filter = params.get("filter").ok_or(StatusCode::BAD_REQUEST)?;
    let from_datetime: i64 = params
        .get("from_datetime")
        .ok_or(StatusCode::BAD_REQUEST)?
        .parse()
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let duration: u32 = params
        .get("duration")
        .map(|d| d.parse())
        .transpose()
        .map_err(|_| StatusCode::BAD_REQUEST)?
        .unwrap_or(86_400);

    let mut schedule_request = ScheduleApiRequest::at(filter, from_datetime, duration);
    schedule_request.calendar = params.get("calendar").cloned();
    if let Some(active) = params.get("disruption_active") {
        schedule_request.disruption_active = active == "true";
    }
    if let Some(count) = params.get("count") {
        schedule_request.count = count.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    }
    if let Some(start_page) = params.get("start_page") {
        schedule_request.start_page = start_page.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    }

    let request = Request {
        request_id: request_id(&params),
        api: if boards {
            Api::StopSchedules(schedule_request)
        } else {
            Api::NextDepartures(schedule_request)
        },
    };
    let response = state.with_worker(|worker| worker.dispatch(&request));
    Ok(Json(response).into_response())
}
