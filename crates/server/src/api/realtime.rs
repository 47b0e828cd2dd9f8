use crate::{api::journeys::request_id, state::AppState};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, sync::Arc};
use tracing::warn;
use wayfarer::{
    realtime::TripUpdate,
    worker::{Api, Request},
};

/// Ingests one realtime trip update.
pub async fn trip_update(
    State(state): State<Arc<AppState>>,
    Json(update): Json<TripUpdate>,
) -> Result<Response, StatusCode> {
    match state.data_manager.apply_trip_update(&update) {
        Ok(()) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(err) => {
            warn!(%err, id = update.id, "trip update rejected");
            Err(StatusCode::UNPROCESSABLE_ENTITY)
        }
    }
}

pub async fn status(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let request = Request {
        request_id: request_id(&params),
        api: Api::Status,
    };
    let response = state.with_worker(|worker| worker.dispatch(&request));
    Json(response).into_response()
}
