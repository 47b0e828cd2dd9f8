mod api;
mod fixtures;
mod state;

use crate::state::AppState;
use axum::routing::{get, post};
use std::{env, sync::Arc, time::Instant};
use tracing::info;
use wayfarer::worker::DataManager;

const PORT: u32 = 3000;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let data_manager = Arc::new(DataManager::new());

    info!("Loading data...");
    let now = Instant::now();
    let (transit, streets) = fixtures::demo_dataset();
    data_manager.load(transit, streets);
    info!("Loading data took {:?}", now.elapsed());

    let nb_workers = env::var("WORKERS")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(4);
    let app_state = Arc::new(AppState::new(data_manager, nb_workers));

    info!("Starting server...");
    let app = axum::Router::new()
        .route("/journeys", get(api::journeys::journeys))
        .route("/stop_schedules", get(api::schedules::stop_schedules))
        .route("/next_departures", get(api::schedules::next_departures))
        .route("/realtime", post(api::realtime::trip_update))
        .route("/status", get(api::realtime::status))
        .with_state(app_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", PORT))
        .await
        .unwrap();
    info!("Listening to port {PORT}");
    axum::serve(listener, app).await.unwrap();
}
