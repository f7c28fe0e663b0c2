//! Worker list handler.

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;

use crate::http::responses::WorkerResponse;
use crate::ControlPlane;

/// List every known worker with its derived liveness.
pub async fn list_workers(State(plane): State<ControlPlane>) -> impl IntoResponse {
    let window = plane.state.liveness_window();
    let now = Utc::now();

    let response: Vec<WorkerResponse> = plane
        .state
        .all_health()
        .await
        .into_iter()
        .map(|health| WorkerResponse {
            live: health.is_live_at(now, window),
            heartbeat_age_secs: health.heartbeat_age(now).num_seconds(),
            health,
        })
        .collect();
    Json(response)
}
