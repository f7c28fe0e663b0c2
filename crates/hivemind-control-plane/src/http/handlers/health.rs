//! Health and metrics handlers.

use axum::{extract::State, http::header, response::IntoResponse, Json};

use crate::ControlPlane;

/// Health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler(State(plane): State<ControlPlane>) -> impl IntoResponse {
    let body = crate::metrics::collect_metrics(&plane).await;
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

/// Latest aggregated system metrics as JSON.
pub async fn system_metrics(State(plane): State<ControlPlane>) -> impl IntoResponse {
    Json(plane.aggregator.latest().await)
}
