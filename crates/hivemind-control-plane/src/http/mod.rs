//! HTTP server for the control plane.
//!
//! Provides endpoints for:
//! - Task submission and listing (`/v1/tasks`)
//! - Worker health list (`/v1/workers`)
//! - Latest aggregated metrics (`/v1/metrics/system`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ControlPlane;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(plane: ControlPlane) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // API routes
        .route("/v1/tasks", post(handlers::create_task).get(handlers::list_tasks))
        .route("/v1/tasks/:id", get(handlers::get_task))
        .route("/v1/workers", get(handlers::list_workers))
        .route("/v1/metrics/system", get(handlers::system_metrics))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(plane)
}
