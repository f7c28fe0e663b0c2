//! Task submission and lookup handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::warn;

use hivemind_core::{Task, TaskId};

use crate::dispatcher::DispatchError;
use crate::http::responses::{CreateTaskRequest, ErrorResponse};
use crate::ControlPlane;

fn error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Queue a new task.
pub async fn create_task(
    State(plane): State<ControlPlane>,
    Json(req): Json<CreateTaskRequest>,
) -> impl IntoResponse {
    let task_type = req.task_type.trim();
    if task_type.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Task type must not be empty");
    }

    let task = Task::new(task_type, req.priority).with_payload(req.payload);
    let id = match plane.dispatcher.add_task(task).await {
        Ok(id) => id,
        Err(DispatchError::DuplicateTask(id)) => {
            return error(StatusCode::CONFLICT, format!("Duplicate task id: {id}"));
        }
        Err(e) => {
            warn!(error = %e, "Failed to queue task");
            return error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    match plane.dispatcher.get_task(&id).await {
        Some(task) => (StatusCode::CREATED, Json(task)).into_response(),
        None => error(StatusCode::INTERNAL_SERVER_ERROR, "Task vanished after insert"),
    }
}

/// List all tasks, oldest first.
pub async fn list_tasks(State(plane): State<ControlPlane>) -> impl IntoResponse {
    Json(plane.dispatcher.list_tasks().await)
}

/// Fetch one task.
pub async fn get_task(
    State(plane): State<ControlPlane>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match plane.dispatcher.get_task(&TaskId::new(id.clone())).await {
        Some(task) => Json(task).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("Task not found: {id}")),
    }
}
