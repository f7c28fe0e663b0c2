//! HTTP request and response types.

use serde::{Deserialize, Serialize};

use hivemind_core::{AgentHealth, TaskPriority};

/// Request body for `POST /v1/tasks`.
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(rename = "type")]
    pub task_type: String,

    #[serde(default)]
    pub priority: TaskPriority,

    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Worker entry in `GET /v1/workers`.
#[derive(Debug, Serialize)]
pub struct WorkerResponse {
    #[serde(flatten)]
    pub health: AgentHealth,

    /// Heartbeat inside the liveness window.
    pub live: bool,

    /// Seconds since the last heartbeat.
    pub heartbeat_age_secs: i64,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
