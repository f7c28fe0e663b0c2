//! Task type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TaskId, TaskPriority, TaskStatus};

/// A discrete unit of work routed to workers by `task_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Work kind used for routing (e.g. "quiz", "challenge").
    #[serde(rename = "type")]
    pub task_type: String,

    /// Dispatch priority.
    pub priority: TaskPriority,

    /// Current lifecycle status.
    pub status: TaskStatus,

    /// Opaque payload handed to the executor.
    #[serde(default)]
    pub payload: serde_json::Value,

    /// When the task entered the store.
    pub created_at: DateTime<Utc>,

    /// Worker holding the task, once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    /// When the task reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending Task.
    pub fn new(task_type: impl Into<String>, priority: TaskPriority) -> Self {
        Self {
            id: TaskId::generate(),
            task_type: task_type.into(),
            priority,
            status: TaskStatus::Pending,
            payload: serde_json::Value::Null,
            created_at: Utc::now(),
            assigned_to: None,
            completed_at: None,
        }
    }

    /// Builder method to attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock time between creation and completion, if finished.
    pub fn turnaround(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.created_at)
    }
}
