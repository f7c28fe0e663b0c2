//! Worker health records carried by heartbeats.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::TaskId;

/// Health snapshot of a single worker, keyed by `agent_name`.
///
/// Liveness is never stored; it is derived from `last_heartbeat` on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealth {
    /// Worker name (registry key).
    pub agent_name: String,

    /// Task type this worker accepts.
    pub worker_type: String,

    /// When the worker last reported in.
    pub last_heartbeat: DateTime<Utc>,

    /// Whether the worker is executing a task.
    pub is_processing: bool,

    /// Task being executed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<TaskId>,

    /// Exponential moving average of task duration, in seconds.
    pub processing_time: f64,

    /// Ratio of successful tasks, in [0, 1].
    pub success_rate: f64,

    /// Last execution error reported by the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// When `last_error` happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_time: Option<DateTime<Utc>>,
}

impl AgentHealth {
    /// Fresh, idle record stamped now.
    pub fn new(agent_name: impl Into<String>, worker_type: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            worker_type: worker_type.into(),
            last_heartbeat: Utc::now(),
            is_processing: false,
            current_task_id: None,
            processing_time: 0.0,
            success_rate: 1.0,
            last_error: None,
            last_error_time: None,
        }
    }

    /// Builder method to backdate the heartbeat (useful for testing).
    pub fn with_last_heartbeat(mut self, at: DateTime<Utc>) -> Self {
        self.last_heartbeat = at;
        self
    }

    /// Age of the last heartbeat relative to `now`.
    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_heartbeat
    }

    /// `now - last_heartbeat < window`.
    pub fn is_live_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.heartbeat_age(now) < window
    }

    /// Liveness against the current clock.
    pub fn is_live(&self, window: Duration) -> bool {
        self.is_live_at(Utc::now(), window)
    }

    /// Live and not holding a task.
    pub fn is_available(&self, window: Duration) -> bool {
        !self.is_processing && self.is_live(window)
    }

    /// Failure ratio derived from `success_rate`.
    pub fn error_rate(&self) -> f64 {
        (1.0 - self.success_rate).clamp(0.0, 1.0)
    }
}
