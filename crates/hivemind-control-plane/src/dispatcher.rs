//! Task dispatcher - hands pending tasks to live workers.
//!
//! Workers pull work. A worker is only served when its heartbeat is inside
//! the liveness window and it holds no other task; the task handed out is
//! the highest-priority pending task of the worker's type.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use hivemind_bus::{publish_json, topics};
use hivemind_core::{CoreError, Task, TaskId, TaskStatus};

use crate::state::AppState;

/// Dispatcher errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Dispatch failed: {0}")]
    Internal(String),
}

impl From<CoreError> for DispatchError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DuplicateTask(id) => DispatchError::DuplicateTask(id),
            CoreError::InvalidStateTransition { from, to } => {
                DispatchError::InvalidTransition { from, to }
            }
            other => DispatchError::Internal(other.to_string()),
        }
    }
}

/// Task dispatcher.
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<AppState>,
}

impl Dispatcher {
    /// Create a new Dispatcher.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Store a new task as pending and announce it on `task.<type>`.
    ///
    /// Creation time and status are stamped here; whatever the caller set
    /// is overwritten.
    pub async fn add_task(&self, mut task: Task) -> Result<TaskId, DispatchError> {
        task.status = TaskStatus::Pending;
        task.created_at = Utc::now();
        task.assigned_to = None;
        task.completed_at = None;

        let id = task.id.clone();
        {
            let mut tasks = self.state.tasks.write().await;
            tasks.insert(task.clone())?;
        }

        info!(
            task_id = %id,
            task_type = %task.task_type,
            priority = ?task.priority,
            "Task queued"
        );

        let topic = topics::task(&task.task_type);
        if let Err(e) = publish_json(self.state.bus.as_ref(), &topic, &task).await {
            warn!(task_id = %id, topic = %topic, error = %e, "Failed to publish task event");
        }

        Ok(id)
    }

    /// Hand the best matching pending task to `worker_name`.
    ///
    /// Returns `None` when the worker is unknown, outside the liveness
    /// window, already processing, or when nothing of its type is pending.
    pub async fn get_next_task(&self, worker_name: &str) -> Option<Task> {
        let window = self.state.liveness_window();

        let mut tasks = self.state.tasks.write().await;
        let mut health = self.state.health.write().await;

        let Some(record) = health.get_mut(worker_name) else {
            debug!(worker = %worker_name, "No health record, not dispatching");
            return None;
        };

        if !record.is_live(window) {
            warn!(
                worker = %worker_name,
                age_secs = record.heartbeat_age(Utc::now()).num_seconds(),
                "Worker heartbeat is stale, not dispatching"
            );
            return None;
        }

        if let Some(held) = tasks.holder_of(worker_name) {
            debug!(worker = %worker_name, task_id = %held, "Worker still holds a task");
            return None;
        }

        // The assignee index is authoritative. A busy flag is only honoured
        // while it names a task that is still open.
        if record.is_processing {
            let open = record
                .current_task_id
                .as_ref()
                .and_then(|id| tasks.get(id))
                .is_some_and(|task| !task.status.is_terminal());
            if open {
                return None;
            }
            debug!(
                worker = %worker_name,
                task_id = ?record.current_task_id,
                "Ignoring stale busy flag"
            );
            record.is_processing = false;
            record.current_task_id = None;
        }

        let task = tasks.take_next(&record.worker_type, worker_name)?;

        record.is_processing = true;
        record.current_task_id = Some(task.id.clone());

        info!(
            task_id = %task.id,
            worker = %worker_name,
            task_type = %task.task_type,
            priority = ?task.priority,
            "Assigned task to worker"
        );

        Some(task)
    }

    /// Apply a worker-reported status change.
    ///
    /// Unknown ids are logged and ignored. Terminal statuses release the
    /// assignee so it can be served again.
    pub async fn update_task_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
    ) -> Result<(), DispatchError> {
        let mut tasks = self.state.tasks.write().await;

        let task = match tasks.transition(task_id, status) {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!(task_id = %task_id, status = %status.as_str(), "Status update for unknown task");
                return Ok(());
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Rejected status update");
                return Err(e.into());
            }
        };

        if status.is_terminal() {
            if let Some(worker) = &task.assigned_to {
                let mut health = self.state.health.write().await;
                if let Some(record) = health.get_mut(worker) {
                    if record.current_task_id.as_ref() == Some(task_id) {
                        record.is_processing = false;
                        record.current_task_id = None;
                    }
                }
            }

            info!(
                task_id = %task_id,
                worker = task.assigned_to.as_deref().unwrap_or("-"),
                status = %status.as_str(),
                "Task finished"
            );
        } else {
            debug!(task_id = %task_id, status = %status.as_str(), "Task status updated");
        }

        Ok(())
    }

    pub async fn get_task(&self, task_id: &TaskId) -> Option<Task> {
        self.state.tasks.read().await.get(task_id).cloned()
    }

    /// All tasks, oldest first.
    pub async fn list_tasks(&self) -> Vec<Task> {
        self.state.tasks.read().await.list()
    }

    /// Pending tasks of one type.
    pub async fn pending_count(&self, task_type: &str) -> usize {
        self.state.tasks.read().await.pending_count(task_type)
    }

    /// Task count per status.
    pub async fn task_counts(&self) -> HashMap<TaskStatus, usize> {
        self.state.tasks.read().await.counts()
    }
}
