//! Core domain errors.

use thiserror::Error;

use crate::TaskStatus;

/// Core domain errors for HiveMind.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A task with this id is already stored.
    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    /// Status transition that would move a task backwards or skip a stage.
    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },

    /// Configuration value out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
