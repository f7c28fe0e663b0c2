//! Task status and priority enums.

use serde::{Deserialize, Serialize};

/// Lifecycle of a Task.
///
/// Transitions only move forward:
/// `Pending -> Assigned -> Running -> {Complete | Failed}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task created but not yet handed to a worker.
    #[default]
    Pending,
    /// Task handed to a worker by the dispatcher.
    Assigned,
    /// Worker started executing the task.
    Running,
    /// Task completed successfully.
    Complete,
    /// Task failed.
    Failed,
}

impl TaskStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Assigned,
        TaskStatus::Running,
        TaskStatus::Complete,
        TaskStatus::Failed,
    ];

    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Returns true if `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Assigned)
                | (Self::Assigned, Self::Running)
                | (Self::Running, Self::Complete)
                | (Self::Running, Self::Failed)
        )
    }

    /// Lowercase label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

/// Priority of a Task. Ordered `Low < Normal < High`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Low < TaskPriority::Normal);
        assert!(TaskPriority::Normal < TaskPriority::High);
    }

    #[test]
    fn test_forward_transitions_only() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Assigned));
        assert!(TaskStatus::Assigned.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Complete));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));

        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Complete.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Complete));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Running));
    }

    #[test]
    fn test_terminal() {
        assert!(TaskStatus::Complete.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Assigned.is_terminal());
    }

    #[test]
    fn test_serde_labels() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Complete).unwrap(),
            "\"complete\""
        );
        let p: TaskPriority = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(p, TaskPriority::High);
    }
}
