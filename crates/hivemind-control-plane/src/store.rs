//! Task records and the pending index.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use hivemind_core::{CoreError, Task, TaskId, TaskPriority, TaskStatus};

/// Sort key of a pending task: highest priority first, then oldest, then
/// insertion order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PendingKey {
    priority: Reverse<TaskPriority>,
    created_at: DateTime<Utc>,
    seq: u64,
    id: TaskId,
}

/// In-memory task store.
///
/// Not synchronized; `AppState` keeps it behind a `RwLock`.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: HashMap<TaskId, Task>,
    /// Pending tasks per task type, best candidate first.
    pending: HashMap<String, BTreeSet<PendingKey>>,
    /// Worker name -> its non-terminal task.
    holders: HashMap<String, TaskId>,
    next_seq: u64,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending task.
    pub fn insert(&mut self, task: Task) -> Result<(), CoreError> {
        if self.tasks.contains_key(&task.id) {
            return Err(CoreError::DuplicateTask(task.id.to_string()));
        }
        if task.status != TaskStatus::Pending {
            return Err(CoreError::InvalidStateTransition {
                from: task.status,
                to: TaskStatus::Pending,
            });
        }

        let key = PendingKey {
            priority: Reverse(task.priority),
            created_at: task.created_at,
            seq: self.next_seq,
            id: task.id.clone(),
        };
        self.next_seq += 1;

        self.pending
            .entry(task.task_type.clone())
            .or_default()
            .insert(key);
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Non-terminal task currently held by `worker`.
    pub fn holder_of(&self, worker: &str) -> Option<&TaskId> {
        self.holders.get(worker)
    }

    /// Pop the best pending task of `task_type` and assign it to `worker`.
    pub fn take_next(&mut self, task_type: &str, worker: &str) -> Option<Task> {
        let queue = self.pending.get_mut(task_type)?;

        while let Some(key) = queue.pop_first() {
            let Some(task) = self.tasks.get_mut(&key.id) else {
                continue;
            };
            if task.status != TaskStatus::Pending {
                continue;
            }

            task.status = TaskStatus::Assigned;
            task.assigned_to = Some(worker.to_string());
            self.holders.insert(worker.to_string(), task.id.clone());
            return Some(task.clone());
        }

        None
    }

    /// Move a task forward. Returns `Ok(None)` for unknown ids.
    ///
    /// `Assigned` is only reachable through [`TaskStore::take_next`].
    pub fn transition(&mut self, id: &TaskId, next: TaskStatus) -> Result<Option<Task>, CoreError> {
        let Some(task) = self.tasks.get_mut(id) else {
            return Ok(None);
        };

        if next == TaskStatus::Assigned || !task.status.can_transition_to(next) {
            return Err(CoreError::InvalidStateTransition {
                from: task.status,
                to: next,
            });
        }

        task.status = next;
        if next.is_terminal() {
            task.completed_at = Some(Utc::now());
            if let Some(worker) = &task.assigned_to {
                if self.holders.get(worker) == Some(id) {
                    self.holders.remove(worker);
                }
            }
        }

        Ok(Some(task.clone()))
    }

    /// Pending tasks routed to `task_type`.
    pub fn pending_count(&self, task_type: &str) -> usize {
        self.pending.get(task_type).map_or(0, BTreeSet::len)
    }

    /// Count of tasks per status.
    pub fn counts(&self) -> HashMap<TaskStatus, usize> {
        let mut counts: HashMap<TaskStatus, usize> =
            TaskStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for task in self.tasks.values() {
            *counts.entry(task.status).or_default() += 1;
        }
        counts
    }

    /// All tasks, oldest first.
    pub fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(priority: TaskPriority, id: &str) -> Task {
        Task::new("quiz", priority).with_id(TaskId::new(id))
    }

    #[test]
    fn test_take_next_highest_priority_first() {
        let mut store = TaskStore::new();
        store.insert(quiz(TaskPriority::Low, "low")).unwrap();
        store.insert(quiz(TaskPriority::High, "high")).unwrap();
        store.insert(quiz(TaskPriority::Normal, "normal")).unwrap();

        let first = store.take_next("quiz", "w1").unwrap();
        assert_eq!(first.id.as_str(), "high");
        assert_eq!(first.status, TaskStatus::Assigned);
        assert_eq!(first.assigned_to.as_deref(), Some("w1"));

        assert_eq!(store.take_next("quiz", "w2").unwrap().id.as_str(), "normal");
        assert_eq!(store.take_next("quiz", "w3").unwrap().id.as_str(), "low");
        assert!(store.take_next("quiz", "w4").is_none());
    }

    #[test]
    fn test_ties_break_by_creation_then_insertion() {
        let mut store = TaskStore::new();
        let now = Utc::now();

        let mut late = quiz(TaskPriority::High, "late");
        late.created_at = now;
        let mut early = quiz(TaskPriority::High, "early");
        early.created_at = now - chrono::Duration::seconds(5);
        let mut same_a = quiz(TaskPriority::Normal, "same-a");
        same_a.created_at = now;
        let mut same_b = quiz(TaskPriority::Normal, "same-b");
        same_b.created_at = now;

        store.insert(late).unwrap();
        store.insert(same_b).unwrap();
        store.insert(early).unwrap();
        store.insert(same_a).unwrap();

        let order: Vec<String> = (0..4)
            .map(|i| {
                store
                    .take_next("quiz", &format!("w{i}"))
                    .unwrap()
                    .id
                    .into_inner()
            })
            .collect();
        assert_eq!(order, ["early", "late", "same-b", "same-a"]);
    }

    #[test]
    fn test_routing_by_type() {
        let mut store = TaskStore::new();
        store
            .insert(Task::new("challenge", TaskPriority::High))
            .unwrap();

        assert!(store.take_next("quiz", "w1").is_none());
        assert_eq!(store.pending_count("challenge"), 1);
        assert!(store.take_next("challenge", "w1").is_some());
        assert_eq!(store.pending_count("challenge"), 0);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut store = TaskStore::new();
        store.insert(quiz(TaskPriority::Low, "t")).unwrap();
        assert!(matches!(
            store.insert(quiz(TaskPriority::High, "t")),
            Err(CoreError::DuplicateTask(_))
        ));
    }

    #[test]
    fn test_transitions_are_forward_only() {
        let mut store = TaskStore::new();
        store.insert(quiz(TaskPriority::Low, "t")).unwrap();
        let id = TaskId::new("t");

        // Assignment only through take_next.
        assert!(store.transition(&id, TaskStatus::Assigned).is_err());
        assert!(store.transition(&id, TaskStatus::Running).is_err());

        store.take_next("quiz", "w1").unwrap();
        assert_eq!(store.holder_of("w1"), Some(&id));

        store.transition(&id, TaskStatus::Running).unwrap();
        let done = store.transition(&id, TaskStatus::Complete).unwrap().unwrap();
        assert!(done.completed_at.is_some());
        assert!(store.holder_of("w1").is_none());

        assert!(store.transition(&id, TaskStatus::Failed).is_err());
        assert!(store.transition(&id, TaskStatus::Pending).is_err());
    }

    #[test]
    fn test_unknown_id_is_none() {
        let mut store = TaskStore::new();
        let result = store.transition(&TaskId::new("missing"), TaskStatus::Running);
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_counts() {
        let mut store = TaskStore::new();
        store.insert(quiz(TaskPriority::Low, "a")).unwrap();
        store.insert(quiz(TaskPriority::Low, "b")).unwrap();
        store.take_next("quiz", "w1").unwrap();

        let counts = store.counts();
        assert_eq!(counts[&TaskStatus::Pending], 1);
        assert_eq!(counts[&TaskStatus::Assigned], 1);
        assert_eq!(counts[&TaskStatus::Complete], 0);
        assert_eq!(store.len(), 2);
    }
}
