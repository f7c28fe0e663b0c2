//! Task execution.
//!
//! What a task actually does is outside the worker loop. The loop only
//! needs a yes/no answer, or an error it can record as the last failure.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use hivemind_core::{Task, WorkerSpec};

/// Errors that can occur during task execution.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Execution failed: {0}")]
    Failed(String),

    #[error("Unsupported task type: {0}")]
    Unsupported(String),

    #[error("Executor panicked: {0}")]
    Panicked(String),
}

/// Runs one task on behalf of a worker.
#[async_trait]
pub trait Executor: Send + Sync {
    /// `Ok(true)` on success, `Ok(false)` for a plain failure.
    async fn execute(&self, spec: &WorkerSpec, task: &Task) -> Result<bool, ExecutorError>;
}

/// Sleeps for a random duration and fails at a fixed rate.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    min_duration: Duration,
    max_duration: Duration,
    failure_rate: f64,
}

impl SimulatedExecutor {
    pub fn new(min_duration: Duration, max_duration: Duration) -> Self {
        Self {
            min_duration,
            max_duration: max_duration.max(min_duration),
            failure_rate: 0.0,
        }
    }

    /// Builder method to set the failure probability (clamped to [0, 1]).
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = if rate.is_finite() {
            rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(2))
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn execute(&self, spec: &WorkerSpec, task: &Task) -> Result<bool, ExecutorError> {
        if task.task_type != spec.worker_type {
            return Err(ExecutorError::Unsupported(task.task_type.clone()));
        }

        let (delay, success) = {
            let mut rng = rand::thread_rng();
            let min = self.min_duration.as_millis() as u64;
            let max = self.max_duration.as_millis() as u64;
            let delay = Duration::from_millis(rng.gen_range(min..=max));
            (delay, !rng.gen_bool(self.failure_rate))
        };

        debug!(
            task_id = %task.id,
            worker = %spec.name,
            delay_ms = delay.as_millis() as u64,
            "Simulating task"
        );
        tokio::time::sleep(delay).await;

        Ok(success)
    }
}
