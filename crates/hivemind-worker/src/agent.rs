//! Worker agent actor.
//!
//! A running agent owns three activities, all tied to one cancellation
//! token:
//! - heartbeat: publishes its [`AgentHealth`] on `health.<name>`
//! - sampler: pushes a [`ResourceSample`] to the metrics aggregator
//! - poll loop: pulls from the dispatcher and executes what it gets
//!
//! A task in flight is never interrupted; stopping waits for it.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hivemind_bus::{publish_json, topics, BusError, MessageBus};
use hivemind_control_plane::{ControlPlane, Dispatcher, MetricsAggregator};
use hivemind_core::{AgentHealth, HiveConfig, ResourceSample, Task, TaskId, TaskStatus, WorkerSpec};

use crate::executor::{Executor, ExecutorError};
use crate::memory::{MemoryItem, MemoryStore};
use crate::probe::ResourceProbe;
use crate::stats::TaskStats;

/// Everything an agent talks to.
#[derive(Clone)]
pub struct WorkerDeps {
    pub dispatcher: Dispatcher,
    pub aggregator: Arc<MetricsAggregator>,
    pub bus: Arc<dyn MessageBus>,
    pub config: Arc<HiveConfig>,
    pub executor: Arc<dyn Executor>,
    pub probe: Arc<dyn ResourceProbe>,
    pub memory: Option<Arc<dyn MemoryStore>>,
}

impl WorkerDeps {
    pub fn new(
        plane: &ControlPlane,
        executor: Arc<dyn Executor>,
        probe: Arc<dyn ResourceProbe>,
    ) -> Self {
        Self {
            dispatcher: plane.dispatcher.clone(),
            aggregator: plane.aggregator.clone(),
            bus: plane.state.bus.clone(),
            config: plane.state.config.clone(),
            executor,
            probe,
            memory: None,
        }
    }

    /// Builder method to record task outcomes in `memory`.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }
}

/// Result of one executed task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub duration_secs: f64,
    pub error: Option<String>,
}

struct AgentState {
    health: AgentHealth,
    stats: TaskStats,
}

struct AgentInner {
    spec: WorkerSpec,
    deps: WorkerDeps,
    state: RwLock<AgentState>,
}

/// A worker agent. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct WorkerAgent {
    inner: Arc<AgentInner>,
}

impl WorkerAgent {
    pub fn new(spec: WorkerSpec, deps: WorkerDeps) -> Self {
        let health = AgentHealth::new(spec.name.clone(), spec.worker_type.clone());
        Self {
            inner: Arc::new(AgentInner {
                spec,
                deps,
                state: RwLock::new(AgentState {
                    health,
                    stats: TaskStats::default(),
                }),
            }),
        }
    }

    /// Create an agent and start its activities.
    pub fn spawn(spec: WorkerSpec, deps: WorkerDeps) -> WorkerHandle {
        Self::new(spec, deps).start()
    }

    /// Start the heartbeat, sampler and poll activities.
    pub fn start(self) -> WorkerHandle {
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        tasks.spawn(self.clone().heartbeat_loop(cancel.clone()));
        tasks.spawn(self.clone().sampler_loop(cancel.clone()));
        tasks.spawn(self.clone().poll_loop(cancel.clone()));

        info!(
            worker = %self.name(),
            worker_type = %self.spec().worker_type,
            "Worker started"
        );

        WorkerHandle {
            agent: self,
            cancel,
            tasks: Mutex::new(Some(tasks)),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.spec.name
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.inner.spec
    }

    pub async fn stats(&self) -> TaskStats {
        self.inner.state.read().await.stats
    }

    /// Current health record.
    pub async fn health(&self) -> AgentHealth {
        self.inner.state.read().await.health.clone()
    }

    /// Stamp and publish the health record.
    pub async fn emit_heartbeat(&self) -> Result<(), BusError> {
        let record = {
            let mut state = self.inner.state.write().await;
            state.health.last_heartbeat = Utc::now();
            state.health.clone()
        };

        debug!(worker = %self.name(), processing = record.is_processing, "Sending heartbeat");
        publish_json(
            self.inner.deps.bus.as_ref(),
            &topics::health(self.name()),
            &record,
        )
        .await
    }

    /// Take one resource sample and hand it to the aggregator.
    pub async fn sample_resources(&self) -> ResourceSample {
        let sample = self.inner.deps.probe.sample();
        self.inner
            .deps
            .aggregator
            .record_sample(self.name(), sample)
            .await;
        sample
    }

    /// Ask for a task and, if one is handed out, run it to completion.
    pub async fn poll_once(&self) -> Option<TaskOutcome> {
        let deps = &self.inner.deps;
        let task = deps.dispatcher.get_next_task(self.name()).await?;

        {
            let mut state = self.inner.state.write().await;
            state.health.is_processing = true;
            state.health.current_task_id = Some(task.id.clone());
        }

        if let Err(e) = deps
            .dispatcher
            .update_task_status(&task.id, TaskStatus::Running)
            .await
        {
            warn!(task_id = %task.id, error = %e, "Failed to mark task running");
        }

        info!(task_id = %task.id, worker = %self.name(), "Executing task");

        let started = Instant::now();
        let result = self.execute(&task).await;
        let duration_secs = started.elapsed().as_secs_f64();

        let (status, error) = match result {
            Ok(true) => (TaskStatus::Complete, None),
            Ok(false) => (TaskStatus::Failed, Some("executor reported failure".to_string())),
            Err(e) => (TaskStatus::Failed, Some(e.to_string())),
        };

        // Go idle locally first so no heartbeat after the report claims the
        // finished task.
        {
            let mut state = self.inner.state.write().await;
            state.stats.record(duration_secs, status == TaskStatus::Complete);
            state.health.processing_time = state.stats.processing_time_estimate();
            state.health.success_rate = state.stats.success_rate();
            if let Some(message) = &error {
                state.health.last_error = Some(message.clone());
                state.health.last_error_time = Some(Utc::now());
            }
            state.health.is_processing = false;
            state.health.current_task_id = None;
        }

        if let Err(e) = deps.dispatcher.update_task_status(&task.id, status).await {
            warn!(task_id = %task.id, error = %e, "Failed to report task outcome");
        }

        match &error {
            None => info!(
                task_id = %task.id,
                worker = %self.name(),
                duration_secs,
                "Task complete"
            ),
            Some(message) => warn!(
                task_id = %task.id,
                worker = %self.name(),
                duration_secs,
                error = %message,
                "Task failed"
            ),
        }

        self.remember(&task, status, duration_secs).await;

        Some(TaskOutcome {
            task_id: task.id,
            status,
            duration_secs,
            error,
        })
    }

    /// Run the executor on its own task so a panic becomes a failure.
    async fn execute(&self, task: &Task) -> Result<bool, ExecutorError> {
        let executor = self.inner.deps.executor.clone();
        let spec = self.inner.spec.clone();
        let task = task.clone();

        match tokio::spawn(async move { executor.execute(&spec, &task).await }).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(ExecutorError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(ExecutorError::Failed(e.to_string())),
        }
    }

    async fn remember(&self, task: &Task, status: TaskStatus, duration_secs: f64) {
        let Some(memory) = &self.inner.deps.memory else {
            return;
        };

        let failed = status == TaskStatus::Failed;
        let item = MemoryItem::new(
            self.name(),
            json!({
                "task_id": task.id,
                "type": task.task_type,
                "status": status,
                "duration_secs": duration_secs,
            }),
            if failed { 0.8 } else { 0.5 },
        )
        .with_tags(["task", task.task_type.as_str(), if failed { "failed" } else { "complete" }]);

        if let Err(e) = memory.store(item).await {
            warn!(worker = %self.name(), error = %e, "Failed to record task in memory");
        }
    }

    async fn heartbeat_loop(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.deps.config.worker.heartbeat_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.emit_heartbeat().await {
                        error!(worker = %self.name(), error = %e, "Failed to publish heartbeat");
                    }
                }
            }
        }
    }

    async fn sampler_loop(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.deps.config.worker.sample_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sample_resources().await;
                }
            }
        }
    }

    async fn poll_loop(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.deps.config.worker.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a running agent.
pub struct WorkerHandle {
    agent: WorkerAgent,
    cancel: CancellationToken,
    tasks: Mutex<Option<JoinSet<()>>>,
}

impl WorkerHandle {
    pub fn agent(&self) -> &WorkerAgent {
        &self.agent
    }

    pub fn name(&self) -> &str {
        self.agent.name()
    }

    pub fn spec(&self) -> &WorkerSpec {
        self.agent.spec()
    }

    pub async fn stats(&self) -> TaskStats {
        self.agent.stats().await
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel every activity and wait for all of them to exit.
    ///
    /// A task in flight finishes first. Calling again is a no-op.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let Some(mut tasks) = self.tasks.lock().await.take() else {
            return;
        };

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(worker = %self.name(), error = %e, "Worker activity ended abnormally");
            }
        }

        info!(worker = %self.name(), "Worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use hivemind_bus::InMemoryBus;
    use hivemind_core::TaskPriority;

    use super::*;
    use crate::memory::InMemoryStore;
    use crate::probe::FixedProbe;

    /// Returns scripted answers in order, then succeeds.
    struct ScriptedExecutor {
        answers: Vec<Result<bool, &'static str>>,
        calls: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn new(answers: Vec<Result<bool, &'static str>>) -> Arc<Self> {
            Arc::new(Self {
                answers,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        async fn execute(&self, _spec: &WorkerSpec, _task: &Task) -> Result<bool, ExecutorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answers.get(n).copied().unwrap_or(Ok(true)) {
                Ok(success) => Ok(success),
                Err("panic") => panic!("executor blew up"),
                Err(message) => Err(ExecutorError::Failed(message.to_string())),
            }
        }
    }

    fn plane() -> ControlPlane {
        ControlPlane::new(Arc::new(HiveConfig::default()), Arc::new(InMemoryBus::new()))
    }

    async fn agent(plane: &ControlPlane, executor: Arc<dyn Executor>) -> WorkerAgent {
        let spec = WorkerSpec::new("quiz-worker", "quiz").with_role("Quiz master");
        plane.state.register_worker(&spec.name, &spec.worker_type).await;
        WorkerAgent::new(spec, WorkerDeps::new(plane, executor, Arc::new(FixedProbe::new(10.0, 20.0))))
    }

    #[tokio::test]
    async fn test_quiz_scenario_end_to_end() {
        let plane = plane();
        let agent = agent(&plane, ScriptedExecutor::new(vec![])).await;

        let _low = plane.dispatcher.add_task(Task::new("quiz", TaskPriority::Low)).await.unwrap();
        let normal = plane
            .dispatcher
            .add_task(Task::new("quiz", TaskPriority::Normal))
            .await
            .unwrap();
        let high = plane
            .dispatcher
            .add_task(Task::new("quiz", TaskPriority::High))
            .await
            .unwrap();

        let outcome = agent.poll_once().await.unwrap();
        assert_eq!(outcome.task_id, high);
        assert_eq!(outcome.status, TaskStatus::Complete);

        let done = plane.dispatcher.get_task(&high).await.unwrap();
        assert_eq!(done.status, TaskStatus::Complete);
        assert!(done.completed_at.is_some());
        assert_eq!(done.assigned_to.as_deref(), Some("quiz-worker"));

        assert_eq!(agent.poll_once().await.unwrap().task_id, normal);
    }

    #[tokio::test]
    async fn test_heartbeat_after_task_reports_idle() {
        let plane = plane();
        let mut sub = plane.state.bus.subscribe(topics::HEALTH_ALL).await.unwrap();
        let agent = agent(&plane, ScriptedExecutor::new(vec![])).await;

        let first = plane.dispatcher.add_task(Task::new("quiz", TaskPriority::High)).await.unwrap();
        let second = plane.dispatcher.add_task(Task::new("quiz", TaskPriority::Low)).await.unwrap();

        assert_eq!(agent.poll_once().await.unwrap().task_id, first);

        agent.emit_heartbeat().await.unwrap();
        let record: AgentHealth = sub.recv().await.unwrap().decode_json().unwrap();
        assert!(!record.is_processing);
        assert!(record.current_task_id.is_none());
        plane.state.upsert_health(record).await;

        assert_eq!(agent.poll_once().await.unwrap().task_id, second);
    }

    #[tokio::test]
    async fn test_failures_recorded() {
        let plane = plane();
        let agent = agent(
            &plane,
            ScriptedExecutor::new(vec![Ok(false), Err("boom"), Err("panic")]),
        )
        .await;

        for _ in 0..4 {
            plane
                .dispatcher
                .add_task(Task::new("quiz", TaskPriority::Normal))
                .await
                .unwrap();
        }

        let declined = agent.poll_once().await.unwrap();
        assert_eq!(declined.status, TaskStatus::Failed);

        let errored = agent.poll_once().await.unwrap();
        assert_eq!(errored.status, TaskStatus::Failed);
        assert!(errored.error.unwrap().contains("boom"));

        let panicked = agent.poll_once().await.unwrap();
        assert_eq!(panicked.status, TaskStatus::Failed);
        assert!(panicked.error.unwrap().contains("executor blew up"));

        let ok = agent.poll_once().await.unwrap();
        assert_eq!(ok.status, TaskStatus::Complete);

        let stats = agent.stats().await;
        assert_eq!(stats.total, 4);
        assert_eq!(stats.succeeded, 1);

        let health = agent.health().await;
        assert_eq!(health.success_rate, 0.25);
        assert!(health.last_error.is_some());
        assert!(!health.is_processing);
        assert!(health.current_task_id.is_none());

        let counts = plane.dispatcher.task_counts().await;
        assert_eq!(counts[&TaskStatus::Failed], 3);
        assert_eq!(counts[&TaskStatus::Complete], 1);
    }

    #[tokio::test]
    async fn test_poll_without_work() {
        let plane = plane();
        let agent = agent(&plane, ScriptedExecutor::new(vec![])).await;
        assert!(agent.poll_once().await.is_none());
        assert_eq!(agent.stats().await.total, 0);
    }

    #[tokio::test]
    async fn test_heartbeat_publishes_health() {
        let plane = plane();
        let mut sub = plane.state.bus.subscribe(topics::HEALTH_ALL).await.unwrap();
        let agent = agent(&plane, ScriptedExecutor::new(vec![])).await;

        agent.emit_heartbeat().await.unwrap();

        let delivery = sub.recv().await.unwrap();
        assert_eq!(delivery.topic, "health.quiz-worker");
        let record: AgentHealth = delivery.decode_json().unwrap();
        assert_eq!(record.agent_name, "quiz-worker");
        assert_eq!(record.worker_type, "quiz");
    }

    #[tokio::test]
    async fn test_sampler_feeds_aggregator() {
        let plane = plane();
        let agent = agent(&plane, ScriptedExecutor::new(vec![])).await;

        agent.sample_resources().await;

        let metrics = plane.aggregator.agent_metrics("quiz-worker").await.unwrap();
        assert_eq!(metrics.cpu_usage, 10.0);
        assert_eq!(metrics.memory_usage, 20.0);
    }

    #[tokio::test]
    async fn test_outcomes_recorded_in_memory() {
        let plane = plane();
        let memory = Arc::new(InMemoryStore::default());
        let spec = WorkerSpec::new("quiz-worker", "quiz");
        plane.state.register_worker("quiz-worker", "quiz").await;
        let deps = WorkerDeps::new(
            &plane,
            ScriptedExecutor::new(vec![Ok(false)]),
            Arc::new(FixedProbe::default()),
        )
        .with_memory(memory.clone());
        let agent = WorkerAgent::new(spec, deps);

        plane
            .dispatcher
            .add_task(Task::new("quiz", TaskPriority::Normal))
            .await
            .unwrap();
        agent.poll_once().await.unwrap();

        let tags = vec!["task".to_string(), "quiz".to_string(), "failed".to_string()];
        let found = memory.search("quiz-worker", &tags).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].importance, 0.8);
    }

    #[tokio::test]
    async fn test_running_agent_drains_queue_and_stops() {
        let mut config = HiveConfig::default();
        config.worker.poll_interval_ms = 10;
        config.worker.heartbeat_interval_ms = 20;
        config.worker.sample_interval_ms = 20;
        let plane = ControlPlane::new(Arc::new(config), Arc::new(InMemoryBus::new()));

        for _ in 0..3 {
            plane
                .dispatcher
                .add_task(Task::new("quiz", TaskPriority::Normal))
                .await
                .unwrap();
        }

        let spec = WorkerSpec::new("quiz-worker", "quiz");
        plane.state.register_worker("quiz-worker", "quiz").await;
        let deps = WorkerDeps::new(
            &plane,
            ScriptedExecutor::new(vec![]),
            Arc::new(FixedProbe::default()),
        );
        let handle = WorkerAgent::spawn(spec, deps);

        let mut done = false;
        for _ in 0..200 {
            if handle.stats().await.total == 3 {
                done = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(done, "worker did not drain the queue");

        handle.stop().await;
        assert!(handle.is_stopped());
        // Second stop is a no-op.
        handle.stop().await;

        plane
            .dispatcher
            .add_task(Task::new("quiz", TaskPriority::Normal))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.stats().await.total, 3);
        assert_eq!(plane.dispatcher.pending_count("quiz").await, 1);
    }
}
