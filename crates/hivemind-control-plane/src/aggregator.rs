//! Metrics aggregator.
//!
//! Workers push resource samples; on each tick the aggregator refreshes the
//! per-worker indicators from the registry and the task store, averages the
//! live workers into a [`SystemMetrics`] snapshot and optionally republishes
//! their values on `metrics.<worker>.<name>`. A tracked worker with no
//! health record, or one outside the liveness window, is left out.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hivemind_bus::{publish_json, topics};
use hivemind_core::{AgentMetrics, ResourceSample, SystemMetrics};

use crate::state::AppState;

/// Payload published on `metrics.<worker>.<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub value: f64,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Metrics aggregator.
pub struct MetricsAggregator {
    state: Arc<AppState>,
    agents: RwLock<HashMap<String, AgentMetrics>>,
    latest: RwLock<SystemMetrics>,
}

impl MetricsAggregator {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            agents: RwLock::new(HashMap::new()),
            latest: RwLock::new(SystemMetrics::default()),
        }
    }

    /// Start tracking a worker. No-op if already tracked.
    pub async fn track(&self, name: &str) {
        let mut agents = self.agents.write().await;
        if !agents.contains_key(name) {
            debug!(worker = %name, "Tracking worker metrics");
            agents.insert(name.to_string(), AgentMetrics::new(name));
        }
    }

    /// Stop tracking a worker.
    pub async fn forget(&self, name: &str) {
        self.agents.write().await.remove(name);
    }

    /// Store a resource sample, tracking the worker if needed.
    pub async fn record_sample(&self, name: &str, sample: ResourceSample) {
        let mut agents = self.agents.write().await;
        let entry = agents
            .entry(name.to_string())
            .or_insert_with(|| AgentMetrics::new(name));
        entry.cpu_usage = sample.cpu_usage;
        entry.memory_usage = sample.memory_usage;
        entry.last_updated = Utc::now();
    }

    pub async fn agent_metrics(&self, name: &str) -> Option<AgentMetrics> {
        self.agents.read().await.get(name).cloned()
    }

    pub async fn tracked_count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Most recent snapshot. All zeros before the first non-empty tick and
    /// after a tick that found no live worker.
    pub async fn latest(&self) -> SystemMetrics {
        self.latest.read().await.clone()
    }

    /// One aggregation pass.
    ///
    /// Returns `None` and clears the snapshot when no tracked worker is live.
    pub async fn aggregate_once(&self) -> Option<SystemMetrics> {
        let window = self.state.liveness_window();
        // Snapshot the registry and the queues first so no store lock is
        // held while the metric table is written.
        let health = self.state.all_health().await;
        let queue_depths: HashMap<String, usize> = {
            let tasks = self.state.tasks.read().await;
            health
                .iter()
                .map(|h| (h.worker_type.clone(), tasks.pending_count(&h.worker_type)))
                .collect()
        };
        let health: HashMap<String, _> = health
            .into_iter()
            .map(|h| (h.agent_name.clone(), h))
            .collect();

        let snapshot: Vec<AgentMetrics> = {
            let mut agents = self.agents.write().await;
            let now = Utc::now();
            let mut live = Vec::with_capacity(agents.len());
            for (name, metrics) in agents.iter_mut() {
                let Some(record) = health.get(name) else {
                    continue;
                };
                if !record.is_live_at(now, window) {
                    continue;
                }
                metrics.tasks_in_queue =
                    queue_depths.get(&record.worker_type).copied().unwrap_or(0);
                metrics.response_time = record.processing_time;
                metrics.error_rate = record.error_rate();
                metrics.last_updated = now;
                live.push(metrics.clone());
            }
            live
        };

        let Some(system) = SystemMetrics::aggregate(&snapshot) else {
            debug!("No live workers, skipping aggregation");
            *self.latest.write().await = SystemMetrics::default();
            return None;
        };

        *self.latest.write().await = system.clone();
        debug!(
            population = system.population,
            cpu = system.cpu_usage,
            memory = system.memory_usage,
            queue_depth = system.queue_depth,
            error_rate = system.error_rate,
            "Aggregated system metrics"
        );

        if self.state.config.metrics.publish_metrics {
            self.publish(&snapshot).await;
        }

        Some(system)
    }

    async fn publish(&self, snapshot: &[AgentMetrics]) {
        let timestamp = Utc::now().timestamp();
        for metrics in snapshot {
            for (name, value) in metrics.published_values() {
                let topic = topics::metric(&metrics.agent_name, name);
                let point = MetricPoint { value, timestamp };
                if let Err(e) = publish_json(self.state.bus.as_ref(), &topic, &point).await {
                    warn!(topic = %topic, error = %e, "Failed to publish metric");
                }
            }
        }
    }

    /// Aggregate every `aggregation_interval` until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.state.config.metrics.aggregation_interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = period.as_millis() as u64, "Metrics aggregator started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.aggregate_once().await;
                }
            }
        }

        info!("Metrics aggregator stopped");
    }
}
