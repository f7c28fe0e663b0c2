//! Shared application state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use hivemind_bus::MessageBus;
use hivemind_core::{AgentHealth, HiveConfig};

use crate::store::TaskStore;

/// Shared application state.
///
/// Lock order is always `tasks` before `health`.
pub struct AppState {
    /// Tasks and the pending index.
    pub tasks: RwLock<TaskStore>,

    /// Health records indexed by worker name.
    pub health: RwLock<HashMap<String, AgentHealth>>,

    /// Runtime configuration.
    pub config: Arc<HiveConfig>,

    /// Message bus used for task, health and metric events.
    pub bus: Arc<dyn MessageBus>,

    /// Instances created by the autoscaler since startup.
    scale_outs: AtomicU64,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(config: Arc<HiveConfig>, bus: Arc<dyn MessageBus>) -> Arc<Self> {
        Arc::new(Self {
            tasks: RwLock::new(TaskStore::new()),
            health: RwLock::new(HashMap::new()),
            config,
            bus,
            scale_outs: AtomicU64::new(0),
        })
    }

    /// Liveness window as a chrono duration.
    pub fn liveness_window(&self) -> chrono::Duration {
        self.config.health.liveness_window()
    }

    /// Get the number of known workers, live or not.
    pub async fn worker_count(&self) -> usize {
        self.health.read().await.len()
    }

    /// Get the number of tasks.
    pub async fn task_count(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub(crate) fn record_scale_out(&self) {
        self.scale_outs.fetch_add(1, Ordering::Relaxed);
    }

    /// Instances created by the autoscaler.
    pub fn scale_out_count(&self) -> u64 {
        self.scale_outs.load(Ordering::Relaxed)
    }
}
