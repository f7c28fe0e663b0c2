//! Health registry and the heartbeat consumer.
//!
//! Records are keyed by worker name and replaced wholesale by each
//! heartbeat. Liveness is computed on read against the configured window.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hivemind_bus::{topics, BusError, Delivery, Subscription};
use hivemind_core::AgentHealth;

use crate::state::AppState;

impl AppState {
    /// Insert or replace a worker's health record. Last write wins.
    pub async fn upsert_health(&self, record: AgentHealth) {
        let mut health = self.health.write().await;
        if !health.contains_key(&record.agent_name) {
            info!(
                worker = %record.agent_name,
                worker_type = %record.worker_type,
                "Worker registered"
            );
        }
        health.insert(record.agent_name.clone(), record);
    }

    /// Register a fresh, idle record stamped now.
    pub async fn register_worker(&self, name: &str, worker_type: &str) -> AgentHealth {
        let record = AgentHealth::new(name, worker_type);
        self.upsert_health(record.clone()).await;
        record
    }

    pub async fn get_health(&self, name: &str) -> Option<AgentHealth> {
        self.health.read().await.get(name).cloned()
    }

    /// Whether `name` heartbeated inside the liveness window.
    pub async fn is_live(&self, name: &str) -> bool {
        let window = self.liveness_window();
        self.health
            .read()
            .await
            .get(name)
            .is_some_and(|h| h.is_live(window))
    }

    /// Records inside the liveness window, sorted by name.
    pub async fn live_workers(&self) -> Vec<AgentHealth> {
        let window = self.liveness_window();
        let now = Utc::now();
        let mut live: Vec<AgentHealth> = self
            .health
            .read()
            .await
            .values()
            .filter(|h| h.is_live_at(now, window))
            .cloned()
            .collect();
        live.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));
        live
    }

    /// Every record, live or stale, sorted by name.
    pub async fn all_health(&self) -> Vec<AgentHealth> {
        let mut all: Vec<AgentHealth> = self.health.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));
        all
    }
}

/// Subscribe to `health.*` and spawn the consumer loop.
///
/// The subscription is made before returning so a failure surfaces to the
/// caller instead of inside the task.
pub async fn spawn_health_consumer(
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, BusError> {
    let subscription = state.bus.subscribe(topics::HEALTH_ALL).await?;
    Ok(tokio::spawn(run_health_consumer(state, subscription, cancel)))
}

/// Apply heartbeats from `subscription` until cancelled or the bus closes.
pub async fn run_health_consumer(
    state: Arc<AppState>,
    mut subscription: Subscription,
    cancel: CancellationToken,
) {
    info!(pattern = %subscription.pattern(), "Health consumer started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            delivery = subscription.recv() => {
                let Some(delivery) = delivery else {
                    warn!("Health subscription closed");
                    break;
                };
                apply_heartbeat(&state, &delivery).await;
            }
        }
    }

    info!("Health consumer stopped");
}

async fn apply_heartbeat(state: &AppState, delivery: &Delivery) {
    match delivery.decode_json::<AgentHealth>() {
        Ok(record) => {
            debug!(
                worker = %record.agent_name,
                processing = record.is_processing,
                "Heartbeat"
            );
            state.upsert_health(record).await;
        }
        Err(e) => {
            warn!(topic = %delivery.topic, error = %e, "Dropping malformed heartbeat");
        }
    }
}
