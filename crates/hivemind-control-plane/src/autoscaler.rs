//! Threshold autoscaler with a cooldown.
//!
//! Scale-out is decided on the aggregator's latest snapshot. The cooldown
//! timestamp is read, tested and written under one lock so concurrent
//! evaluations can never both pass the gate.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hivemind_core::{ScalingConfig, SystemMetrics};

use crate::aggregator::MetricsAggregator;
use crate::fleet::{FleetError, InstanceInfo, WorkerFleet};
use crate::state::AppState;

/// A threshold that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Breach {
    Cpu(f64),
    Memory(f64),
    QueueDepth(f64),
    ErrorRate(f64),
}

impl Breach {
    pub fn name(&self) -> &'static str {
        match self {
            Breach::Cpu(_) => "cpu",
            Breach::Memory(_) => "memory",
            Breach::QueueDepth(_) => "queue_depth",
            Breach::ErrorRate(_) => "error_rate",
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Breach::Cpu(v) | Breach::Memory(v) | Breach::QueueDepth(v) | Breach::ErrorRate(v) => *v,
        }
    }
}

/// Thresholds strictly exceeded by `metrics`.
pub fn breaches(config: &ScalingConfig, metrics: &SystemMetrics) -> Vec<Breach> {
    let mut out = Vec::new();
    if metrics.cpu_usage > config.cpu_threshold {
        out.push(Breach::Cpu(metrics.cpu_usage));
    }
    if metrics.memory_usage > config.memory_threshold {
        out.push(Breach::Memory(metrics.memory_usage));
    }
    if metrics.queue_depth > config.queue_depth_threshold {
        out.push(Breach::QueueDepth(metrics.queue_depth));
    }
    if metrics.error_rate > config.error_rate_threshold {
        out.push(Breach::ErrorRate(metrics.error_rate));
    }
    out
}

/// Autoscaler.
pub struct Autoscaler {
    state: Arc<AppState>,
    aggregator: Arc<MetricsAggregator>,
    fleet: Arc<dyn WorkerFleet>,
    /// `None` until the first scale-out.
    last_scale: Mutex<Option<Instant>>,
}

impl Autoscaler {
    pub fn new(
        state: Arc<AppState>,
        aggregator: Arc<MetricsAggregator>,
        fleet: Arc<dyn WorkerFleet>,
    ) -> Self {
        Self {
            state,
            aggregator,
            fleet,
            last_scale: Mutex::new(None),
        }
    }

    fn config(&self) -> &ScalingConfig {
        &self.state.config.scaling
    }

    /// Decide whether to scale now.
    ///
    /// Returns true at most once per cooldown period and stamps the
    /// cooldown when it does.
    pub async fn check_scaling(&self) -> bool {
        let metrics = self.aggregator.latest().await;

        let mut last = self.last_scale.lock().await;
        if let Some(at) = *last {
            if at.elapsed() < self.config().cooldown() {
                return false;
            }
        }

        let breached = breaches(self.config(), &metrics);
        if breached.is_empty() {
            return false;
        }

        for breach in &breached {
            warn!(metric = breach.name(), value = breach.value(), "Scaling threshold exceeded");
        }

        *last = Some(Instant::now());
        true
    }

    /// Clone one overloaded live instance per template.
    ///
    /// Returns the instances created. A failed clone is logged and does
    /// not stop the other templates.
    pub async fn scale_system(&self) -> Vec<InstanceInfo> {
        let overload = self.config().overload_processing_secs;

        let mut by_template: BTreeMap<String, Vec<InstanceInfo>> = BTreeMap::new();
        for instance in self.fleet.instances().await {
            by_template
                .entry(instance.template.clone())
                .or_default()
                .push(instance);
        }

        let live: BTreeMap<String, f64> = self
            .state
            .live_workers()
            .await
            .into_iter()
            .map(|h| (h.agent_name, h.processing_time))
            .collect();

        let mut created = Vec::new();
        for (template, instances) in by_template {
            let overloaded = instances
                .iter()
                .find(|i| live.get(&i.name).is_some_and(|t| *t > overload));
            let Some(source) = overloaded else {
                debug!(template = %template, "No overloaded instance");
                continue;
            };

            match self.fleet.clone_instance(&source.name).await {
                Ok(clone) => {
                    self.state.record_scale_out();
                    info!(
                        template = %template,
                        source = %source.name,
                        clone = %clone.name,
                        "Scaled out"
                    );
                    created.push(clone);
                }
                Err(e) => log_clone_failure(&source.name, &e),
            }
        }

        created
    }

    /// `check_scaling` then, if it passed, `scale_system`.
    pub async fn evaluate(&self) -> Vec<InstanceInfo> {
        if !self.check_scaling().await {
            return Vec::new();
        }
        self.scale_system().await
    }

    /// Evaluate every `check_interval` until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.config().check_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = period.as_millis() as u64,
            cooldown_secs = self.config().cooldown_secs,
            "Autoscaler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.evaluate().await;
                }
            }
        }

        info!("Autoscaler stopped");
    }
}

fn log_clone_failure(source: &str, err: &FleetError) {
    error!(source = %source, error = %err, "Failed to clone worker instance");
}
