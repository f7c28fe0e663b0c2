//! HiveMind Control Plane Library
//!
//! Central coordination for a HiveMind deployment: the task dispatcher,
//! the worker health registry, metrics aggregation, the autoscaler and
//! the HTTP surface exposing them.

pub mod aggregator;
pub mod autoscaler;
pub mod dispatcher;
pub mod fleet;
pub mod health;
pub mod http;
pub mod metrics;
pub mod state;
pub mod store;

use std::sync::Arc;

use hivemind_bus::MessageBus;
use hivemind_core::HiveConfig;

pub use aggregator::{MetricPoint, MetricsAggregator};
pub use autoscaler::{Autoscaler, Breach};
pub use dispatcher::{DispatchError, Dispatcher};
pub use fleet::{FleetError, InstanceInfo, WorkerFleet};
pub use health::{run_health_consumer, spawn_health_consumer};
pub use state::AppState;

/// The shared pieces a worker or the HTTP layer needs.
#[derive(Clone)]
pub struct ControlPlane {
    pub state: Arc<AppState>,
    pub dispatcher: Dispatcher,
    pub aggregator: Arc<MetricsAggregator>,
}

impl ControlPlane {
    pub fn new(config: Arc<HiveConfig>, bus: Arc<dyn MessageBus>) -> Self {
        let state = AppState::new(config, bus);
        Self {
            dispatcher: Dispatcher::new(state.clone()),
            aggregator: Arc::new(MetricsAggregator::new(state.clone())),
            state,
        }
    }
}
