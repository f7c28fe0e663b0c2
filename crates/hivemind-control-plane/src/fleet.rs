//! Seam between the autoscaler and whatever runs worker instances.

use async_trait::async_trait;
use thiserror::Error;

/// Fleet errors.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Unknown worker instance: {0}")]
    UnknownInstance(String),

    #[error("Failed to spawn worker instance: {0}")]
    Spawn(String),
}

/// A running worker instance as seen by the autoscaler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub name: String,
    /// Name of the original configuration this instance derives from.
    pub template: String,
    pub worker_type: String,
}

/// Something that can list and clone worker instances.
#[async_trait]
pub trait WorkerFleet: Send + Sync {
    /// Running instances.
    async fn instances(&self) -> Vec<InstanceInfo>;

    /// Start a new instance with the same configuration as `name`.
    async fn clone_instance(&self, name: &str) -> Result<InstanceInfo, FleetError>;
}
