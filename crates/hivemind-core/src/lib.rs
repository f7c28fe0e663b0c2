//! HiveMind Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - The message bus
//! - The async runtime
//! - Host resource probing
//!
//! Everything the dispatcher, the workers and the autoscaler exchange is
//! defined here.

pub mod config;
pub mod error;
pub mod health;
pub mod ids;
pub mod metrics;
pub mod status;
pub mod task;
pub mod worker;

// Re-export commonly used types
pub use config::{HealthConfig, HiveConfig, MetricsConfig, ScalingConfig, WorkerTimings};
pub use error::CoreError;
pub use health::AgentHealth;
pub use ids::TaskId;
pub use metrics::{AgentMetrics, ResourceSample, SystemMetrics};
pub use status::{TaskPriority, TaskStatus};
pub use task::Task;
pub use worker::WorkerSpec;
