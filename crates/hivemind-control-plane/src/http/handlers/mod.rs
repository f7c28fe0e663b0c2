//! HTTP request handlers.

mod health;
mod tasks;
mod workers;

pub use health::{health_check, metrics_handler, system_metrics};
pub use tasks::{create_task, get_task, list_tasks};
pub use workers::list_workers;
