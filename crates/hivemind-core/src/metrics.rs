//! Resource and load metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One reading of host resources taken by a worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// CPU usage percentage (0-100).
    pub cpu_usage: f64,
    /// Memory usage percentage (0-100).
    pub memory_usage: f64,
}

/// Per-worker indicators folded into [`SystemMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub agent_name: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    /// Pending tasks routed to this worker's type.
    pub tasks_in_queue: usize,
    /// Processing time estimate, seconds.
    pub response_time: f64,
    pub error_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl AgentMetrics {
    /// Empty record for a newly tracked worker.
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            cpu_usage: 0.0,
            memory_usage: 0.0,
            tasks_in_queue: 0,
            response_time: 0.0,
            error_rate: 0.0,
            last_updated: Utc::now(),
        }
    }

    /// Named values published on `metrics.<worker>.<name>`.
    pub fn published_values(&self) -> [(&'static str, f64); 5] {
        [
            ("cpu", self.cpu_usage),
            ("memory", self.memory_usage),
            ("tasks_in_queue", self.tasks_in_queue as f64),
            ("response_time", self.response_time),
            ("error_rate", self.error_rate),
        ]
    }
}

/// Population-level averages across the tracked workers.
///
/// Derived on every aggregation tick, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Mean CPU percentage.
    pub cpu_usage: f64,
    /// Mean memory percentage.
    pub memory_usage: f64,
    /// Mean pending tasks per worker.
    pub queue_depth: f64,
    /// Mean error rate.
    pub error_rate: f64,
    /// Number of workers the averages were taken over.
    pub population: usize,
    /// When the snapshot was computed.
    pub updated_at: Option<DateTime<Utc>>,
}

impl SystemMetrics {
    /// Arithmetic mean over `metrics`. Returns `None` for an empty population.
    pub fn aggregate<'a, I>(metrics: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a AgentMetrics>,
    {
        let mut cpu = 0.0;
        let mut memory = 0.0;
        let mut queue = 0.0;
        let mut errors = 0.0;
        let mut population = 0usize;

        for m in metrics {
            cpu += m.cpu_usage;
            memory += m.memory_usage;
            queue += m.tasks_in_queue as f64;
            errors += m.error_rate;
            population += 1;
        }

        if population == 0 {
            return None;
        }

        let n = population as f64;
        Some(Self {
            cpu_usage: cpu / n,
            memory_usage: memory / n,
            queue_depth: queue / n,
            error_rate: errors / n,
            population,
            updated_at: Some(Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(name: &str, cpu: f64, mem: f64, queue: usize, err: f64) -> AgentMetrics {
        AgentMetrics {
            cpu_usage: cpu,
            memory_usage: mem,
            tasks_in_queue: queue,
            error_rate: err,
            ..AgentMetrics::new(name)
        }
    }

    #[test]
    fn test_aggregate_means() {
        let all = [
            metrics("a", 90.0, 40.0, 4, 0.0),
            metrics("b", 50.0, 60.0, 2, 0.5),
        ];
        let snapshot = SystemMetrics::aggregate(&all).unwrap();

        assert_eq!(snapshot.population, 2);
        assert!((snapshot.cpu_usage - 70.0).abs() < f64::EPSILON);
        assert!((snapshot.memory_usage - 50.0).abs() < f64::EPSILON);
        assert!((snapshot.queue_depth - 3.0).abs() < f64::EPSILON);
        assert!((snapshot.error_rate - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregate_empty_population() {
        let none: [AgentMetrics; 0] = [];
        assert!(SystemMetrics::aggregate(&none).is_none());
    }
}
