//! Per-worker task counters and the processing time estimate.

use serde::Serialize;

/// Counters kept by a worker across the tasks it has run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TaskStats {
    pub total: u64,
    pub succeeded: u64,
    /// EMA of task durations in seconds; `None` before the first task.
    pub processing_time: Option<f64>,
}

impl TaskStats {
    /// Weight of the newest observation.
    pub const SMOOTHING: f64 = 0.5;

    /// Fold one finished task into the counters.
    pub fn record(&mut self, duration_secs: f64, success: bool) {
        self.total += 1;
        if success {
            self.succeeded += 1;
        }
        self.processing_time = Some(match self.processing_time {
            None => duration_secs,
            Some(old) => (1.0 - Self::SMOOTHING) * old + Self::SMOOTHING * duration_secs,
        });
    }

    pub fn failed(&self) -> u64 {
        self.total - self.succeeded
    }

    /// `succeeded / total`, or 1.0 before any task.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }

    pub fn processing_time_estimate(&self) -> f64 {
        self.processing_time.unwrap_or(0.0)
    }
}
