//! HiveMind configuration.
//!
//! A single [`HiveConfig`] is built once (defaults, then an optional JSON
//! file, then command-line overrides) and handed to every component.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    pub health: HealthConfig,
    pub worker: WorkerTimings,
    pub metrics: MetricsConfig,
    pub scaling: ScalingConfig,
}

/// Upper bound for `health.liveness_window_secs` (one year).
pub const MAX_LIVENESS_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Health registry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Maximum heartbeat age for a worker to be considered live (seconds).
    pub liveness_window_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            liveness_window_secs: 30,
        }
    }
}

impl HealthConfig {
    /// Saturates at the largest representable duration.
    pub fn liveness_window(&self) -> chrono::Duration {
        i64::try_from(self.liveness_window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

/// Worker loop intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerTimings {
    pub heartbeat_interval_ms: u64,
    pub sample_interval_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WorkerTimings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 10_000,
            sample_interval_ms: 3_000,
            poll_interval_ms: 1_000,
        }
    }
}

impl WorkerTimings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Metrics aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub aggregation_interval_ms: u64,
    /// Publish per-worker values on `metrics.<worker>.<metric>`.
    pub publish_metrics: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            aggregation_interval_ms: 5_000,
            publish_metrics: true,
        }
    }
}

impl MetricsConfig {
    pub fn aggregation_interval(&self) -> Duration {
        Duration::from_millis(self.aggregation_interval_ms)
    }
}

/// Autoscaler thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Mean CPU percentage above which to scale.
    pub cpu_threshold: f64,
    /// Mean memory percentage above which to scale.
    pub memory_threshold: f64,
    /// Mean pending tasks per worker above which to scale.
    pub queue_depth_threshold: f64,
    /// Mean error rate (0-1) above which to scale.
    pub error_rate_threshold: f64,
    /// Minimum time between scale-outs (seconds).
    pub cooldown_secs: u64,
    /// Processing time estimate (seconds) marking an instance as overloaded.
    pub overload_processing_secs: f64,
    /// How often the autoscaler evaluates.
    pub check_interval_ms: u64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: 80.0,
            memory_threshold: 85.0,
            queue_depth_threshold: 10.0,
            error_rate_threshold: 0.05,
            cooldown_secs: 300,
            overload_processing_secs: 5.0,
            check_interval_ms: 5_000,
        }
    }
}

impl ScalingConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl HiveConfig {
    /// Load a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::InvalidConfig(format!("failed to read '{}': {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the loops cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        let intervals = [
            ("worker.heartbeat_interval_ms", self.worker.heartbeat_interval_ms),
            ("worker.sample_interval_ms", self.worker.sample_interval_ms),
            ("worker.poll_interval_ms", self.worker.poll_interval_ms),
            (
                "metrics.aggregation_interval_ms",
                self.metrics.aggregation_interval_ms,
            ),
            ("scaling.check_interval_ms", self.scaling.check_interval_ms),
            ("health.liveness_window_secs", self.health.liveness_window_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(CoreError::InvalidConfig(format!("{name} must be > 0")));
            }
        }

        if self.health.liveness_window_secs > MAX_LIVENESS_WINDOW_SECS {
            return Err(CoreError::InvalidConfig(format!(
                "health.liveness_window_secs must be at most {MAX_LIVENESS_WINDOW_SECS}"
            )));
        }

        let s = &self.scaling;
        let thresholds = [
            ("scaling.cpu_threshold", s.cpu_threshold),
            ("scaling.memory_threshold", s.memory_threshold),
            ("scaling.queue_depth_threshold", s.queue_depth_threshold),
            ("scaling.overload_processing_secs", s.overload_processing_secs),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(CoreError::InvalidConfig(format!(
                    "{name} must be a non-negative number"
                )));
            }
        }

        if !(0.0..=1.0).contains(&s.error_rate_threshold) {
            return Err(CoreError::InvalidConfig(
                "scaling.error_rate_threshold must be within [0, 1]".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_design_values() {
        let config = HiveConfig::default();
        assert_eq!(config.health.liveness_window_secs, 30);
        assert_eq!(config.worker.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(config.worker.sample_interval(), Duration::from_secs(3));
        assert_eq!(config.worker.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.metrics.aggregation_interval(), Duration::from_secs(5));
        assert_eq!(config.scaling.cooldown(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: HiveConfig =
            serde_json::from_str(r#"{ "scaling": { "cpu_threshold": 60.0 } }"#).unwrap();
        assert_eq!(config.scaling.cpu_threshold, 60.0);
        assert_eq!(config.scaling.memory_threshold, 85.0);
        assert_eq!(config.health.liveness_window_secs, 30);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = HiveConfig::default();
        config.worker.poll_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfig(msg)) if msg.contains("poll_interval_ms")
        ));
    }

    #[test]
    fn test_huge_liveness_window_is_rejected_not_panicking() {
        let mut config = HiveConfig::default();
        config.health.liveness_window_secs = u64::MAX;
        assert_eq!(config.health.liveness_window(), chrono::Duration::MAX);
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfig(msg)) if msg.contains("liveness_window_secs")
        ));

        config.health.liveness_window_secs = MAX_LIVENESS_WINDOW_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_error_rate_above_one() {
        let mut config = HiveConfig::default();
        config.scaling.error_rate_threshold = 5.0;
        assert!(config.validate().is_err());
    }
}
