//! Local resource sampling.

use std::sync::Mutex;

use sysinfo::System;

use hivemind_core::ResourceSample;

/// Source of CPU and memory readings for a worker.
pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> ResourceSample;
}

/// Host-wide readings via sysinfo.
///
/// CPU usage is computed between consecutive calls, so the first sample
/// after construction reads low.
pub struct SystemProbe {
    system: Mutex<System>,
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemProbe {
    fn sample(&self) -> ResourceSample {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_cpu_usage();
        system.refresh_memory();

        let total = system.total_memory();
        let memory_usage = if total == 0 {
            0.0
        } else {
            system.used_memory() as f64 / total as f64 * 100.0
        };

        ResourceSample {
            cpu_usage: f64::from(system.global_cpu_usage()),
            memory_usage,
        }
    }
}

/// Always returns the same reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedProbe(pub ResourceSample);

impl FixedProbe {
    pub fn new(cpu_usage: f64, memory_usage: f64) -> Self {
        Self(ResourceSample {
            cpu_usage,
            memory_usage,
        })
    }
}

impl ResourceProbe for FixedProbe {
    fn sample(&self) -> ResourceSample {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_probe_in_range() {
        let probe = SystemProbe::new();
        let sample = probe.sample();
        assert!((0.0..=100.0).contains(&sample.memory_usage));
        assert!(sample.cpu_usage >= 0.0);
    }

    #[test]
    fn test_fixed_probe() {
        let probe = FixedProbe::new(42.0, 17.5);
        assert_eq!(probe.sample().cpu_usage, 42.0);
        assert_eq!(probe.sample().memory_usage, 17.5);
    }
}
