//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;

use chrono::Utc;

use hivemind_core::{SystemMetrics, TaskStatus};

use crate::ControlPlane;

/// Collect all metrics and format as Prometheus text.
pub async fn collect_metrics(plane: &ControlPlane) -> String {
    let mut output = String::new();

    collect_worker_metrics(plane, &mut output).await;
    collect_task_metrics(plane, &mut output).await;
    collect_system_metrics(&plane.aggregator.latest().await, &mut output);

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP hivemind_scale_outs_total Worker instances created by the autoscaler"
    )
    .ok();
    writeln!(output, "# TYPE hivemind_scale_outs_total counter").ok();
    writeln!(
        output,
        "hivemind_scale_outs_total {}",
        plane.state.scale_out_count()
    )
    .ok();

    output
}

/// Collect worker counts by liveness.
async fn collect_worker_metrics(plane: &ControlPlane, output: &mut String) {
    let window = plane.state.liveness_window();
    let now = Utc::now();

    let mut idle = 0u64;
    let mut processing = 0u64;
    let mut stale = 0u64;

    for record in plane.state.health.read().await.values() {
        if !record.is_live_at(now, window) {
            stale += 1;
        } else if record.is_processing {
            processing += 1;
        } else {
            idle += 1;
        }
    }

    writeln!(
        output,
        "# HELP hivemind_workers Number of known workers by state"
    )
    .ok();
    writeln!(output, "# TYPE hivemind_workers gauge").ok();
    writeln!(output, "hivemind_workers{{state=\"idle\"}} {idle}").ok();
    writeln!(output, "hivemind_workers{{state=\"processing\"}} {processing}").ok();
    writeln!(output, "hivemind_workers{{state=\"stale\"}} {stale}").ok();
}

/// Collect task metrics by status.
async fn collect_task_metrics(plane: &ControlPlane, output: &mut String) {
    let counts = plane.dispatcher.task_counts().await;

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP hivemind_tasks_total Total number of tasks by status"
    )
    .ok();
    writeln!(output, "# TYPE hivemind_tasks_total gauge").ok();
    for status in TaskStatus::ALL {
        let count = counts.get(&status).copied().unwrap_or(0);
        writeln!(
            output,
            "hivemind_tasks_total{{status=\"{}\"}} {count}",
            status.as_str()
        )
        .ok();
    }
}

fn collect_system_metrics(system: &SystemMetrics, output: &mut String) {
    let gauges = [
        ("cpu_usage_percent", "Mean CPU usage across workers", system.cpu_usage),
        ("memory_usage_percent", "Mean memory usage across workers", system.memory_usage),
        ("queue_depth", "Mean pending tasks per worker", system.queue_depth),
        ("error_rate", "Mean task error rate", system.error_rate),
        ("tracked_workers", "Workers in the last aggregation", system.population as f64),
    ];

    for (name, help, value) in gauges {
        writeln!(output).ok();
        writeln!(output, "# HELP hivemind_system_{name} {help}").ok();
        writeln!(output, "# TYPE hivemind_system_{name} gauge").ok();
        writeln!(output, "hivemind_system_{name} {value}").ok();
    }
}
