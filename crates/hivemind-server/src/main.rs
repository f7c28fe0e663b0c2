//! HiveMind Server
//!
//! Runs the control plane, a fleet of simulated worker agents and the
//! autoscaler in one process, with the HTTP API in front.

mod config;
mod error;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::seq::SliceRandom;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hivemind_bus::amqp::{AmqpBus, DEFAULT_EXCHANGE};
use hivemind_bus::{InMemoryBus, MessageBus};
use hivemind_control_plane::http::create_router;
use hivemind_control_plane::{spawn_health_consumer, Autoscaler, ControlPlane};
use hivemind_core::{Task, TaskPriority, WorkerSpec};
use hivemind_worker::{Fleet, SimulatedExecutor, SystemProbe, WorkerDeps};

use config::{Args, BusKind, LogFormat};
use error::ServerError;

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hivemind=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn connect_bus(args: &Args) -> Result<Arc<dyn MessageBus>, ServerError> {
    match args.bus {
        BusKind::Memory => {
            info!("Using in-process message bus");
            Ok(Arc::new(InMemoryBus::new()))
        }
        BusKind::Amqp => {
            let bus = AmqpBus::connect(&args.amqp_url, DEFAULT_EXCHANGE).await?;
            info!(exchange = DEFAULT_EXCHANGE, "Connected to AMQP broker");
            Ok(Arc::new(bus))
        }
    }
}

/// Random tasks spread over the template types.
fn seed_tasks(templates: &[WorkerSpec], count: usize) -> Vec<Task> {
    const PRIORITIES: [TaskPriority; 3] =
        [TaskPriority::Low, TaskPriority::Normal, TaskPriority::High];

    let mut rng = rand::thread_rng();
    (0..count)
        .filter_map(|n| {
            let spec = templates.choose(&mut rng)?;
            let priority = *PRIORITIES.choose(&mut rng)?;
            Some(
                Task::new(spec.worker_type.clone(), priority)
                    .with_payload(serde_json::json!({ "seed": n })),
            )
        })
        .collect()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c");
    }
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = Arc::new(args.hive_config()?);
    info!(
        liveness_window_secs = config.health.liveness_window_secs,
        cooldown_secs = config.scaling.cooldown_secs,
        "HiveMind starting"
    );

    // Bus connectivity failures abort startup.
    let bus = connect_bus(&args).await?;
    let plane = ControlPlane::new(config.clone(), bus);
    let cancel = CancellationToken::new();

    let health_consumer = spawn_health_consumer(plane.state.clone(), cancel.clone()).await?;
    let aggregator = tokio::spawn(plane.aggregator.clone().run(cancel.clone()));

    let executor = SimulatedExecutor::new(
        Duration::from_millis(args.sim_min_ms),
        Duration::from_millis(args.sim_max_ms),
    )
    .with_failure_rate(args.sim_failure_rate);
    let deps = WorkerDeps::new(&plane, Arc::new(executor), Arc::new(SystemProbe::new()));
    let fleet = Arc::new(Fleet::new(deps));

    let templates = args.templates();
    for spec in &templates {
        fleet.spawn(spec.clone()).await?;
    }

    let autoscaler = Arc::new(Autoscaler::new(
        plane.state.clone(),
        plane.aggregator.clone(),
        fleet.clone(),
    ));
    let scaler = tokio::spawn(autoscaler.run(cancel.clone()));

    for task in seed_tasks(&templates, args.seed_tasks) {
        plane.dispatcher.add_task(task).await?;
    }

    let listener = TcpListener::bind(&args.http_addr).await?;
    info!(http_addr = %args.http_addr, workers = templates.len(), "HTTP server listening");

    let served = axum::serve(listener, create_router(plane.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = &served {
        error!(error = %e, "HTTP server error");
    }

    fleet.stop_all().await;
    cancel.cancel();
    for (name, handle) in [
        ("health consumer", health_consumer),
        ("aggregator", aggregator),
        ("autoscaler", scaler),
    ] {
        if let Err(e) = handle.await {
            error!(task = name, error = %e, "Background task failed");
        }
    }

    info!("HiveMind stopped");
    served.map_err(ServerError::from)
}
