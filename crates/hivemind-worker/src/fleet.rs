//! The set of running worker instances.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use hivemind_control_plane::{FleetError, InstanceInfo, WorkerFleet};
use hivemind_core::WorkerSpec;

use crate::agent::{WorkerAgent, WorkerDeps, WorkerHandle};

fn info_of(spec: &WorkerSpec) -> InstanceInfo {
    InstanceInfo {
        name: spec.name.clone(),
        template: spec.template.clone(),
        worker_type: spec.worker_type.clone(),
    }
}

/// Running worker instances, by name.
pub struct Fleet {
    deps: WorkerDeps,
    instances: RwLock<BTreeMap<String, WorkerHandle>>,
}

impl Fleet {
    pub fn new(deps: WorkerDeps) -> Self {
        Self {
            deps,
            instances: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register and start a worker.
    ///
    /// The health record and metric tracking exist before this returns, so
    /// the dispatcher can serve the instance right away.
    pub async fn spawn(&self, spec: WorkerSpec) -> Result<InstanceInfo, FleetError> {
        let mut instances = self.instances.write().await;
        if instances.contains_key(&spec.name) {
            return Err(FleetError::Spawn(format!(
                "instance {} already running",
                spec.name
            )));
        }

        let state = self.deps.dispatcher.state();
        state.register_worker(&spec.name, &spec.worker_type).await;
        self.deps.aggregator.track(&spec.name).await;

        let info = info_of(&spec);
        let handle = WorkerAgent::spawn(spec, self.deps.clone());
        instances.insert(info.name.clone(), handle);

        info!(
            worker = %info.name,
            template = %info.template,
            instances = instances.len(),
            "Worker instance added"
        );
        Ok(info)
    }

    /// Agent behind a running instance.
    pub async fn get(&self, name: &str) -> Option<WorkerAgent> {
        self.instances
            .read()
            .await
            .get(name)
            .map(|h| h.agent().clone())
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }

    /// Stop one instance and forget it.
    pub async fn stop(&self, name: &str) -> Result<(), FleetError> {
        let handle = self
            .instances
            .write()
            .await
            .remove(name)
            .ok_or_else(|| FleetError::UnknownInstance(name.to_string()))?;
        handle.stop().await;
        self.deps.aggregator.forget(name).await;
        Ok(())
    }

    /// Stop every instance, waiting for each to finish.
    pub async fn stop_all(&self) {
        let handles = std::mem::take(&mut *self.instances.write().await);
        for (name, handle) in handles {
            handle.stop().await;
            self.deps.aggregator.forget(&name).await;
        }
    }
}

#[async_trait]
impl WorkerFleet for Fleet {
    async fn instances(&self) -> Vec<InstanceInfo> {
        self.instances
            .read()
            .await
            .values()
            .map(|h| info_of(h.spec()))
            .collect()
    }

    async fn clone_instance(&self, name: &str) -> Result<InstanceInfo, FleetError> {
        let spec = self
            .instances
            .read()
            .await
            .get(name)
            .map(|h| h.spec().derive_clone())
            .ok_or_else(|| FleetError::UnknownInstance(name.to_string()))?;
        self.spawn(spec).await
    }
}
