//! Main controller implementation.
//!
//! Wires the allocator, the cloud client, and the reconciler together and
//! runs the watchers. Cold-start reconstruction completes before the first
//! watcher spawns, so no lifecycle event can race the rebuild.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tokio::task::JoinHandle;
use tracing::info;

use crate::allocator::PortAllocator;
use crate::config::AllocatorConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use cloud_client::KubeCloudClient;
use crds::{DedicatedLoadBalancer, GameServerSet};

/// Main controller for game-server network management.
pub struct Controller {
    pod_watcher: JoinHandle<Result<(), ControllerError>>,
    set_watcher: JoinHandle<Result<(), ControllerError>>,
    pool_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

impl Controller {
    /// Creates a controller instance: builds the clients, reconstructs
    /// allocator state from the cluster, runs the initial prewarming passes,
    /// and starts the watchers.
    pub async fn new(
        allocator_config: AllocatorConfig,
        namespace: Option<String>,
    ) -> Result<Self, ControllerError> {
        info!("Initializing gamenet controller");

        let kube_client = Client::try_default().await?;
        let cloud = KubeCloudClient::new(kube_client.clone(), namespace.clone());

        let allocator = Arc::new(PortAllocator::new(allocator_config.clone()));
        let reconciler = Arc::new(Reconciler::new(
            Box::new(cloud),
            Arc::clone(&allocator),
            allocator_config,
        ));

        // Reconstruct-then-serve: the watchers must not start until the
        // allocator state is rebuilt from the cluster.
        reconciler.initialize().await?;

        let (pod_api, set_api, pool_api): (Api<Pod>, Api<GameServerSet>, Api<DedicatedLoadBalancer>) =
            match namespace.as_deref() {
                Some(ns) => (
                    Api::namespaced(kube_client.clone(), ns),
                    Api::namespaced(kube_client.clone(), ns),
                    Api::namespaced(kube_client.clone(), ns),
                ),
                None => (
                    Api::all(kube_client.clone()),
                    Api::all(kube_client.clone()),
                    Api::all(kube_client.clone()),
                ),
            };

        let watcher = Arc::new(Watcher::new(
            kube_client,
            reconciler,
            pod_api,
            set_api,
            pool_api,
        ));

        let pod_watcher = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.watch_pods().await })
        };
        let set_watcher = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.watch_workload_sets().await })
        };
        let pool_watcher = tokio::spawn(async move { watcher.watch_pool_entries().await });

        Ok(Self {
            pod_watcher,
            set_watcher,
            pool_watcher,
        })
    }

    /// Runs the controller until a watcher exits (they should run forever).
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("gamenet controller running");

        tokio::select! {
            result = &mut self.pod_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Pod watcher panicked: {e}")))??;
            }
            result = &mut self.set_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("GameServerSet watcher panicked: {e}")))??;
            }
            result = &mut self.pool_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("DedicatedLoadBalancer watcher panicked: {e}")))??;
            }
        }

        Ok(())
    }
}
