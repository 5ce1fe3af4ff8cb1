//! Kubernetes resource watchers.
//!
//! All watchers use a generic `watch_resource()` helper built on
//! `kube_runtime::Controller`, which handles reconnection, retries, and
//! event batching. Pods route to the replica lifecycle hooks, workload sets
//! to the prewarming controller, and pool entries to the release gate.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::PostParams;
use kube::{Api, Client, ResourceExt};
use kube_runtime::{
    controller::{Action, Config as ControllerConfig},
    watcher, Controller,
};
use tracing::{debug, error, info};

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{DedicatedLoadBalancer, GameServerSet, NetworkState, ENABLED_LABEL, REPLICA_FINALIZER};

/// Boxed reconcile future, the shape `watch_resource` dispatches on.
type ReconcileFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Action, ControllerError>> + Send>>;

/// Requeue cadence while a replica waits on external provisioning.
const PROVISIONING_REQUEUE: Duration = Duration::from_secs(15);
/// Requeue cadence for steady-state drift detection.
const STEADY_REQUEUE: Duration = Duration::from_secs(300);
/// Requeue cadence for prewarming passes.
const PREWARM_REQUEUE: Duration = Duration::from_secs(60);

/// Generic watcher helper that runs a `kube_runtime::Controller` with
/// debounced events, bounded concurrency, and per-resource error backoff.
async fn watch_resource<K, F>(
    api: Api<K>,
    watch_config: watcher::Config,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    resource_name: &'static str,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + std::cmp::Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
    F: Fn(
            Arc<Reconciler>,
            Arc<K>,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<Action, ControllerError>> + Send>,
        > + Send
        + Sync
        + Clone
        + 'static,
{
    info!("Starting {} watcher", resource_name);

    // Error policy: configuration errors wait for the user, everything else
    // requeues on the resource's Fibonacci backoff.
    let error_policy = |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any());
        match error {
            ControllerError::DependencyNotReady(reason) => {
                debug!("{resource_name} {key} deferred: {reason}");
                Action::requeue(PROVISIONING_REQUEUE)
            }
            e if !e.is_retryable() => {
                error!("{resource_name} {key} misconfigured: {e}");
                Action::requeue(STEADY_REQUEUE)
            }
            e => {
                error!("Reconciliation error for {resource_name} {key}: {e}");
                Action::requeue(ctx.error_backoff(&key))
            }
        }
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            debug!("Reconciling {} {}", resource_name, obj.name_any());
            reconcile_fn(ctx, obj).await
        }
    };

    // Debounce batches bursts of status updates; concurrency bounds the
    // number of in-flight reconciliations per watcher.
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(1))
        .concurrency(5);

    Controller::new(api, watch_config)
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for {}: {}", resource_name, e);
            }
        })
        .await;

    Ok(())
}

/// Watches the resources the engine reacts to.
pub struct Watcher {
    client: Client,
    reconciler: Arc<Reconciler>,
    pod_api: Api<Pod>,
    set_api: Api<GameServerSet>,
    pool_api: Api<DedicatedLoadBalancer>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a watcher set over the given APIs.
    pub fn new(
        client: Client,
        reconciler: Arc<Reconciler>,
        pod_api: Api<Pod>,
        set_api: Api<GameServerSet>,
        pool_api: Api<DedicatedLoadBalancer>,
    ) -> Self {
        Self {
            client,
            reconciler,
            pod_api,
            set_api,
            pool_api,
        }
    }

    /// Watches managed pods and drives the replica lifecycle hooks.
    pub async fn watch_pods(&self) -> Result<(), ControllerError> {
        let client = self.client.clone();
        let reconcile = move |ctx: Arc<Reconciler>, pod: Arc<Pod>| -> ReconcileFuture {
            let client = client.clone();
            Box::pin(async move { reconcile_pod(ctx, pod, client).await })
        };
        watch_resource(
            self.pod_api.clone(),
            watcher::Config::default().labels(ENABLED_LABEL),
            Arc::clone(&self.reconciler),
            reconcile,
            "Pod",
        )
        .await
    }

    /// Watches workload sets and runs prewarming passes.
    pub async fn watch_workload_sets(&self) -> Result<(), ControllerError> {
        let reconcile = move |ctx: Arc<Reconciler>, set: Arc<GameServerSet>| -> ReconcileFuture {
            Box::pin(async move {
                ctx.reconcile_workload_set(&set).await?;
                Ok(Action::requeue(PREWARM_REQUEUE))
            })
        };
        watch_resource(
            self.set_api.clone(),
            watcher::Config::default(),
            Arc::clone(&self.reconciler),
            reconcile,
            "GameServerSet",
        )
        .await
    }

    /// Watches pool entries for the finalizer release gate.
    pub async fn watch_pool_entries(&self) -> Result<(), ControllerError> {
        let reconcile =
            move |ctx: Arc<Reconciler>, entry: Arc<DedicatedLoadBalancer>| -> ReconcileFuture {
                Box::pin(async move {
                    ctx.reconcile_pool_entry(&entry).await?;
                    Ok(Action::await_change())
                })
            };
        watch_resource(
            self.pool_api.clone(),
            watcher::Config::default(),
            Arc::clone(&self.reconciler),
            reconcile,
            "DedicatedLoadBalancer",
        )
        .await
    }
}

/// Routes one pod event through the lifecycle hooks and writes the modified
/// pod back when the hooks changed it.
async fn reconcile_pod(
    reconciler: Arc<Reconciler>,
    pod: Arc<Pod>,
    client: Client,
) -> Result<Action, ControllerError> {
    let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
    let name = pod.name_any();
    let key = format!("{namespace}/{name}");
    let api: Api<Pod> = Api::namespaced(client, &namespace);

    if pod.metadata.deletion_timestamp.is_some() {
        let has_marker = pod
            .metadata
            .finalizers
            .as_ref()
            .map(|f| f.iter().any(|x| x == REPLICA_FINALIZER))
            .unwrap_or(false);
        if has_marker {
            let cleared = reconciler.on_replica_deleted(&pod).await?;
            if pod_changed(&pod, &cleared) {
                api.replace(&name, &PostParams::default(), &cleared).await?;
            }
        }
        reconciler.reset_errors(&key);
        return Ok(Action::await_change());
    }

    let added = reconciler.on_replica_added(&pod).await?;
    let (updated, state) = reconciler.on_replica_updated(&added).await?;
    if pod_changed(&pod, &updated) {
        api.replace(&name, &PostParams::default(), &updated).await?;
    }
    reconciler.reset_errors(&key);

    Ok(match state {
        // Readiness depends on vendor-side status we are not watching, so
        // poll until the object reports.
        NetworkState::NotReady => Action::requeue(PROVISIONING_REQUEUE),
        NetworkState::Ready => Action::requeue(STEADY_REQUEUE),
        NetworkState::Waiting => Action::await_change(),
    })
}

/// Whether the hooks changed anything the API server needs to see.
fn pod_changed(before: &Pod, after: &Pod) -> bool {
    before.metadata.annotations != after.metadata.annotations
        || before.metadata.finalizers != after.metadata.finalizers
}
